//! Scheduler error types.

use flex_id::IdError;
use flex_model::ModelError;
use flex_state_format::StateFormatError;

use crate::driver::DriverError;
use crate::ledger::LedgerError;
use crate::state::StoreError;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors surfaced by scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("framework id already set to {existing}, refusing {requested}")]
    FrameworkIdConflict { existing: String, requested: String },

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("state format error: {0}")]
    StateFormat(#[from] StateFormatError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}
