//! flex scheduler library.
//!
//! Matches offer batches against pending tasks, tracks every task through
//! its lifecycle sets with a persisted snapshot, and parks unused offers
//! from elastic hosts for the host cluster manager.

pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod ledger;
pub mod offer_cache;
pub mod operations;
pub mod profiles;
pub mod reconcile;
pub mod state;
pub mod status;
pub mod task_factory;
pub mod terminator;

pub use config::Config;
pub use coordinator::{AllocationCoordinator, AllocationStats};
pub use driver::{OfferDriver, RecordingDriver};
pub use error::{SchedulerError, SchedulerResult};
pub use ledger::ResourceLedger;
pub use offer_cache::{HostRegistry, OfferCache};
pub use operations::{FlexOperations, FlexUpRequest};
pub use profiles::ProfileRegistry;
pub use reconcile::{ReconcileService, ReconcileStats};
pub use state::{MemoryStateStore, StateStore, TaskLifecycleStore};
pub use status::StatusUpdateHandler;
pub use terminator::{TaskTerminator, TerminationStats};
