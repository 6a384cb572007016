//! Offer source interface and a recording mock.
//!
//! The driver is how the scheduler talks back to the offer source:
//! - Launching tasks against accepted offers
//! - Declining offers it will not use
//! - Killing tasks marked for termination
//! - Asking for the latest state of tasks it already knows about
//!
//! A recording implementation is provided for testing and development.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use flex_id::{OfferId, TaskId};
use flex_model::TaskLaunch;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors reported by the offer source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("driver is not running")]
    NotRunning,

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Result type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Calls toward the offer source.
pub trait OfferDriver: Send + Sync {
    /// Launch tasks against the given offers.
    fn launch(&self, offer_ids: &[OfferId], launches: &[TaskLaunch]) -> DriverResult<()>;

    /// Decline an offer.
    fn decline(&self, offer_id: &OfferId) -> DriverResult<()>;

    /// Kill a running task.
    fn kill(&self, task_id: &TaskId) -> DriverResult<()>;

    /// Send the last known status of each task so the offer source reports
    /// any that changed.
    fn reconcile(&self, statuses: &[(TaskId, Bytes)]) -> DriverResult<()>;
}

/// A call recorded by [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Launch {
        offer_ids: Vec<OfferId>,
        launches: Vec<TaskLaunch>,
    },
    Decline(OfferId),
    Kill(TaskId),
    Reconcile(Vec<TaskId>),
}

/// Mock driver that records every call.
#[derive(Default)]
pub struct RecordingDriver {
    calls: Mutex<Vec<DriverCall>>,

    /// Whether launches should be rejected.
    fail_launches: AtomicBool,

    /// Whether kills should be rejected.
    fail_kills: AtomicBool,

    /// Whether reconcile requests should be rejected.
    fail_reconciles: AtomicBool,
}

impl RecordingDriver {
    /// Create a new recording driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recording driver that rejects every launch.
    pub fn failing_launches() -> Self {
        let driver = Self::new();
        driver.set_fail_launches(true);
        driver
    }

    pub fn set_fail_launches(&self, fail: bool) {
        self.fail_launches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_kills(&self, fail: bool) {
        self.fail_kills.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reconciles(&self, fail: bool) {
        self.fail_reconciles.store(fail, Ordering::SeqCst);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    /// Launch requests that went through.
    pub fn launches(&self) -> Vec<TaskLaunch> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::Launch { launches, .. } => Some(launches.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn declined(&self) -> Vec<OfferId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::Decline(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn killed(&self) -> Vec<TaskId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::Kill(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Task ids of each reconcile request, one entry per request.
    pub fn reconciled(&self) -> Vec<Vec<TaskId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::Reconcile(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl OfferDriver for RecordingDriver {
    fn launch(&self, offer_ids: &[OfferId], launches: &[TaskLaunch]) -> DriverResult<()> {
        if self.fail_launches.load(Ordering::SeqCst) {
            return Err(DriverError::Rejected(
                "recording driver configured to fail launches".to_string(),
            ));
        }
        debug!(offers = offer_ids.len(), tasks = launches.len(), "Recording launch");
        self.calls.lock().push(DriverCall::Launch {
            offer_ids: offer_ids.to_vec(),
            launches: launches.to_vec(),
        });
        Ok(())
    }

    fn decline(&self, offer_id: &OfferId) -> DriverResult<()> {
        debug!(offer_id = %offer_id, "Recording decline");
        self.calls.lock().push(DriverCall::Decline(offer_id.clone()));
        Ok(())
    }

    fn kill(&self, task_id: &TaskId) -> DriverResult<()> {
        if self.fail_kills.load(Ordering::SeqCst) {
            return Err(DriverError::NotRunning);
        }
        debug!(task_id = %task_id, "Recording kill");
        self.calls.lock().push(DriverCall::Kill(task_id.clone()));
        Ok(())
    }

    fn reconcile(&self, statuses: &[(TaskId, Bytes)]) -> DriverResult<()> {
        if self.fail_reconciles.load(Ordering::SeqCst) {
            return Err(DriverError::NotRunning);
        }
        debug!(tasks = statuses.len(), "Recording reconcile");
        let ids = statuses.iter().map(|(id, _)| id.clone()).collect();
        self.calls.lock().push(DriverCall::Reconcile(ids));
        Ok(())
    }
}
