//! Task reconciliation after (re)registration.
//!
//! The first request carries every known status. Later attempts, spaced
//! by a growing delay, resend only the tasks that have not reported since
//! reconciliation began. The service stops once every task has reported
//! or the attempt budget runs out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::driver::OfferDriver;
use crate::error::SchedulerResult;
use crate::state::TaskLifecycleStore;

/// Outcome of one reconciliation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub requests_sent: usize,
    pub failures: usize,
    /// Every task reported before the attempts ran out.
    pub complete: bool,
}

/// Asks the offer source for the latest state of known tasks.
pub struct ReconcileService {
    store: Arc<TaskLifecycleStore>,
    driver: Arc<dyn OfferDriver>,
    max_attempts: u32,
    base_delay: Duration,
}

impl ReconcileService {
    pub fn new(
        store: Arc<TaskLifecycleStore>,
        driver: Arc<dyn OfferDriver>,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            store,
            driver,
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<TaskLifecycleStore>,
        driver: Arc<dyn OfferDriver>,
    ) -> Self {
        Self::new(store, driver, config.reconcile_max_attempts, config.reconcile_delay())
    }

    /// Sends every known status. Returns how many were sent.
    pub fn reconcile_all(&self) -> SchedulerResult<usize> {
        let statuses = self.store.task_statuses();
        self.driver.reconcile(&statuses)?;
        Ok(statuses.len())
    }

    /// Resends statuses unchanged since `mark`. Nothing is sent when every
    /// task has reported.
    pub fn reconcile_unchanged(&self, mark: u64) -> SchedulerResult<usize> {
        let statuses = self.store.statuses_since_unchanged(mark);
        if statuses.is_empty() {
            return Ok(0);
        }
        self.driver.reconcile(&statuses)?;
        Ok(statuses.len())
    }

    /// Runs one reconciliation until done, out of attempts or shut down.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let mark = self.store.status_mark();

        match self.reconcile_all() {
            Ok(sent) => {
                info!(statuses = sent, "Reconciliation started");
                stats.requests_sent += 1;
            }
            Err(e) => {
                warn!(error = %e, "Initial reconcile request failed");
                stats.failures += 1;
            }
        }

        for attempt in 1..=self.max_attempts {
            let delay = self.base_delay.saturating_mul(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciliation shutting down");
                        return stats;
                    }
                }
            }

            match self.reconcile_unchanged(mark) {
                Ok(0) => {
                    info!(attempt, "Reconciliation complete");
                    stats.complete = true;
                    return stats;
                }
                Ok(sent) => {
                    debug!(attempt, statuses = sent, "Resent unreported statuses");
                    stats.requests_sent += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconcile request failed");
                    stats.failures += 1;
                }
            }
        }

        stats.complete = self.store.statuses_since_unchanged(mark).is_empty();
        if !stats.complete {
            warn!(attempts = self.max_attempts, "Reconciliation attempts exhausted");
        }
        stats
    }

    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<ReconcileStats> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
