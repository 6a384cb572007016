//! Periodic termination of killable tasks.
//!
//! Placed tasks get a kill request and stay killable until their terminal
//! status arrives, so a lost request is retried on the next pass. Tasks
//! that were never placed are removed outright.

use std::sync::Arc;
use std::time::Duration;

use flex_model::LifecycleState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::driver::OfferDriver;
use crate::state::TaskLifecycleStore;

/// Statistics from one termination pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminationStats {
    pub kills_requested: usize,
    pub tasks_removed: usize,
    pub kill_failures: usize,
}

impl TerminationStats {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Kills or removes every killable task.
pub struct TaskTerminator {
    store: Arc<TaskLifecycleStore>,
    driver: Arc<dyn OfferDriver>,
}

impl TaskTerminator {
    pub fn new(store: Arc<TaskLifecycleStore>, driver: Arc<dyn OfferDriver>) -> Self {
        Self { store, driver }
    }

    /// Runs a single pass.
    pub fn run_once(&self) -> TerminationStats {
        let mut stats = TerminationStats::default();

        for (task_id, task) in self.store.tasks_in(LifecycleState::Killable) {
            if !task.is_placed() {
                self.store.remove(&task_id);
                stats.tasks_removed += 1;
                continue;
            }

            match self.driver.kill(&task_id) {
                Ok(()) => {
                    debug!(task_id = %task_id, hostname = %task.hostname, "Kill requested");
                    stats.kills_requested += 1;
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Kill request failed, will retry");
                    stats.kill_failures += 1;
                }
            }
        }

        stats
    }

    /// Spawns the pass loop at the configured interval.
    pub fn spawn(
        self: Arc<Self>,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let period = config.terminator_interval();
        tokio::spawn(async move { self.run(period, shutdown).await })
    }

    /// Runs passes every `period` until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = period.as_secs(), "Starting task terminator");

        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.run_once();
                    if !stats.is_idle() {
                        info!(
                            kills_requested = stats.kills_requested,
                            tasks_removed = stats.tasks_removed,
                            kill_failures = stats.kill_failures,
                            "Termination pass complete"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Task terminator shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;
    use flex_id::TaskId;
    use flex_model::{Constraint, ResourceProfile, Task};

    fn setup() -> (TaskTerminator, Arc<TaskLifecycleStore>, Arc<RecordingDriver>, Vec<TaskId>) {
        let store = Arc::new(TaskLifecycleStore::in_memory());
        let driver = Arc::new(RecordingDriver::new());
        let profile = ResourceProfile::new("small", 1.0, 1.0);
        let ids = store
            .add_tasks(vec![
                Task::new(profile.clone(), Constraint::None, "nm"),
                Task::new(profile, Constraint::None, "nm"),
            ])
            .unwrap();
        store.record_placement(&ids[0], "host-1", "agent-1".parse().unwrap(), None);
        for id in &ids {
            store.make_killable(id);
        }
        (TaskTerminator::new(store.clone(), driver.clone()), store, driver, ids)
    }

    #[test]
    fn test_placed_task_killed_unplaced_removed() {
        let (terminator, store, driver, ids) = setup();

        let stats = terminator.run_once();

        assert_eq!(stats.kills_requested, 1);
        assert_eq!(stats.tasks_removed, 1);
        assert_eq!(driver.killed(), vec![ids[0].clone()]);
        assert_eq!(store.state_of(&ids[0]), Some(LifecycleState::Killable));
        assert!(!store.contains(&ids[1]));
    }

    #[test]
    fn test_kill_failure_retried() {
        let (terminator, store, driver, ids) = setup();
        driver.set_fail_kills(true);

        let stats = terminator.run_once();
        assert_eq!(stats.kill_failures, 1);
        assert!(driver.killed().is_empty());
        assert_eq!(store.state_of(&ids[0]), Some(LifecycleState::Killable));

        driver.set_fail_kills(false);
        let stats = terminator.run_once();
        assert_eq!(stats.kills_requested, 1);
        assert_eq!(driver.killed(), vec![ids[0].clone()]);
    }

    #[test]
    fn test_idle_pass() {
        let terminator = TaskTerminator::new(
            Arc::new(TaskLifecycleStore::in_memory()),
            Arc::new(RecordingDriver::new()),
        );
        assert!(terminator.run_once().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let (terminator, store, driver, ids) = setup();
        let terminator = Arc::new(terminator);
        let (tx, rx) = watch::channel(false);

        let worker = {
            let terminator = terminator.clone();
            tokio::spawn(async move { terminator.run(Duration::from_secs(5), rx).await })
        };

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(driver.killed(), vec![ids[0].clone()]);
        assert!(!store.contains(&ids[1]));

        tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_uses_configured_interval() {
        let (terminator, _store, driver, ids) = setup();
        let config = Config {
            terminator_interval_secs: 30,
            ..Config::default()
        };
        let (tx, rx) = watch::channel(false);
        let worker = Arc::new(terminator).spawn(&config, rx);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(driver.killed().is_empty());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(driver.killed(), vec![ids[0].clone()]);

        tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
