//! Status update handling.

use std::sync::Arc;

use flex_model::{LifecycleSignal, LifecycleState, StatusUpdate};
use tracing::{info, warn};

use crate::offer_cache::OfferCache;
use crate::state::TaskLifecycleStore;

/// Applies status updates from the offer source to the task store.
///
/// Each signal is an absolute assignment, so duplicated or reordered
/// updates are harmless.
pub struct StatusUpdateHandler {
    store: Arc<TaskLifecycleStore>,
    cache: Arc<OfferCache>,
}

impl StatusUpdateHandler {
    pub fn new(store: Arc<TaskLifecycleStore>, cache: Arc<OfferCache>) -> Self {
        Self { store, cache }
    }

    pub fn handle(&self, update: &StatusUpdate) {
        let task_id = &update.task_id;
        let Some(task) = self.store.task(task_id) else {
            warn!(task_id = %task_id, signal = %update.signal, "Status for unknown task ignored");
            return;
        };

        self.store.attach_status(task_id, update.data.clone());

        match &update.signal {
            LifecycleSignal::Staging | LifecycleSignal::Starting => {
                self.store.make_staging(task_id);
            }
            LifecycleSignal::Running => {
                self.store.make_active(task_id);
            }
            LifecycleSignal::Finished | LifecycleSignal::Killed => {
                self.release_host(&task.hostname);
                self.store.remove(task_id);
            }
            LifecycleSignal::Failed | LifecycleSignal::Lost => {
                self.release_host(&task.hostname);
                if self.store.state_of(task_id) == Some(LifecycleState::Killable) {
                    self.store.remove(task_id);
                } else {
                    self.store.make_lost(task_id);
                }
            }
            LifecycleSignal::Unrecognized(name) => {
                warn!(task_id = %task_id, signal = %name, "Unrecognized task state ignored");
                return;
            }
        }

        info!(task_id = %task_id, signal = %update.signal, "Status update applied");
    }

    fn release_host(&self, hostname: &str) {
        if !hostname.is_empty() {
            self.cache.decline_outstanding(hostname);
        }
    }
}
