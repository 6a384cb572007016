//! Offer batch allocation.
//!
//! The coordinator is responsible for:
//! - Matching pending tasks against each offer batch
//! - Launching matched tasks and moving them to staging
//! - Caching leftover offers from elastic hosts, declining the rest
//!
//! One coarse lock covers the whole batch so an offer or a pending task is
//! never booked twice. The lock also guards the consumed-offer accumulator.

use std::collections::HashMap;
use std::sync::Arc;

use flex_id::{FrameworkId, TaskId};
use flex_model::{LifecycleState, ResourceOffer, Task};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::driver::OfferDriver;
use crate::ledger::ResourceLedger;
use crate::offer_cache::{ConsumedOffer, ConsumedOffers, OfferCache};
use crate::state::TaskLifecycleStore;
use crate::task_factory::{DefaultTaskFactory, LaunchContext, TaskFactory};

/// Statistics from one offer batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AllocationStats {
    pub offers_received: usize,
    pub tasks_launched: usize,
    pub offers_cached: usize,
    pub offers_declined: usize,
    pub launch_failures: usize,
}

/// State serialized by the allocation lock.
struct AllocationState {
    consumed: ConsumedOffers,
    /// Seeds each ledger's port generator.
    rng: StdRng,
}

/// Matches offer batches against pending tasks.
pub struct AllocationCoordinator {
    role: String,
    store: Arc<TaskLifecycleStore>,
    cache: Arc<OfferCache>,
    driver: Arc<dyn OfferDriver>,
    factories: HashMap<String, Arc<dyn TaskFactory>>,
    default_factory: Arc<dyn TaskFactory>,
    state: Mutex<AllocationState>,
}

impl AllocationCoordinator {
    pub fn new(
        config: &Config,
        store: Arc<TaskLifecycleStore>,
        cache: Arc<OfferCache>,
        driver: Arc<dyn OfferDriver>,
    ) -> Self {
        let rng = match config.port_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            role: config.framework_role.clone(),
            store,
            cache,
            driver,
            factories: HashMap::new(),
            default_factory: Arc::new(DefaultTaskFactory::new(config.framework_name.clone())),
            state: Mutex::new(AllocationState {
                consumed: ConsumedOffers::default(),
                rng,
            }),
        }
    }

    /// Uses `factory` for tasks of `task_type`.
    pub fn with_factory(mut self, task_type: impl Into<String>, factory: Arc<dyn TaskFactory>) -> Self {
        self.factories.insert(task_type.into(), factory);
        self
    }

    /// Processes one offer batch.
    ///
    /// Errors from a single (task, offer) pairing are logged and skip that
    /// pairing; they never abort the batch.
    #[instrument(skip(self, offers), fields(offers = offers.len()))]
    pub fn handle_offers(&self, offers: Vec<ResourceOffer>) -> AllocationStats {
        let mut state = self.state.lock();
        let mut stats = AllocationStats {
            offers_received: offers.len(),
            ..Default::default()
        };

        let Some(framework_id) = self.store.framework_id() else {
            warn!("No framework id recorded, declining offer batch");
            for offer in &offers {
                self.decline(offer);
            }
            stats.offers_declined = offers.len();
            return stats;
        };

        self.store.requeue_lost();

        let mut offers = offers;
        offers.sort_by_key(|offer| !offer.has_reserved_resources());

        for offer in &offers {
            self.store
                .record_agent_attributes(&offer.agent_id, &offer.attributes);
        }

        let mut used = vec![false; offers.len()];
        let mut missing = Vec::new();

        for task_id in self.store.ids_in(LifecycleState::Pending) {
            let Some(task) = self.store.task(&task_id) else {
                missing.push(task_id);
                continue;
            };

            for (idx, offer) in offers.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                match self.try_place(&mut state, &framework_id, &task_id, &task, offer) {
                    Placement::Launched => {
                        used[idx] = true;
                        stats.tasks_launched += 1;
                        break;
                    }
                    Placement::LaunchFailed => stats.launch_failures += 1,
                    Placement::Skipped => {}
                    Placement::Withdrawn => break,
                }
            }
        }

        for task_id in missing {
            warn!(task_id = %task_id, "Pending task has no record, removing");
            self.store.remove(&task_id);
        }

        for (offer, used) in offers.into_iter().zip(used) {
            if used {
                continue;
            }
            if self.store.has_elastic_task_on(&offer.hostname) {
                let queued = self.cache.add_offers([offer]);
                stats.offers_cached += queued;
                stats.offers_declined += 1 - queued;
            } else {
                debug!(offer_id = %offer.id, hostname = %offer.hostname, "Declining unused offer");
                self.decline(&offer);
                stats.offers_declined += 1;
            }
        }

        if stats.tasks_launched > 0 || stats.launch_failures > 0 {
            info!(
                offers_received = stats.offers_received,
                tasks_launched = stats.tasks_launched,
                offers_cached = stats.offers_cached,
                offers_declined = stats.offers_declined,
                launch_failures = stats.launch_failures,
                "Offer batch processed"
            );
        }

        stats
    }

    /// Records an offer the host cluster manager took from a feed.
    pub fn mark_consumed(&self, offer: ResourceOffer) {
        self.state.lock().consumed.mark(offer);
    }

    /// Hands over everything consumed on a host since the last drain.
    pub fn drain_consumed(&self, hostname: &str) -> Option<ConsumedOffer> {
        self.state.lock().consumed.drain(hostname)
    }

    fn try_place(
        &self,
        state: &mut AllocationState,
        framework_id: &FrameworkId,
        task_id: &TaskId,
        task: &Task,
        offer: &ResourceOffer,
    ) -> Placement {
        if !task.constraint.matches(offer) {
            debug!(task_id = %task_id, offer_id = %offer.id, "Constraint rejects offer");
            return Placement::Skipped;
        }
        if self.store.is_host_occupied(&task.task_type, &offer.hostname) {
            debug!(
                task_id = %task_id,
                hostname = %offer.hostname,
                "Host already runs a task of this type"
            );
            return Placement::Skipped;
        }

        let mut ledger = ResourceLedger::new(offer, &self.role, StdRng::seed_from_u64(state.rng.random()));
        if !ledger.satisfies(&task.profile) {
            return Placement::Skipped;
        }

        let ctx = LaunchContext {
            framework_id,
            task_id,
            task,
            offer,
        };
        let launch = match self.factory_for(&task.task_type).create_launch(&mut ledger, &ctx) {
            Ok(launch) => launch,
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    offer_id = %offer.id,
                    error = %e,
                    "Failed to build launch request"
                );
                return Placement::Skipped;
            }
        };

        let executor_info = match launch.executor.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to encode executor info");
                None
            }
        };

        // A task killed or removed since the pass began is never launched.
        if !self
            .store
            .claim_pending(task_id, &offer.hostname, offer.agent_id.clone(), executor_info)
        {
            return Placement::Withdrawn;
        }

        if let Err(e) = self.driver.launch(std::slice::from_ref(&offer.id), std::slice::from_ref(&launch)) {
            error!(task_id = %task_id, offer_id = %offer.id, error = %e, "Launch failed");
            self.store.release_claim(task_id);
            return Placement::LaunchFailed;
        }

        info!(
            task_id = %task_id,
            offer_id = %offer.id,
            hostname = %offer.hostname,
            "Task launched"
        );
        Placement::Launched
    }

    fn factory_for(&self, task_type: &str) -> &Arc<dyn TaskFactory> {
        self.factories.get(task_type).unwrap_or(&self.default_factory)
    }

    fn decline(&self, offer: &ResourceOffer) {
        if let Err(e) = self.driver.decline(&offer.id) {
            warn!(offer_id = %offer.id, error = %e, "Failed to decline offer");
        }
    }
}

enum Placement {
    Launched,
    LaunchFailed,
    Skipped,
    /// The task left pending while the pass ran.
    Withdrawn,
}
