//! Offer caching for hosts under elastic sharing.
//!
//! Offers the allocator did not use on an elastic host are parked in a
//! per-host [`OfferFeed`] for the host cluster manager to pick up on its
//! next capacity check. Offers it takes are then marked consumed and
//! accumulate per host until [`ConsumedOffers::drain`] hands them over.
//!
//! Feeds take many concurrent per-host readers and writers. The consumed
//! accumulator is single-writer: it lives behind the allocation lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use flex_id::AgentId;
use flex_model::{ResourceOffer, RESOURCE_CPUS, RESOURCE_MEM};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::driver::OfferDriver;

/// Hosts known to the host cluster manager, with their last-seen agent.
#[derive(Default)]
pub struct HostRegistry {
    hosts: RwLock<HashMap<String, Option<AgentId>>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hostname: impl Into<String>) {
        let hostname = hostname.into();
        debug!(hostname = %hostname, "Host registered");
        self.hosts.write().entry(hostname).or_insert(None);
    }

    pub fn unregister(&self, hostname: &str) -> bool {
        self.hosts.write().remove(hostname).is_some()
    }

    pub fn is_registered(&self, hostname: &str) -> bool {
        self.hosts.read().contains_key(hostname)
    }

    pub fn agent_id(&self, hostname: &str) -> Option<AgentId> {
        self.hosts.read().get(hostname).cloned().flatten()
    }

    /// Records the agent behind a registered host. Unknown hosts are ignored.
    pub fn record_agent(&self, hostname: &str, agent_id: &AgentId) {
        if let Some(slot) = self.hosts.write().get_mut(hostname) {
            *slot = Some(agent_id.clone());
        }
    }
}

/// FIFO of uncommitted offers for one host.
#[derive(Default)]
pub struct OfferFeed {
    offers: Mutex<VecDeque<ResourceOffer>>,
}

impl OfferFeed {
    pub fn push(&self, offer: ResourceOffer) {
        self.offers.lock().push_back(offer);
    }

    /// Takes the oldest offer.
    pub fn poll(&self) -> Option<ResourceOffer> {
        self.offers.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<ResourceOffer> {
        self.offers.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.offers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.lock().is_empty()
    }
}

/// Per-host offer queues.
pub struct OfferCache {
    registry: Arc<HostRegistry>,
    feeds: RwLock<HashMap<String, Arc<OfferFeed>>>,
    driver: Arc<dyn OfferDriver>,
}

impl OfferCache {
    pub fn new(registry: Arc<HostRegistry>, driver: Arc<dyn OfferDriver>) -> Self {
        Self {
            registry,
            feeds: RwLock::new(HashMap::new()),
            driver,
        }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Queues offers from registered hosts and declines the rest.
    ///
    /// Returns how many offers were queued.
    pub fn add_offers<I>(&self, offers: I) -> usize
    where
        I: IntoIterator<Item = ResourceOffer>,
    {
        let mut queued = 0;
        for offer in offers {
            if !self.registry.is_registered(&offer.hostname) {
                info!(
                    offer_id = %offer.id,
                    hostname = %offer.hostname,
                    "Declining offer from unregistered host"
                );
                self.decline(&offer);
                continue;
            }

            self.registry.record_agent(&offer.hostname, &offer.agent_id);
            debug!(offer_id = %offer.id, hostname = %offer.hostname, "Offer cached");
            self.feed_or_create(&offer.hostname).push(offer);
            queued += 1;
        }
        queued
    }

    /// The feed for a host, if any offer was ever cached for it.
    pub fn offer_feed(&self, hostname: &str) -> Option<Arc<OfferFeed>> {
        self.feeds.read().get(hostname).cloned()
    }

    /// Declines every offer still queued for a host.
    pub fn decline_outstanding(&self, hostname: &str) -> usize {
        let Some(feed) = self.offer_feed(hostname) else {
            return 0;
        };
        let offers = feed.drain();
        for offer in &offers {
            self.decline(offer);
        }
        if !offers.is_empty() {
            info!(hostname = %hostname, count = offers.len(), "Declined outstanding offers");
        }
        offers.len()
    }

    fn feed_or_create(&self, hostname: &str) -> Arc<OfferFeed> {
        if let Some(feed) = self.feeds.read().get(hostname) {
            return feed.clone();
        }
        self.feeds
            .write()
            .entry(hostname.to_string())
            .or_default()
            .clone()
    }

    fn decline(&self, offer: &ResourceOffer) {
        if let Err(e) = self.driver.decline(&offer.id) {
            warn!(offer_id = %offer.id, error = %e, "Failed to decline offer");
        }
    }
}

/// Offers consumed on one host since the last drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumedOffer {
    pub offers: Vec<ResourceOffer>,
}

impl ConsumedOffer {
    pub fn cpus(&self) -> f64 {
        self.offers.iter().map(|o| o.scalar_total(RESOURCE_CPUS)).sum()
    }

    /// Memory in MB.
    pub fn memory(&self) -> f64 {
        self.offers.iter().map(|o| o.scalar_total(RESOURCE_MEM)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

/// Consumed offers per host. Needs `&mut` for every change; the owner
/// serializes access.
#[derive(Debug, Default)]
pub struct ConsumedOffers {
    by_host: HashMap<String, ConsumedOffer>,
}

impl ConsumedOffers {
    pub fn mark(&mut self, offer: ResourceOffer) {
        self.by_host
            .entry(offer.hostname.clone())
            .or_default()
            .offers
            .push(offer);
    }

    /// Removes and returns a host's accumulator.
    pub fn drain(&mut self, hostname: &str) -> Option<ConsumedOffer> {
        self.by_host.remove(hostname)
    }
}
