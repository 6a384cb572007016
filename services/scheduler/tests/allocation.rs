//! Integration tests for the offer-to-launch flow.
//!
//! These tests drive the public surface end to end:
//! 1. Flex-up creates pending tasks
//! 2. An offer batch launches them and stages them
//! 3. Status updates move them to active and out of the store
//! 4. Flex-down and the terminator retire them
//!
//! Uses RecordingDriver in place of a live offer source.

use std::sync::Arc;

use bytes::Bytes;
use flex_model::{
    LifecycleSignal, LifecycleState, Resource, ResourceOffer, ResourceProfile, StatusUpdate,
    ValueRange, RESOURCE_CPUS, RESOURCE_MEM, RESOURCE_PORTS,
};
use flex_scheduler::{
    AllocationCoordinator, Config, FlexOperations, FlexUpRequest, HostRegistry, OfferCache,
    ProfileRegistry, RecordingDriver, StatusUpdateHandler, TaskLifecycleStore, TaskTerminator,
};

struct Harness {
    store: Arc<TaskLifecycleStore>,
    cache: Arc<OfferCache>,
    driver: Arc<RecordingDriver>,
    coordinator: AllocationCoordinator,
    ops: FlexOperations,
    status: StatusUpdateHandler,
    terminator: TaskTerminator,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,flex_scheduler=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn harness() -> Harness {
    init_tracing();

    let config = Config {
        port_seed: Some(42),
        ..Config::default()
    };
    let store = Arc::new(TaskLifecycleStore::in_memory());
    store.set_framework_id("fw-1".parse().unwrap()).unwrap();

    let driver = Arc::new(RecordingDriver::new());
    let registry = Arc::new(HostRegistry::new());
    registry.register("host-1");
    registry.register("host-2");
    let cache = Arc::new(OfferCache::new(registry, driver.clone()));

    let profiles = Arc::new(ProfileRegistry::from_config(&config));
    profiles
        .register(ResourceProfile::new("small", 1.0, 1024.0).with_port("http", 0))
        .unwrap();
    profiles.register(ResourceProfile::new("zero", 0.0, 0.0)).unwrap();

    Harness {
        coordinator: AllocationCoordinator::new(&config, store.clone(), cache.clone(), driver.clone()),
        ops: FlexOperations::new(&config, store.clone(), profiles),
        status: StatusUpdateHandler::new(store.clone(), cache.clone()),
        terminator: TaskTerminator::new(store.clone(), driver.clone()),
        store,
        cache,
        driver,
    }
}

fn offer(id: &str, hostname: &str) -> ResourceOffer {
    ResourceOffer {
        id: id.parse().unwrap(),
        hostname: hostname.to_string(),
        agent_id: format!("agent-{hostname}").parse().unwrap(),
        framework_id: "fw-1".parse().unwrap(),
        resources: vec![
            Resource::scalar(RESOURCE_CPUS, 4.0),
            Resource::scalar(RESOURCE_MEM, 4096.0),
            Resource::ranges(RESOURCE_PORTS, vec![ValueRange::new(31000, 31099)]),
        ],
        attributes: vec![],
    }
}

fn signal(h: &Harness, task_id: &flex_id::TaskId, signal: LifecycleSignal) {
    h.status
        .handle(&StatusUpdate::new(task_id.clone(), signal, Bytes::new()));
}

#[test]
fn test_flex_up_launch_run_and_retire() {
    let h = harness();
    let ids = h.ops.flex_up(&FlexUpRequest::new("small", 2)).unwrap();

    let stats = h
        .coordinator
        .handle_offers(vec![offer("o-1", "host-1"), offer("o-2", "host-2")]);
    assert_eq!(stats.offers_received, 2);
    assert_eq!(stats.tasks_launched, 2);
    assert_eq!(stats.offers_declined, 0);

    // One task of a type per host.
    let launches = h.driver.launches();
    assert_eq!(launches.len(), 2);
    assert_ne!(launches[0].agent_id, launches[1].agent_id);
    for launch in &launches {
        let port = launch.ports["http"];
        assert!((31000..=31099).contains(&port));
        assert_eq!(launch.scalar_total(RESOURCE_CPUS), 1.0);
    }
    assert_eq!(h.store.ids_in(LifecycleState::Staging).len(), 2);

    for id in &ids {
        signal(&h, id, LifecycleSignal::Running);
    }
    assert_eq!(h.store.ids_in(LifecycleState::Active).len(), 2);

    let marked = h.ops.flex_down("nm", 1);
    assert_eq!(marked.len(), 1);
    let stats = h.terminator.run_once();
    assert_eq!(stats.kills_requested, 1);
    assert_eq!(h.driver.killed(), marked);

    signal(&h, &marked[0], LifecycleSignal::Killed);
    assert!(!h.store.contains(&marked[0]));
    for state in LifecycleState::ALL {
        assert!(!h.store.ids_in(state).contains(&marked[0]));
    }
    assert_eq!(h.store.len(), 1);
}

#[test]
fn test_hostname_constraint_selects_offer() {
    let h = harness();
    let ids = h
        .ops
        .flex_up(&FlexUpRequest::new("small", 1).with_constraint("hostname LIKE host-2"))
        .unwrap();

    let stats = h
        .coordinator
        .handle_offers(vec![offer("o-1", "host-1"), offer("o-2", "host-2")]);

    assert_eq!(stats.tasks_launched, 1);
    assert_eq!(stats.offers_declined, 1);
    assert_eq!(h.store.task(&ids[0]).unwrap().hostname, "host-2");
    assert_eq!(h.driver.declined(), vec!["o-1".parse::<flex_id::OfferId>().unwrap()]);
}

#[test]
fn test_lost_task_relaunched_next_batch() {
    let h = harness();
    let ids = h.ops.flex_up(&FlexUpRequest::new("small", 1)).unwrap();
    h.coordinator.handle_offers(vec![offer("o-1", "host-1")]);
    signal(&h, &ids[0], LifecycleSignal::Running);

    signal(&h, &ids[0], LifecycleSignal::Lost);
    assert_eq!(h.store.state_of(&ids[0]), Some(LifecycleState::Lost));

    let stats = h.coordinator.handle_offers(vec![offer("o-2", "host-2")]);
    assert_eq!(stats.tasks_launched, 1);
    assert_eq!(h.store.state_of(&ids[0]), Some(LifecycleState::Staging));
    assert_eq!(h.store.task(&ids[0]).unwrap().hostname, "host-2");
}

#[test]
fn test_elastic_host_offers_cached_and_consumed() {
    let h = harness();
    let ids = h
        .ops
        .flex_up(&FlexUpRequest::new("zero", 1).with_constraint("hostname LIKE host-1"))
        .unwrap();
    h.coordinator.handle_offers(vec![offer("o-1", "host-1")]);
    signal(&h, &ids[0], LifecycleSignal::Running);
    h.driver.clear();

    let stats = h
        .coordinator
        .handle_offers(vec![offer("o-2", "host-1"), offer("o-3", "host-2")]);
    assert_eq!(stats.offers_cached, 1);
    assert_eq!(stats.offers_declined, 1);
    assert_eq!(h.driver.declined(), vec!["o-3".parse::<flex_id::OfferId>().unwrap()]);

    let feed = h.cache.offer_feed("host-1").unwrap();
    let taken = feed.poll().unwrap();
    assert_eq!(taken.id.as_str(), "o-2");
    h.coordinator.mark_consumed(taken);

    let consumed = h.coordinator.drain_consumed("host-1").unwrap();
    assert_eq!(consumed.cpus(), 4.0);
    assert_eq!(consumed.memory(), 4096.0);
    assert!(h.coordinator.drain_consumed("host-1").is_none());

    // Finishing the elastic task releases anything still queued.
    h.cache.add_offers([offer("o-4", "host-1")]);
    signal(&h, &ids[0], LifecycleSignal::Finished);
    assert!(feed.is_empty());
    assert!(h
        .driver
        .declined()
        .contains(&"o-4".parse::<flex_id::OfferId>().unwrap()));
}

#[test]
fn test_unregistered_elastic_host_declined() {
    let h = harness();
    let ids = h
        .ops
        .flex_up(&FlexUpRequest::new("zero", 1).with_constraint("hostname LIKE host-9"))
        .unwrap();
    h.coordinator.handle_offers(vec![offer("o-1", "host-9")]);
    signal(&h, &ids[0], LifecycleSignal::Running);

    let stats = h.coordinator.handle_offers(vec![offer("o-2", "host-9")]);
    assert_eq!(stats.offers_cached, 0);
    assert_eq!(stats.offers_declined, 1);
    assert!(h.cache.offer_feed("host-9").is_none());
}

#[test]
fn test_no_framework_id_declines_batch() {
    init_tracing();
    let store = Arc::new(TaskLifecycleStore::in_memory());
    let driver = Arc::new(RecordingDriver::new());
    let cache = Arc::new(OfferCache::new(Arc::new(HostRegistry::new()), driver.clone()));
    let coordinator = AllocationCoordinator::new(&Config::default(), store, cache, driver.clone());

    let stats = coordinator.handle_offers(vec![offer("o-1", "host-1")]);
    assert_eq!(stats.offers_declined, 1);
    assert!(driver.launches().is_empty());
}
