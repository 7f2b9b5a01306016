use std::sync::Arc;
use std::time::Duration;
use symbion_inventory::model::Instance;
use symbion_inventory::refresh::{CacheState, RefreshError};
use symbion_inventory_devkit::{InstanceBuilder, TestHarness};

fn named(id: &str, name: &str) -> Instance {
    InstanceBuilder::running(id).tag("Name", name).build()
}

fn setup(instances: Vec<Instance>) -> TestHarness {
    let harness = TestHarness::new();
    harness.inventory.set_instances("default", instances);
    harness
}

const PAST_WINDOW: Duration = Duration::from_secs(31);

#[tokio::test(start_paused = true)]
async fn test_calls_within_window_share_one_fetch() {
    let harness = setup(vec![named("i-1", "web")]);
    let source = harness.source(&harness.config()).unwrap();

    let first = source.get_nodes().await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;
    let second = source.get_nodes().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.inventory.list_starts(), 1);
    assert_eq!(source.status().state, CacheState::Fresh);
}

#[tokio::test(start_paused = true)]
async fn test_stale_call_serves_old_set_and_refreshes_once() {
    let harness = setup(vec![named("i-1", "web")]);
    let source = harness.source(&harness.config()).unwrap();
    let first = source.get_nodes().await.unwrap();

    harness.inventory.set_instances("default", vec![named("i-1", "web"), named("i-2", "db")]);
    tokio::time::advance(PAST_WINDOW).await;

    let stale = source.get_nodes().await.unwrap();
    assert!(Arc::ptr_eq(&first, &stale));

    harness.wait_for_refresh(&source).await.unwrap();
    let refreshed = source.get_nodes().await.unwrap();
    assert_eq!(refreshed.len(), 2);
    assert!(refreshed.get("db").is_some());
    assert_eq!(harness.inventory.list_starts(), 2);

    let again = source.get_nodes().await.unwrap();
    assert!(Arc::ptr_eq(&refreshed, &again));
    assert_eq!(harness.inventory.list_starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_while_refresh_is_pending() {
    let harness = setup(vec![named("i-1", "web")]);
    let source = harness.source(&harness.config()).unwrap();
    let first = source.get_nodes().await.unwrap();

    harness.inventory.pause();
    tokio::time::advance(PAST_WINDOW).await;
    source.get_nodes().await.unwrap();
    harness.wait_for_list_calls(2).await.unwrap();

    for _ in 0..5 {
        let nodes = source.get_nodes().await.unwrap();
        assert!(Arc::ptr_eq(&first, &nodes));
        tokio::task::yield_now().await;
    }
    let status = source.status();
    assert!(status.refresh_in_flight);
    assert_eq!(status.state, CacheState::Stale);
    assert_eq!(harness.inventory.list_starts(), 2);

    harness.inventory.set_instances("default", vec![named("i-3", "cache")]);
    harness.inventory.resume();
    harness.wait_for_refresh(&source).await.unwrap();

    let nodes = source.get_nodes().await.unwrap();
    assert!(nodes.get("cache").is_some());
    assert_eq!(harness.inventory.list_starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_first_fetch_failure_propagates() {
    let harness = setup(vec![named("i-1", "web")]);
    harness.inventory.set_list_failure(Some("rate exceeded"));
    let source = harness.source(&harness.config()).unwrap();

    let err = source.get_nodes().await.unwrap_err();
    let RefreshError::InitialFetch { source_name, .. } = &err;
    assert_eq!(source_name, "test");
    assert_eq!(source.status().state, CacheState::Empty);

    harness.inventory.set_list_failure(None);
    let nodes = source.get_nodes().await.unwrap();
    assert!(nodes.get("web").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_background_failure_keeps_previous_set() {
    let harness = setup(vec![named("i-1", "web")]);
    let source = harness.source(&harness.config()).unwrap();
    let first = source.get_nodes().await.unwrap();
    let refreshed_at = source.status().last_refresh;

    harness.inventory.set_list_failure(Some("rate exceeded"));
    tokio::time::advance(PAST_WINDOW).await;
    source.get_nodes().await.unwrap();
    harness.wait_for_refresh(&source).await.unwrap();

    let nodes = source.get_nodes().await.unwrap();
    assert!(Arc::ptr_eq(&first, &nodes));
    let status = source.status();
    assert_eq!(status.node_count, 1);
    assert_eq!(status.last_refresh, refreshed_at);
    assert_eq!(status.state, CacheState::Stale);
}

#[tokio::test(start_paused = true)]
async fn test_negative_interval_fetches_every_call() {
    let harness = setup(vec![named("i-1", "web")]);
    let mut config = harness.config();
    config.refresh_interval = -1;
    let source = harness.source(&config).unwrap();

    for _ in 0..3 {
        source.get_nodes().await.unwrap();
    }
    assert_eq!(harness.inventory.list_starts(), 3);
    assert_eq!(source.status().state, CacheState::Stale);
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_load_returns_fresh_result() {
    let harness = setup(vec![named("i-1", "web")]);
    let mut config = harness.config();
    config.synchronous_load = true;
    let source = harness.source(&config).unwrap();
    source.get_nodes().await.unwrap();

    harness.inventory.set_instances("default", vec![named("i-2", "db")]);
    tokio::time::advance(PAST_WINDOW).await;
    let nodes = source.get_nodes().await.unwrap();
    assert!(nodes.get("db").is_some());
    assert!(!source.status().refresh_in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_refresh_failure_serves_stale() {
    let harness = setup(vec![named("i-1", "web")]);
    let mut config = harness.config();
    config.synchronous_load = true;
    let source = harness.source(&config).unwrap();
    let first = source.get_nodes().await.unwrap();

    harness.inventory.set_list_failure(Some("rate exceeded"));
    tokio::time::advance(PAST_WINDOW).await;
    let nodes = source.get_nodes().await.unwrap();
    assert!(Arc::ptr_eq(&first, &nodes));
}

#[tokio::test(start_paused = true)]
async fn test_status_transitions() {
    let harness = setup(vec![named("i-1", "web"), named("i-2", "db")]);
    let source = harness.source(&harness.config()).unwrap();

    let status = source.status();
    assert_eq!(status.state, CacheState::Empty);
    assert_eq!(status.node_count, 0);
    assert!(status.last_refresh.is_none());

    source.get_nodes().await.unwrap();
    let status = source.status();
    assert_eq!(status.state, CacheState::Fresh);
    assert_eq!(status.node_count, 2);
    assert!(status.last_refresh.is_some());

    tokio::time::advance(PAST_WINDOW).await;
    assert_eq!(source.status().state, CacheState::Stale);
}

#[tokio::test(start_paused = true)]
async fn test_status_answers_while_fetch_is_pending() {
    let harness = setup(vec![named("i-1", "web")]);
    let mut config = harness.config();
    config.synchronous_load = true;
    let source = Arc::new(harness.source(&config).unwrap());

    harness.inventory.pause();
    let first = tokio::spawn({
        let source = source.clone();
        async move { source.get_nodes().await }
    });
    harness.wait_for_list_calls(1).await.unwrap();

    let status = source.status();
    assert_eq!(status.state, CacheState::Empty);
    assert_eq!(status.node_count, 0);

    harness.inventory.resume();
    first.await.unwrap().unwrap();
    assert_eq!(source.status().node_count, 1);

    // a synchronous refresh holds the source lock for the whole cycle
    tokio::time::advance(PAST_WINDOW).await;
    harness.inventory.pause();
    let refresh = tokio::spawn({
        let source = source.clone();
        async move { source.get_nodes().await }
    });
    harness.wait_for_list_calls(2).await.unwrap();

    let status = source.status();
    assert_eq!(status.state, CacheState::Stale);
    assert_eq!(status.node_count, 1);

    harness.inventory.resume();
    refresh.await.unwrap().unwrap();
    assert_eq!(source.status().state, CacheState::Fresh);
}
