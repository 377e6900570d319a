// Integration tests for cache semantics: subscription lifecycle, fetch
// collapse, stale-while-revalidate, polling, and fencing.

use std::sync::Arc;
use std::time::Duration;

use ebb::client::mock::MockTransport;
use ebb::client::{FetchError, FetchSuccess, Payload};
use ebb::query::{MetaUpdate, QueryCache, QueryResult, QuerySubscription};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn cache_with_mock() -> (QueryCache, MockTransport) {
    let transport = MockTransport::new();
    (QueryCache::new(Arc::new(transport.clone())), transport)
}

fn observe(
    cache: &QueryCache,
    key: &str,
    meta: MetaUpdate,
) -> (QuerySubscription, mpsc::UnboundedReceiver<QueryResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = cache.subscribe(
        key,
        move |snapshot| {
            let _ = tx.send(snapshot.clone());
        },
        meta,
    );
    (subscription, rx)
}

async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<QueryResult>) -> QueryResult {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a snapshot")
        .expect("subscription channel closed")
}

/// Lets spawned fetch tasks run to completion on the current-thread runtime.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn data(message: &str) -> FetchSuccess {
    FetchSuccess::Data(Payload::from_message(message))
}

#[tokio::test]
async fn test_subscribe_then_invalidate_notification_sequence() {
    let (cache, transport) = cache_with_mock();
    transport.enqueue(Ok(data("ok")));

    let (_sub, mut rx) = observe(&cache, "/users", MetaUpdate::default());

    // Synchronous initial delivery of the default entry.
    let initial = next_snapshot(&mut rx).await;
    assert_eq!(initial, QueryResult::default());

    cache.invalidate("/users");

    let pending = next_snapshot(&mut rx).await;
    assert!(pending.is_fetching);
    assert!(pending.data.is_none());
    assert!(pending.error.is_none());

    let settled = next_snapshot(&mut rx).await;
    assert!(!settled.is_fetching);
    assert_eq!(settled.data, Some(data("ok")));
    assert!(settled.error.is_none());

    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.requested_keys(), vec!["/users"]);
}

#[tokio::test]
async fn test_invalidate_never_subscribed_key_performs_no_fetch() {
    let (cache, transport) = cache_with_mock();

    cache.invalidate("/ghost");
    settle().await;

    assert_eq!(transport.calls(), 0);
    assert!(cache.get("/ghost").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_invalidations_collapse_into_one_fetch() {
    let (cache, transport) = cache_with_mock();
    transport.enqueue_delayed(Duration::from_secs(1), Ok(data("once")));

    let (_sub, mut rx) = observe(&cache, "/users", MetaUpdate::default());
    let _initial = next_snapshot(&mut rx).await;

    cache.invalidate("/users");
    cache.invalidate("/users");

    let pending = next_snapshot(&mut rx).await;
    assert!(pending.is_fetching);

    let settled = next_snapshot(&mut rx).await;
    assert_eq!(settled.data, Some(data("once")));
    assert_eq!(transport.calls(), 1);

    // Once settled, a further invalidation fetches again.
    transport.enqueue(Ok(data("twice")));
    cache.invalidate("/users");
    let _pending = next_snapshot(&mut rx).await;
    let settled = next_snapshot(&mut rx).await;
    assert_eq!(settled.data, Some(data("twice")));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_failed_refetch_preserves_cached_data() {
    let (cache, transport) = cache_with_mock();

    cache.set_query_data("/users", Some(data("cached")), MetaUpdate::default());
    let (_sub, mut rx) = observe(&cache, "/users", MetaUpdate::default());
    let initial = next_snapshot(&mut rx).await;
    assert_eq!(initial.data, Some(data("cached")));

    transport.enqueue(Err(FetchError::Status {
        message: "backend unavailable".to_owned(),
        status: 503,
    }));
    cache.invalidate("/users");

    let pending = next_snapshot(&mut rx).await;
    assert!(pending.is_fetching);
    assert!(pending.error.is_none());

    let settled = next_snapshot(&mut rx).await;
    assert!(!settled.is_fetching);
    assert_eq!(settled.data, Some(data("cached")));
    assert_eq!(settled.error.as_deref(), Some("backend unavailable"));
}

#[tokio::test]
async fn test_successful_refetch_clears_previous_error() {
    let (cache, transport) = cache_with_mock();

    let (_sub, mut rx) = observe(&cache, "/users", MetaUpdate::default());
    let _initial = next_snapshot(&mut rx).await;

    transport.enqueue(Err(FetchError::Network("down".to_owned())));
    cache.invalidate("/users");
    let _pending = next_snapshot(&mut rx).await;
    let failed = next_snapshot(&mut rx).await;
    assert!(failed.is_error());

    transport.enqueue(Ok(data("recovered")));
    cache.invalidate("/users");
    let _pending = next_snapshot(&mut rx).await;
    let settled = next_snapshot(&mut rx).await;
    assert_eq!(settled.data, Some(data("recovered")));
    assert!(settled.error.is_none());
    assert!(!settled.is_fetching);
}

#[tokio::test]
async fn test_set_query_data_delivers_without_transport() {
    let (cache, transport) = cache_with_mock();

    let (_sub, mut rx) = observe(&cache, "/users", MetaUpdate::default());
    let _initial = next_snapshot(&mut rx).await;

    cache.set_query_data("/users", Some(data("pushed")), MetaUpdate::default());

    let pushed = next_snapshot(&mut rx).await;
    assert_eq!(pushed.data, Some(data("pushed")));
    assert!(!pushed.is_fetching);

    settle().await;
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_polling_runs_while_subscribed_and_stops_after() {
    let (cache, transport) = cache_with_mock();

    let (sub, mut rx) = observe(
        &cache,
        "/feed",
        MetaUpdate::stale_time(Duration::from_secs(1)),
    );
    let _initial = next_snapshot(&mut rx).await;

    // Two full polling cycles: each produces a pending and a settled
    // snapshot.
    for _ in 0..2 {
        let pending = next_snapshot(&mut rx).await;
        assert!(pending.is_fetching);
        let settled = next_snapshot(&mut rx).await;
        assert!(!settled.is_fetching);
    }
    assert_eq!(transport.calls(), 2);

    sub.unsubscribe();
    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(transport.calls(), 2);

    // The entry survives the last unsubscribe.
    assert!(cache.get("/feed").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_zero_stale_time_never_polls() {
    let (cache, transport) = cache_with_mock();

    let (_sub, mut rx) = observe(&cache, "/static", MetaUpdate::default());
    let _initial = next_snapshot(&mut rx).await;

    tokio::time::advance(Duration::from_secs(300)).await;
    settle().await;
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_polling_requires_subscribers() {
    let (cache, transport) = cache_with_mock();

    // A positive stale time alone is not enough: without subscribers the
    // key must not poll.
    cache.set_query_data(
        "/orphan",
        Some(data("seeded")),
        MetaUpdate::stale_time(Duration::from_secs(1)),
    );

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_write_through_supersedes_in_flight_fetch() {
    let (cache, transport) = cache_with_mock();
    transport.enqueue_delayed(Duration::from_secs(5), Ok(data("slow")));

    let (_sub, mut rx) = observe(&cache, "/users", MetaUpdate::default());
    let _initial = next_snapshot(&mut rx).await;

    cache.invalidate("/users");
    let pending = next_snapshot(&mut rx).await;
    assert!(pending.is_fetching);

    // A newer write lands while the fetch is still in flight.
    cache.set_query_data("/users", Some(data("newer")), MetaUpdate::default());
    let written = next_snapshot(&mut rx).await;
    assert_eq!(written.data, Some(data("newer")));
    assert!(!written.is_fetching);

    // Let the in-flight response arrive; it must be discarded.
    tokio::time::advance(Duration::from_secs(6)).await;
    settle().await;

    assert!(rx.try_recv().is_err());
    let snapshot = cache.get("/users").unwrap();
    assert_eq!(snapshot.data, Some(data("newer")));
    assert!(snapshot.error.is_none());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_each_subscriber_is_notified() {
    let (cache, _transport) = cache_with_mock();

    let (_first_sub, mut first) = observe(&cache, "/users", MetaUpdate::default());
    let (_second_sub, mut second) = observe(&cache, "/users", MetaUpdate::default());
    let _ = next_snapshot(&mut first).await;
    let _ = next_snapshot(&mut second).await;

    cache.set_query_data("/users", Some(data("shared")), MetaUpdate::default());

    assert_eq!(next_snapshot(&mut first).await.data, Some(data("shared")));
    assert_eq!(next_snapshot(&mut second).await.data, Some(data("shared")));
}

#[tokio::test]
async fn test_keys_are_independent() {
    let (cache, transport) = cache_with_mock();
    transport.enqueue(Ok(data("users")));

    let (_users_sub, mut users) = observe(&cache, "/users", MetaUpdate::default());
    let (_items_sub, mut items) = observe(&cache, "/items", MetaUpdate::default());
    let _ = next_snapshot(&mut users).await;
    let _ = next_snapshot(&mut items).await;

    cache.invalidate("/users");
    let _pending = next_snapshot(&mut users).await;
    let settled = next_snapshot(&mut users).await;
    assert_eq!(settled.data, Some(data("users")));

    // The other key saw nothing.
    assert!(items.try_recv().is_err());
    assert_eq!(transport.requested_keys(), vec!["/users"]);
}
