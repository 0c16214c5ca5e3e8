//! Integration coverage for the dispatcher's core scenarios (S1-S6), driving
//! its public API against the in-memory mock cursor and mock consumer
//! transport.

use bytes::Bytes;
use key_shared_dispatch::config::DispatcherConfig;
use key_shared_dispatch::consumer::ConsumerId;
use key_shared_dispatch::dispatcher::KeySharedDispatcher;
use key_shared_dispatch::mock::{InMemoryLog, MockConsumerTransport};
use key_shared_dispatch::position::Position;
use key_shared_dispatch::rate_limiter::NoRateLimiter;
use key_shared_dispatch::selector::{ConsumerSelector, RingSelector};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A test-only selector with an explicitly controlled key-to-consumer
/// mapping, for scenarios (S2, S4) that need a specific routing decision
/// rather than whatever a real consistent-hash ring happens to produce.
/// The routing table is shared via `Arc<Mutex<_>>` so a test can update it
/// mid-scenario to model "the selector's mapping for a key changed".
#[derive(Clone, Default)]
struct FixedRoutes(Arc<Mutex<HashMap<Vec<u8>, ConsumerId>>>);

impl FixedRoutes {
    fn set(&self, key: &[u8], id: ConsumerId) {
        self.0.lock().unwrap().insert(key.to_vec(), id);
    }
}

struct MapSelector {
    routes: FixedRoutes,
    live: HashSet<ConsumerId>,
}

impl MapSelector {
    fn new(routes: FixedRoutes) -> Self {
        Self {
            routes,
            live: HashSet::new(),
        }
    }
}

impl ConsumerSelector for MapSelector {
    fn select(&self, sticky_key: &[u8]) -> Option<ConsumerId> {
        self.routes
            .0
            .lock()
            .unwrap()
            .get(sticky_key)
            .copied()
            .filter(|id| self.live.contains(id))
    }

    fn add_consumer(&mut self, id: ConsumerId) {
        self.live.insert(id);
    }

    fn remove_consumer(&mut self, id: &ConsumerId) {
        self.live.remove(id);
    }
}

#[tokio::test]
async fn s1_single_consumer_passthrough() {
    let log = InMemoryLog::new();
    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));
    log.append_at(Position::new(1, 2), Bytes::from_static(b"y"), Bytes::from_static(b"e2"));
    log.append_at(Position::new(1, 3), Bytes::from_static(b"x"), Bytes::from_static(b"e3"));

    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        RingSelector::new(),
        NoRateLimiter,
        DispatcherConfig::default(),
    );
    let a = Arc::new(MockConsumerTransport::new("A", 10));
    dispatcher.add_consumer(a.clone()).await;

    dispatcher.read_and_dispatch_once(10).await.unwrap();

    assert_eq!(
        a.received_positions(),
        vec![Position::new(1, 1), Position::new(1, 2), Position::new(1, 3)]
    );
    assert_eq!(dispatcher.redelivery_len().await, 0);
}

#[tokio::test]
async fn s2_key_affinity_routes_each_key_to_its_own_consumer() {
    let log = InMemoryLog::new();
    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));
    log.append_at(Position::new(1, 2), Bytes::from_static(b"y"), Bytes::from_static(b"e2"));
    log.append_at(Position::new(1, 3), Bytes::from_static(b"x"), Bytes::from_static(b"e3"));
    log.append_at(Position::new(1, 4), Bytes::from_static(b"y"), Bytes::from_static(b"e4"));

    let routes = FixedRoutes::default();
    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        MapSelector::new(routes.clone()),
        NoRateLimiter,
        DispatcherConfig::default(),
    );
    let a = Arc::new(MockConsumerTransport::new("A", 10));
    let b = Arc::new(MockConsumerTransport::new("B", 10));
    let a_id = dispatcher.add_consumer(a.clone()).await;
    let b_id = dispatcher.add_consumer(b.clone()).await;
    routes.set(b"x", a_id);
    routes.set(b"y", b_id);

    dispatcher.read_and_dispatch_once(10).await.unwrap();

    assert_eq!(a.received_positions(), vec![Position::new(1, 1), Position::new(1, 3)]);
    assert_eq!(b.received_positions(), vec![Position::new(1, 2), Position::new(1, 4)]);
}

#[tokio::test]
async fn total_available_permits_tracks_successful_sends() {
    let log = InMemoryLog::new();
    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));
    log.append_at(Position::new(1, 2), Bytes::from_static(b"y"), Bytes::from_static(b"e2"));
    log.append_at(Position::new(1, 3), Bytes::from_static(b"x"), Bytes::from_static(b"e3"));

    let routes = FixedRoutes::default();
    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        MapSelector::new(routes.clone()),
        NoRateLimiter,
        DispatcherConfig::default(),
    );
    let a = Arc::new(MockConsumerTransport::new("A", 5));
    let b = Arc::new(MockConsumerTransport::new("B", 3));
    let a_id = dispatcher.add_consumer(a.clone()).await;
    let b_id = dispatcher.add_consumer(b.clone()).await;
    routes.set(b"x", a_id);
    routes.set(b"y", b_id);

    // Snapshotted inside the cycle itself, from each live consumer's
    // permits at that instant.
    let starting_permits = 5 + 3;

    dispatcher.read_and_dispatch_once(10).await.unwrap();

    let sent = a.received_positions().len() + b.received_positions().len();
    assert_eq!(sent, 3);
    assert_eq!(
        dispatcher.total_available_permits().await,
        starting_permits - sent as i64
    );
}

#[tokio::test]
async fn s3_permit_cap_defers_the_overflow_to_redelivery() {
    let log = InMemoryLog::new();
    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));
    log.append_at(Position::new(1, 2), Bytes::from_static(b"x"), Bytes::from_static(b"e2"));
    log.append_at(Position::new(1, 3), Bytes::from_static(b"x"), Bytes::from_static(b"e3"));

    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        RingSelector::new(),
        NoRateLimiter,
        DispatcherConfig::default(),
    );
    let a = Arc::new(MockConsumerTransport::new("A", 2));
    dispatcher.add_consumer(a.clone()).await;

    dispatcher.read_and_dispatch_once(10).await.unwrap();

    assert_eq!(a.received_positions(), vec![Position::new(1, 1), Position::new(1, 2)]);
    assert_eq!(dispatcher.redelivery_len().await, 1);
}

#[tokio::test]
async fn s4_join_barrier_withholds_then_replays_in_order() {
    let routes = FixedRoutes::default();
    let log = InMemoryLog::new();
    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));
    log.append_at(Position::new(1, 2), Bytes::from_static(b"x"), Bytes::from_static(b"e2"));

    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        MapSelector::new(routes.clone()),
        NoRateLimiter,
        DispatcherConfig::default(),
    );
    let a = Arc::new(MockConsumerTransport::new("A", 10));
    let a_id = dispatcher.add_consumer(a.clone()).await;
    routes.set(b"x", a_id);

    // A alone drains the initial backlog; it stays unacked (in flight).
    dispatcher.read_and_dispatch_once(10).await.unwrap();
    assert_eq!(a.received_positions(), vec![Position::new(1, 1), Position::new(1, 2)]);
    assert_eq!(log.read_position(), Position::new(1, 3));

    // B joins while that backlog is still unacked; its join barrier snapshots
    // the current read position, and the selector now routes "x" to B.
    let b = Arc::new(MockConsumerTransport::new("B", 10));
    let b_id = dispatcher.add_consumer(b.clone()).await;
    routes.set(b"x", b_id);
    assert_eq!(dispatcher.recently_joined_len().await, 1);

    log.append_at(Position::new(1, 3), Bytes::from_static(b"x"), Bytes::from_static(b"e3"));
    log.append_at(Position::new(1, 4), Bytes::from_static(b"x"), Bytes::from_static(b"e4"));
    dispatcher.read_and_dispatch_once(10).await.unwrap();

    assert!(b.received_positions().is_empty());
    assert_eq!(dispatcher.redelivery_len().await, 2);

    // A acks the original backlog; mark-delete passes B's join barrier.
    log.ack_through(Position::new(1, 2));
    dispatcher.on_acknowledgement_processed().await;
    assert_eq!(dispatcher.recently_joined_len().await, 0);

    let to_replay = dispatcher.get_messages_to_replay_now(10).await;
    assert_eq!(to_replay, vec![Position::new(1, 3), Position::new(1, 4)]);
    dispatcher.async_replay_entries(to_replay).await.unwrap();

    assert_eq!(b.received_positions(), vec![Position::new(1, 3), Position::new(1, 4)]);
    assert_eq!(dispatcher.redelivery_len().await, 0);
}

#[tokio::test]
async fn s5_stuck_on_replays_forces_one_empty_replay_cycle() {
    let routes = FixedRoutes::default();
    let log = InMemoryLog::new();

    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        MapSelector::new(routes.clone()),
        NoRateLimiter,
        DispatcherConfig::default(),
    );
    let a = Arc::new(MockConsumerTransport::new("A", 0));
    let b = Arc::new(MockConsumerTransport::new("B", 0));
    let a_id = dispatcher.add_consumer(a.clone()).await;
    let b_id = dispatcher.add_consumer(b.clone()).await;
    routes.set(b"x", a_id);
    routes.set(b"y", b_id);

    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));
    log.append_at(Position::new(1, 2), Bytes::from_static(b"y"), Bytes::from_static(b"e2"));
    dispatcher.read_and_dispatch_once(10).await.unwrap();

    assert!(a.received_positions().is_empty());
    assert!(b.received_positions().is_empty());
    assert_eq!(dispatcher.redelivery_len().await, 2);

    // Stuck flag was latched: the next replay poll returns nothing once...
    let first = dispatcher.get_messages_to_replay_now(10).await;
    assert!(first.is_empty());

    // ...then resumes returning the queued positions.
    let second = dispatcher.get_messages_to_replay_now(10).await;
    assert_eq!(second, vec![Position::new(1, 1), Position::new(1, 2)]);
}

#[tokio::test]
async fn s6_no_consumers_releases_the_batch_and_rewinds() {
    let log = InMemoryLog::new();
    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));

    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        RingSelector::new(),
        NoRateLimiter,
        DispatcherConfig::default(),
    );

    dispatcher.read_and_dispatch_once(10).await.unwrap();

    assert_eq!(log.read_position(), Position::new(0, 1));
    assert_eq!(log.read_position(), log.mark_delete().next());
    assert_eq!(dispatcher.redelivery_len().await, 0);
}

#[tokio::test]
async fn send_failure_returns_entries_to_the_redelivery_set() {
    let log = InMemoryLog::new();
    log.append_at(Position::new(1, 1), Bytes::from_static(b"x"), Bytes::from_static(b"e1"));

    let dispatcher = KeySharedDispatcher::new(
        log.cursor(),
        RingSelector::new(),
        NoRateLimiter,
        DispatcherConfig::default(),
    );
    let a = Arc::new(MockConsumerTransport::new("A", 10));
    a.fail_next_send();
    dispatcher.add_consumer(a.clone()).await;

    dispatcher.read_and_dispatch_once(10).await.unwrap();

    assert!(a.received_positions().is_empty());
    assert_eq!(dispatcher.redelivery_len().await, 1);
}
