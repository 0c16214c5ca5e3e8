//! The sticky-key dispatch engine — the core of this crate.

use crate::config::DispatcherConfig;
use crate::consumer::{Consumer, ConsumerId, ConsumerTransport, DispatchedBatch};
use crate::cursor::{CursorError, ManagedCursor, ReadType};
use crate::entry::Entry;
use crate::error::DispatchError;
use crate::position::Position;
use crate::rate_limiter::DispatchRateLimiter;
use crate::recently_joined::RecentlyJoinedTable;
use crate::redelivery::RedeliverySet;
use crate::selector::ConsumerSelector;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

struct DispatcherState<C, S> {
    cursor: C,
    selector: S,
    consumers: HashMap<ConsumerId, Arc<Consumer>>,
    next_consumer_id: u64,
    recently_joined: RecentlyJoinedTable,
    redelivery: RedeliverySet,
    total_available_permits: i64,
    config: DispatcherConfig,
    /// Reused rather than reallocated every cycle: a plain field cleared in
    /// place instead of freed, to keep a hot dispatch cycle allocation-free.
    scratch: HashMap<ConsumerId, Vec<Entry>>,
    closed: bool,
}

impl<C: ManagedCursor, S: ConsumerSelector> DispatcherState<C, S> {
    fn rate_limiter_applies(&self, rate_limiter_present: bool) -> bool {
        rate_limiter_present
            && (self.config.dispatch_throttling_on_non_backlog_consumer_enabled
                || !self.cursor.is_active())
    }
}

struct PlannedGroup {
    consumer: Arc<Consumer>,
    sendable: Vec<Entry>,
}

struct GroupOutcome {
    positions: Vec<Position>,
    total_messages: usize,
    total_bytes: usize,
    result: Result<(), crate::error::SendError>,
}

/// The Key_Shared dispatcher: pulls entries from a [`ManagedCursor`], fans
/// them out to consumers under the sticky-key and ordering constraints, and
/// enforces permit-based backpressure.
///
/// All state-mutating operations are serialized by an internal async mutex,
/// modeling a single-threaded cooperative scheduler per subscription. The
/// mutex is held across cursor reads (they don't re-enter the dispatcher),
/// but always released before awaiting a consumer send — a send's
/// completion re-enters only through
/// [`request_read`](KeySharedDispatcher::request_read), which never needs
/// the lock.
pub struct KeySharedDispatcher<C, S, L> {
    state: Mutex<DispatcherState<C, S>>,
    rate_limiter: L,
    read_notify: Notify,
    stuck_on_replays: AtomicBool,
}

impl<C, S, L> KeySharedDispatcher<C, S, L>
where
    C: ManagedCursor,
    S: ConsumerSelector,
    L: DispatchRateLimiter,
{
    pub fn new(cursor: C, selector: S, rate_limiter: L, config: DispatcherConfig) -> Self {
        Self {
            state: Mutex::new(DispatcherState {
                cursor,
                selector,
                consumers: HashMap::new(),
                next_consumer_id: 0,
                recently_joined: RecentlyJoinedTable::new(),
                redelivery: RedeliverySet::new(),
                total_available_permits: 0,
                config,
                scratch: HashMap::new(),
                closed: false,
            }),
            rate_limiter,
            read_notify: Notify::new(),
            stuck_on_replays: AtomicBool::new(false),
        }
    }

    /// Registers a new consumer and, if it's joining a group with existing
    /// backlog, records its join barrier.
    pub async fn add_consumer(&self, transport: Arc<dyn ConsumerTransport>) -> ConsumerId {
        let mut state = self.state.lock().await;
        let id = ConsumerId(state.next_consumer_id);
        state.next_consumer_id += 1;

        let joining_nonempty_group = !state.consumers.is_empty();
        let consumer = Arc::new(Consumer::new(id, transport));
        log::info!("consumer {:?} ({}) joining", id, consumer.name());
        state.consumers.insert(id, consumer);
        state.selector.add_consumer(id);

        if joining_nonempty_group
            && state.cursor.number_of_entries_since_first_not_acked_message() > 1
        {
            let snapshot = state.cursor.read_position();
            state.recently_joined.insert(id, snapshot);
        }
        drop(state);
        self.request_read();
        id
    }

    /// Deregisters a consumer from the selector and the recently-joined
    /// table. Entries already dispatched to it that get negatively
    /// acknowledged reappear through the replay path, driven externally by
    /// the transport's unack timeout.
    pub async fn remove_consumer(&self, id: ConsumerId) {
        let mut state = self.state.lock().await;
        if state.consumers.remove(&id).is_some() {
            log::info!("consumer {:?} left", id);
        }
        state.selector.remove_consumer(&id);
        state.recently_joined.remove(&id);
    }

    /// Mark-delete may have advanced; if anyone is still waiting behind a
    /// join barrier, trigger a read so their barrier gets re-evaluated.
    pub async fn on_acknowledgement_processed(&self) {
        let mut state = self.state.lock().await;
        let should_read = !state.recently_joined.is_empty();
        if should_read {
            let mark_delete_next = state.cursor.mark_deleted_position().next();
            state.redelivery.drop_up_to(state.cursor.mark_deleted_position());
            state.recently_joined.retain_unresolved(mark_delete_next);
        }
        drop(state);
        if should_read {
            self.request_read();
        }
    }

    /// Returns up to `max` positions from the redelivery set, unless the
    /// dispatcher latched the stuck-on-replays state last cycle — in which
    /// case this call returns empty once and clears the flag, forcing
    /// forward progress onto unread entries instead of spinning on
    /// replays pinned to busy consumers.
    pub async fn get_messages_to_replay_now(&self, max: usize) -> Vec<Position> {
        if self.stuck_on_replays.swap(false, Ordering::SeqCst) {
            return Vec::new();
        }
        let state = self.state.lock().await;
        state.redelivery.peek_up_to(max)
    }

    pub async fn async_replay_entries(&self, positions: Vec<Position>) -> Result<(), DispatchError> {
        if positions.is_empty() {
            return Ok(());
        }
        let replayed = {
            let mut state = self.state.lock().await;
            state.cursor.replay(positions).await
        };
        match replayed {
            Ok(entries) => {
                self.on_entries_read(entries, ReadType::Replay).await;
                Ok(())
            }
            Err(e) if e.is_transient() => Ok(()),
            Err(e) => {
                let mut state = self.state.lock().await;
                state.closed = true;
                Err(DispatchError::Cursor(e))
            }
        }
    }

    pub fn request_read(&self) {
        self.read_notify.notify_one();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn total_available_permits(&self) -> i64 {
        self.state.lock().await.total_available_permits
    }

    pub async fn redelivery_len(&self) -> usize {
        self.state.lock().await.redelivery.len()
    }

    pub async fn recently_joined_len(&self) -> usize {
        self.state.lock().await.recently_joined.len()
    }

    /// The core routine: partitions a batch by sticky key, applies the
    /// join-barrier ordering filter and permit caps per consumer group,
    /// hands sendable entries to their transports, and pushes everything
    /// else into the redelivery set.
    pub async fn on_entries_read(&self, batch: Vec<Entry>, read_type: ReadType) {
        if batch.is_empty() {
            log::debug!("empty batch read ({:?}), requesting another read", read_type);
            self.request_read();
            return;
        }

        let plan = {
            let mut state = self.state.lock().await;

            if state.consumers.is_empty() {
                log::debug!("no live consumers, releasing {} entries and rewinding", batch.len());
                for entry in batch {
                    entry.release();
                }
                state.cursor.rewind();
                return;
            }

            log::debug!(
                "dispatching {} entries ({:?}) across {} consumers",
                batch.len(),
                read_type,
                state.consumers.len()
            );
            Self::build_dispatch_plan(&mut state, batch, read_type)
        };

        let outcomes = Self::execute_plan(plan).await;
        self.finalize_cycle(outcomes).await;
    }

    fn build_dispatch_plan(
        state: &mut DispatcherState<C, S>,
        batch: Vec<Entry>,
        read_type: ReadType,
    ) -> Vec<PlannedGroup> {
        state.scratch.clear();
        for entry in batch {
            match state.selector.select(entry.sticky_key()) {
                Some(id) => state.scratch.entry(id).or_default().push(entry),
                None => {
                    // No live consumer owns this key's slot right now; hold
                    // it for redelivery instead of dropping it.
                    state.redelivery.add(entry.position());
                    entry.release();
                }
            }
        }

        state.total_available_permits = state
            .consumers
            .values()
            .map(|c| c.available_permits().max(0))
            .sum();

        let mark_delete_next = state.cursor.mark_deleted_position().next();
        let mut groups = Vec::with_capacity(state.scratch.len());

        let selected: Vec<(ConsumerId, Vec<Entry>)> = state.scratch.drain().collect();
        for (id, entries) in selected {
            let consumer = match state.consumers.get(&id) {
                Some(consumer) => consumer.clone(),
                None => {
                    // Selected a consumer that left mid-cycle; can't happen
                    // while the lock is held across selection and lookup,
                    // but handled defensively since entries must never be
                    // silently dropped.
                    for entry in entries {
                        state.redelivery.add(entry.position());
                        entry.release();
                    }
                    continue;
                }
            };

            let cap = entries.len().min(consumer.available_permits().max(0) as usize);
            let barrier = state.recently_joined.get(&id);
            let (k, barrier_opened) = ordering_filter(&entries, barrier, mark_delete_next, cap);
            if barrier_opened {
                state.recently_joined.remove(&id);
            }

            let mut entries = entries;
            let leftover = entries.split_off(k);
            let sendable = entries;

            if read_type == ReadType::Replay {
                for entry in &sendable {
                    state.redelivery.remove(&entry.position());
                }
            }
            for entry in leftover {
                state.redelivery.add(entry.position());
                entry.release();
            }

            groups.push(PlannedGroup { consumer, sendable });
        }

        groups
    }

    async fn execute_plan(plan: Vec<PlannedGroup>) -> Vec<GroupOutcome> {
        let sends = plan.into_iter().map(|group| async move {
            let positions: Vec<Position> = group.sendable.iter().map(Entry::position).collect();
            let total_messages = group.sendable.len();
            let total_bytes: usize = group.sendable.iter().map(Entry::payload_len).sum();
            let result = group
                .consumer
                .send(DispatchedBatch {
                    entries: group.sendable,
                    total_messages,
                    total_bytes,
                })
                .await;
            GroupOutcome {
                positions,
                total_messages,
                total_bytes,
                result,
            }
        });
        futures_util::future::join_all(sends).await
    }

    async fn finalize_cycle(&self, outcomes: Vec<GroupOutcome>) {
        let mut state = self.state.lock().await;
        let mut total_sent = 0usize;
        let mut total_bytes_sent = 0usize;

        for outcome in outcomes {
            match outcome.result {
                Ok(()) => {
                    total_sent += outcome.total_messages;
                    total_bytes_sent += outcome.total_bytes;
                    state.total_available_permits -= outcome.total_messages as i64;
                }
                Err(e) => {
                    log::warn!("send failed, returning entries to redelivery set: {e}");
                    for position in outcome.positions {
                        state.redelivery.add(position);
                    }
                }
            }
        }

        if state.rate_limiter_applies(self.rate_limiter.is_present()) {
            self.rate_limiter
                .try_dispatch_permit(total_sent, total_bytes_sent);
        }

        if total_sent == 0 && state.recently_joined.is_empty() {
            log::warn!("stuck on replays: every key routed to a permit-exhausted consumer");
            self.stuck_on_replays.store(true, Ordering::SeqCst);
        }

        drop(state);
        self.request_read();
    }

    /// Runs one read-and-dispatch cycle against the cursor, for callers
    /// driving their own loop (see [`run_forever`](Self::run_forever) for
    /// a ready-made one).
    pub async fn read_and_dispatch_once(&self, batch_size: usize) -> Result<(), DispatchError> {
        let batch_result = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Ok(());
            }
            state.cursor.read_entries(batch_size).await
        };
        match batch_result {
            Ok(batch) => {
                self.on_entries_read(batch, ReadType::Normal).await;
                Ok(())
            }
            Err(e) if e.is_transient() => {
                log::debug!("transient cursor error: {e}");
                Ok(())
            }
            Err(e) => {
                log::warn!("terminal cursor error, stopping dispatcher: {e}");
                let mut state = self.state.lock().await;
                state.closed = true;
                Err(DispatchError::Cursor(e))
            }
        }
    }

    /// Drives reads off the notify trigger until the cursor hits a
    /// terminal error or the dispatcher is told to stop externally.
    pub async fn run_forever(&self, batch_size: usize) -> Result<(), DispatchError> {
        self.request_read();
        loop {
            self.read_notify.notified().await;
            if self.is_closed().await {
                return Ok(());
            }
            self.read_and_dispatch_once(batch_size).await?;
        }
    }
}

/// Returns how many of `entries[0..cap]` (already position-sorted, since
/// they came from a sequential read) may be delivered to a consumer gated
/// by `barrier`, and whether the barrier has now opened and should be
/// cleared from the recently-joined table.
///
/// A linear scan suffices here — no additional sort is needed — because
/// entries within a group are already ordered by position.
fn ordering_filter(
    entries: &[Entry],
    barrier: Option<Position>,
    mark_delete_next: Position,
    cap: usize,
) -> (usize, bool) {
    let Some(barrier) = barrier else {
        return (cap, false);
    };
    if barrier <= mark_delete_next {
        return (cap, true);
    }
    let mut k = 0;
    for entry in entries.iter().take(cap) {
        if entry.position() >= barrier {
            break;
        }
        k += 1;
    }
    (k, false)
}
