//! Replica engine handling every subscribed order book on a connection.
//!
//! This module provides [`OrderBookEngine`], which applies snapshot and delta
//! frames to per-topic [`OrderBookReplica`]s and decides when a replica has
//! diverged from the venue.
//!
//! # Sequence Tracking
//!
//! Each replica tracks its sequence number to detect gaps. When a gap, a
//! checksum mismatch or a crossed level is detected, the replica is cleared,
//! marked [`ReplicaState::NeedsResync`], and the caller is told to run a
//! resync. Deltas arriving before the fresh snapshot are buffered and replayed
//! on top of it.
//!
//! The engine is owned by the connection's event loop and is never shared, so
//! it needs no internal locking.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::config::ResyncConfig;
use crate::error::{Error, IntegrityReason};
use crate::types::{BookAction, BookUpdate, Topic};

use super::{BookChecksum, OrderBookReplica, OrderBookSnapshot};

/// State of a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    /// No snapshot applied yet
    WaitingForSnapshot,
    /// Replica is consistent and receiving updates
    Synchronized,
    /// Integrity check failed; waiting for a fresh snapshot
    NeedsResync,
    /// Too many consecutive resyncs failed; updates are ignored until a snapshot arrives
    Exhausted,
}

/// Result of feeding one book frame to the engine
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// Replica changed; notify consumers with this view
    Updated(Arc<OrderBookSnapshot>),
    /// Delta kept until a snapshot arrives
    Buffered,
    /// Frame ignored (stale sequence, or replica exhausted)
    Dropped,
    /// Replica invalidated; the caller must run a resync after `delay`
    Resync {
        /// The violation that was detected
        violation: Error,
        /// 1-based consecutive attempt number
        attempt: u32,
        /// Backoff before the resync action
        delay: Duration,
    },
    /// Resync budget spent; surface this error to consumers
    Exhausted(Error),
}

#[derive(Debug)]
struct BookEntry {
    replica: OrderBookReplica,
    state: ReplicaState,
    buffer: VecDeque<BookUpdate>,
    /// Consecutive integrity failures not yet followed by a verified delta
    failures: u32,
    verified_since_snapshot: bool,
    resync_at: Option<Instant>,
}

impl BookEntry {
    fn new(topic: &Topic) -> Self {
        Self {
            replica: OrderBookReplica::new(topic.symbol().unwrap_or_default()),
            state: ReplicaState::WaitingForSnapshot,
            buffer: VecDeque::new(),
            failures: 0,
            verified_since_snapshot: false,
            resync_at: None,
        }
    }
}

#[derive(Debug)]
struct EngineSettings {
    checksum: Option<Arc<dyn BookChecksum>>,
    buffer_limit: usize,
    resync: ResyncConfig,
}

/// Replica engine for all order book topics of one connection.
///
/// # Example
///
/// ```rust
/// use market_sync::config::ResyncConfig;
/// use market_sync::orderbook::{ApplyOutcome, OrderBookEngine};
/// use market_sync::types::{BookAction, BookUpdate, Topic};
///
/// let mut engine = OrderBookEngine::new(None, 100, ResyncConfig::default());
/// let topic = Topic::order_book("BTC/USDT", None);
///
/// let snapshot = BookUpdate {
///     bids: vec![("100".parse().unwrap(), "1".parse().unwrap())],
///     asks: vec![("101".parse().unwrap(), "2".parse().unwrap())],
///     sequence: Some(1),
///     ..Default::default()
/// };
/// match engine.apply(&topic, BookAction::Snapshot, snapshot) {
///     ApplyOutcome::Updated(view) => assert_eq!(view.bids.len(), 1),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
#[derive(Debug)]
pub struct OrderBookEngine {
    books: FxHashMap<Topic, BookEntry>,
    settings: EngineSettings,
}

impl OrderBookEngine {
    /// Create an engine.
    ///
    /// * `checksum` - venue checksum, `None` if the venue sends none
    /// * `buffer_limit` - deltas kept per topic while waiting for a snapshot
    /// * `resync` - attempt budget and backoff
    pub fn new(
        checksum: Option<Arc<dyn BookChecksum>>,
        buffer_limit: usize,
        resync: ResyncConfig,
    ) -> Self {
        Self {
            books: FxHashMap::default(),
            settings: EngineSettings {
                checksum,
                buffer_limit,
                resync,
            },
        }
    }

    /// Start tracking a topic in `WaitingForSnapshot` state
    pub fn track(&mut self, topic: &Topic) {
        self.books
            .entry(topic.clone())
            .or_insert_with(|| BookEntry::new(topic));
    }

    /// Stop tracking a topic
    pub fn remove(&mut self, topic: &Topic) {
        self.books.remove(topic);
    }

    /// Drop every replica
    pub fn clear(&mut self) {
        self.books.clear();
    }

    /// Number of tracked topics
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no topic is tracked
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Get the state of a replica
    pub fn state(&self, topic: &Topic) -> Option<ReplicaState> {
        self.books.get(topic).map(|e| e.state)
    }

    /// Current view of a synchronized replica
    pub fn snapshot(&self, topic: &Topic) -> Option<Arc<OrderBookSnapshot>> {
        self.books
            .get(topic)
            .filter(|e| e.state == ReplicaState::Synchronized)
            .map(|e| Arc::new(e.replica.snapshot(None)))
    }

    /// Remember that `topic` must be resynced at `at`
    pub fn schedule_resync(&mut self, topic: &Topic, at: Instant) {
        if let Some(entry) = self.books.get_mut(topic) {
            entry.resync_at = Some(at);
        }
    }

    /// Take every scheduled resync whose time has come
    pub fn take_due_resyncs(&mut self, now: Instant) -> Vec<Topic> {
        let mut due = Vec::new();
        for (topic, entry) in self.books.iter_mut() {
            if entry.resync_at.is_some_and(|at| at <= now) {
                entry.resync_at = None;
                if entry.state == ReplicaState::NeedsResync {
                    due.push(topic.clone());
                }
            }
        }
        due
    }

    /// Count a resync round trip that failed before a fresh snapshot arrived.
    ///
    /// Returns `None` if the replica is not waiting for a resync (a snapshot
    /// already repaired it, or the topic is not tracked).
    pub fn record_resync_failure(&mut self, topic: &Topic, cause: Error) -> Option<ApplyOutcome> {
        let settings = &self.settings;
        let entry = self.books.get_mut(topic)?;
        if entry.state != ReplicaState::NeedsResync {
            return None;
        }
        entry.resync_at = None;
        Some(invalidate(settings, topic, entry, cause))
    }

    /// Feed one book frame for `topic`
    pub fn apply(&mut self, topic: &Topic, action: BookAction, update: BookUpdate) -> ApplyOutcome {
        let settings = &self.settings;
        let entry = self
            .books
            .entry(topic.clone())
            .or_insert_with(|| BookEntry::new(topic));

        match action {
            BookAction::Snapshot => apply_snapshot(settings, topic, entry, update),
            BookAction::Delta => match entry.state {
                ReplicaState::Synchronized => apply_delta(settings, topic, entry, &update),
                ReplicaState::WaitingForSnapshot | ReplicaState::NeedsResync => {
                    buffer_delta(settings, topic, entry, update);
                    ApplyOutcome::Buffered
                }
                ReplicaState::Exhausted => ApplyOutcome::Dropped,
            },
        }
    }
}

fn apply_snapshot(
    settings: &EngineSettings,
    topic: &Topic,
    entry: &mut BookEntry,
    update: BookUpdate,
) -> ApplyOutcome {
    entry.replica.apply_snapshot(&update);
    entry.resync_at = None;
    entry.verified_since_snapshot = false;

    if let Some(reason) = verify_checksum(settings, &entry.replica, update.checksum) {
        return violation(settings, topic, entry, reason);
    }

    entry.state = ReplicaState::Synchronized;
    debug!(topic = %topic, sequence = ?update.sequence, "order book snapshot applied");

    // Only deltas provably newer than the snapshot can be replayed on top of it
    let buffered = std::mem::take(&mut entry.buffer);
    let snapshot_seq = update.sequence;
    let mut replayed = 0usize;
    for delta in buffered {
        let newer = matches!(
            (delta.sequence, snapshot_seq),
            (Some(seq), Some(base)) if seq > base
        );
        if !newer {
            continue;
        }
        if let Err(reason) = check_and_apply(settings, entry, &delta) {
            return violation(settings, topic, entry, reason);
        }
        replayed += 1;
    }
    if replayed > 0 {
        debug!(topic = %topic, replayed, "replayed buffered deltas");
    }

    ApplyOutcome::Updated(Arc::new(entry.replica.snapshot(None)))
}

fn apply_delta(
    settings: &EngineSettings,
    topic: &Topic,
    entry: &mut BookEntry,
    update: &BookUpdate,
) -> ApplyOutcome {
    match check_and_apply(settings, entry, update) {
        Ok(true) => {
            if !entry.verified_since_snapshot {
                entry.verified_since_snapshot = true;
                entry.failures = 0;
            }
            ApplyOutcome::Updated(Arc::new(entry.replica.snapshot(None)))
        }
        Ok(false) => {
            debug!(topic = %topic, sequence = ?update.sequence, "dropping stale delta");
            ApplyOutcome::Dropped
        }
        Err(reason) => violation(settings, topic, entry, reason),
    }
}

/// Returns `Ok(false)` for a stale delta that was skipped
fn check_and_apply(
    settings: &EngineSettings,
    entry: &mut BookEntry,
    update: &BookUpdate,
) -> Result<bool, IntegrityReason> {
    if let (Some(seq), Some(current)) = (update.sequence, entry.replica.sequence()) {
        if seq <= current {
            return Ok(false);
        }
        match update.prev_sequence {
            Some(prev) if prev != current => {
                return Err(IntegrityReason::SequenceGap {
                    expected: current,
                    got: prev,
                });
            }
            Some(_) => {}
            None if seq != current + 1 => {
                return Err(IntegrityReason::SequenceGap {
                    expected: current + 1,
                    got: seq,
                });
            }
            None => {}
        }
    }

    if let Some(price) = entry.replica.apply_delta(update) {
        return Err(IntegrityReason::CrossedLevel { price });
    }

    match verify_checksum(settings, &entry.replica, update.checksum) {
        Some(reason) => Err(reason),
        None => Ok(true),
    }
}

fn verify_checksum(
    settings: &EngineSettings,
    replica: &OrderBookReplica,
    expected: Option<i64>,
) -> Option<IntegrityReason> {
    let (checksum, expected) = (settings.checksum.as_ref()?, expected?);
    let computed = checksum.compute(replica);
    (computed != expected).then_some(IntegrityReason::ChecksumMismatch { expected, computed })
}

fn buffer_delta(settings: &EngineSettings, topic: &Topic, entry: &mut BookEntry, update: BookUpdate) {
    if settings.buffer_limit == 0 {
        return;
    }
    if entry.buffer.len() >= settings.buffer_limit {
        entry.buffer.pop_front();
        warn!(topic = %topic, limit = settings.buffer_limit, "delta buffer full, dropping oldest");
    }
    entry.buffer.push_back(update);
}

fn violation(
    settings: &EngineSettings,
    topic: &Topic,
    entry: &mut BookEntry,
    reason: IntegrityReason,
) -> ApplyOutcome {
    let cause = Error::IntegrityViolation {
        topic: topic.clone(),
        reason,
    };
    invalidate(settings, topic, entry, cause)
}

/// Clear the replica and count one more consecutive failure
fn invalidate(
    settings: &EngineSettings,
    topic: &Topic,
    entry: &mut BookEntry,
    cause: Error,
) -> ApplyOutcome {
    entry.replica.clear();
    entry.buffer.clear();
    entry.verified_since_snapshot = false;
    entry.failures += 1;

    if entry.failures > settings.resync.max_attempts {
        entry.state = ReplicaState::Exhausted;
        entry.resync_at = None;
        let attempts = entry.failures - 1;
        warn!(topic = %topic, attempts, %cause, "resync budget exhausted");
        return ApplyOutcome::Exhausted(Error::ResyncExhausted {
            topic: topic.clone(),
            attempts,
        });
    }

    entry.state = ReplicaState::NeedsResync;
    let attempt = entry.failures;
    let delay = settings.resync.delay_for_attempt(attempt);
    info!(topic = %topic, attempt, ?delay, %cause, "order book diverged, resyncing");

    ApplyOutcome::Resync {
        violation: cause,
        attempt,
        delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::InterleavedCrc32;
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn levels(raw: &[(&str, &str)]) -> Vec<(Decimal, Decimal)> {
        raw.iter().map(|(p, a)| (d(p), d(a))).collect()
    }

    fn frame(bids: &[(&str, &str)], asks: &[(&str, &str)], seq: Option<u64>) -> BookUpdate {
        BookUpdate {
            bids: levels(bids),
            asks: levels(asks),
            sequence: seq,
            ..Default::default()
        }
    }

    fn engine() -> OrderBookEngine {
        OrderBookEngine::new(None, 8, ResyncConfig::default())
    }

    fn topic() -> Topic {
        Topic::order_book("BTC/USDT", None)
    }

    #[test]
    fn test_track() {
        let mut engine = engine();
        engine.track(&topic());

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.state(&topic()), Some(ReplicaState::WaitingForSnapshot));
        assert!(engine.snapshot(&topic()).is_none());
    }

    #[test]
    fn test_snapshot_then_delta_removes_level() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("100", "1")], &[("101", "2")], Some(1)));

        let outcome = engine.apply(&topic(), BookAction::Delta, frame(&[("100", "0")], &[], Some(2)));
        let ApplyOutcome::Updated(view) = outcome else {
            panic!("expected update, got {:?}", outcome);
        };
        assert!(view.bids.is_empty());
        assert_eq!(view.asks, levels(&[("101", "2")]));
        assert_eq!(view.sequence, Some(2));
    }

    #[test]
    fn test_sequence_gap_triggers_single_resync() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("100", "1")], &[], Some(10)));

        let outcome = engine.apply(&topic(), BookAction::Delta, frame(&[("99", "1")], &[], Some(12)));
        match outcome {
            ApplyOutcome::Resync {
                violation: Error::IntegrityViolation { reason, .. },
                attempt,
                delay,
            } => {
                assert_eq!(reason, IntegrityReason::SequenceGap { expected: 11, got: 12 });
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::ZERO);
            }
            other => panic!("expected resync, got {:?}", other),
        }
        assert_eq!(engine.state(&topic()), Some(ReplicaState::NeedsResync));

        // Further deltas wait for the snapshot instead of triggering another resync
        let next = engine.apply(&topic(), BookAction::Delta, frame(&[("98", "1")], &[], Some(13)));
        assert!(matches!(next, ApplyOutcome::Buffered));
        assert!(engine.snapshot(&topic()).is_none());
    }

    #[test]
    fn test_stale_delta_dropped() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("100", "1")], &[], Some(5)));

        let outcome = engine.apply(&topic(), BookAction::Delta, frame(&[("100", "9")], &[], Some(5)));
        assert!(matches!(outcome, ApplyOutcome::Dropped));
        assert_eq!(engine.snapshot(&topic()).unwrap().bids, levels(&[("100", "1")]));
    }

    #[test]
    fn test_prev_sequence_chaining() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("100", "1")], &[], Some(100)));

        let mut chained = frame(&[("100", "2")], &[], Some(140));
        chained.prev_sequence = Some(100);
        assert!(matches!(
            engine.apply(&topic(), BookAction::Delta, chained),
            ApplyOutcome::Updated(_)
        ));

        let mut broken = frame(&[("100", "3")], &[], Some(170));
        broken.prev_sequence = Some(150);
        assert!(matches!(
            engine.apply(&topic(), BookAction::Delta, broken),
            ApplyOutcome::Resync { .. }
        ));
    }

    #[test]
    fn test_buffered_deltas_replayed_after_snapshot() {
        let mut engine = engine();
        for (seq, price) in [(4, "97"), (5, "98"), (6, "99")] {
            let outcome = engine.apply(&topic(), BookAction::Delta, frame(&[(price, "1")], &[], Some(seq)));
            assert!(matches!(outcome, ApplyOutcome::Buffered));
        }

        let outcome = engine.apply(&topic(), BookAction::Snapshot, frame(&[("100", "1")], &[], Some(4)));
        let ApplyOutcome::Updated(view) = outcome else {
            panic!("expected update");
        };
        // seq 4 predates the snapshot, 5 and 6 are replayed
        assert_eq!(view.bids, levels(&[("100", "1"), ("99", "1"), ("98", "1")]));
        assert_eq!(view.sequence, Some(6));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut engine = OrderBookEngine::new(None, 2, ResyncConfig::default());
        for seq in 1..=5 {
            engine.apply(&topic(), BookAction::Delta, frame(&[("1", "1")], &[], Some(seq)));
        }
        assert_eq!(engine.books[&topic()].buffer.len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_triggers_resync() {
        let checksum = Arc::new(InterleavedCrc32::new(25));
        let mut engine = OrderBookEngine::new(Some(checksum.clone()), 8, ResyncConfig::default());

        let mut reference = OrderBookReplica::new("BTC/USDT");
        reference.apply_snapshot(&frame(&[("100", "1")], &[("101", "2")], None));
        let mut snapshot = frame(&[("100", "1")], &[("101", "2")], Some(1));
        snapshot.checksum = Some(checksum.compute(&reference));
        assert!(matches!(
            engine.apply(&topic(), BookAction::Snapshot, snapshot),
            ApplyOutcome::Updated(_)
        ));

        // Contiguous sequence, but the venue's checksum reflects a different price
        reference.apply_delta(&frame(&[("99", "1")], &[], None));
        let mut delta = frame(&[("98", "1")], &[], Some(2));
        delta.checksum = Some(checksum.compute(&reference));

        match engine.apply(&topic(), BookAction::Delta, delta) {
            ApplyOutcome::Resync {
                violation: Error::IntegrityViolation { reason, .. },
                ..
            } => assert!(matches!(reason, IntegrityReason::ChecksumMismatch { .. })),
            other => panic!("expected resync, got {:?}", other),
        }
    }

    #[test]
    fn test_crossed_level_triggers_resync() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("100", "1")], &[("101", "1")], Some(1)));

        let outcome = engine.apply(&topic(), BookAction::Delta, frame(&[("101", "1")], &[], Some(2)));
        assert!(matches!(outcome, ApplyOutcome::Resync { .. }));
    }

    #[test]
    fn test_exhausted_after_max_attempts() {
        let resync = ResyncConfig {
            max_attempts: 2,
            ..ResyncConfig::default()
        };
        let mut engine = OrderBookEngine::new(None, 8, resync);

        let mut attempts = Vec::new();
        for round in 0..3u64 {
            let base = round * 10;
            engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(base)));
            match engine.apply(&topic(), BookAction::Delta, frame(&[("1", "2")], &[], Some(base + 5))) {
                ApplyOutcome::Resync { attempt, delay, .. } => attempts.push((attempt, delay)),
                ApplyOutcome::Exhausted(Error::ResyncExhausted { attempts: n, .. }) => {
                    assert_eq!(round, 2);
                    assert_eq!(n, 2);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].1, Duration::ZERO);
        assert!(attempts[1].1 > Duration::ZERO);
        assert_eq!(engine.state(&topic()), Some(ReplicaState::Exhausted));

        // Deltas are ignored until a snapshot revives the replica
        assert!(matches!(
            engine.apply(&topic(), BookAction::Delta, frame(&[("1", "1")], &[], Some(31))),
            ApplyOutcome::Dropped
        ));
        assert!(matches!(
            engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(40))),
            ApplyOutcome::Updated(_)
        ));
    }

    #[test]
    fn test_failure_count_resets_after_verified_delta() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(1)));
        engine.apply(&topic(), BookAction::Delta, frame(&[("1", "1")], &[], Some(3)));
        assert_eq!(engine.books[&topic()].failures, 1);

        engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(10)));
        engine.apply(&topic(), BookAction::Delta, frame(&[("1", "2")], &[], Some(11)));
        assert_eq!(engine.books[&topic()].failures, 0);
    }

    #[test]
    fn test_failed_resync_counts_as_attempt() {
        let resync = ResyncConfig {
            max_attempts: 2,
            ..ResyncConfig::default()
        };
        let mut engine = OrderBookEngine::new(None, 8, resync);
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(1)));
        assert!(matches!(
            engine.apply(&topic(), BookAction::Delta, frame(&[("1", "2")], &[], Some(5))),
            ApplyOutcome::Resync { attempt: 1, .. }
        ));

        let timeout = Error::SubscriptionTimeout { topic: topic() };
        match engine.record_resync_failure(&topic(), timeout.clone()) {
            Some(ApplyOutcome::Resync { violation, attempt, delay }) => {
                assert_eq!(attempt, 2);
                assert!(delay > Duration::ZERO);
                assert!(matches!(violation, Error::SubscriptionTimeout { .. }));
            }
            other => panic!("expected resync, got {:?}", other),
        }

        assert!(matches!(
            engine.record_resync_failure(&topic(), timeout),
            Some(ApplyOutcome::Exhausted(Error::ResyncExhausted { attempts: 2, .. }))
        ));
        assert_eq!(engine.state(&topic()), Some(ReplicaState::Exhausted));
    }

    #[test]
    fn test_resync_failure_ignored_once_repaired() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(1)));
        engine.apply(&topic(), BookAction::Delta, frame(&[("1", "1")], &[], Some(9)));
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(20)));

        let timeout = Error::SubscriptionTimeout { topic: topic() };
        assert!(engine.record_resync_failure(&topic(), timeout).is_none());
        assert_eq!(engine.state(&topic()), Some(ReplicaState::Synchronized));
    }

    #[test]
    fn test_rescaled_price_keeps_checksum_in_step() {
        use crate::orderbook::checksum::signed_crc32;

        let checksum = Arc::new(InterleavedCrc32::new(25));
        let mut engine = OrderBookEngine::new(Some(checksum), 8, ResyncConfig::default());

        let mut snapshot = frame(&[("100.10", "1")], &[], Some(1));
        snapshot.checksum = Some(signed_crc32(b"100.10:1"));
        assert!(matches!(
            engine.apply(&topic(), BookAction::Snapshot, snapshot),
            ApplyOutcome::Updated(_)
        ));

        // Same level, venue now prints it without the trailing zero
        let mut delta = frame(&[("100.1", "2")], &[], Some(2));
        delta.checksum = Some(signed_crc32(b"100.1:2"));
        match engine.apply(&topic(), BookAction::Delta, delta) {
            ApplyOutcome::Updated(view) => assert_eq!(view.bids.len(), 1),
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_scheduled_resyncs() {
        let mut engine = engine();
        engine.apply(&topic(), BookAction::Snapshot, frame(&[("1", "1")], &[], Some(1)));
        engine.apply(&topic(), BookAction::Delta, frame(&[("1", "1")], &[], Some(9)));

        let now = Instant::now();
        engine.schedule_resync(&topic(), now + Duration::from_millis(50));
        assert!(engine.take_due_resyncs(now).is_empty());
        assert_eq!(engine.take_due_resyncs(now + Duration::from_millis(50)), vec![topic()]);
        assert!(engine.take_due_resyncs(now + Duration::from_secs(1)).is_empty());
        assert_eq!(engine.state(&topic()), Some(ReplicaState::NeedsResync));
    }
}
