//! In-memory bucket store with snapshot reads.
//!
//! Every bucket holds its current [`Generation`]: an immutable list of
//! record segments. Writers build the next generation off-lock, sharing the
//! unchanged segments, and swap it in; readers clone the `Arc` of whatever
//! generation is current. A snapshot therefore never changes after it has
//! been handed out, and a reader never sees half of an appended batch.
//!
//! Locks are per bucket. The bucket map lock is only held to look a slot up
//! or insert one, never while records are copied.
//!
//! Only the poller writes. Writer methods serialize on an internal mutex so
//! that a second writer could not lose an update, but the read path never
//! touches it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::types::{BucketKey, LogRecord};

/// Number of segments after which a generation is compacted into one.
const MAX_SEGMENTS: usize = 32;

/// A file whose records are hidden because it vanished from disk.
#[derive(Debug, Clone)]
struct StaleFile {
    file: String,
    since: Instant,
}

/// One immutable version of a bucket.
#[derive(Debug, Default)]
struct Generation {
    number: u64,
    segments: Vec<Arc<[LogRecord]>>,
    len: usize,
    stale: Vec<StaleFile>,
    stale_records: usize,
}

impl Generation {
    fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.segments.iter().flat_map(|segment| segment.iter())
    }

    fn is_stale(&self, record: &LogRecord) -> bool {
        self.stale.iter().any(|s| s.file == record.source_file)
    }

    fn count_file(&self, file: &str) -> usize {
        self.records().filter(|r| r.source_file == file).count()
    }

    /// Rebuilds into a single segment keeping only records that pass `keep`.
    fn retain(&self, number: u64, mut keep: impl FnMut(&LogRecord) -> bool) -> Self {
        let kept: Vec<LogRecord> = self.records().filter(|r| keep(r)).cloned().collect();
        let len = kept.len();
        let segments = if kept.is_empty() {
            Vec::new()
        } else {
            vec![Arc::from(kept)]
        };
        let mut next = Self {
            number,
            segments,
            len,
            stale: self.stale.clone(),
            stale_records: 0,
        };
        next.recount_stale();
        next
    }

    fn recount_stale(&mut self) {
        self.stale_records = if self.stale.is_empty() {
            0
        } else {
            self.records().filter(|r| self.is_stale(r)).count()
        };
    }
}

/// Immutable view of one bucket at the moment it was taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: Arc<Generation>,
}

impl Snapshot {
    /// Iterates visible records in append order.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.generation
            .records()
            .filter(|record| !self.generation.is_stale(record))
    }

    /// Number of visible records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generation.len - self.generation.stale_records
    }

    /// Returns true if no record is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generation number the snapshot was taken from.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.number
    }
}

/// Outcome of a snapshot request.
#[derive(Debug, Clone)]
pub enum SnapshotRead {
    /// The bucket is cached.
    Present(Snapshot),
    /// The bucket was evicted for memory; a reload has been requested.
    Evicted,
    /// No such bucket.
    Missing,
}

#[derive(Debug)]
enum SlotState {
    Loaded(Arc<Generation>),
    Evicted,
}

#[derive(Debug)]
struct Slot {
    state: RwLock<SlotState>,
    last_access: AtomicU64,
    /// Tick of the last query or reload plus one; zero if never queried.
    last_demand: AtomicU64,
}

impl Slot {
    fn loaded(generation: Generation, tick: u64) -> Self {
        Self {
            state: RwLock::new(SlotState::Loaded(Arc::new(generation))),
            last_access: AtomicU64::new(tick),
            last_demand: AtomicU64::new(0),
        }
    }

    fn demanded(&self, tick: u64) {
        self.last_access.store(tick, Ordering::Relaxed);
        self.last_demand.store(tick + 1, Ordering::Relaxed);
    }

    fn demanded_after(&self, mark: u64) -> bool {
        self.last_demand.load(Ordering::Relaxed) > mark
    }

    fn current(&self) -> Option<Arc<Generation>> {
        match &*self.state.read() {
            SlotState::Loaded(generation) => Some(Arc::clone(generation)),
            SlotState::Evicted => None,
        }
    }
}

/// Thread-safe store of all project-day buckets.
#[derive(Debug, Default)]
pub struct CacheStore {
    buckets: RwLock<HashMap<BucketKey, Arc<Slot>>>,
    clock: AtomicU64,
    generations: AtomicU64,
    reload_demands: Mutex<BTreeSet<BucketKey>>,
    writer: Mutex<()>,
}

impl CacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Takes a snapshot of one bucket.
    ///
    /// Touching an evicted bucket queues it for re-ingestion by the poller.
    pub fn snapshot(&self, key: &BucketKey) -> SnapshotRead {
        let Some(slot) = self.slot(key) else {
            return SnapshotRead::Missing;
        };
        slot.demanded(self.tick());

        match slot.current() {
            Some(generation) => SnapshotRead::Present(Snapshot { generation }),
            None => {
                self.reload_demands.lock().insert(key.clone());
                SnapshotRead::Evicted
            }
        }
    }

    /// Lists the keys of a project's buckets, cached or evicted, sorted by day.
    #[must_use]
    pub fn keys_for(&self, project: &str) -> Vec<BucketKey> {
        let mut keys: Vec<BucketKey> = self
            .buckets
            .read()
            .keys()
            .filter(|key| key.project == project)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Current value of the access clock.
    ///
    /// Buckets queried after this call count as demanded after the returned
    /// mark in [`CacheStore::enforce_budget`].
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// Returns true if the bucket exists and is evicted.
    #[must_use]
    pub fn is_evicted(&self, key: &BucketKey) -> bool {
        self.slot(key).is_some_and(|slot| slot.current().is_none())
    }

    /// Total records held in memory, stale ones included.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.slots()
            .iter()
            .filter_map(|(_, slot)| slot.current())
            .map(|generation| generation.len)
            .sum()
    }

    /// Number of buckets, cached or evicted.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    // ------------------------------------------------------------------
    // Write path (poller only)
    // ------------------------------------------------------------------

    /// Appends a batch of records to a bucket as one new segment.
    ///
    /// Appends to an evicted bucket are ignored; the bucket is rebuilt from
    /// disk when it is restored.
    pub fn append(&self, key: &BucketKey, records: Vec<LogRecord>) {
        if records.is_empty() {
            return;
        }
        let _writer = self.writer.lock();
        let slot = self.slot_or_insert(key);
        let Some(current) = slot.current() else {
            debug!(bucket = %key, "skipping append to evicted bucket");
            return;
        };

        let added = records.len();
        let mut segments = current.segments.clone();
        segments.push(Arc::from(records));

        let mut next = Generation {
            number: self.next_generation(),
            segments,
            len: current.len + added,
            stale: current.stale.clone(),
            stale_records: current.stale_records,
        };
        if next.segments.len() > MAX_SEGMENTS {
            next = next.retain(next.number, |_| true);
        }
        Self::publish(&slot, next);
    }

    /// Replaces the record with the same file and sequence as `record`.
    ///
    /// Used when continuation lines for a file's last record arrive on a
    /// later pass. Returns false if the record is not cached.
    pub fn amend_tail(&self, key: &BucketKey, record: LogRecord) -> bool {
        let _writer = self.writer.lock();
        let Some(slot) = self.slot(key) else {
            return false;
        };
        let Some(current) = slot.current() else {
            return false;
        };

        let found = current.segments.iter().enumerate().rev().find_map(|(i, segment)| {
            segment
                .iter()
                .rposition(|r| r.source_file == record.source_file && r.sequence == record.sequence)
                .map(|j| (i, j))
        });
        let Some((segment_index, record_index)) = found else {
            return false;
        };

        let mut rebuilt: Vec<LogRecord> = current.segments[segment_index].to_vec();
        rebuilt[record_index] = record;
        let mut segments = current.segments.clone();
        segments[segment_index] = Arc::from(rebuilt);

        Self::publish(
            &slot,
            Generation {
                number: self.next_generation(),
                segments,
                len: current.len,
                stale: current.stale.clone(),
                stale_records: current.stale_records,
            },
        );
        true
    }

    /// Removes every record of `file` from a bucket, clearing any stale mark.
    ///
    /// Returns the number of records removed.
    pub fn evict_file(&self, key: &BucketKey, file: &str) -> usize {
        let _writer = self.writer.lock();
        let Some(slot) = self.slot(key) else {
            return 0;
        };
        let Some(current) = slot.current() else {
            return 0;
        };

        let removed = current.count_file(file);
        let was_stale = current.stale.iter().any(|s| s.file == file);
        if removed == 0 && !was_stale {
            return 0;
        }

        let mut next = current.retain(self.next_generation(), |r| r.source_file != file);
        next.stale.retain(|s| s.file != file);
        next.recount_stale();
        Self::publish(&slot, next);
        removed
    }

    /// Hides the records of a vanished file from future snapshots.
    ///
    /// The records stay in memory until [`CacheStore::purge_stale`] runs past
    /// the grace period.
    pub fn mark_file_stale(&self, key: &BucketKey, file: &str) {
        let _writer = self.writer.lock();
        let Some(slot) = self.slot(key) else {
            return;
        };
        let Some(current) = slot.current() else {
            return;
        };
        if current.stale.iter().any(|s| s.file == file) {
            return;
        }

        let mut stale = current.stale.clone();
        stale.push(StaleFile {
            file: file.to_string(),
            since: Instant::now(),
        });
        let mut next = Generation {
            number: self.next_generation(),
            segments: current.segments.clone(),
            len: current.len,
            stale,
            stale_records: 0,
        };
        next.recount_stale();
        Self::publish(&slot, next);
    }

    /// Drops records of files that have been stale for at least `grace`, and
    /// removes buckets left empty.
    ///
    /// Returns the number of records dropped.
    pub fn purge_stale(&self, grace: Duration) -> usize {
        let _writer = self.writer.lock();
        let now = Instant::now();
        let mut dropped = 0;
        let mut emptied = Vec::new();

        for (key, slot) in self.slots() {
            let Some(current) = slot.current() else {
                continue;
            };
            let expired: Vec<String> = current
                .stale
                .iter()
                .filter(|s| now.duration_since(s.since) >= grace)
                .map(|s| s.file.clone())
                .collect();
            if expired.is_empty() {
                continue;
            }

            let mut next = current.retain(self.next_generation(), |r| {
                !expired.iter().any(|file| *file == r.source_file)
            });
            next.stale.retain(|s| !expired.contains(&s.file));
            next.recount_stale();
            dropped += current.len - next.len;

            if next.len == 0 && next.stale.is_empty() {
                emptied.push(key);
            } else {
                Self::publish(&slot, next);
            }
        }

        if !emptied.is_empty() {
            let mut buckets = self.buckets.write();
            for key in emptied {
                debug!(bucket = %key, "removing emptied bucket");
                buckets.remove(&key);
            }
        }
        dropped
    }

    /// Drops a bucket entirely.
    pub fn remove_bucket(&self, key: &BucketKey) {
        let _writer = self.writer.lock();
        self.buckets.write().remove(key);
        self.reload_demands.lock().remove(key);
    }

    /// Evicts a bucket's records, keeping the slot so that a later access
    /// requests a reload. Returns the number of records freed.
    pub fn evict_bucket(&self, key: &BucketKey) -> usize {
        let _writer = self.writer.lock();
        let Some(slot) = self.slot(key) else {
            return 0;
        };
        let mut state = slot.state.write();
        let freed = match &*state {
            SlotState::Loaded(generation) => generation.len,
            SlotState::Evicted => return 0,
        };
        *state = SlotState::Evicted;
        freed
    }

    /// Turns an evicted bucket back into an empty cached bucket, ready to be
    /// refilled from disk.
    pub fn restore(&self, key: &BucketKey) {
        let _writer = self.writer.lock();
        let slot = self.slot_or_insert(key);
        slot.demanded(self.tick());
        let mut state = slot.state.write();
        if matches!(*state, SlotState::Evicted) {
            *state = SlotState::Loaded(Arc::new(Generation {
                number: self.next_generation(),
                ..Generation::default()
            }));
        }
    }

    /// Evicts the least recently queried buckets until at most `max_records`
    /// remain cached. Returns the evicted keys.
    ///
    /// Buckets queried or restored after `mark` (a value of
    /// [`CacheStore::clock`]) are never evicted; if they alone exceed the
    /// budget, the store stays over it until they cool down.
    pub fn enforce_budget(&self, max_records: usize, mark: u64) -> Vec<BucketKey> {
        let mut loaded: Vec<(BucketKey, u64, usize, bool)> = self
            .slots()
            .into_iter()
            .filter_map(|(key, slot)| {
                let generation = slot.current()?;
                Some((
                    key,
                    slot.last_access.load(Ordering::Relaxed),
                    generation.len,
                    slot.demanded_after(mark),
                ))
            })
            .collect();

        let mut total: usize = loaded.iter().map(|(_, _, len, _)| len).sum();
        if total <= max_records {
            return Vec::new();
        }

        loaded.sort_by_key(|(key, access, _, _)| (*access, key.clone()));
        let mut evicted = Vec::new();
        for (key, _, _, hot) in loaded {
            if total <= max_records {
                break;
            }
            if hot {
                continue;
            }
            total -= self.evict_bucket(&key);
            evicted.push(key);
        }
        if total > max_records {
            debug!(total, max_records, "recently queried buckets exceed the record budget");
        }
        evicted
    }

    /// Takes the set of evicted buckets that queries asked for.
    pub fn take_reload_demands(&self) -> Vec<BucketKey> {
        std::mem::take(&mut *self.reload_demands.lock())
            .into_iter()
            .collect()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn slot(&self, key: &BucketKey) -> Option<Arc<Slot>> {
        self.buckets.read().get(key).cloned()
    }

    fn slot_or_insert(&self, key: &BucketKey) -> Arc<Slot> {
        if let Some(slot) = self.slot(key) {
            return slot;
        }
        let tick = self.tick();
        let number = self.next_generation();
        Arc::clone(self.buckets.write().entry(key.clone()).or_insert_with(|| {
            Arc::new(Slot::loaded(
                Generation {
                    number,
                    ..Generation::default()
                },
                tick,
            ))
        }))
    }

    fn slots(&self) -> Vec<(BucketKey, Arc<Slot>)> {
        self.buckets
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect()
    }

    fn publish(slot: &Slot, generation: Generation) {
        *slot.state.write() = SlotState::Loaded(Arc::new(generation));
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date")
    }

    fn key() -> BucketKey {
        BucketKey::new("alpha", day())
    }

    fn record(file: &str, sequence: u64, message: &str) -> LogRecord {
        LogRecord {
            project: "alpha".to_string(),
            timestamp: day().and_hms_opt(10, 0, 0).expect("valid time"),
            level: LogLevel::Info,
            message: message.to_string(),
            log_id: None,
            thread: None,
            process: None,
            source_file: file.to_string(),
            source_day: day(),
            sequence,
        }
    }

    fn batch(file: &str, range: std::ops::Range<u64>) -> Vec<LogRecord> {
        range.map(|i| record(file, i, &format!("m{i}"))).collect()
    }

    fn present(store: &CacheStore, key: &BucketKey) -> Snapshot {
        match store.snapshot(key) {
            SnapshotRead::Present(snapshot) => snapshot,
            other => panic!("expected cached bucket, got {other:?}"),
        }
    }

    fn messages(snapshot: &Snapshot) -> Vec<String> {
        snapshot.iter().map(|r| r.message.clone()).collect()
    }

    #[test]
    fn missing_bucket() {
        let store = CacheStore::new();
        assert!(matches!(store.snapshot(&key()), SnapshotRead::Missing));
        assert_eq!(store.bucket_count(), 0);
    }

    #[test]
    fn append_preserves_order() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..3));
        store.append(&key(), batch("a.log", 3..5));

        let snapshot = present(&store, &key());
        assert_eq!(snapshot.len(), 5);
        assert_eq!(messages(&snapshot), vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn snapshot_is_not_affected_by_later_appends() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..2));
        let before = present(&store, &key());

        store.append(&key(), batch("a.log", 2..4));
        let after = present(&store, &key());

        assert_eq!(before.len(), 2);
        assert_eq!(messages(&before), vec!["m0", "m1"]);
        assert_eq!(after.len(), 4);
        assert!(after.generation() > before.generation());
    }

    #[test]
    fn empty_append_is_a_no_op() {
        let store = CacheStore::new();
        store.append(&key(), Vec::new());
        assert_eq!(store.bucket_count(), 0);
    }

    #[test]
    fn compaction_keeps_content() {
        let store = CacheStore::new();
        for i in 0..(MAX_SEGMENTS as u64 + 5) {
            store.append(&key(), batch("a.log", i..i + 1));
        }
        let snapshot = present(&store, &key());
        assert_eq!(snapshot.len(), MAX_SEGMENTS + 5);
        let sequences: Vec<u64> = snapshot.iter().map(|r| r.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn amend_tail_replaces_in_new_generation() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..2));
        let before = present(&store, &key());

        let amended = record("a.log", 1, "m1\n  at frame");
        assert!(store.amend_tail(&key(), amended));

        assert_eq!(messages(&before), vec!["m0", "m1"]);
        assert_eq!(
            messages(&present(&store, &key())),
            vec!["m0", "m1\n  at frame"]
        );
        assert!(!store.amend_tail(&key(), record("a.log", 9, "nope")));
    }

    #[test]
    fn evict_file_only_touches_that_file() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..3));
        store.append(&key(), batch("b.log", 0..2));

        assert_eq!(store.evict_file(&key(), "a.log"), 3);
        let snapshot = present(&store, &key());
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|r| r.source_file == "b.log"));
        assert_eq!(store.evict_file(&key(), "a.log"), 0);
    }

    #[test]
    fn stale_files_are_hidden_then_purged() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..3));
        store.append(&key(), batch("b.log", 0..2));
        let before = present(&store, &key());

        store.mark_file_stale(&key(), "a.log");
        let hidden = present(&store, &key());
        assert_eq!(hidden.len(), 2);
        assert!(hidden.iter().all(|r| r.source_file == "b.log"));
        assert_eq!(before.len(), 5);
        assert_eq!(store.total_records(), 5);

        assert_eq!(store.purge_stale(Duration::from_secs(3600)), 0);
        assert_eq!(store.purge_stale(Duration::ZERO), 3);
        assert_eq!(store.total_records(), 2);
        assert_eq!(present(&store, &key()).len(), 2);
    }

    #[test]
    fn purge_removes_emptied_buckets() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..3));
        store.mark_file_stale(&key(), "a.log");

        assert_eq!(store.purge_stale(Duration::ZERO), 3);
        assert!(matches!(store.snapshot(&key()), SnapshotRead::Missing));
    }

    #[test]
    fn evict_file_clears_stale_mark() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..3));
        store.mark_file_stale(&key(), "a.log");
        store.evict_file(&key(), "a.log");
        store.append(&key(), batch("a.log", 0..1));

        assert_eq!(present(&store, &key()).len(), 1);
    }

    #[test]
    fn budget_evicts_least_recently_queried() {
        let store = CacheStore::new();
        let cold = BucketKey::new("alpha", day());
        let hot = BucketKey::new("alpha", day().succ_opt().expect("valid date"));
        store.append(&cold, batch("a.log", 0..4));
        store.append(&hot, batch("b.log", 0..4));

        let mark = store.clock();
        let _ = store.snapshot(&hot);
        let evicted = store.enforce_budget(5, mark);

        assert_eq!(evicted, vec![cold.clone()]);
        assert!(store.is_evicted(&cold));
        assert_eq!(store.total_records(), 4);
        assert!(store.enforce_budget(5, mark).is_empty());
    }

    #[test]
    fn budget_spares_buckets_queried_since_mark() {
        let store = CacheStore::new();
        let older = BucketKey::new("alpha", day());
        let newer = BucketKey::new("alpha", day().succ_opt().expect("valid date"));
        store.append(&older, batch("a.log", 0..6));
        store.append(&newer, batch("b.log", 0..3));

        let mark = store.clock();
        let _ = store.snapshot(&older);
        let _ = store.snapshot(&newer);
        assert!(store.enforce_budget(4, mark).is_empty());
        assert_eq!(store.total_records(), 9);

        let cooled = store.clock();
        assert_eq!(store.enforce_budget(4, cooled), vec![older]);
        assert_eq!(store.total_records(), 3);
    }

    #[test]
    fn restored_bucket_survives_budget_even_when_oversized() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..5));
        let mark = store.clock();
        assert_eq!(store.enforce_budget(4, mark), vec![key()]);

        assert!(matches!(store.snapshot(&key()), SnapshotRead::Evicted));
        let mark = store.clock();
        store.restore(&key());
        store.append(&key(), batch("a.log", 0..5));

        assert!(store.enforce_budget(4, mark).is_empty());
        assert_eq!(present(&store, &key()).len(), 5);
    }

    #[test]
    fn evicted_access_requests_reload() {
        let store = CacheStore::new();
        store.append(&key(), batch("a.log", 0..2));
        assert_eq!(store.evict_bucket(&key()), 2);

        assert!(matches!(store.snapshot(&key()), SnapshotRead::Evicted));
        assert_eq!(store.take_reload_demands(), vec![key()]);
        assert!(store.take_reload_demands().is_empty());

        store.append(&key(), batch("a.log", 0..2));
        assert!(store.is_evicted(&key()));

        store.restore(&key());
        assert!(present(&store, &key()).is_empty());
        store.append(&key(), batch("a.log", 0..2));
        assert_eq!(present(&store, &key()).len(), 2);
    }

    #[test]
    fn keys_for_project_are_sorted() {
        let store = CacheStore::new();
        let later = BucketKey::new("alpha", day().succ_opt().expect("valid date"));
        store.append(&later, batch("b.log", 0..1));
        store.append(&key(), batch("a.log", 0..1));
        store.append(&BucketKey::new("beta", day()), batch("c.log", 0..1));

        assert_eq!(store.keys_for("alpha"), vec![key(), later]);
        assert!(store.keys_for("gamma").is_empty());
    }

    #[test]
    fn readers_never_observe_partial_batches() {
        const BATCH: u64 = 50;
        let store = Arc::new(CacheStore::new());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..200 {
                    store.append(&key(), batch("a.log", i * BATCH..(i + 1) * BATCH));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let SnapshotRead::Present(snapshot) = store.snapshot(&key()) {
                            let len = snapshot.len();
                            assert_eq!(len % BATCH as usize, 0);
                            assert_eq!(snapshot.iter().count(), len);
                        }
                    }
                })
            })
            .collect();

        writer.join().expect("writer thread");
        for reader in readers {
            reader.join().expect("reader thread");
        }
        assert_eq!(store.total_records(), 200 * BATCH as usize);
    }
}
