//! Per-file read state and incremental line ingestion.
//!
//! The tracker never touches the filesystem itself. The poller stats files,
//! asks [`FileTracker::observe`] what changed, reads the byte range the state
//! asks for, and hands the bytes to [`FileTracker::ingest`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{NaiveDate, NaiveDateTime};

use crate::parser::{Draft, LineParser, ParseContext, ParsedLine};
use crate::types::{BucketKey, LogRecord};

/// Read state of one tracked file.
#[derive(Debug, Clone)]
pub struct FileState {
    /// File path.
    pub path: PathBuf,
    /// Provenance string stamped on records.
    pub source: String,
    /// Bucket the file feeds, fixed at discovery.
    pub key: BucketKey,
    /// Size at the last stat.
    pub last_size: u64,
    /// Modification time at the last stat.
    pub last_modified: Option<SystemTime>,
    /// Bytes parsed into records so far.
    pub read_offset: u64,
    /// Bytes read past `read_offset` that do not end in a newline yet.
    pub pending_partial_line: Vec<u8>,
    /// Timestamp of the last record, inherited by unparsable lines.
    pub last_record_timestamp: Option<NaiveDateTime>,
    /// Sequence number of the next record.
    pub next_sequence: u64,
    /// Last record emitted, so a later pass can fold continuation lines into it.
    pub last_record: Option<LogRecord>,
    /// The bucket was evicted; growth is left on disk until a reload.
    pub dormant: bool,
}

impl FileState {
    fn new(path: PathBuf, key: BucketKey) -> Self {
        let source = path.to_string_lossy().into_owned();
        Self {
            path,
            source,
            key,
            last_size: 0,
            last_modified: None,
            read_offset: 0,
            pending_partial_line: Vec::new(),
            last_record_timestamp: None,
            next_sequence: 0,
            last_record: None,
            dormant: false,
        }
    }

    /// Offset of the next byte to read.
    #[must_use]
    pub fn read_position(&self) -> u64 {
        self.read_offset + self.pending_partial_line.len() as u64
    }

    /// Forgets everything read so far, as for a brand new file.
    pub fn reset(&mut self) {
        self.last_size = 0;
        self.last_modified = None;
        self.read_offset = 0;
        self.pending_partial_line.clear();
        self.last_record_timestamp = None;
        self.next_sequence = 0;
        self.last_record = None;
        self.dormant = false;
    }

    fn context(&self) -> ParseContext {
        ParseContext {
            last_timestamp: self.last_record_timestamp,
            nominal_day: self.key.day,
        }
    }

    fn record(&mut self, draft: Draft) -> LogRecord {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.last_record_timestamp = Some(draft.timestamp);
        LogRecord {
            project: self.key.project.clone(),
            timestamp: draft.timestamp,
            level: draft.level,
            message: draft.message,
            log_id: draft.log_id,
            thread: draft.thread,
            process: draft.process,
            source_file: self.source.clone(),
            source_day: self.key.day,
            sequence,
        }
    }
}

/// What a stat revealed about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Not tracked yet.
    New,
    /// Same size and mtime, everything consumed.
    Unchanged,
    /// Same size, everything consumed, but the mtime moved.
    Touched,
    /// Larger than last seen.
    Grown,
    /// Same size, but earlier passes stopped at the read limit.
    Backlog,
    /// Smaller than last seen: truncated or rotated.
    Shrunk,
    /// The file's bucket is evicted.
    Dormant,
}

/// Records produced by one ingestion step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestBatch {
    /// New records in file order.
    pub appended: Vec<LogRecord>,
    /// The file's previous last record, grown by continuation lines.
    pub amended_tail: Option<LogRecord>,
}

impl IngestBatch {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.appended.is_empty() && self.amended_tail.is_none()
    }
}

/// Tracks read state for every discovered file.
#[derive(Debug, Default)]
pub struct FileTracker {
    files: HashMap<PathBuf, FileState>,
}

impl FileTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies a file from its current size and mtime. Stat data only.
    #[must_use]
    pub fn observe(&self, path: &Path, size: u64, modified: Option<SystemTime>) -> Change {
        let Some(state) = self.files.get(path) else {
            return Change::New;
        };
        if state.dormant {
            return Change::Dormant;
        }
        if size < state.last_size {
            return Change::Shrunk;
        }
        if size > state.last_size {
            return Change::Grown;
        }
        if state.read_position() < size {
            return Change::Backlog;
        }
        if modified == state.last_modified {
            Change::Unchanged
        } else {
            Change::Touched
        }
    }

    /// Starts tracking a file at offset zero.
    pub fn track(&mut self, path: PathBuf, key: BucketKey) -> &FileState {
        self.files
            .entry(path.clone())
            .or_insert_with(|| FileState::new(path, key))
    }

    /// Returns the state of a tracked file.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileState> {
        self.files.get(path)
    }

    /// Records the size and mtime seen by the latest stat.
    pub fn mark_observed(&mut self, path: &Path, size: u64, modified: Option<SystemTime>) {
        if let Some(state) = self.files.get_mut(path) {
            state.last_size = size;
            state.last_modified = modified;
        }
    }

    /// Resets a file to offset zero.
    pub fn reset(&mut self, path: &Path) {
        if let Some(state) = self.files.get_mut(path) {
            state.reset();
        }
    }

    /// Stops tracking a file, returning its last state.
    pub fn forget(&mut self, path: &Path) -> Option<FileState> {
        self.files.remove(path)
    }

    /// Marks every file of a bucket dormant, or resets them to zero when
    /// waking them up so the bucket is rebuilt from the start.
    pub fn set_dormant(&mut self, key: &BucketKey, dormant: bool) {
        for state in self.files.values_mut().filter(|s| &s.key == key) {
            if dormant {
                state.dormant = true;
            } else {
                state.reset();
            }
        }
    }

    /// Paths of all tracked files.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    /// Paths of the files feeding one bucket.
    #[must_use]
    pub fn files_in(&self, key: &BucketKey) -> Vec<PathBuf> {
        self.files
            .values()
            .filter(|s| &s.key == key)
            .map(|s| s.path.clone())
            .collect()
    }

    /// Partition days of every project with at least one tracked file.
    #[must_use]
    pub fn partitions(&self) -> BTreeMap<String, BTreeSet<NaiveDate>> {
        let mut partitions: BTreeMap<String, BTreeSet<NaiveDate>> = BTreeMap::new();
        for state in self.files.values() {
            partitions
                .entry(state.key.project.clone())
                .or_default()
                .insert(state.key.day);
        }
        partitions
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no file is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Feeds bytes read at the file's read position.
    ///
    /// Complete lines are parsed; a trailing unterminated line is kept
    /// pending until a later call completes it. Continuation lines extend
    /// the current record, or the last record of an earlier call, which is
    /// then returned as `amended_tail`.
    pub fn ingest(&mut self, path: &Path, bytes: &[u8], parser: &LineParser) -> IngestBatch {
        let Some(state) = self.files.get_mut(path) else {
            return IngestBatch::default();
        };

        let mut buffer = std::mem::take(&mut state.pending_partial_line);
        buffer.extend_from_slice(bytes);

        let complete = buffer
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |newline| newline + 1);

        let mut appended: Vec<LogRecord> = Vec::new();
        let mut amended: Option<LogRecord> = None;

        if complete > 0 {
            for raw in buffer[..complete - 1].split(|b| *b == b'\n') {
                let line = LineParser::decode(raw);
                match parser.parse(&line, &state.context()) {
                    ParsedLine::Entry(draft) => {
                        let record = state.record(draft);
                        appended.push(record);
                    }
                    ParsedLine::Continuation(text) => {
                        if text.trim().is_empty() {
                            continue;
                        }
                        if let Some(current) = appended.last_mut() {
                            fold(current, &text);
                        } else if let Some(tail) = amended.as_mut() {
                            fold(tail, &text);
                        } else if let Some(previous) = &state.last_record {
                            let mut tail = previous.clone();
                            fold(&mut tail, &text);
                            amended = Some(tail);
                        } else {
                            let draft = LineParser::orphan(&text, &state.context());
                            let record = state.record(draft);
                            appended.push(record);
                        }
                    }
                }
            }
        }

        state.read_offset += complete as u64;
        state.pending_partial_line = buffer[complete..].to_vec();
        if let Some(last) = appended.last().or(amended.as_ref()) {
            state.last_record = Some(last.clone());
        }

        IngestBatch {
            appended,
            amended_tail: amended,
        }
    }
}

fn fold(record: &mut LogRecord, text: &str) {
    record.message.push('\n');
    record.message.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    fn parser() -> LineParser {
        LineParser::new(vec!["%Y-%m-%d %H:%M:%S%.f".to_string()])
    }

    fn key() -> BucketKey {
        BucketKey::new(
            "alpha",
            NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date"),
        )
    }

    fn path() -> PathBuf {
        PathBuf::from("/logs/alpha/2024-05-01.log")
    }

    fn tracker() -> FileTracker {
        let mut tracker = FileTracker::new();
        tracker.track(path(), key());
        tracker
    }

    const SAMPLE: &str = "2024-05-01 10:00:00 INFO started\n\
                          2024-05-01 10:00:01 ERROR failed\n\
                          Traceback (most recent call last):\n\
                          \x20 File \"main.py\", line 3\n\
                          2024-05-01 10:00:02 INFO recovered\n";

    #[test]
    fn observe_transitions() {
        let mut tracker = FileTracker::new();
        let now = Some(SystemTime::now());
        assert_eq!(tracker.observe(&path(), 10, now), Change::New);

        tracker.track(path(), key());
        assert_eq!(tracker.observe(&path(), 0, None), Change::Unchanged);
        assert_eq!(tracker.observe(&path(), 0, now), Change::Touched);
        assert_eq!(tracker.observe(&path(), 10, now), Change::Grown);

        tracker.mark_observed(&path(), 10, now);
        assert_eq!(tracker.observe(&path(), 10, now), Change::Backlog);
        assert_eq!(tracker.observe(&path(), 4, now), Change::Shrunk);

        let _ = tracker.ingest(&path(), b"0123456789", &parser());
        assert_eq!(tracker.observe(&path(), 10, now), Change::Unchanged);

        tracker.set_dormant(&key(), true);
        assert_eq!(tracker.observe(&path(), 20, now), Change::Dormant);
    }

    #[test]
    fn ingest_folds_continuations() {
        let mut tracker = tracker();
        let batch = tracker.ingest(&path(), SAMPLE.as_bytes(), &parser());

        assert_eq!(batch.appended.len(), 3);
        assert!(batch.amended_tail.is_none());
        assert_eq!(
            batch.appended[1].message,
            "failed\nTraceback (most recent call last):\n  File \"main.py\", line 3"
        );
        let sequences: Vec<u64> = batch.appended.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(batch.appended.iter().all(|r| r.source_file == "/logs/alpha/2024-05-01.log"));

        let state = tracker.get(&path()).expect("tracked");
        assert_eq!(state.read_offset, SAMPLE.len() as u64);
        assert!(state.pending_partial_line.is_empty());
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let mut tracker = tracker();
        let batch = tracker.ingest(&path(), b"2024-05-01 10:00:00 INFO sta", &parser());
        assert!(batch.is_empty());

        let state = tracker.get(&path()).expect("tracked");
        assert_eq!(state.read_offset, 0);
        assert_eq!(state.read_position(), 28);

        let batch = tracker.ingest(&path(), b"rted\n", &parser());
        assert_eq!(batch.appended.len(), 1);
        assert_eq!(batch.appended[0].message, "started");
        assert_eq!(tracker.get(&path()).map(|s| s.read_offset), Some(33));
    }

    #[test]
    fn split_ingest_matches_single_pass() {
        let whole = tracker().ingest(&path(), SAMPLE.as_bytes(), &parser()).appended;

        for cut in 0..SAMPLE.len() {
            let mut tracker = tracker();
            let mut records = tracker
                .ingest(&path(), &SAMPLE.as_bytes()[..cut], &parser())
                .appended;
            let second = tracker.ingest(&path(), &SAMPLE.as_bytes()[cut..], &parser());
            if let Some(tail) = second.amended_tail {
                let slot = records
                    .iter_mut()
                    .find(|r| r.sequence == tail.sequence)
                    .expect("amended record was emitted earlier");
                *slot = tail;
            }
            records.extend(second.appended);
            assert_eq!(records, whole, "cut at byte {cut}");
        }
    }

    #[test]
    fn leading_garbage_becomes_unknown_record() {
        let mut tracker = tracker();
        let batch = tracker.ingest(
            &path(),
            b"orphaned text\nmore orphaned\n2024-05-01 09:00:00 INFO first\n",
            &parser(),
        );

        assert_eq!(batch.appended.len(), 2);
        let orphan = &batch.appended[0];
        assert_eq!(orphan.level, LogLevel::Unknown);
        assert_eq!(orphan.message, "orphaned text\nmore orphaned");
        assert_eq!(
            orphan.timestamp,
            key().day.and_hms_opt(0, 0, 0).expect("valid time")
        );
    }

    #[test]
    fn crlf_and_blank_lines() {
        let mut tracker = tracker();
        let batch = tracker.ingest(
            &path(),
            b"2024-05-01 10:00:00 INFO a\r\n\r\n2024-05-01 10:00:01 INFO b\r\n",
            &parser(),
        );
        let messages: Vec<&str> = batch.appended.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn reset_and_dormant_wakeup() {
        let mut tracker = tracker();
        let _ = tracker.ingest(&path(), SAMPLE.as_bytes(), &parser());
        tracker.mark_observed(&path(), SAMPLE.len() as u64, None);

        tracker.set_dormant(&key(), true);
        assert!(tracker.get(&path()).is_some_and(|s| s.dormant));

        tracker.set_dormant(&key(), false);
        let state = tracker.get(&path()).expect("tracked");
        assert!(!state.dormant);
        assert_eq!(state.read_offset, 0);
        assert_eq!(state.next_sequence, 0);
        assert_eq!(state.last_size, 0);
    }

    #[test]
    fn partitions_group_by_project() {
        let mut tracker = tracker();
        let next_day = NaiveDate::from_ymd_opt(2024, 5, 2).expect("valid date");
        tracker.track(
            PathBuf::from("/logs/alpha/2024-05-02.log"),
            BucketKey::new("alpha", next_day),
        );
        tracker.track(
            PathBuf::from("/logs/beta/2024-05-02.log"),
            BucketKey::new("beta", next_day),
        );

        let partitions = tracker.partitions();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions["alpha"].len(), 2);
        assert_eq!(tracker.files_in(&key()), vec![path()]);
        assert_eq!(tracker.len(), 3);
    }
}
