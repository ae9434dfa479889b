//! Background polling of the log root.
//!
//! [`Poller::poll_once`] is one synchronous pass over
//! `<log_root>/<project>/*.<ext>`; it is the only code that reads log files
//! and the only writer of the [`CacheStore`]. [`PollerHandle::spawn`] runs
//! passes on a fixed interval, one at a time, on the blocking thread pool.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::parser::LineParser;
use crate::registry::ProjectRegistry;
use crate::tracker::{Change, FileTracker};
use crate::types::BucketKey;

/// Counters describing one polling pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Files stat'ed.
    pub files_scanned: usize,
    /// Files read from.
    pub files_read: usize,
    /// Bytes read.
    pub bytes_read: u64,
    /// Records appended to the cache.
    pub records_appended: usize,
    /// Files seen for the first time.
    pub new_files: usize,
    /// Files that shrank and were re-ingested.
    pub rotations: usize,
    /// Files that disappeared.
    pub vanished: usize,
    /// I/O errors, retried on the next pass.
    pub errors: usize,
    /// Buckets evicted to honor the record budget.
    pub evicted_buckets: usize,
    /// Evicted buckets rebuilt on demand.
    pub reloaded_buckets: usize,
    /// Records of vanished files dropped after the grace period.
    pub purged_records: usize,
}

/// Incremental ingester of a log root.
#[derive(Debug)]
pub struct Poller {
    config: EngineConfig,
    parser: LineParser,
    tracker: FileTracker,
    cache: Arc<CacheStore>,
    registry: Arc<ProjectRegistry>,
    /// Cache clock at the start of the previous pass.
    demand_mark: u64,
}

impl Poller {
    /// Creates a poller feeding the given cache and registry.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        cache: Arc<CacheStore>,
        registry: Arc<ProjectRegistry>,
    ) -> Self {
        let parser = LineParser::new(config.timestamp_formats.clone());
        Self {
            config,
            parser,
            tracker: FileTracker::new(),
            cache,
            registry,
            demand_mark: 0,
        }
    }

    /// Returns the file tracker.
    #[must_use]
    pub const fn tracker(&self) -> &FileTracker {
        &self.tracker
    }

    /// Runs one full pass.
    ///
    /// Buckets queried since the previous pass started, and buckets reloaded
    /// by this one, are exempt from budget eviction.
    pub fn poll_once(&mut self) -> PollReport {
        let mut report = PollReport::default();
        let demand_mark = std::mem::replace(&mut self.demand_mark, self.cache.clock());

        for key in self.cache.take_reload_demands() {
            self.reload(&key, &mut report);
        }

        let Some(scan) = self.scan(&mut report) else {
            return report;
        };

        for path in self.tracker.paths() {
            if !scan.seen.contains(&path) {
                self.vanish(&path, &mut report);
            }
        }

        for key in self.cache.enforce_budget(self.config.max_cached_records, demand_mark) {
            info!(bucket = %key, "evicting cold bucket");
            self.tracker.set_dormant(&key, true);
            report.evicted_buckets += 1;
        }

        report.purged_records = self.cache.purge_stale(self.config.stale_grace());

        let partitions: BTreeMap<_, _> = self
            .tracker
            .partitions()
            .into_iter()
            .filter(|(project, _)| scan.projects.contains(project))
            .collect();
        self.registry.refresh(partitions);

        if report.records_appended > 0 || report.rotations > 0 || report.vanished > 0 {
            debug!(
                files = report.files_scanned,
                read = report.files_read,
                bytes = report.bytes_read,
                records = report.records_appended,
                rotations = report.rotations,
                vanished = report.vanished,
                "poll pass complete"
            );
        }
        report
    }

    /// Walks the log root and ingests every changed file.
    ///
    /// Returns `None` if the root itself could not be listed, in which case
    /// nothing is treated as vanished.
    fn scan(&mut self, report: &mut PollReport) -> Option<Scan> {
        let root = self.config.log_root.clone();
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "cannot list log root");
                report.errors += 1;
                return None;
            }
        };

        let mut scan = Scan::default();
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let Some(project) = entry.file_name().to_str().map(ToString::to_string) else {
                debug!(dir = %dir.display(), "skipping non UTF-8 project directory");
                continue;
            };

            let files = match fs::read_dir(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!(project = %project, error = %e, "cannot list project directory");
                    report.errors += 1;
                    scan.keep_project_files(&self.tracker, &project);
                    scan.projects.insert(project);
                    continue;
                }
            };
            scan.projects.insert(project.clone());

            for file in files.flatten() {
                let path = file.path();
                if !self.config.layout.is_log_file(&path) {
                    continue;
                }
                match file.metadata() {
                    Ok(meta) if meta.is_file() => {
                        scan.seen.insert(path.clone());
                        report.files_scanned += 1;
                        self.visit(&project, path, &meta, report);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot stat log file");
                        report.errors += 1;
                        scan.seen.insert(path);
                    }
                }
            }
        }
        Some(scan)
    }

    /// Applies the outcome of one stat.
    fn visit(&mut self, project: &str, path: PathBuf, meta: &Metadata, report: &mut PollReport) {
        let size = meta.len();
        let modified = meta.modified().ok();

        match self.tracker.observe(&path, size, modified) {
            Change::Unchanged | Change::Dormant => {}
            Change::Touched => self.tracker.mark_observed(&path, size, modified),
            Change::New => {
                let Some(day) = self.config.layout.partition_day(&path, modified) else {
                    debug!(path = %path.display(), "no partition day for file, ignoring");
                    return;
                };
                let state = self.tracker.track(path.clone(), BucketKey::new(project, day));
                let (key, source) = (state.key.clone(), state.source.clone());
                self.cache.evict_file(&key, &source);
                debug!(path = %path.display(), bucket = %key, size, "discovered log file");
                report.new_files += 1;
                self.read(&path, size, modified, report);
            }
            Change::Shrunk => {
                if let Some(state) = self.tracker.get(&path) {
                    warn!(
                        path = %path.display(),
                        previous_size = state.last_size,
                        current_size = size,
                        "log file truncated or rotated; re-ingesting"
                    );
                    let removed = self.cache.evict_file(&state.key, &state.source);
                    debug!(path = %path.display(), removed, "evicted pre-rotation records");
                }
                self.tracker.reset(&path);
                report.rotations += 1;
                self.read(&path, size, modified, report);
            }
            Change::Grown | Change::Backlog => self.read(&path, size, modified, report),
        }
    }

    /// Reads the next chunk of a file and publishes the resulting records.
    ///
    /// On I/O failure the file state is left untouched so the next pass
    /// resumes from the same offset.
    fn read(
        &mut self,
        path: &Path,
        size: u64,
        modified: Option<std::time::SystemTime>,
        report: &mut PollReport,
    ) {
        let Some(state) = self.tracker.get(path) else {
            return;
        };
        let position = state.read_position();
        let key = state.key.clone();
        let want = size.saturating_sub(position).min(self.config.max_read_bytes);

        let bytes = if want == 0 {
            Vec::new()
        } else {
            match read_range(path, position, want) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), offset = position, error = %e, "read failed; will retry");
                    report.errors += 1;
                    return;
                }
            }
        };

        report.files_read += 1;
        report.bytes_read += bytes.len() as u64;

        let batch = self.tracker.ingest(path, &bytes, &self.parser);
        self.tracker.mark_observed(path, size, modified);

        if let Some(tail) = batch.amended_tail {
            self.cache.amend_tail(&key, tail);
        }
        report.records_appended += batch.appended.len();
        self.cache.append(&key, batch.appended);
    }

    /// Stops tracking a file that is gone and hides its records.
    fn vanish(&mut self, path: &Path, report: &mut PollReport) {
        if let Some(state) = self.tracker.forget(path) {
            info!(path = %path.display(), bucket = %state.key, "log file disappeared");
            self.cache.mark_file_stale(&state.key, &state.source);
            report.vanished += 1;
        }
    }

    /// Prepares an evicted bucket to be rebuilt from offset zero.
    fn reload(&mut self, key: &BucketKey, report: &mut PollReport) {
        if self.tracker.files_in(key).is_empty() {
            debug!(bucket = %key, "no files left for evicted bucket, dropping it");
            self.cache.remove_bucket(key);
            return;
        }
        info!(bucket = %key, "reloading evicted bucket");
        self.cache.restore(key);
        self.tracker.set_dormant(key, false);
        report.reloaded_buckets += 1;
    }
}

/// What one directory walk found.
#[derive(Debug, Default)]
struct Scan {
    projects: BTreeSet<String>,
    seen: HashSet<PathBuf>,
}

impl Scan {
    /// Counts a project's tracked files as seen when its directory could not
    /// be listed, so a transient error does not look like deletion.
    fn keep_project_files(&mut self, tracker: &FileTracker, project: &str) {
        self.seen.extend(
            tracker
                .paths()
                .into_iter()
                .filter(|path| tracker.get(path).is_some_and(|s| s.key.project == project)),
        );
    }
}

fn read_range(path: &Path, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buffer = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    file.take(len).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Pass counters published by the polling loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PassCounter {
    started: u64,
    completed: u64,
}

/// Handle to the background polling loop.
#[derive(Debug)]
pub struct PollerHandle {
    trigger: Arc<Notify>,
    passes: watch::Receiver<PassCounter>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollerHandle {
    /// Spawns the polling loop on the current tokio runtime.
    ///
    /// The first pass starts immediately. A pass never overlaps the previous
    /// one; ticks missed during a long pass are delayed, not bunched.
    #[must_use]
    pub fn spawn(poller: Poller, interval: Duration) -> Self {
        let trigger = Arc::new(Notify::new());
        let (passes_tx, passes) = watch::channel(PassCounter::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_loop(
            poller,
            interval,
            Arc::clone(&trigger),
            passes_tx,
            cancel.clone(),
        ));

        Self {
            trigger,
            passes,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Number of passes completed so far.
    #[must_use]
    pub fn passes_completed(&self) -> u64 {
        self.passes.borrow().completed
    }

    /// Requests an immediate pass and waits until a pass that started after
    /// the request has completed, or until `timeout` elapses.
    ///
    /// Returns true if such a pass completed in time.
    pub async fn request_pass(&self, timeout: Duration) -> bool {
        let target = self.passes.borrow().started + 1;
        self.trigger.notify_one();

        let mut passes = self.passes.clone();
        let wait = passes.wait_for(|counter| counter.completed >= target);
        matches!(tokio::time::timeout(timeout, wait).await, Ok(Ok(_)))
    }

    /// Waits until at least `count` passes have completed.
    pub async fn wait_for_passes(&self, count: u64) -> bool {
        let mut passes = self.passes.clone();
        passes.wait_for(|counter| counter.completed >= count).await.is_ok()
    }

    /// Stops the loop and waits for the in-flight pass to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "poller task ended abnormally");
            }
        }
    }

    /// Returns true once the loop has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }
}

async fn run_loop(
    mut poller: Poller,
    interval: Duration,
    trigger: Arc<Notify>,
    passes: watch::Sender<PassCounter>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(root = %poller.config.log_root.display(), ?interval, "poller started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            () = trigger.notified() => {}
        }

        passes.send_modify(|counter| counter.started += 1);
        let result = tokio::task::spawn_blocking(move || {
            let report = poller.poll_once();
            (poller, report)
        })
        .await;

        match result {
            Ok((returned, report)) => {
                poller = returned;
                if report.errors > 0 {
                    debug!(errors = report.errors, "poll pass finished with errors");
                }
                passes.send_modify(|counter| counter.completed += 1);
            }
            Err(e) => {
                error!(error = %e, "poll pass panicked; stopping poller");
                break;
            }
        }
    }
    info!("poller stopped");
}
