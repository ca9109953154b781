//! Generic stage worker
//!
//! Every pipeline role (walker, filter, sink) runs on its own OS thread
//! through [`Worker::spawn`]. Each worker:
//! - Receives its queue leases already registered, before the thread starts
//! - Pulls work until its source reports exhaustion
//! - Releases every lease when `run` returns, on success or failure
//!
//! A stage consumes itself in [`Stage::run`], so its leases drop the moment
//! the work loop ends. A panicking stage releases them during unwinding.

use crate::error::{StageError, StageResult, WorkerError};
use crate::pipeline::audit::AuditLog;
use std::any::Any;
use std::fmt;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Pipeline role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Recursive directory enumeration
    Walker,

    /// Prefix matching within one directory
    Filter,

    /// Byte copy into the destination
    Sink,
}

impl StageKind {
    /// Lowercase name, also used for thread names
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Walker => "walker",
            StageKind::Filter => "filter",
            StageKind::Sink => "sink",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory to search, produced by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirTask {
    /// Full path to the directory
    pub path: PathBuf,

    /// Depth from root (0 = root)
    pub depth: u32,
}

impl DirTask {
    /// Create a new directory task
    pub fn new(path: PathBuf, depth: u32) -> Self {
        Self { path, depth }
    }

    /// Create the root task
    pub fn root(path: PathBuf) -> Self {
        Self { path, depth: 0 }
    }
}

/// A file whose name matched the prefix, produced by a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatch {
    /// Full path to the file
    pub path: PathBuf,
}

impl FileMatch {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Final path component, lossily converted for display
    pub fn display_name(&self) -> String {
        display_name(&self.path)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Directories enqueued by the walker
    pub dirs_scouted: AtomicU64,

    /// Directories listed by a filter
    pub dirs_searched: AtomicU64,

    /// Files matched by a filter
    pub files_matched: AtomicU64,

    /// Files copied by a sink
    pub files_copied: AtomicU64,

    /// Bytes copied by a sink
    pub bytes_copied: AtomicU64,

    /// Items skipped (recoverable errors, shutdown drain)
    pub skipped: AtomicU64,

    /// Errors encountered
    pub errors: AtomicU64,
}

impl WorkerStats {
    pub(crate) fn record_scouted(&self) {
        self.dirs_scouted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_searched(&self) {
        self.dirs_searched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_match(&self) {
        self.files_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_copy(&self, bytes: u64) {
        self.files_copied.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dirs_scouted: self.dirs_scouted.load(Ordering::Relaxed),
            dirs_searched: self.dirs_searched.load(Ordering::Relaxed),
            files_matched: self.files_matched.load(Ordering::Relaxed),
            files_copied: self.files_copied.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`WorkerStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub dirs_scouted: u64,
    pub dirs_searched: u64,
    pub files_matched: u64,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl AddAssign for StatsSnapshot {
    fn add_assign(&mut self, other: Self) {
        self.dirs_scouted += other.dirs_scouted;
        self.dirs_searched += other.dirs_searched;
        self.files_matched += other.files_matched;
        self.files_copied += other.files_copied;
        self.bytes_copied += other.bytes_copied;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Per-worker context handed to [`Stage::run`]
pub struct StageContext {
    /// Worker ID (unique across all stages of one run)
    pub id: usize,

    /// Audit producer; a no-op when auditing is off
    pub audit: AuditLog,

    /// Shutdown signal
    pub shutdown: Arc<AtomicBool>,

    /// Worker statistics
    pub stats: Arc<WorkerStats>,
}

impl StageContext {
    pub fn new(id: usize, audit: AuditLog, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            id,
            audit,
            shutdown,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Check if a shutdown was requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// One pipeline role
///
/// Implementors own their queue leases. `run` consumes the stage, so the
/// leases are released when it returns, whether it returns `Ok` or `Err`.
pub trait Stage: Send + 'static {
    /// Which role this stage plays
    fn kind(&self) -> StageKind;

    /// Process work until the source is exhausted
    ///
    /// Recoverable per-item errors are handled inside; an `Err` return means
    /// the worker stops.
    fn run(self, ctx: StageContext) -> StageResult<()>;
}

/// A worker thread running one stage
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Stage this worker runs
    kind: StageKind,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread running `stage`
    pub fn spawn<S: Stage>(stage: S, ctx: StageContext) -> Result<Self, WorkerError> {
        let id = ctx.id;
        let kind = stage.kind();
        let stats = Arc::clone(&ctx.stats);
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("{}-{}", kind, id))
            .spawn(move || worker_main(id, kind, stage, ctx, thread_stats))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                stage: kind,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            kind,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get the stage this worker runs
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Get a handle to the worker statistics that outlives `join`
    pub fn shared_stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(payload) => Err(WorkerError::Panicked {
                    id: self.id,
                    stage: self.kind,
                    message: panic_message(payload.as_ref()),
                }),
            }
        } else {
            Ok(())
        }
    }
}

fn worker_main<S: Stage>(
    id: usize,
    kind: StageKind,
    stage: S,
    ctx: StageContext,
    stats: Arc<WorkerStats>,
) -> Result<(), WorkerError> {
    debug!(worker = id, stage = %kind, "Worker starting");

    // Leases held by `stage` and `ctx` are released before this returns
    match stage.run(ctx) {
        Ok(()) => {
            let snapshot = stats.snapshot();
            info!(
                worker = id,
                stage = %kind,
                scouted = snapshot.dirs_scouted,
                searched = snapshot.dirs_searched,
                matched = snapshot.files_matched,
                copied = snapshot.files_copied,
                skipped = snapshot.skipped,
                "Worker finished"
            );
            Ok(())
        }
        Err(source) => {
            stats.record_error();
            match source.path() {
                Some(path) => error!(
                    worker = id,
                    stage = %kind,
                    path = %path.display(),
                    error = %source,
                    "Worker stopped on error"
                ),
                None => error!(worker = id, stage = %kind, error = %source, "Worker stopped on error"),
            }
            Err(WorkerError::Failed {
                id,
                stage: kind,
                source,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Worker thread panicked".into()
    }
}

/// Log a recoverable per-item error and count it as skipped
pub(crate) fn skip_item(ctx: &StageContext, kind: StageKind, err: &StageError) {
    ctx.stats.record_skip();
    match err.path() {
        Some(path) => warn!(
            worker = ctx.id,
            stage = %kind,
            path = %path.display(),
            error = %err,
            "Skipping item"
        ),
        None => warn!(worker = ctx.id, stage = %kind, error = %err, "Skipping item"),
    }
}
