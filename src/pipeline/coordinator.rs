//! Search coordinator - wires and runs the three-stage pipeline
//!
//! The coordinator is responsible for:
//! - Building one queue per pipeline edge (plus the optional audit queue)
//! - Registering every queue lease before any worker starts
//! - Spawning the walker, filter and sink workers
//! - Draining audit lines on the calling thread
//! - Joining workers and collecting final statistics
//!
//! Every stage is built, and so takes its directory and results queue
//! leases, on the coordinator thread before the first worker starts. No
//! consumer can see a premature end-of-stream, and no early-exiting worker
//! can leave a queue abandoned while its peers are still being set up.
//!
//! Audit producer leases are taken per worker in `launch`, just before that
//! worker is spawned. The audit queue is only drained after every launch,
//! so the drain never sees a gap in audit producers between two launches.

use crate::config::SearchConfig;
use crate::error::{ConfigError, Result};
use crate::pipeline::audit::{self, AuditLog, START_MESSAGE};
use crate::pipeline::filter::Filter;
use crate::pipeline::queue::BoundedSignalQueue;
use crate::pipeline::sink::Sink;
use crate::pipeline::stage::{DirTask, FileMatch, Stage, StageContext, StatsSnapshot, Worker};
use crate::pipeline::walker::Walker;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of a completed search
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Directories enqueued by the walker
    pub dirs_scouted: u64,

    /// Directories listed by filters
    pub dirs_searched: u64,

    /// Files whose names matched
    pub files_matched: u64,

    /// Files copied to the destination
    pub files_copied: u64,

    /// Total bytes copied
    pub bytes_copied: u64,

    /// Items skipped (recoverable errors, shutdown drain)
    pub skipped: u64,

    /// Workers that stopped on an error, panicked or failed to start
    pub failed_workers: usize,

    /// Audit lines drained
    pub audit_lines: usize,

    /// Time taken for the whole run
    pub duration: Duration,

    /// Whether the run completed (vs was interrupted)
    pub completed: bool,
}

/// Coordinates one pipeline run
pub struct SearchCoordinator {
    /// Configuration
    config: Arc<SearchConfig>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,

    /// Next worker ID
    next_id: usize,

    /// Running workers
    workers: Vec<Worker>,

    /// Workers that could not be spawned
    spawn_failures: usize,
}

impl SearchCoordinator {
    /// Create a new search coordinator
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(AtomicBool::new(false)),
            next_id: 0,
            workers: Vec::new(),
            spawn_failures: 0,
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the search, printing audit lines to stdout
    pub fn run(self) -> Result<SearchResult> {
        self.run_with_audit(|index, line| println!("{}", audit::format_line(index, line)))
    }

    /// Run the search, handing each audit line to `on_audit` with its
    /// zero-based sequence index
    pub fn run_with_audit(mut self, on_audit: impl FnMut(usize, &str)) -> Result<SearchResult> {
        let start = Instant::now();
        let config = Arc::clone(&self.config);

        config.validate()?;
        fs::create_dir_all(&config.destination).map_err(|e| ConfigError::InvalidDestination {
            path: config.destination.clone(),
            reason: e.to_string(),
        })?;

        info!(
            prefix = %config.prefix,
            root = %config.root.display(),
            destination = %config.destination.display(),
            filters = config.filter_count,
            sinks = config.sink_count,
            audit = config.audit,
            "Starting search"
        );

        let directories: Arc<BoundedSignalQueue<DirTask>> =
            Arc::new(BoundedSignalQueue::new("directories", config.directory_capacity));
        let results: Arc<BoundedSignalQueue<FileMatch>> =
            Arc::new(BoundedSignalQueue::new("results", config.results_capacity));
        let audit_queue: Option<Arc<BoundedSignalQueue<String>>> = config
            .audit
            .then(|| Arc::new(BoundedSignalQueue::new("audit", config.audit_capacity)));

        let audit_reader = audit_queue.as_ref().map(|queue| queue.consumer());
        if let Some(queue) = &audit_queue {
            audit::announce(queue, START_MESSAGE)?;
        }

        // A stage with no workers would leave its input unread forever
        if config.filter_count == 0 {
            warn!("No filter workers configured, directories will not be searched");
            directories.abandon();
        }
        if config.sink_count == 0 {
            warn!("No sink workers configured, matches will not be copied");
            results.abandon();
        }

        let walker = Walker::new(config.root.clone(), config.include_root, directories.producer());
        let filters: Vec<Filter> = (0..config.filter_count)
            .map(|_| Filter::new(config.prefix.clone(), directories.consumer(), results.producer()))
            .collect();
        let sinks: Vec<Sink> = (0..config.sink_count)
            .map(|_| Sink::new(config.destination.clone(), config.buffer_size, results.consumer()))
            .collect();

        self.launch(walker, audit_queue.as_ref());
        for filter in filters {
            self.launch(filter, audit_queue.as_ref());
        }
        for sink in sinks {
            self.launch(sink, audit_queue.as_ref());
        }

        info!(count = self.workers.len(), "Workers spawned");

        // The coordinator holds no producer lease, so the drain ends once
        // every worker has finished
        let audit_lines = match audit_reader {
            Some(reader) => audit::drain(reader, on_audit),
            None => 0,
        };

        let (stats, failed) = self.join_workers();
        let failed_workers = failed + self.spawn_failures;

        log_queue_stats(&directories);
        log_queue_stats(&results);

        let duration = start.elapsed();
        let completed = !self.shutdown.load(Ordering::SeqCst);

        info!(
            scouted = stats.dirs_scouted,
            matched = stats.files_matched,
            copied = stats.files_copied,
            bytes = stats.bytes_copied,
            failed_workers = failed_workers,
            duration_ms = duration.as_millis() as u64,
            "Search completed"
        );

        Ok(SearchResult {
            dirs_scouted: stats.dirs_scouted,
            dirs_searched: stats.dirs_searched,
            files_matched: stats.files_matched,
            files_copied: stats.files_copied,
            bytes_copied: stats.bytes_copied,
            skipped: stats.skipped,
            failed_workers,
            audit_lines,
            duration,
            completed,
        })
    }

    /// Spawn one worker, registering it on the audit queue first
    fn launch<S: Stage>(&mut self, stage: S, audit_queue: Option<&Arc<BoundedSignalQueue<String>>>) {
        let id = self.next_id;
        self.next_id += 1;
        let kind = stage.kind();

        let ctx = StageContext::new(id, AuditLog::for_queue(audit_queue), Arc::clone(&self.shutdown));

        // On failure the closure is dropped, releasing the stage's leases
        match Worker::spawn(stage, ctx) {
            Ok(worker) => {
                debug!(worker = id, stage = %kind, "Worker spawned");
                self.workers.push(worker);
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn worker");
                self.spawn_failures += 1;
            }
        }
    }

    /// Join all worker threads, returning their combined stats and how
    /// many failed
    fn join_workers(&mut self) -> (StatsSnapshot, usize) {
        let mut total = StatsSnapshot::default();
        let mut failed = 0;

        for worker in std::mem::take(&mut self.workers) {
            let kind = worker.kind();
            let stats = worker.shared_stats();
            if let Err(e) = worker.join() {
                warn!(worker = e.worker_id(), stage = %kind, error = %e, "Worker failed");
                failed += 1;
            }
            total += stats.snapshot();
        }

        (total, failed)
    }
}

fn log_queue_stats<T>(queue: &BoundedSignalQueue<T>) {
    let stats = queue.stats();
    debug!(
        queue = queue.name(),
        enqueued = stats.enqueued(),
        dequeued = stats.dequeued(),
        full_waits = stats.full_waits(),
        empty_waits = stats.empty_waits(),
        peak = stats.peak_size(),
        "Queue statistics"
    );
}
