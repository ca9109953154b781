//! Audit side channel
//!
//! When auditing is on, every worker also registers as a producer on a shared
//! audit queue and records one free-text line per event. The coordinator
//! thread is the single consumer and drains the queue until end-of-stream.

use crate::error::QueueError;
use crate::pipeline::queue::{BoundedSignalQueue, ConsumerLease, ProducerLease};
use std::sync::Arc;
use tracing::debug;

/// First line recorded on every audited run
pub const START_MESSAGE: &str = "General, program has started the search";

/// Audit producer handle owned by one worker
#[derive(Default)]
pub struct AuditLog {
    lease: Option<ProducerLease<String>>,
}

impl AuditLog {
    /// An audit log that records nothing
    pub fn disabled() -> Self {
        Self { lease: None }
    }

    /// Register as a producer on `queue`
    pub fn new(queue: &Arc<BoundedSignalQueue<String>>) -> Self {
        Self {
            lease: Some(queue.producer()),
        }
    }

    /// Register on `queue` if auditing is enabled
    pub fn for_queue(queue: Option<&Arc<BoundedSignalQueue<String>>>) -> Self {
        queue.map(Self::new).unwrap_or_default()
    }

    /// Check if lines are being recorded
    pub fn is_enabled(&self) -> bool {
        self.lease.is_some()
    }

    /// Record a line; the closure only runs when auditing is on
    pub fn record(&self, line: impl FnOnce() -> String) {
        if let Some(lease) = &self.lease {
            if let Err(e) = lease.enqueue(line()) {
                debug!(error = %e, "Audit line dropped");
            }
        }
    }
}

/// Enqueue a single line as a short-lived producer
pub fn announce(queue: &Arc<BoundedSignalQueue<String>>, line: &str) -> Result<(), QueueError> {
    let lease = queue.producer();
    lease.enqueue(line.to_string())
}

/// Drain audit lines until end-of-stream, returning how many were seen
pub fn drain(reader: ConsumerLease<String>, mut on_line: impl FnMut(usize, &str)) -> usize {
    let mut count = 0;
    for (index, line) in reader.iter().enumerate() {
        on_line(index, &line);
        count = index + 1;
    }
    count
}

/// Render an audit line with its zero-based sequence index
pub fn format_line(index: usize, line: &str) -> String {
    format!("{} - {}", index, line)
}
