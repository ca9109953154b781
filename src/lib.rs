//! disk-searcher - Parallel prefix search and copy
//!
//! Walks a directory tree, finds files whose names start with a prefix and
//! copies them to a destination directory. Each stage runs on a fixed number
//! of OS threads and stages are joined by bounded blocking queues.
//!
//! # Features
//!
//! - **Producer-counted queues**: a consumer stops when the queue is empty
//!   *and* every producer has unregistered, so no sentinel values travel
//!   through the pipeline.
//!
//! - **Lease-based registration**: producers and consumers hold RAII leases,
//!   so a worker that fails or panics can never leave a queue waiting on it.
//!
//! - **Backpressure**: full queues block their producers; a stage whose
//!   consumers are all gone reports it instead of blocking forever.
//!
//! - **Audit channel**: optional per-event lines from every stage, drained
//!   and printed by the coordinator thread.
//!
//! # Example
//!
//! ```bash
//! # Copy every file starting with "data_" using 4 filters and 2 copiers
//! disk-searcher false data_ /srv/archive /tmp/out 4 2
//!
//! # Same, with audit lines
//! disk-searcher true data_ /srv/archive /tmp/out 4 2
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;

pub use config::{CliArgs, SearchConfig};
pub use error::{Result, SearchError};
pub use pipeline::{BoundedSignalQueue, Dequeued, SearchCoordinator, SearchResult};
