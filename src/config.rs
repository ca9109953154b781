//! Configuration types for disk-searcher
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::pipeline::stage::StageKind;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Maximum reasonable worker count per stage
pub const MAX_WORKERS: usize = 512;

/// Default capacity for every queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Minimum queue capacity
const MIN_QUEUE_CAPACITY: usize = 1;

/// Default copy buffer size
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 4096;

/// Copy buffer size limits
const MIN_BUFFER_SIZE: usize = 1;
const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Parallel prefix search and copy
#[derive(Parser, Debug, Clone)]
#[command(
    name = "disk-searcher",
    version,
    about = "Find files by name prefix under a directory tree and copy them to a destination",
    long_about = "Walks ROOT with one walker thread, lists every directory it finds with FILTERS \
                  filter threads, and copies each file whose name starts with PREFIX into \
                  DESTINATION with SINKS copier threads.\n\n\
                  Stages are connected by bounded queues. With AUDIT set to true, every stage \
                  also reports what it did and the lines are printed as they arrive.",
    after_help = "EXAMPLES:\n    \
        disk-searcher false data_ /srv/archive /tmp/out 4 2\n    \
        disk-searcher true report- ~/docs ./collected 1 1\n    \
        disk-searcher false log_ /var/data ./logs 8 8 --results-capacity 500 --include-root"
)]
pub struct CliArgs {
    /// Print an audit line for every directory scouted, file found and file copied
    #[arg(value_name = "AUDIT", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub audit: bool,

    /// File name prefix to match
    #[arg(value_name = "PREFIX")]
    pub prefix: String,

    /// Root of the directory tree to search
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Directory that receives the copies
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    /// Number of filter threads
    #[arg(value_name = "FILTERS")]
    pub filters: usize,

    /// Number of copier threads
    #[arg(value_name = "SINKS")]
    pub sinks: usize,

    /// Capacity of the directory queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_name = "NUM")]
    pub directory_capacity: usize,

    /// Capacity of the results queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_name = "NUM")]
    pub results_capacity: usize,

    /// Capacity of the audit queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_name = "NUM")]
    pub audit_capacity: usize,

    /// Copy buffer size in bytes
    #[arg(long, default_value_t = DEFAULT_COPY_BUFFER_SIZE, value_name = "BYTES")]
    pub buffer_size: usize,

    /// Also search files directly under ROOT
    #[arg(long)]
    pub include_root: bool,

    /// Verbose output (per-worker detail)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Quiet mode - only print audit lines and the elapsed time
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Record and print audit lines
    pub audit: bool,

    /// File name prefix to match
    pub prefix: String,

    /// Root directory
    pub root: PathBuf,

    /// Destination directory
    pub destination: PathBuf,

    /// Number of filter workers
    pub filter_count: usize,

    /// Number of sink workers
    pub sink_count: usize,

    /// Directory queue capacity
    pub directory_capacity: usize,

    /// Results queue capacity
    pub results_capacity: usize,

    /// Audit queue capacity
    pub audit_capacity: usize,

    /// Copy buffer size
    pub buffer_size: usize,

    /// Enqueue the root directory itself
    pub include_root: bool,

    /// Verbose logging
    pub verbose: bool,

    /// Suppress header and summary
    pub quiet: bool,
}

impl SearchConfig {
    /// Configuration with one filter, one sink and default capacities
    pub fn new(prefix: impl Into<String>, root: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            audit: false,
            prefix: prefix.into(),
            root: root.into(),
            destination: destination.into(),
            filter_count: 1,
            sink_count: 1,
            directory_capacity: DEFAULT_QUEUE_CAPACITY,
            results_capacity: DEFAULT_QUEUE_CAPACITY,
            audit_capacity: DEFAULT_QUEUE_CAPACITY,
            buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            include_root: false,
            verbose: false,
            quiet: false,
        }
    }

    /// Set the filter and sink worker counts
    pub fn with_workers(mut self, filters: usize, sinks: usize) -> Self {
        self.filter_count = filters;
        self.sink_count = sinks;
        self
    }

    /// Enable or disable auditing
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Set the copy buffer size
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the directory, results and audit queue capacities
    pub fn with_capacities(mut self, directories: usize, results: usize, audit: usize) -> Self {
        self.directory_capacity = directories;
        self.results_capacity = results;
        self.audit_capacity = audit;
        self
    }

    /// Also search files directly under the root
    pub fn with_include_root(mut self, include_root: bool) -> Self {
        self.include_root = include_root;
        self
    }

    /// Create configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let config = Self {
            audit: args.audit,
            prefix: args.prefix,
            root: args.root,
            destination: args.destination,
            filter_count: args.filters,
            sink_count: args.sinks,
            directory_capacity: args.directory_capacity,
            results_capacity: args.results_capacity,
            audit_capacity: args.audit_capacity,
            buffer_size: args.buffer_size,
            include_root: args.include_root,
            verbose: args.verbose,
            quiet: args.quiet,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check limits and the root/destination paths
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (stage, count) in [
            (StageKind::Filter, self.filter_count),
            (StageKind::Sink, self.sink_count),
        ] {
            if count > MAX_WORKERS {
                return Err(ConfigError::InvalidWorkerCount {
                    stage,
                    count,
                    max: MAX_WORKERS,
                });
            }
        }

        for (queue, capacity) in [
            ("directory", self.directory_capacity),
            ("results", self.results_capacity),
            ("audit", self.audit_capacity),
        ] {
            if capacity < MIN_QUEUE_CAPACITY {
                return Err(ConfigError::InvalidQueueCapacity {
                    queue,
                    capacity,
                    min: MIN_QUEUE_CAPACITY,
                });
            }
        }

        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(ConfigError::InvalidBufferSize {
                size: self.buffer_size,
                min: MIN_BUFFER_SIZE,
                max: MAX_BUFFER_SIZE,
            });
        }

        if !self.root.is_dir() {
            let reason = if self.root.exists() {
                "not a directory"
            } else {
                "does not exist"
            };
            return Err(ConfigError::InvalidRoot {
                path: self.root.clone(),
                reason: reason.into(),
            });
        }

        if self.destination.exists() && !self.destination.is_dir() {
            return Err(ConfigError::InvalidDestination {
                path: self.destination.clone(),
                reason: "exists and is not a directory".into(),
            });
        }

        Ok(())
    }
}
