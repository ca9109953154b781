//! Error types for disk-searcher
//!
//! This module defines the error hierarchy for:
//! - Queue protocol errors (producer/consumer accounting)
//! - Stage errors (listing, reading and copying files)
//! - Configuration and CLI errors
//! - Worker thread errors (joined and logged by the coordinator)
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors stay inside the stage that hit them; queues only ever carry work
//! - Preserve error chains for debugging

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::stage::StageKind;

/// Top-level error type for the disk-searcher application
#[derive(Error, Debug)]
pub enum SearchError {
    /// Queue protocol errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the bounded signal queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// More producers unregistered than ever registered
    #[error("Producer count on queue '{queue}' would drop below zero")]
    ProducerUnderflow { queue: &'static str },

    /// More consumers unregistered than ever registered
    #[error("Consumer count on queue '{queue}' would drop below zero")]
    ConsumerUnderflow { queue: &'static str },

    /// Every consumer has left; enqueued items would never be read
    #[error("Queue '{queue}' has no consumers left")]
    Abandoned { queue: &'static str },
}

/// Errors raised while a stage processes one unit of work
#[derive(Error, Debug)]
pub enum StageError {
    /// Directory listing failed
    #[error("Failed to list directory '{path}': {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Opening a source file failed
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Creating a destination file failed
    #[error("Failed to create '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or writing during a copy failed
    #[error("Failed to copy '{path}': {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving the finished copy onto the target failed
    #[error("Failed to move copy into place at '{path}': {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Source path has no final component to name the copy after
    #[error("Source '{path}' has no file name")]
    NoFileName { path: PathBuf },

    /// Destination resolves to the source file itself
    #[error("Refusing to copy '{path}' onto itself")]
    SameFile { path: PathBuf },

    /// Queue protocol error while producing
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl StageError {
    /// Check if this error only affects the current item (skip and continue)
    pub fn is_recoverable(&self) -> bool {
        match self {
            StageError::ListDir { source, .. } | StageError::Open { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            StageError::SameFile { .. } => true,
            _ => false,
        }
    }

    /// The path the error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            StageError::ListDir { path, .. }
            | StageError::Open { path, .. }
            | StageError::Create { path, .. }
            | StageError::Copy { path, .. }
            | StageError::Rename { path, .. }
            | StageError::NoFileName { path }
            | StageError::SameFile { path } => Some(path.as_path()),
            StageError::Queue(_) => None,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid {stage} worker count {count}: must be at most {max}")]
    InvalidWorkerCount {
        stage: StageKind,
        count: usize,
        max: usize,
    },

    /// Invalid queue capacity
    #[error("Invalid {queue} queue capacity {capacity}: must be at least {min}")]
    InvalidQueueCapacity {
        queue: &'static str,
        capacity: usize,
        min: usize,
    },

    /// Invalid copy buffer size
    #[error("Invalid buffer size {size}: must be between {min} and {max}")]
    InvalidBufferSize { size: usize, min: usize, max: usize },

    /// Root directory unusable
    #[error("Invalid root directory '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Destination directory unusable
    #[error("Invalid destination '{path}': {reason}")]
    InvalidDestination { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} ({stage}) panicked: {message}")]
    Panicked {
        id: usize,
        stage: StageKind,
        message: String,
    },

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {id} ({stage}): {reason}")]
    SpawnFailed {
        id: usize,
        stage: StageKind,
        reason: String,
    },

    /// Worker stopped on an unrecoverable stage error
    #[error("Worker {id} ({stage}) failed: {source}")]
    Failed {
        id: usize,
        stage: StageKind,
        #[source]
        source: StageError,
    },
}

impl WorkerError {
    /// Returns the id of the worker this error belongs to
    pub fn worker_id(&self) -> usize {
        match self {
            WorkerError::Panicked { id, .. }
            | WorkerError::SpawnFailed { id, .. }
            | WorkerError::Failed { id, .. } => *id,
        }
    }
}

/// Result type alias for SearchError
pub type Result<T> = std::result::Result<T, SearchError>;

/// Result type alias for StageError
pub type StageResult<T> = std::result::Result<T, StageError>;
