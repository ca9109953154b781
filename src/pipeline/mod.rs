//! Three-stage search pipeline
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────┐  directories  ┌───────────┐   results   ┌─────────┐
//!   │  Walker  │──────────────▶│ Filter ×N │────────────▶│ Sink ×M │──▶ destination
//!   │ (1 thr)  │  (bounded)    │           │  (bounded)  │         │
//!   └────┬─────┘               └─────┬─────┘             └────┬────┘
//!        │                           │                        │
//!        └───────────────────────────┼────────────────────────┘
//!                                    ▼
//!                            ┌──────────────┐
//!                            │ audit queue  │──▶ coordinator thread (stdout)
//!                            │  (optional)  │
//!                            └──────────────┘
//! ```
//!
//! Every edge is a [`BoundedSignalQueue`]. A stage ends when its input
//! reports end-of-stream, which happens once every upstream worker has
//! released its producer lease and the buffer is drained.

pub mod audit;
pub mod coordinator;
pub mod filter;
pub mod queue;
pub mod sink;
pub mod stage;
pub mod walker;

pub use coordinator::{SearchCoordinator, SearchResult};
pub use queue::{BoundedSignalQueue, ConsumerLease, Dequeued, ProducerLease, QueueStats};
pub use stage::{DirTask, FileMatch, Stage, StageContext, StageKind, Worker, WorkerStats};
