//! The qline queue engine: per-topic sequencing, per-line redelivery
//! cursors, a store-facing adapter with world-lock + stats, and
//! snapshot/recovery.

pub mod adapter;
pub mod line;
pub mod path;
pub mod queue;
pub mod snapshot;
pub mod stats;
pub mod topic;

pub use queue_core::error::QueueError;

/// A specialized `Result` type for qline engine operations.
pub type Result<T> = std::result::Result<T, QueueError>;
