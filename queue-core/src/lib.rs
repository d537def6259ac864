//! Core types shared by the qline queue crates.
//!
//! This crate has no I/O and no locking of its own: it holds the error
//! taxonomy, the recycle-duration grammar, and topic/line name validation
//! that `queue-storage` and `queue-engine` both depend on.

pub mod duration;
pub mod error;
pub mod name;

/// A specialized `Result` type for qline operations.
pub type Result<T> = std::result::Result<T, crate::error::QueueError>;
