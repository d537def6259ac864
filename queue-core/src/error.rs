//! Error kinds surfaced by the queue to its host.

use thiserror::Error;

/// Errors produced by the queue subsystem.
///
/// Variant names match the stable string labels a host is expected to
/// match on, not Rust type names: `KeyNotFound`, `NodeExist`, `InvalidForm`,
/// `ReadOnly`, `NotExisted`.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Unknown topic/line/id, or a malformed routing path.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Attempted to create a topic or line that already exists.
    #[error("node already exists: {0}")]
    NodeExist(String),

    /// A recycle duration string failed to parse.
    #[error("invalid form: {0}")]
    InvalidForm(String),

    /// Confirm was called on a line with `recycle == 0`.
    #[error("line {0} is read-only (recycle == 0)")]
    ReadOnly(String),

    /// PayloadStore lookup miss.
    #[error("data not existed: {0}")]
    NotExisted(String),

    /// Backend I/O failure from the PayloadStore.
    #[error("storage error: {0}")]
    Storage(String),
}

impl QueueError {
    /// The stable label the host's event log expects for this error.
    pub fn label(&self) -> &'static str {
        match self {
            QueueError::KeyNotFound(_) => "KeyNotFound",
            QueueError::NodeExist(_) => "NodeExist",
            QueueError::InvalidForm(_) => "InvalidForm",
            QueueError::ReadOnly(_) => "ReadOnly",
            QueueError::NotExisted(_) => "NotExisted",
            QueueError::Storage(_) => "Storage",
        }
    }
}
