//! Storage abstraction layer for the qline embedded message queue.
//!
//! This crate provides the `PayloadStore` trait and two backends: an
//! in-memory map and a persistent, snappy-compressed, log-structured file.
//! A `Topic` (in `queue-engine`) owns exactly one `PayloadStore`.

pub mod memory;
pub mod persistent;

use std::{collections::HashMap, path::PathBuf};

use queue_core::error::QueueError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Which backend a `PayloadStore` is. Recorded in snapshots so recovery
/// knows how to re-open each topic's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PayloadStoreKind {
    /// Backed by an in-process `HashMap`; does not survive a restart.
    Memory,
    /// Backed by an on-disk log; survives a restart if its path does.
    Persistent,
}

/// Contract required of a topic's payload backend.
///
/// `Get` of a missing key fails with `QueueError::NotExisted`; `Set`
/// overwrites; iteration is not part of the contract.
pub trait PayloadStore: Send + Sync {
    /// Store `value` under `key`, overwriting any existing value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> Result<String>;

    /// Delete `key`. Fails with `QueueError::NotExisted` if absent.
    fn del(&self, key: &str) -> Result<()>;

    /// Which backend variant this is.
    fn kind(&self) -> PayloadStoreKind;

    /// Release any resources (file handles, locks) held by this store.
    fn close(&self);

    /// The full key/value contents, for a snapshot of a memory-backed
    /// store. `None` for any backend that doesn't hold its data in process
    /// memory — a persistent store's log is its own durable copy and has
    /// no need to be embedded in a snapshot.
    fn snapshot_memory(&self) -> Option<HashMap<String, String>> {
        None
    }

    /// The backing file path, for a persistent store. `None` for any
    /// backend with no on-disk location to re-open on recovery.
    fn persistent_path(&self) -> Option<PathBuf> {
        None
    }
}
