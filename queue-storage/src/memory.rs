//! In-memory payload backend.
//!
//! Thread-safe via `RwLock`: writers exclusive, readers shared. All data is
//! lost when the store is closed or the process exits.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use queue_core::error::QueueError;
use tracing::debug;

use crate::{PayloadStore, PayloadStoreKind, Result};

/// In-memory `PayloadStore` implementation.
#[derive(Debug, Default)]
pub struct MemoryPayloadStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryPayloadStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt an existing map, e.g. one restored from a snapshot.
    pub fn from_map(data: HashMap<String, String>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Snapshot the current contents for serialization.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().expect("payload store lock poisoned").clone()
    }
}

impl PayloadStore for MemoryPayloadStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.write().expect("payload store lock poisoned");
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        let data = self.data.read().expect("payload store lock poisoned");
        data.get(key)
            .cloned()
            .ok_or_else(|| QueueError::NotExisted(key.to_string()))
    }

    fn del(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().expect("payload store lock poisoned");
        if data.remove(key).is_none() {
            return Err(QueueError::NotExisted(key.to_string()));
        }
        debug!(key, "payload deleted");
        Ok(())
    }

    fn kind(&self) -> PayloadStoreKind {
        PayloadStoreKind::Memory
    }

    fn close(&self) {
        self.data.write().expect("payload store lock poisoned").clear();
    }

    fn snapshot_memory(&self) -> Option<HashMap<String, String>> {
        Some(self.snapshot())
    }
}
