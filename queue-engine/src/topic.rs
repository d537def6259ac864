//! A named, append-only log of opaque payloads, fanned out to lines.
//!
//! `head`/`tail` track the surviving window of ids; each line gets its own
//! cursor into that window. `clean` trims payloads below the slowest
//! line's watermark once every line has moved past them.

use std::{collections::HashMap, time::SystemTime};

use queue_core::error::QueueError;
use queue_storage::{PayloadStore, PayloadStoreKind};
use tracing::{info, warn};

use crate::line::Line;

/// A topic: a monotonic tail counter, a payload backend, and its lines.
pub struct Topic {
    name: String,
    tail: u64,
    head: u64,
    payloads: Box<dyn PayloadStore>,
    lines: HashMap<String, Line>,
}

impl Topic {
    /// Create a new, empty topic backed by `payloads`.
    pub fn new(name: impl Into<String>, payloads: Box<dyn PayloadStore>) -> Self {
        let name = name.into();
        info!(topic = %name, "topic created");
        Topic {
            name,
            tail: 0,
            head: 0,
            payloads,
            lines: HashMap::new(),
        }
    }

    /// Reconstruct a topic from snapshot fields.
    pub fn from_parts(
        name: String,
        head: u64,
        tail: u64,
        payloads: Box<dyn PayloadStore>,
        lines: HashMap<String, Line>,
    ) -> Self {
        Topic {
            name,
            tail,
            head,
            payloads,
            lines,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn tail(&self) -> u64 {
        self.tail
    }

    pub fn payload_kind(&self) -> PayloadStoreKind {
        self.payloads.kind()
    }

    /// The payload map, for a memory-backed topic's snapshot.
    pub fn payload_snapshot(&self) -> Option<HashMap<String, String>> {
        self.payloads.snapshot_memory()
    }

    /// The backing file path, for a persistent-backed topic's snapshot.
    pub fn payload_path(&self) -> Option<std::path::PathBuf> {
        self.payloads.persistent_path()
    }

    pub fn lines(&self) -> &HashMap<String, Line> {
        &self.lines
    }

    fn payload_key(&self, id: u64) -> String {
        format!("{}/{}", self.name, id)
    }

    /// Append `value` to the topic's log. Failure leaves `tail` unchanged.
    pub fn push(&mut self, value: &str) -> Result<(), QueueError> {
        let key = self.payload_key(self.tail);
        self.payloads.set(&key, value)?;
        self.tail += 1;
        Ok(())
    }

    /// Pop the next id/payload for `line_name`.
    pub fn pop(
        &mut self,
        line_name: &str,
        now: SystemTime,
    ) -> Result<Option<(u64, String)>, QueueError> {
        let tail = self.tail;
        let payloads = &self.payloads;
        let key_prefix = self.name.clone();

        let line = self
            .lines
            .get_mut(line_name)
            .ok_or_else(|| QueueError::KeyNotFound(line_name.to_string()))?;

        let id = match line.pop(tail, now)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let key = format!("{}/{}", key_prefix, id);
        let value = payloads.get(&key).map_err(|_| {
            warn!(topic = %key_prefix, id, "payload missing for an id inside [head, tail) — invariant violation");
            QueueError::KeyNotFound(key.clone())
        })?;

        Ok(Some((id, value)))
    }

    /// Confirm `id` on `line_name`.
    pub fn confirm(&mut self, line_name: &str, id: u64) -> Result<(), QueueError> {
        let line = self
            .lines
            .get_mut(line_name)
            .ok_or_else(|| QueueError::KeyNotFound(line_name.to_string()))?;
        line.confirm(id)
    }

    /// Create a new line. Rejects a name collision with `NodeExist`.
    pub fn add_line(&mut self, name: &str, recycle: std::time::Duration) -> Result<(), QueueError> {
        if self.lines.contains_key(name) {
            return Err(QueueError::NodeExist(name.to_string()));
        }
        self.lines.insert(name.to_string(), Line::new(name, recycle, self.head));
        Ok(())
    }

    /// Destroy and detach a line. Fails with `KeyNotFound` if absent.
    pub fn del_line(&mut self, name: &str) -> Result<(), QueueError> {
        self.lines
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| QueueError::KeyNotFound(name.to_string()))
    }

    /// Delete payloads below every line's `flight_head`. If the topic has no
    /// lines, no cleanup progresses. Stops at the first delete error,
    /// leaving surviving ids in storage.
    pub fn clean(&mut self) -> Result<(), QueueError> {
        let watermark = self
            .lines
            .values()
            .map(|l| l.flight_head())
            .min()
            .unwrap_or(self.head);

        while self.head < watermark {
            let key = self.payload_key(self.head);
            self.payloads.del(&key)?;
            self.head += 1;
        }
        Ok(())
    }

    /// Destroy every line and close the payload store.
    pub fn destroy(&mut self) {
        self.lines.clear();
        self.payloads.close();
        info!(topic = %self.name, "topic destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_storage::memory::MemoryPayloadStore;
    use std::time::Duration;

    fn topic(name: &str) -> Topic {
        Topic::new(name, Box::new(MemoryPayloadStore::new()))
    }

    #[test]
    fn push_increments_tail() {
        let mut t = topic("t");
        t.push("a").unwrap();
        t.push("b").unwrap();
        assert_eq!(t.tail(), 2);
    }

    #[test]
    fn add_line_rejects_duplicate() {
        let mut t = topic("t");
        t.add_line("c", Duration::ZERO).unwrap();
        assert!(matches!(
            t.add_line("c", Duration::ZERO),
            Err(QueueError::NodeExist(_))
        ));
    }

    #[test]
    fn pop_on_unknown_line_fails() {
        let mut t = topic("t");
        assert!(matches!(
            t.pop("missing", SystemTime::now()),
            Err(QueueError::KeyNotFound(_))
        ));
    }

    #[test]
    fn pop_without_recycle_never_redelivers() {
        let mut t = topic("t");
        t.add_line("c", Duration::ZERO).unwrap();
        t.push("a").unwrap();
        t.push("b").unwrap();
        let now = SystemTime::now();
        assert_eq!(t.pop("c", now).unwrap(), Some((0, "a".to_string())));
        assert_eq!(t.pop("c", now).unwrap(), Some((1, "b".to_string())));
        assert_eq!(t.pop("c", now).unwrap(), None);
    }

    #[test]
    fn clean_advances_head_and_deletes_confirmed_payload() {
        let mut t = topic("t");
        t.add_line("c", Duration::from_millis(50)).unwrap();
        t.push("a").unwrap();
        t.push("b").unwrap();
        let now = SystemTime::now();
        t.pop("c", now).unwrap();
        t.pop("c", now).unwrap();
        t.confirm("c", 0).unwrap();
        t.clean().unwrap();

        assert_eq!(t.head(), 1);
        // "a" (id 0) should be gone, "b" (id 1) should remain.
        let key_a = t.payload_key(0);
        let key_b = t.payload_key(1);
        assert!(t.payloads.get(&key_a).is_err());
        assert_eq!(t.payloads.get(&key_b).unwrap(), "b");
    }

    #[test]
    fn clean_without_lines_makes_no_progress() {
        let mut t = topic("t");
        t.push("a").unwrap();
        t.clean().unwrap();
        assert_eq!(t.head(), 0);
    }

    #[test]
    fn two_lines_independent_flight_heads_block_clean() {
        let mut t = topic("t");
        t.add_line("c1", Duration::ZERO).unwrap();
        t.add_line("c2", Duration::ZERO).unwrap();
        t.push("a").unwrap();
        let now = SystemTime::now();
        assert_eq!(t.pop("c1", now).unwrap(), Some((0, "a".to_string())));
        assert_eq!(t.pop("c2", now).unwrap(), Some((0, "a".to_string())));
        // c2 never confirms (recycle == 0 means flight_head never advances
        // past an id it hasn't been told to forget), so clean can't progress.
        t.clean().unwrap();
        assert_eq!(t.head(), 0);
    }
}
