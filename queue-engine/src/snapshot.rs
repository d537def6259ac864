//! Save and recovery of queue state to a single JSON document.
//!
//! A topic's name, head, tail, payload-store variant and (for the memory
//! variant) its payload map are captured, together with every line's
//! name/recycle/head/flight_head/flights. On recovery, a malformed *line*
//! entry is skipped with a warning rather than failing the whole document —
//! the surrounding topic still comes back, minus that one cursor — while a
//! malformed *document* or *topic* entry fails recovery outright, since
//! there is no smaller unit to fall back to.

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use queue_core::error::QueueError;
use queue_storage::{memory::MemoryPayloadStore, persistent::PersistentPayloadStore, PayloadStore, PayloadStoreKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{line::Line, queue::Queue, topic::Topic};

/// One flight entry: a popped id and its redelivery deadline, in
/// milliseconds since the Unix epoch.
type FlightDoc = (u64, u128);

#[derive(Debug, Serialize, Deserialize)]
struct LineDoc {
    name: String,
    recycle_ms: u64,
    head: u64,
    flight_head: u64,
    flights: Vec<FlightDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TopicDoc {
    name: String,
    head: u64,
    tail: u64,
    kind: PayloadStoreKind,
    path: Option<PathBuf>,
    payloads: Option<HashMap<String, String>>,
    /// Each line kept as its own JSON value so a single corrupt entry can be
    /// skipped without losing the rest.
    lines: Vec<serde_json::Value>,
}

/// The full document written by `save` and read by `recover`.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    current_index: u64,
    topics: Vec<TopicDoc>,
}

fn system_time_to_millis(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_millis()
}

fn millis_to_system_time(ms: u128) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.min(u64::MAX as u128) as u64)
}

/// Capture `queue`'s current state. Called by the adapter under its
/// world-lock, so topics and lines cannot change mid-capture.
pub fn build(queue: &Queue, current_index: u64) -> QueueSnapshot {
    let topics = queue
        .topics()
        .values()
        .map(|topic| TopicDoc {
            name: topic.name().to_string(),
            head: topic.head(),
            tail: topic.tail(),
            kind: topic.payload_kind(),
            path: topic.payload_path(),
            payloads: topic.payload_snapshot(),
            lines: topic
                .lines()
                .values()
                .map(|line| {
                    let doc = LineDoc {
                        name: line.name().to_string(),
                        recycle_ms: line.recycle().as_millis() as u64,
                        head: line.head(),
                        flight_head: line.flight_head(),
                        flights: line
                            .flights()
                            .iter()
                            .map(|&(id, expires_at)| (id, system_time_to_millis(expires_at)))
                            .collect(),
                    };
                    serde_json::to_value(doc).expect("LineDoc always serializes")
                })
                .collect(),
        })
        .collect();

    QueueSnapshot { current_index, topics }
}

/// Serialize `queue` to `path` as a single JSON document, overwriting any
/// existing file.
pub fn save(queue: &Queue, current_index: u64, path: impl AsRef<std::path::Path>) -> Result<(), QueueError> {
    let doc = build(queue, current_index);
    let json = serde_json::to_vec_pretty(&doc).map_err(|e| QueueError::Storage(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| QueueError::Storage(e.to_string()))
}

/// Read and rebuild a `Queue` plus its `current_index` from `path`.
///
/// A malformed document (the JSON itself doesn't parse, or a topic entry is
/// missing a required field) fails recovery. A malformed individual line is
/// skipped; its topic still recovers, minus that line.
pub fn recover(path: impl AsRef<std::path::Path>) -> Result<(Queue, u64), QueueError> {
    let bytes = std::fs::read(path).map_err(|e| QueueError::Storage(e.to_string()))?;
    let doc: QueueSnapshot =
        serde_json::from_slice(&bytes).map_err(|e| QueueError::Storage(format!("corrupt snapshot: {e}")))?;
    restore(doc)
}

/// Rebuild a `Queue` plus its `current_index` from an already-parsed
/// document.
pub fn restore(doc: QueueSnapshot) -> Result<(Queue, u64), QueueError> {
    let mut queue = Queue::new();

    for topic_doc in doc.topics {
        let payloads: Box<dyn PayloadStore> = match topic_doc.kind {
            PayloadStoreKind::Memory => {
                Box::new(MemoryPayloadStore::from_map(topic_doc.payloads.unwrap_or_default()))
            }
            PayloadStoreKind::Persistent => {
                let path = topic_doc.path.ok_or_else(|| {
                    QueueError::Storage(format!("topic {} is persistent but has no path", topic_doc.name))
                })?;
                Box::new(PersistentPayloadStore::open(path)?)
            }
        };

        let mut lines = HashMap::new();
        for raw_line in topic_doc.lines {
            match serde_json::from_value::<LineDoc>(raw_line) {
                Ok(line_doc) => {
                    let flights: VecDeque<(u64, SystemTime)> = line_doc
                        .flights
                        .into_iter()
                        .map(|(id, ms)| (id, millis_to_system_time(ms)))
                        .collect();
                    let line = Line::from_parts(
                        line_doc.name.clone(),
                        Duration::from_millis(line_doc.recycle_ms),
                        line_doc.head,
                        line_doc.flight_head,
                        flights,
                    );
                    lines.insert(line_doc.name, line);
                }
                Err(e) => {
                    warn!(topic = %topic_doc.name, error = %e, "skipping corrupt line entry during recovery");
                }
            }
        }

        let topic = Topic::from_parts(topic_doc.name, topic_doc.head, topic_doc.tail, payloads, lines);
        queue.insert_topic(topic);
    }

    Ok((queue, doc.current_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryFactory;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("qline-snapshot-test-{}-{}.json", std::process::id(), n))
    }

    #[test]
    fn round_trips_memory_topic_with_a_line() {
        let mut queue = Queue::new();
        let factory = MemoryFactory;
        queue.add("/t", "", &factory).unwrap();
        queue.add("/t/c", "10s", &factory).unwrap();
        queue.push("/t", "a").unwrap();
        let now = SystemTime::now();
        queue.pop("/t/c", now).unwrap();

        let doc = build(&queue, 7);
        let json = serde_json::to_vec(&doc).unwrap();
        let doc2: QueueSnapshot = serde_json::from_slice(&json).unwrap();
        let (mut restored, index) = restore(doc2).unwrap();
        assert_eq!(index, 7);

        // The in-flight id was restored into the line's flight list, so a
        // second pop must not redeliver it immediately.
        assert_eq!(restored.pop("/t/c", now).unwrap(), None);
    }

    #[test]
    fn corrupt_line_entry_is_skipped_not_fatal() {
        let mut queue = Queue::new();
        let factory = MemoryFactory;
        queue.add("/t", "", &factory).unwrap();
        queue.add("/t/c", "", &factory).unwrap();

        let mut doc = build(&queue, 0);
        doc.topics[0].lines.push(serde_json::json!({"not": "a line"}));

        let (restored, _) = restore(doc).unwrap();
        let topic = restored.topics().get("/t").unwrap();
        assert_eq!(topic.lines().len(), 1);
        assert!(topic.lines().contains_key("c"));
    }

    #[test]
    fn save_then_recover_round_trips_through_disk() {
        let mut queue = Queue::new();
        let factory = MemoryFactory;
        queue.add("/t", "", &factory).unwrap();
        queue.push("/t", "hello").unwrap();

        let path = temp_path();
        save(&queue, 3, &path).unwrap();
        let (restored, index) = recover(&path).unwrap();
        assert_eq!(index, 3);
        assert_eq!(restored.topics().get("/t").unwrap().tail(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn corrupt_document_fails_recovery() {
        let path = temp_path();
        std::fs::write(&path, b"not json").unwrap();
        assert!(recover(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
