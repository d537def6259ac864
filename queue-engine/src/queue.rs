//! Namespace of topics; parses hierarchical names and dispatches.
//!
//! Routing is purely by path-segment count: one segment is a topic, two a
//! line, three a flight id.

use std::{collections::HashMap, time::SystemTime};

use queue_core::{duration::parse_recycle, error::QueueError, name::validate_name};
use queue_storage::{memory::MemoryPayloadStore, PayloadStore};

use crate::topic::Topic;

/// A factory for a topic's `PayloadStore`, selected at `add` time.
///
/// This is how `Queue` stays agnostic of `queue-storage`'s concrete
/// backends: the adapter supplies a factory (memory by default, persistent
/// when configured), and recovery picks the same variant each topic was
/// using before the snapshot was taken.
pub trait PayloadStoreFactory: Send + Sync {
    fn create(&self, topic_name: &str) -> Result<Box<dyn PayloadStore>, QueueError>;
}

/// Default factory: every topic gets a fresh `MemoryPayloadStore`.
pub struct MemoryFactory;

impl PayloadStoreFactory for MemoryFactory {
    fn create(&self, _topic_name: &str) -> Result<Box<dyn PayloadStore>, QueueError> {
        Ok(Box::new(MemoryPayloadStore::new()))
    }
}

/// Namespace of topics, unique by name.
pub struct Queue {
    topics: HashMap<String, Topic>,
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            topics: HashMap::new(),
        }
    }

    pub fn topics(&self) -> &HashMap<String, Topic> {
        &self.topics
    }

    pub fn topics_mut(&mut self) -> &mut HashMap<String, Topic> {
        &mut self.topics
    }

    /// Adopt an already-built topic, e.g. one restored from a snapshot.
    pub fn insert_topic(&mut self, topic: Topic) {
        self.topics.insert(topic.name().to_string(), topic);
    }

    /// Route an `add` by path shape: `/<topic>` creates a topic,
    /// `/<topic>/<line>` creates a line on an existing topic.
    pub fn add(
        &mut self,
        path: &str,
        value: &str,
        factory: &dyn PayloadStoreFactory,
    ) -> Result<(), QueueError> {
        let parts = split_path(path);
        match parts.as_slice() {
            [topic_name] => {
                validate_name(topic_name).map_err(|e| QueueError::InvalidForm(e.to_string()))?;
                if self.topics.contains_key(*topic_name) {
                    return Err(QueueError::NodeExist(topic_name.to_string()));
                }
                let payloads = factory.create(topic_name)?;
                self.topics
                    .insert(topic_name.to_string(), Topic::new(*topic_name, payloads));
                Ok(())
            }
            [topic_name, line_name] => {
                let recycle = parse_recycle(value)?;
                let topic = self
                    .topics
                    .get_mut(*topic_name)
                    .ok_or_else(|| QueueError::KeyNotFound(topic_name.to_string()))?;
                topic.add_line(line_name, recycle)
            }
            _ => Err(QueueError::KeyNotFound(path.to_string())),
        }
    }

    /// Route a `push`. Only `/<topic>` is a valid path.
    pub fn push(&mut self, path: &str, value: &str) -> Result<(), QueueError> {
        let parts = split_path(path);
        match parts.as_slice() {
            [topic_name] => {
                let topic = self
                    .topics
                    .get_mut(*topic_name)
                    .ok_or_else(|| QueueError::KeyNotFound(topic_name.to_string()))?;
                topic.push(value)
            }
            _ => Err(QueueError::KeyNotFound(path.to_string())),
        }
    }

    /// Route a `pop`. Only `/<topic>/<line>` is a valid path.
    pub fn pop(
        &mut self,
        path: &str,
        now: SystemTime,
    ) -> Result<Option<(u64, String)>, QueueError> {
        let parts = split_path(path);
        match parts.as_slice() {
            [topic_name, line_name] => {
                let topic = self
                    .topics
                    .get_mut(*topic_name)
                    .ok_or_else(|| QueueError::KeyNotFound(topic_name.to_string()))?;
                topic.pop(line_name, now)
            }
            _ => Err(QueueError::KeyNotFound(path.to_string())),
        }
    }

    /// Route a `confirm`. Only `/<topic>/<line>/<id>` is a valid path.
    pub fn confirm(&mut self, path: &str) -> Result<(), QueueError> {
        let parts = split_path(path);
        match parts.as_slice() {
            [topic_name, line_name, id] => {
                let id: u64 = id
                    .parse()
                    .map_err(|_| QueueError::KeyNotFound(id.to_string()))?;
                let topic = self
                    .topics
                    .get_mut(*topic_name)
                    .ok_or_else(|| QueueError::KeyNotFound(topic_name.to_string()))?;
                topic.confirm(line_name, id)
            }
            _ => Err(QueueError::KeyNotFound(path.to_string())),
        }
    }

    /// Route a `remove`: drops a topic or a line.
    pub fn remove(&mut self, path: &str) -> Result<(), QueueError> {
        let parts = split_path(path);
        match parts.as_slice() {
            [topic_name] => {
                let mut topic = self
                    .topics
                    .remove(*topic_name)
                    .ok_or_else(|| QueueError::KeyNotFound(topic_name.to_string()))?;
                topic.destroy();
                Ok(())
            }
            [topic_name, line_name] => {
                let topic = self
                    .topics
                    .get_mut(*topic_name)
                    .ok_or_else(|| QueueError::KeyNotFound(topic_name.to_string()))?;
                topic.del_line(line_name)
            }
            _ => Err(QueueError::KeyNotFound(path.to_string())),
        }
    }
}

/// Split a normalized (leading-slash, no empty components) path into its
/// non-empty components.
fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_topic_then_line_then_push_pop() {
        let mut q = Queue::new();
        let factory = MemoryFactory;
        q.add("/t", "", &factory).unwrap();
        q.add("/t/c", "", &factory).unwrap();
        q.push("/t", "a").unwrap();
        let now = SystemTime::now();
        assert_eq!(q.pop("/t/c", now).unwrap(), Some((0, "a".to_string())));
    }

    #[test]
    fn add_duplicate_topic_fails() {
        let mut q = Queue::new();
        let factory = MemoryFactory;
        q.add("/t", "", &factory).unwrap();
        assert!(matches!(
            q.add("/t", "", &factory),
            Err(QueueError::NodeExist(_))
        ));
    }

    #[test]
    fn add_line_with_invalid_duration_fails() {
        let mut q = Queue::new();
        let factory = MemoryFactory;
        q.add("/t", "", &factory).unwrap();
        assert!(matches!(
            q.add("/t/c", "banana", &factory),
            Err(QueueError::InvalidForm(_))
        ));
    }

    #[test]
    fn malformed_path_is_key_not_found() {
        let mut q = Queue::new();
        assert!(matches!(
            q.push("/a/b/c/d", "x"),
            Err(QueueError::KeyNotFound(_))
        ));
    }

    #[test]
    fn confirm_parses_id_from_path() {
        let mut q = Queue::new();
        let factory = MemoryFactory;
        q.add("/t", "", &factory).unwrap();
        q.add("/t/c", "10s", &factory).unwrap();
        q.push("/t", "a").unwrap();
        let now = SystemTime::now();
        q.pop("/t/c", now).unwrap();
        q.confirm("/t/c/0").unwrap();
    }

    #[test]
    fn remove_topic_drops_it() {
        let mut q = Queue::new();
        let factory = MemoryFactory;
        q.add("/t", "", &factory).unwrap();
        q.remove("/t").unwrap();
        assert!(matches!(q.push("/t", "a"), Err(QueueError::KeyNotFound(_))));
    }

    #[test]
    fn remove_line_drops_it() {
        let mut q = Queue::new();
        let factory = MemoryFactory;
        q.add("/t", "", &factory).unwrap();
        q.add("/t/c", "", &factory).unwrap();
        q.remove("/t/c").unwrap();
        assert!(matches!(
            q.pop("/t/c", SystemTime::now()),
            Err(QueueError::KeyNotFound(_))
        ));
    }
}
