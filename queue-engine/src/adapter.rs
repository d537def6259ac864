//! Store-facing adapter: the five operations the surrounding key-value
//! store sees, each under the store's world-lock, allocating an event index
//! and bumping stats.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
    time::SystemTime,
};

use queue_core::error::QueueError;

use crate::{
    path::normalize,
    queue::{MemoryFactory, PayloadStoreFactory, Queue},
    snapshot::{self, QueueSnapshot},
    stats::{Stats, StatsSnapshot},
};

/// The kind of change an `Event` represents, mirroring the host store's own
/// event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Set,
    Get,
    Delete,
}

/// An event emitted for the host's replication/watch stream.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub key: String,
    pub index: u64,
}

/// Which side of the world-lock `Pop`/`Confirm`/`Remove` take.
///
/// The original source takes the *read* side of the world-lock for these
/// three operations while mutating line/topic state — a bug. `WriteAlways`
/// is the corrected, default discipline. `ReadOnPopConfirm` reproduces the
/// original's lock *choice* for parity testing; queue mutation itself
/// always goes through an inner mutex so the reproduction stays
/// memory-safe, unlike the original's unguarded race — see
/// `read_on_pop_confirm_discipline_still_yields_correct_results` for what
/// this discipline does and does not demonstrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockDiscipline {
    #[default]
    WriteAlways,
    ReadOnPopConfirm,
}

struct Shared {
    world_lock: RwLock<()>,
    queue: Mutex<Queue>,
    current_index: AtomicU64,
    stats: Stats,
    discipline: LockDiscipline,
    factory: Box<dyn PayloadStoreFactory>,
}

/// The store-facing adapter. Cheap to clone — internally `Arc`-backed, so
/// every clone shares the same queue, lock, and counters.
#[derive(Clone)]
pub struct StoreAdapter {
    shared: Arc<Shared>,
}

impl Default for StoreAdapter {
    fn default() -> Self {
        Self::new(Box::new(MemoryFactory), LockDiscipline::WriteAlways)
    }
}

impl StoreAdapter {
    pub fn new(factory: Box<dyn PayloadStoreFactory>, discipline: LockDiscipline) -> Self {
        StoreAdapter {
            shared: Arc::new(Shared {
                world_lock: RwLock::new(()),
                queue: Mutex::new(Queue::new()),
                current_index: AtomicU64::new(0),
                stats: Stats::new(),
                discipline,
                factory,
            }),
        }
    }

    /// Rebuild an adapter around an already-recovered `Queue`.
    pub fn from_recovered(
        queue: Queue,
        current_index: u64,
        factory: Box<dyn PayloadStoreFactory>,
        discipline: LockDiscipline,
    ) -> Self {
        StoreAdapter {
            shared: Arc::new(Shared {
                world_lock: RwLock::new(()),
                queue: Mutex::new(queue),
                current_index: AtomicU64::new(current_index),
                stats: Stats::new(),
                discipline,
                factory,
            }),
        }
    }

    pub fn current_index(&self) -> u64 {
        self.shared.current_index.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Capture the full queue state under the world-lock.
    pub fn snapshot(&self) -> QueueSnapshot {
        let _guard = self.shared.world_lock.write().expect("world lock poisoned");
        let queue = self.shared.queue.lock().expect("queue lock poisoned");
        snapshot::build(&queue, self.current_index())
    }

    /// Save the current queue state to `path` as a single JSON document.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), QueueError> {
        let _guard = self.shared.world_lock.write().expect("world lock poisoned");
        let queue = self.shared.queue.lock().expect("queue lock poisoned");
        snapshot::save(&queue, self.current_index(), path)
    }

    /// Rebuild an adapter from a previously saved snapshot file.
    pub fn recover(
        path: impl AsRef<std::path::Path>,
        factory: Box<dyn PayloadStoreFactory>,
        discipline: LockDiscipline,
    ) -> Result<Self, QueueError> {
        let (queue, current_index) = snapshot::recover(path)?;
        Ok(Self::from_recovered(queue, current_index, factory, discipline))
    }

    fn next_index(&self) -> u64 {
        self.shared.current_index.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// `Add(name, value)`: create a topic or line.
    pub fn add(&self, name: &str, value: &str) -> Result<Event, QueueError> {
        let name = normalize(name);
        let _guard = self.shared.world_lock.write().expect("world lock poisoned");
        let mut queue = self.shared.queue.lock().expect("queue lock poisoned");

        match queue.add(&name, value, self.shared.factory.as_ref()) {
            Ok(()) => {
                let index = self.next_index();
                self.shared.stats.inc_add(true);
                Ok(Event {
                    kind: EventKind::Create,
                    key: name,
                    index,
                })
            }
            Err(e) => {
                self.shared.stats.inc_add(false);
                Err(e)
            }
        }
    }

    /// `Push(name, value)`: append a payload to a topic.
    pub fn push(&self, name: &str, value: &str) -> Result<Event, QueueError> {
        let name = normalize(name);
        let _guard = self.shared.world_lock.write().expect("world lock poisoned");
        let mut queue = self.shared.queue.lock().expect("queue lock poisoned");

        match queue.push(&name, value) {
            Ok(()) => {
                let index = self.next_index();
                self.shared.stats.inc_push(true);
                Ok(Event {
                    kind: EventKind::Set,
                    key: name,
                    index,
                })
            }
            Err(e) => {
                self.shared.stats.inc_push(false);
                Err(e)
            }
        }
    }

    /// `Pop(name, now)`: deliver the next id/payload for a line. An empty
    /// line surfaces as `KeyNotFound` to the host, even though `Queue::pop`
    /// itself treats it as a non-error `None`. Returns the event alongside
    /// the popped payload, since a caller needs the message content and
    /// `Event` itself only carries the key/index shape.
    pub fn pop(&self, name: &str, now: SystemTime) -> Result<(Event, String), QueueError> {
        let name = normalize(name);
        let _guard = self.acquire_for_pop_confirm_remove();
        let mut queue = self.shared.queue.lock().expect("queue lock poisoned");

        let result = queue.pop(&name, now);
        match result {
            Ok(Some((id, value))) => {
                let index = self.next_index();
                self.shared.stats.inc_pop(true);
                let event = Event {
                    kind: EventKind::Get,
                    key: format!("{}/{}", name, id),
                    index,
                };
                Ok((event, value))
            }
            Ok(None) => {
                self.shared.stats.inc_pop(false);
                Err(QueueError::KeyNotFound(name))
            }
            Err(e) => {
                self.shared.stats.inc_pop(false);
                Err(e)
            }
        }
    }

    /// `Confirm(name)`.
    pub fn confirm(&self, name: &str) -> Result<Event, QueueError> {
        let name = normalize(name);
        let _guard = self.acquire_for_pop_confirm_remove();
        let mut queue = self.shared.queue.lock().expect("queue lock poisoned");

        match queue.confirm(&name) {
            Ok(()) => {
                let index = self.next_index();
                self.shared.stats.inc_confirm(true);
                Ok(Event {
                    kind: EventKind::Delete,
                    key: name,
                    index,
                })
            }
            Err(e) => {
                self.shared.stats.inc_confirm(false);
                Err(e)
            }
        }
    }

    /// `Remove(name)`: drop a topic or line.
    pub fn remove(&self, name: &str) -> Result<Event, QueueError> {
        let name = normalize(name);
        let _guard = self.acquire_for_pop_confirm_remove();
        let mut queue = self.shared.queue.lock().expect("queue lock poisoned");

        match queue.remove(&name) {
            Ok(()) => {
                let index = self.next_index();
                self.shared.stats.inc_remove(true);
                Ok(Event {
                    kind: EventKind::Delete,
                    key: name,
                    index,
                })
            }
            Err(e) => {
                self.shared.stats.inc_remove(false);
                Err(e)
            }
        }
    }

    fn acquire_for_pop_confirm_remove(&self) -> WorldLockGuard<'_> {
        match self.shared.discipline {
            LockDiscipline::WriteAlways => {
                WorldLockGuard::Write(self.shared.world_lock.write().expect("world lock poisoned"))
            }
            LockDiscipline::ReadOnPopConfirm => {
                WorldLockGuard::Read(self.shared.world_lock.read().expect("world lock poisoned"))
            }
        }
    }
}

enum WorldLockGuard<'a> {
    Write(std::sync::RwLockWriteGuard<'a, ()>),
    Read(std::sync::RwLockReadGuard<'a, ()>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> StoreAdapter {
        StoreAdapter::default()
    }

    #[test]
    fn add_bumps_index_and_stats() {
        let a = adapter();
        let ev = a.add("/t", "").unwrap();
        assert_eq!(ev.kind, EventKind::Create);
        assert_eq!(a.current_index(), 1);
        assert_eq!(a.stats().add_success, 1);
    }

    #[test]
    fn add_failure_bumps_fail_stat() {
        let a = adapter();
        a.add("/t", "").unwrap();
        assert!(a.add("/t", "").is_err());
        assert_eq!(a.stats().add_fail, 1);
    }

    #[test]
    fn pop_on_empty_line_is_key_not_found() {
        let a = adapter();
        a.add("/t", "").unwrap();
        a.add("/t/c", "").unwrap();
        assert!(matches!(
            a.pop("/t/c", SystemTime::now()),
            Err(QueueError::KeyNotFound(_))
        ));
        assert_eq!(a.stats().pop_fail, 1);
    }

    #[test]
    fn full_scenario_push_pop_confirm() {
        let a = adapter();
        a.add("/t", "").unwrap();
        a.add("/t/c", "10s").unwrap();
        a.push("/t", "a").unwrap();

        let (ev, value) = a.pop("/t/c", SystemTime::now()).unwrap();
        assert_eq!(ev.key, "/t/c/0");
        assert_eq!(value, "a");

        a.confirm("/t/c/0").unwrap();
        assert_eq!(a.stats().confirm_success, 1);
    }

    #[test]
    fn remove_topic_then_push_fails() {
        let a = adapter();
        a.add("/t", "").unwrap();
        a.remove("/t").unwrap();
        assert!(a.push("/t", "a").is_err());
    }

    #[test]
    fn path_is_normalized_before_routing() {
        let a = adapter();
        a.add("//t//", "").unwrap();
        assert!(a.push("/t", "a").is_ok());
    }

    #[test]
    fn save_then_recover_preserves_index_and_data() {
        let n = std::sync::atomic::AtomicU64::new(0);
        let path = std::env::temp_dir().join(format!(
            "qline-adapter-test-{}-{}.json",
            std::process::id(),
            n.fetch_add(1, Ordering::Relaxed)
        ));

        let a = adapter();
        a.add("/t", "").unwrap();
        a.push("/t", "hello").unwrap();
        a.save(&path).unwrap();

        let recovered =
            StoreAdapter::recover(&path, Box::new(MemoryFactory), LockDiscipline::WriteAlways).unwrap();
        assert_eq!(recovered.current_index(), a.current_index());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn read_on_pop_confirm_discipline_still_yields_correct_results() {
        let a = StoreAdapter::new(Box::new(MemoryFactory), LockDiscipline::ReadOnPopConfirm);
        a.add("/t", "").unwrap();
        a.add("/t/c", "10s").unwrap();
        a.push("/t", "a").unwrap();
        let (ev, _) = a.pop("/t/c", SystemTime::now()).unwrap();
        assert_eq!(ev.key, "/t/c/0");
        a.confirm("/t/c/0").unwrap();
    }
}
