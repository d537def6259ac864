//! Operation counters exposed to the host.
//!
//! One success/fail pair per operation (`AddSuccess/Fail`,
//! `PushSuccess/Fail`, `PopSuccess/Fail`, `ConfirmSuccess/Fail`,
//! `RemoveSuccess/Fail`), each an independent `AtomicU64` so a read never
//! blocks a writer.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters for the five store-facing queue operations.
#[derive(Debug, Default)]
pub struct Stats {
    pub add_success: AtomicU64,
    pub add_fail: AtomicU64,
    pub push_success: AtomicU64,
    pub push_fail: AtomicU64,
    pub pop_success: AtomicU64,
    pub pop_fail: AtomicU64,
    pub confirm_success: AtomicU64,
    pub confirm_fail: AtomicU64,
    pub remove_success: AtomicU64,
    pub remove_fail: AtomicU64,
}

/// A point-in-time, plain-value copy of `Stats`, suitable for serialization.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsSnapshot {
    #[serde(rename = "addSuccess")]
    pub add_success: u64,
    #[serde(rename = "addFail")]
    pub add_fail: u64,
    #[serde(rename = "pushSuccess")]
    pub push_success: u64,
    #[serde(rename = "pushFail")]
    pub push_fail: u64,
    #[serde(rename = "popSuccess")]
    pub pop_success: u64,
    #[serde(rename = "popFail")]
    pub pop_fail: u64,
    #[serde(rename = "confirmSuccess")]
    pub confirm_success: u64,
    #[serde(rename = "confirmFail")]
    pub confirm_fail: u64,
    #[serde(rename = "removeSuccess")]
    pub remove_success: u64,
    #[serde(rename = "removeFail")]
    pub remove_fail: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every counter under no lock, for a point-in-time view a host
    /// can poll cheaply.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            add_success: self.add_success.load(Ordering::Relaxed),
            add_fail: self.add_fail.load(Ordering::Relaxed),
            push_success: self.push_success.load(Ordering::Relaxed),
            push_fail: self.push_fail.load(Ordering::Relaxed),
            pop_success: self.pop_success.load(Ordering::Relaxed),
            pop_fail: self.pop_fail.load(Ordering::Relaxed),
            confirm_success: self.confirm_success.load(Ordering::Relaxed),
            confirm_fail: self.confirm_fail.load(Ordering::Relaxed),
            remove_success: self.remove_success.load(Ordering::Relaxed),
            remove_fail: self.remove_fail.load(Ordering::Relaxed),
        }
    }

    pub fn inc_add(&self, ok: bool) {
        inc(if ok { &self.add_success } else { &self.add_fail });
    }

    pub fn inc_push(&self, ok: bool) {
        inc(if ok { &self.push_success } else { &self.push_fail });
    }

    pub fn inc_pop(&self, ok: bool) {
        inc(if ok { &self.pop_success } else { &self.pop_fail });
    }

    pub fn inc_confirm(&self, ok: bool) {
        inc(if ok {
            &self.confirm_success
        } else {
            &self.confirm_fail
        });
    }

    pub fn inc_remove(&self, ok: bool) {
        inc(if ok {
            &self.remove_success
        } else {
            &self.remove_fail
        });
    }
}

fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
