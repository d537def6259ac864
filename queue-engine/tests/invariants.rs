//! Cross-module invariants and end-to-end scenarios exercised through the
//! public `StoreAdapter` surface.

use std::time::{Duration, SystemTime};

use queue_engine::adapter::{LockDiscipline, StoreAdapter};
use queue_engine::queue::{MemoryFactory, Queue};
use queue_engine::QueueError;

fn adapter() -> StoreAdapter {
    init_tracing();
    StoreAdapter::new(Box::new(MemoryFactory), LockDiscipline::WriteAlways)
}

/// Surface the engine's `debug!`/`warn!` events under `cargo test -- --nocapture`.
/// Idempotent: later calls after the first successful init are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// `Topic.Head <= min(Line.FlightHead) <= min(Line.Head) <= Topic.Tail` must
/// hold at all times, observed across a mixed sequence of pushes, pops, and
/// confirms on two independent lines.
#[test]
fn head_watermark_ordering_holds_across_mixed_operations() {
    init_tracing();
    let mut q = Queue::new();
    let factory = MemoryFactory;
    q.add("/t", "", &factory).unwrap();
    q.add("/t/fast", "1ms", &factory).unwrap();
    q.add("/t/slow", "1h", &factory).unwrap();

    let now = SystemTime::now();
    for payload in ["a", "b", "c"] {
        q.push("/t", payload).unwrap();
    }

    q.pop("/t/fast", now).unwrap();
    q.pop("/t/fast", now).unwrap();
    q.confirm("/t/fast/0").unwrap();
    q.pop("/t/slow", now).unwrap();

    let topic = q.topics().get("/t").unwrap();
    let fast = topic.lines().get("fast").unwrap();
    let slow = topic.lines().get("slow").unwrap();

    let min_flight_head = fast.flight_head().min(slow.flight_head());
    let min_head = fast.head().min(slow.head());

    assert!(topic.head() <= min_flight_head);
    assert!(min_flight_head <= min_head);
    assert!(min_head <= topic.tail());
}

/// An unconfirmed message is redelivered only after `recycle` has elapsed,
/// and before any fresh id.
#[test]
fn redelivery_law_holds_through_the_adapter() {
    let a = adapter();
    a.add("/t", "").unwrap();
    a.add("/t/c", "50ms").unwrap();
    a.push("/t", "a").unwrap();

    let t0 = SystemTime::now();
    let (ev0, v0) = a.pop("/t/c", t0).unwrap();
    assert_eq!((ev0.key.as_str(), v0.as_str()), ("/t/c/0", "a"));

    // Not yet expired: empty line surfaces as KeyNotFound.
    assert!(matches!(
        a.pop("/t/c", t0 + Duration::from_millis(10)),
        Err(QueueError::KeyNotFound(_))
    ));

    // Expired: the same id is redelivered.
    let (ev1, v1) = a.pop("/t/c", t0 + Duration::from_millis(100)).unwrap();
    assert_eq!((ev1.key.as_str(), v1.as_str()), ("/t/c/0", "a"));
}

/// Confirming on one line must not affect another line's cursor or
/// in-flight set.
#[test]
fn confirm_isolation_between_lines() {
    let a = adapter();
    a.add("/t", "").unwrap();
    a.add("/t/c1", "10s").unwrap();
    a.add("/t/c2", "10s").unwrap();
    a.push("/t", "a").unwrap();

    let now = SystemTime::now();
    a.pop("/t/c1", now).unwrap();
    a.pop("/t/c2", now).unwrap();
    a.confirm("/t/c1/0").unwrap();

    // c2 never confirmed: its own confirm of the same id must still work,
    // and was never implicitly resolved by c1's confirm.
    a.confirm("/t/c2/0").unwrap();
}

/// Two lines with recycle=0 each independently receive the same fresh id;
/// clean makes no progress while either line's flight_head lags.
#[test]
fn two_independent_lines_both_see_the_same_fresh_id() {
    let a = adapter();
    a.add("/t", "").unwrap();
    a.add("/t/c1", "").unwrap();
    a.add("/t/c2", "").unwrap();
    a.push("/t", "a").unwrap();

    let now = SystemTime::now();
    let (e1, v1) = a.pop("/t/c1", now).unwrap();
    let (e2, v2) = a.pop("/t/c2", now).unwrap();
    assert_eq!(e1.key, "/t/c1/0");
    assert_eq!(e2.key, "/t/c2/0");
    assert_eq!(v1, "a");
    assert_eq!(v2, "a");
}

/// After save + recover, subsequent pops and confirms behave exactly as
/// they would have against the live queue.
#[test]
fn snapshot_round_trip_preserves_behavior() {
    let a = adapter();
    a.add("/t", "").unwrap();
    a.add("/t/c", "10s").unwrap();
    a.push("/t", "a").unwrap();
    a.push("/t", "b").unwrap();

    let now = SystemTime::now();
    a.pop("/t/c", now).unwrap();
    a.confirm("/t/c/0").unwrap();

    let path = std::env::temp_dir().join(format!(
        "qline-invariants-test-{}.json",
        std::process::id()
    ));
    a.save(&path).unwrap();

    let recovered = StoreAdapter::recover(&path, Box::new(MemoryFactory), LockDiscipline::WriteAlways).unwrap();
    std::fs::remove_file(&path).ok();

    let (ev, value) = recovered.pop("/t/c", now).unwrap();
    assert_eq!(ev.key, "/t/c/1");
    assert_eq!(value, "b");
    assert!(matches!(
        recovered.pop("/t/c", now),
        Err(QueueError::KeyNotFound(_))
    ));
}
