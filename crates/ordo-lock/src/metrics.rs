// Lock metrics
// Counters, gauges and histograms published through the `metrics` facade

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

pub const ACQUIRE_TOTAL: &str = "ordo_lock_acquire_total";
pub const RELEASE_TOTAL: &str = "ordo_lock_release_total";
pub const WAIT_SECONDS: &str = "ordo_lock_wait_seconds";
pub const HELD: &str = "ordo_lock_held";

/// How an acquisition ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired,
    Reentered,
    Timeout,
    Interrupted,
    Error,
}

impl AcquireResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::Reentered => "reentered",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }
}

/// Register metric descriptions.
/// Should be called once after installing a recorder
pub fn describe_lock_metrics() {
    describe_counter!(ACQUIRE_TOTAL, "Lock acquisition attempts by result");
    describe_counter!(RELEASE_TOTAL, "Lock releases that deleted a contender node");
    describe_histogram!(
        WAIT_SECONDS,
        "Time spent acquiring a lock through the coordination service"
    );
    describe_gauge!(HELD, "Owners in this process currently holding the lock path");
}

pub fn record_acquire(path: &str, result: AcquireResult, waited: Duration) {
    counter!(ACQUIRE_TOTAL, "path" => path.to_string(), "result" => result.as_str()).increment(1);
    if result != AcquireResult::Reentered {
        histogram!(WAIT_SECONDS, "path" => path.to_string()).record(waited.as_secs_f64());
    }
}

pub fn record_release(path: &str) {
    counter!(RELEASE_TOTAL, "path" => path.to_string()).increment(1);
}

/// One more owner holds `path`. Counts from every mutex instance on the
/// same path add up.
pub fn increment_held(path: &str) {
    gauge!(HELD, "path" => path.to_string()).increment(1.0);
}

pub fn decrement_held(path: &str) {
    gauge!(HELD, "path" => path.to_string()).decrement(1.0);
}
