use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in epoch milliseconds.
///
/// The cache takes the clock as a dependency so that idleness and expiry
/// decisions are testable without sleeping.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}
