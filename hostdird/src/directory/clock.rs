use chrono::{DateTime, Duration, Utc};

/// Source of the current time. Swapped out in tests to simulate elapsed days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Decides whether a record is still live.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    ttl: Duration,
}

impl TtlPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Live iff `now - updated_at < ttl`. A timestamp in the future counts as live.
    pub fn is_live(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - updated_at < self.ttl
    }
}
