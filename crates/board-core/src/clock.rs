//! Time sources for commit timestamps and lock cooldowns.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::types::Timestamp;

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Timestamp;
}

/// Wall clock backed by chrono.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: Timestamp) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// CommitClock hands out strictly increasing timestamps.
///
/// Each call returns `max(wall_now, previous + 1)`, so a watermark handed to
/// a poller is below every later commit and above every earlier one.
pub struct CommitClock {
    clock: Arc<dyn Clock>,
    last: AtomicI64,
}

impl CommitClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicI64::new(0),
        }
    }

    /// Next commit timestamp.
    pub fn next(&self) -> Timestamp {
        let now = self.clock.now_ms();
        match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            }) {
            Ok(prev) | Err(prev) => now.max(prev + 1),
        }
    }

    /// Last timestamp handed out, `0` before the first call.
    pub fn last(&self) -> Timestamp {
        self.last.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CommitClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitClock")
            .field("last", &self.last())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn test_commit_clock_follows_wall_clock() {
        let manual = Arc::new(ManualClock::new(1_000));
        let commits = CommitClock::new(manual.clone());
        assert_eq!(commits.next(), 1_000);
        manual.advance(25);
        assert_eq!(commits.next(), 1_025);
    }

    #[test]
    fn test_commit_clock_is_strictly_increasing() {
        let manual = Arc::new(ManualClock::new(1_000));
        let commits = CommitClock::new(manual.clone());
        let a = commits.next();
        let b = commits.next();
        manual.set(500);
        let c = commits.next();
        assert!(a < b && b < c);
        assert_eq!(commits.last(), c);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01 in ms
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
