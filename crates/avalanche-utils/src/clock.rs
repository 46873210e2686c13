//! Wall clock that tests can freeze and advance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A monotonic clock. Cloned handles share the same faked time, so a test
/// can hold one handle and advance the time seen by every component.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    faked: Arc<Mutex<Option<Instant>>>,
}

impl Clock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock frozen at the current instant.
    #[must_use]
    pub fn frozen() -> Self {
        let clock = Self::default();
        clock.set(Instant::now());
        clock
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        let faked = *self.faked.lock();
        faked.unwrap_or_else(Instant::now)
    }

    /// Freezes the clock at `time`.
    pub fn set(&self, time: Instant) {
        *self.faked.lock() = Some(time);
    }

    /// Moves a frozen clock forward. Freezes a real clock first.
    pub fn advance(&self, by: Duration) {
        let mut faked = self.faked.lock();
        let base = (*faked).unwrap_or_else(Instant::now);
        *faked = Some(base + by);
    }

    /// Returns to real time.
    pub fn sync(&self) {
        *self.faked.lock() = None;
    }

    #[must_use]
    pub fn is_faked(&self) -> bool {
        self.faked.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_clock_advances_only_on_request() {
        let clock = Clock::frozen();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), start + Duration::from_secs(5));
    }

    #[test]
    fn test_handles_share_time() {
        let clock = Clock::frozen();
        let other = clock.clone();
        clock.advance(Duration::from_millis(10));
        assert_eq!(clock.now(), other.now());

        other.sync();
        assert!(!clock.is_faked());
    }
}
