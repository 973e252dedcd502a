//! Clocks used by the store to stamp appended records

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of commit timestamps.
///
/// Nothing here promises monotonicity: two reads may return the same
/// instant, or an earlier one after a wall-clock adjustment.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Start at 2024-01-01T00:00:00Z
    pub fn epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock() = instant;
    }

    /// Move forward (or backward, for a negative step) and return the new time
    pub fn advance(&self, step: Duration) -> DateTime<Utc> {
        let mut current = self.current.lock();
        *current += step;
        *current
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::epoch()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_on_demand() {
        let clock = ManualClock::epoch();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        let t1 = clock.advance(Duration::seconds(5));
        assert_eq!(t1 - t0, Duration::seconds(5));

        clock.advance(Duration::seconds(-10));
        assert!(clock.now() < t0);
    }
}
