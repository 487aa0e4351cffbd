//! Store-side commit clock.

use std::sync::atomic::{AtomicI64, Ordering};

/// Strictly increasing commit timestamps in microseconds since the Unix epoch.
///
/// Each tick is `max(wall_clock, previous + 1)`, so two commits never share a
/// timestamp even when the wall clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct ServerClock {
    last: AtomicI64,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after a previously persisted timestamp.
    pub fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    pub fn tick(&self) -> i64 {
        let now = wall_clock_micros();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

fn wall_clock_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_strictly_increase() {
        let clock = ServerClock::new();
        let mut prev = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_starting_after_future_value() {
        let far = wall_clock_micros() + 10_000_000;
        let clock = ServerClock::starting_after(far);
        assert_eq!(clock.tick(), far + 1);
    }
}
