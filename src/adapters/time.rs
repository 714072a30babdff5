//! Monotonic clock adapter.

use std::time::Instant;

use crate::app::ports::TimePort;

/// [`TimePort`] backed by `std::time::Instant`; origin is construction time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl TimePort for MonotonicClock {
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
