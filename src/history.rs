//! Reading history and device-link heartbeat.
//!
//! The last [`HISTORY_CAPACITY`] successful readings are kept in a
//! fixed-capacity ring; the oldest is overwritten.  The link counts as
//! online while the most recent successful poll is younger than the
//! configured staleness window.

use heapless::HistoryBuffer;
use log::info;

use crate::fsm::context::SensorSnapshot;

pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub at_ms: u64,
    pub snapshot: SensorSnapshot,
}

pub struct ReadingHistory {
    buf: HistoryBuffer<Reading, HISTORY_CAPACITY>,
    stale_after_ms: u64,
    last_success_ms: Option<u64>,
    /// Last reported link state.
    online: bool,
}

impl ReadingHistory {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            buf: HistoryBuffer::new(),
            stale_after_ms,
            last_success_ms: None,
            online: false,
        }
    }

    /// Record a successful poll.
    pub fn record(&mut self, at_ms: u64, snapshot: SensorSnapshot) {
        self.buf.write(Reading { at_ms, snapshot });
        self.last_success_ms = Some(at_ms);
    }

    /// Whether the link is fresh at `now_ms`.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        self.last_success_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < self.stale_after_ms)
    }

    /// Re-evaluate the link at `now_ms`.  Returns the new state only when
    /// it changed since the previous call.
    pub fn update_link(&mut self, now_ms: u64) -> Option<bool> {
        let fresh = self.is_fresh(now_ms);
        if fresh == self.online {
            return None;
        }
        self.online = fresh;
        info!("Device link {}", if fresh { "online" } else { "offline" });
        Some(fresh)
    }

    pub fn online(&self) -> bool {
        self.online
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.buf.recent()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// Mean temperature over the retained readings.
    pub fn average_temperature(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum: f64 = self.buf.iter().map(|r| r.snapshot.temperature).sum();
        Some(sum / self.buf.len() as f64)
    }

    /// Readings from oldest to newest.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &Reading> {
        self.buf.oldest_ordered()
    }
}
