//! Decoupled advisory refresh.
//!
//! The oracle can take seconds to answer; polling and dispatch must not wait
//! for it.  The control loop and a background worker therefore meet at a
//! single-slot [`AdvisoryHandoff`]:
//!
//! ```text
//!   control loop ──publish_snapshot──▶ ┌──────────────┐ ──latest_snapshot──▶ worker
//!                                      │  HandoffSlot │                        │
//!   control loop ◀──latest_advisory─── └──────────────┘ ◀──store_advisory─────┘
//!                                          (Mutex)
//! ```
//!
//! Both sides overwrite; nothing queues.  Readers always observe the most
//! recently completed advisory as a whole value, never a partial write.
//!
//! Advice older than `max_lag` snapshots is not handed to the loop: a stalled
//! or dead worker degrades to everything-off instead of freezing the last
//! recommendation in place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use crate::app::ports::OraclePort;
use crate::fsm::context::SensorSnapshot;

use super::{AdvisoryDecision, AdvisoryGateway, AdvisorySource};

// ───────────────────────────────────────────────────────────────
// Slot
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct HandoffSlot {
    snapshot: Option<SensorSnapshot>,
    /// Bumped on every published snapshot.
    snapshot_seq: u64,
    advisory: AdvisoryDecision,
    /// `snapshot_seq` the stored advisory was computed for.
    advised_seq: u64,
    /// False until the first `store_advisory`.
    has_advice: bool,
    /// Set while the loop is being served the stale fallback.
    stale: bool,
}

/// Default bound on advisory age, in snapshots.
pub const DEFAULT_MAX_LAG: u64 = 16;

/// Cloneable handle to the shared slot.
#[derive(Debug, Clone)]
pub struct AdvisoryHandoff {
    slot: Arc<Mutex<HandoffSlot>>,
    max_lag: u64,
}

impl Default for AdvisoryHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisoryHandoff {
    pub fn new() -> Self {
        Self::with_max_lag(DEFAULT_MAX_LAG)
    }

    /// Handoff whose advice expires once it lags more than `max_lag`
    /// snapshots behind the loop.
    pub fn with_max_lag(max_lag: u64) -> Self {
        Self {
            slot: Arc::new(Mutex::new(HandoffSlot {
                snapshot: None,
                snapshot_seq: 0,
                advisory: AdvisoryDecision::initializing(),
                advised_seq: 0,
                has_advice: false,
                stale: false,
            })),
            max_lag,
        }
    }

    // A panic on the other side must not take the loop down with it; the
    // slot only ever holds whole values, so the inner data is still valid.
    fn lock(&self) -> MutexGuard<'_, HandoffSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the snapshot the worker should advise on next.
    pub fn publish_snapshot(&self, snapshot: SensorSnapshot) -> u64 {
        let mut slot = self.lock();
        slot.snapshot = Some(snapshot);
        slot.snapshot_seq += 1;
        slot.snapshot_seq
    }

    /// Most recent snapshot and its sequence number, if any was published.
    pub fn latest_snapshot(&self) -> Option<(u64, SensorSnapshot)> {
        let slot = self.lock();
        slot.snapshot.map(|s| (slot.snapshot_seq, s))
    }

    /// Store a completed advisory computed for snapshot `seq`.
    pub fn store_advisory(&self, seq: u64, advisory: AdvisoryDecision) {
        let mut slot = self.lock();
        slot.advisory = advisory;
        slot.advised_seq = seq;
        slot.has_advice = true;
    }

    /// Most recently completed advisory.
    pub fn latest_advisory(&self) -> AdvisoryDecision {
        self.lock().advisory.clone()
    }

    /// How many snapshots the stored advisory lags behind (0 = current).
    pub fn lag(&self) -> u64 {
        let slot = self.lock();
        slot.snapshot_seq.saturating_sub(slot.advised_seq)
    }
}

impl AdvisorySource for AdvisoryHandoff {
    fn advise(&mut self, snapshot: &SensorSnapshot) -> AdvisoryDecision {
        self.publish_snapshot(*snapshot);
        let mut slot = self.lock();
        if !slot.has_advice {
            return slot.advisory.clone();
        }
        let lag = slot.snapshot_seq.saturating_sub(slot.advised_seq);
        if lag > self.max_lag {
            if !slot.stale {
                warn!("Advisory is {lag} snapshots old, falling back to safe default");
                slot.stale = true;
            }
            return AdvisoryDecision::degraded(format!("Advisory stale ({lag} snapshots old)"));
        }
        if slot.stale {
            info!("Advisory fresh again");
            slot.stale = false;
        }
        slot.advisory.clone()
    }
}

// ───────────────────────────────────────────────────────────────
// Worker
// ───────────────────────────────────────────────────────────────

/// Background thread that keeps the handoff's advisory fresh.
pub struct AdvisoryWorker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AdvisoryWorker {
    /// Start refreshing every `refresh`.  The worker re-advises the latest
    /// snapshot each round even if it did not change.
    pub fn spawn<O>(
        gateway: AdvisoryGateway<O>,
        handoff: AdvisoryHandoff,
        refresh: Duration,
    ) -> std::io::Result<Self>
    where
        O: OraclePort + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("advisory".into())
            .spawn(move || {
                info!("Advisory worker started (refresh {:?})", refresh);
                while flag.load(Ordering::Acquire) {
                    if let Some((seq, snapshot)) = handoff.latest_snapshot() {
                        let decision = gateway.consult(&snapshot);
                        handoff.store_advisory(seq, decision);
                    }
                    thread::sleep(refresh);
                }
                info!("Advisory worker stopped");
            })?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Ask the worker to stop and wait for it.  An oracle call in flight is
    /// allowed to finish (it is bounded by the oracle timeout).
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Advisory worker panicked");
            }
        }
    }
}

impl Drop for AdvisoryWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
