//! Per-iteration data threaded through the control loop.
//!
//! `CycleContext` is the blackboard of one loop iteration: the snapshot
//! captured by the telemetry client, the advisory consulted for it, and the
//! final command produced by the arbiter.  A fresh context is built every
//! iteration; nothing in it survives into the next one.

use crate::advisory::AdvisoryDecision;

// ---------------------------------------------------------------------------
// Sensor snapshot (written once by the telemetry client)
// ---------------------------------------------------------------------------

/// One sampled set of appliance readings.
///
/// Missing or unparseable readings are already replaced by their defaults
/// (`0.0` / `false`) when a snapshot is built, so consumers must tolerate
/// zeroed values during platform outages.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    /// Soleplate temperature (°C).
    pub temperature: f64,
    /// Relative humidity (%).
    pub humidity: f64,
    /// True if fabric is detected under the iron.
    pub fabric_present: bool,
}

impl SensorSnapshot {
    pub const fn new(temperature: f64, humidity: f64, fabric_present: bool) -> Self {
        Self {
            temperature,
            humidity,
            fabric_present,
        }
    }
}

// ---------------------------------------------------------------------------
// Final command (written only by the safety arbiter)
// ---------------------------------------------------------------------------

/// The only object ever transmitted to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinalCommand {
    /// Heater relay energised.
    pub relay: bool,
    /// Audible alarm on.
    pub buzzer: bool,
}

impl FinalCommand {
    /// Heater and alarm off.
    pub const fn all_off() -> Self {
        Self {
            relay: false,
            buzzer: false,
        }
    }
}

// ---------------------------------------------------------------------------
// CycleContext
// ---------------------------------------------------------------------------

/// Everything one iteration learned, in the order it learned it.
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    /// Monotonic iteration number (1-based).
    pub cycle: u64,
    /// Snapshot captured by the poll stage.
    pub snapshot: Option<SensorSnapshot>,
    /// Advisory consulted for the snapshot (possibly one refresh behind).
    pub advisory: Option<AdvisoryDecision>,
    /// Command produced by the arbiter.
    pub command: Option<FinalCommand>,
    /// Override bitmask reported by the arbiter (see [`SafetyOverride`](crate::safety::SafetyOverride)).
    pub overrides: u8,
    /// Whether the command was handed to the dispatcher this iteration.
    pub dispatched: bool,
}

impl CycleContext {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }
}
