//! Outbound application events.
//!
//! The [`Supervisor`](super::service::Supervisor) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them.

use serde::Serialize;

use crate::error::Error;
use crate::fsm::StateId;
use crate::fsm::context::FinalCommand;

use super::commands::ControlMode;

/// Structured events emitted by the control loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Initial login succeeded; the loop is about to run.
    Started { device_id: String },

    /// One completed iteration.
    Telemetry(TelemetryData),

    /// The arbiter overrode the advisory (bitmask of
    /// [`SafetyOverride`](crate::safety::SafetyOverride)).
    SafetyOverride { overrides: u8, temperature: f64 },

    /// Command delivered to the device.
    Dispatched(FinalCommand),

    /// Command not delivered; `status` is the HTTP status (0 = transport).
    DispatchFailed { command: FinalCommand, status: u16 },

    /// A fresh token replaced the previous one.
    SessionRenewed { logins: u32 },

    /// Device link went online or offline.
    LinkChanged { online: bool },

    /// Operator switched between automatic and manual control.
    ModeChanged(ControlMode),

    /// An iteration was aborted and the loop is backing off.
    CycleAborted { state: StateId, error: Error },
}

/// A point-in-time telemetry record suitable for logging or display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryData {
    pub cycle: u64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub fabric_present: bool,
    /// Mean temperature over the retained reading history.
    pub avg_temperature_c: Option<f64>,
    pub relay: bool,
    pub buzzer: bool,
    /// Whether the command went out this iteration (rate gate).
    pub dispatched: bool,
    pub overrides: u8,
    pub advisory_reason: String,
    pub mode: ControlMode,
    /// Operator muted the current alarm.
    pub buzzer_silenced: bool,
    pub online: bool,
}
