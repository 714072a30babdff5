//! Inbound operator commands.
//!
//! Commands reach the [`Supervisor`](super::service::Supervisor) through a
//! [`ControlHandle`] and are applied between iterations, never in the middle
//! of a network call.

use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;

/// Who decides the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// The advisory oracle proposes; the arbiter disposes.
    #[default]
    Auto,
    /// The operator proposes; the arbiter still disposes.
    Manual { relay: bool },
}

/// Commands that external adapters can send into the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Replace the oracle's relay advice with an operator decision.
    ManualRelay(bool),

    /// Hand the relay back to the oracle.
    ResumeAuto,

    /// Flip the fabric-presence reading (sensor wired active-low).
    SetSensorInversion(bool),

    /// Mute the alarm until the overheat condition clears.  Only ever
    /// turns the buzzer off.
    SilenceBuzzer,

    /// Leave the loop after the current iteration.
    Stop,
}

impl AppCommand {
    /// Parse one console line: `on`, `off`, `auto`, `invert on|off`,
    /// `silence`, `stop`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_ascii_lowercase);
        let head = words.next()?;
        let arg = words.next();
        if words.next().is_some() {
            return None;
        }
        match (head.as_str(), arg.as_deref()) {
            ("on", None) => Some(Self::ManualRelay(true)),
            ("off", None) => Some(Self::ManualRelay(false)),
            ("auto", None) => Some(Self::ResumeAuto),
            ("invert", Some("on")) => Some(Self::SetSensorInversion(true)),
            ("invert", Some("off")) => Some(Self::SetSensorInversion(false)),
            ("silence" | "mute", None) => Some(Self::SilenceBuzzer),
            ("stop" | "quit", None) => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Cloneable sender side of the command channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: Sender<AppCommand>,
}

impl ControlHandle {
    /// Queue `cmd`.  Returns `false` once the loop has gone away.
    pub fn send(&self, cmd: AppCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    pub fn stop(&self) -> bool {
        self.send(AppCommand::Stop)
    }
}

/// Create a command channel: the handle goes to operators, the receiver to
/// [`Supervisor::run`](super::service::Supervisor::run).
pub fn control_channel() -> (ControlHandle, Receiver<AppCommand>) {
    let (tx, rx) = mpsc::channel();
    (ControlHandle { tx }, rx)
}
