//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade, one line per event, prefixed by concern.  Telemetry can
//! alternatively be written as one JSON object per line for log shippers.

use log::{info, warn};

use crate::app::commands::ControlMode;
use crate::app::events::{AppEvent, TelemetryData};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    json_telemetry: bool,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that renders `TELEM` records as JSON.
    pub fn with_json_telemetry() -> Self {
        Self {
            json_telemetry: true,
        }
    }
}

/// One telemetry record as a single-line JSON object.
pub fn telemetry_json(t: &TelemetryData) -> String {
    serde_json::to_string(t).unwrap_or_else(|e| format!(r#"{{"error":"{e}"}}"#))
}

fn on_off(b: bool) -> &'static str {
    if b { "ON" } else { "OFF" }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) if self.json_telemetry => {
                info!("TELEM | {}", telemetry_json(t));
            }
            AppEvent::Telemetry(t) => {
                let avg = t
                    .avg_temperature_c
                    .map_or_else(|| "-".to_string(), |a| format!("{a:.1}"));
                info!(
                    "TELEM | #{} | T={:.1}\u{00b0}C (avg {}) | H={:.1}% | fabric={} | \
                     relay={} buzzer={}{} sent={} | overrides=0b{:04b} | mode={:?} | link={} | {}",
                    t.cycle,
                    t.temperature_c,
                    avg,
                    t.humidity_pct,
                    if t.fabric_present { "YES" } else { "NO" },
                    on_off(t.relay),
                    on_off(t.buzzer),
                    if t.buzzer_silenced { " (silenced)" } else { "" },
                    t.dispatched,
                    t.overrides,
                    t.mode,
                    if t.online { "online" } else { "offline" },
                    t.advisory_reason,
                );
            }
            AppEvent::SafetyOverride {
                overrides,
                temperature,
            } => {
                warn!(
                    "SAFETY | advisory overridden, flags=0b{:04b} T={:.1}\u{00b0}C",
                    overrides, temperature
                );
            }
            AppEvent::Dispatched(cmd) => {
                info!("RPC | relay={} buzzer={} delivered", on_off(cmd.relay), on_off(cmd.buzzer));
            }
            AppEvent::DispatchFailed { command, status } => {
                warn!(
                    "RPC | relay={} buzzer={} failed (HTTP {})",
                    on_off(command.relay),
                    on_off(command.buzzer),
                    status
                );
            }
            AppEvent::SessionRenewed { logins } => {
                info!("AUTH | session renewed (login #{logins})");
            }
            AppEvent::LinkChanged { online } => {
                info!("LINK | device {}", if *online { "ONLINE" } else { "OFFLINE" });
            }
            AppEvent::ModeChanged(mode) => match mode {
                ControlMode::Auto => info!("MODE | advisory control"),
                ControlMode::Manual { relay } => info!("MODE | manual, relay {}", on_off(*relay)),
            },
            AppEvent::CycleAborted { state, error } => {
                warn!("CYCLE | aborted in {:?}: {}", state, error);
            }
            AppEvent::Started { device_id } => {
                info!("START | device={}", device_id);
            }
        }
    }
}
