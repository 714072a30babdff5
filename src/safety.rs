//! Safety arbiter.
//!
//! The arbiter is the single policy boundary of the supervisor: it takes
//! the oracle's advisory and the raw snapshot of the same iteration and
//! produces the [`FinalCommand`] that is actually transmitted.  It is a pure
//! function without state or I/O.
//!
//! ## Relay rules (first match wins)
//!
//! 1. No fabric under the iron → relay off.
//! 2. Temperature above [`CRITICAL_TEMPERATURE_C`] → relay off.
//! 3. Temperature not a finite number → relay off.
//! 4. Otherwise → relay follows the advisory.
//!
//! ## Buzzer rule
//!
//! The advisory's buzzer is honoured only when the raw reading independently
//! exceeds [`CRITICAL_TEMPERATURE_C`].
//!
//! Only `advisory.relay` and `advisory.buzzer` are read; the `reason` text
//! never influences the command.

use core::fmt;

use log::warn;

use crate::advisory::AdvisoryDecision;
use crate::fsm::context::{FinalCommand, SensorSnapshot};

/// Overheat threshold (°C).  Strictly greater-than.
pub const CRITICAL_TEMPERATURE_C: f64 = 170.0;

// ---------------------------------------------------------------------------
// Override report
// ---------------------------------------------------------------------------

/// Reasons the arbiter departed from the advisory.  Accumulated in a
/// bitfield so one verdict can carry several overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyOverride {
    /// Advisory asked for heat with no fabric present.
    NoFabric = 0b0000_0001,
    /// Advisory asked for heat above the critical temperature.
    OverTemperature = 0b0000_0010,
    /// Advisory asked for heat with an unusable temperature reading.
    UnknownTemperature = 0b0000_0100,
    /// Advisory asked for the alarm without a corroborating reading.
    BuzzerUncorroborated = 0b0000_1000,
}

impl SafetyOverride {
    /// Return the bitmask for this override.
    pub const fn mask(self) -> u8 {
        self as u8
    }

    /// All overrides, in rule order.
    pub const ALL: [Self; 4] = [
        Self::NoFabric,
        Self::OverTemperature,
        Self::UnknownTemperature,
        Self::BuzzerUncorroborated,
    ];
}

impl fmt::Display for SafetyOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFabric => write!(f, "relay refused: no fabric"),
            Self::OverTemperature => write!(f, "relay refused: over temperature"),
            Self::UnknownTemperature => write!(f, "relay refused: temperature unknown"),
            Self::BuzzerUncorroborated => write!(f, "buzzer refused: not corroborated"),
        }
    }
}

/// Arbiter output plus the overrides applied to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub command: FinalCommand,
    pub overrides: u8,
}

impl Verdict {
    pub fn has_override(&self, o: SafetyOverride) -> bool {
        self.overrides & o.mask() != 0
    }
}

// ---------------------------------------------------------------------------
// Arbitration
// ---------------------------------------------------------------------------

/// Produce the final command for `snapshot`, trusting `advisory` only
/// inside the safety envelope.
pub fn arbitrate(advisory: &AdvisoryDecision, snapshot: &SensorSnapshot) -> FinalCommand {
    review(advisory, snapshot).command
}

/// Like [`arbitrate`], but also reports which rules overrode the advisory.
pub fn review(advisory: &AdvisoryDecision, snapshot: &SensorSnapshot) -> Verdict {
    let critical = snapshot.temperature > CRITICAL_TEMPERATURE_C;
    let mut overrides = 0u8;

    // ── Relay ────────────────────────────────────────────────
    let relay = if !snapshot.fabric_present {
        if advisory.relay {
            overrides |= SafetyOverride::NoFabric.mask();
        }
        false
    } else if critical {
        if advisory.relay {
            overrides |= SafetyOverride::OverTemperature.mask();
        }
        false
    } else if !snapshot.temperature.is_finite() {
        if advisory.relay {
            overrides |= SafetyOverride::UnknownTemperature.mask();
        }
        false
    } else {
        advisory.relay
    };

    // ── Buzzer ───────────────────────────────────────────────
    let buzzer = advisory.buzzer && critical;
    if advisory.buzzer && !critical {
        overrides |= SafetyOverride::BuzzerUncorroborated.mask();
    }

    if overrides != 0 {
        for o in SafetyOverride::ALL {
            if overrides & o.mask() != 0 {
                warn!("SAFETY OVERRIDE: {o} (T={:.1}°C)", snapshot.temperature);
            }
        }
    }

    Verdict {
        command: FinalCommand { relay, buzzer },
        overrides,
    }
}
