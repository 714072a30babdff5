//! Advisory gateway wrapping the external decision oracle.
//!
//! The oracle is asked for a `{relay, buzzer, reason}` recommendation under a
//! fixed rule set ([`prompt::SAFETY_RULES`]).  Whatever goes wrong on
//! the way, the gateway still returns an [`AdvisoryDecision`]: the degraded one, with
//! everything off and a diagnostic reason.
//!
//! The result is advice.  The [`safety`](crate::safety) arbiter decides what
//! is actually sent.
//!
//! ```text
//!   snapshot ──▶ AdvisoryGateway ──▶ OraclePort ──▶ raw text
//!                      │                              │
//!                      ◀────── extract_decision ◀─────┘
//! ```

pub mod handoff;
pub mod prompt;

use log::{debug, warn};
use serde::Deserialize;

use crate::app::ports::OraclePort;
use crate::error::OracleError;
use crate::fsm::context::SensorSnapshot;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// A non-binding actuation recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdvisoryDecision {
    pub relay: bool,
    pub buzzer: bool,
    #[serde(default)]
    pub reason: String,
}

impl AdvisoryDecision {
    /// Everything off, with a diagnostic explaining why no real advice exists.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            relay: false,
            buzzer: false,
            reason: reason.into(),
        }
    }

    /// Placeholder published before the first oracle reply.
    pub fn initializing() -> Self {
        Self::degraded("Initializing advisory")
    }

    /// Operator decision used while the supervisor is in manual mode.
    pub fn manual(relay: bool) -> Self {
        Self {
            relay,
            buzzer: false,
            reason: "Manual override".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Advisory source (what the control loop consults)
// ---------------------------------------------------------------------------

/// Where the control loop gets its advisory from.
///
/// Two implementations exist: the [`AdvisoryGateway`] itself (inline: the
/// oracle is queried inside the iteration) and the
/// [`AdvisoryHandoff`](handoff::AdvisoryHandoff) (background: the loop
/// publishes its snapshot and reads the most recently completed decision).
pub trait AdvisorySource {
    fn advise(&mut self, snapshot: &SensorSnapshot) -> AdvisoryDecision;
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct AdvisoryGateway<O: OraclePort> {
    oracle: O,
}

impl<O: OraclePort> AdvisoryGateway<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    /// Ask the oracle about `snapshot`.  Never fails.
    pub fn consult(&self, snapshot: &SensorSnapshot) -> AdvisoryDecision {
        match self.query(snapshot) {
            Ok(decision) => {
                debug!(
                    "Advisory: relay={} buzzer={} ({})",
                    decision.relay, decision.buzzer, decision.reason
                );
                decision
            }
            Err(e) => {
                warn!("Advisory degraded to safe default: {e}");
                AdvisoryDecision::degraded(format!("Advisory unavailable: {e}"))
            }
        }
    }

    fn query(&self, snapshot: &SensorSnapshot) -> Result<AdvisoryDecision, OracleError> {
        let observation = prompt::observation(snapshot);
        let reply = self.oracle.complete(prompt::SAFETY_RULES, &observation)?;
        prompt::extract_decision(&reply)
    }
}

impl<O: OraclePort> AdvisorySource for AdvisoryGateway<O> {
    fn advise(&mut self, snapshot: &SensorSnapshot) -> AdvisoryDecision {
        self.consult(snapshot)
    }
}
