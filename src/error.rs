//! Unified error types for the SmartIron supervisor.
//!
//! Each concern has its own enum so the control loop can decide, per
//! variant, whether a failure is fatal (initial login), recoverable
//! (re-login, back-off) or silently degraded (oracle output).  The umbrella
//! [`Error`] is what a cycle report carries when an iteration is aborted.
//!
//! Malformed telemetry is deliberately absent: the normaliser never fails,
//! it reports which keys fell back to defaults instead.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every failure that can abort a control-loop iteration funnels into this type.
/// Oracle failures never abort one, and configuration failures end the
/// process before the loop exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The platform answered the login request with a non-200 status.
    #[error("login rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The login reply parsed but carried no usable token.
    #[error("login reply carried no token")]
    MissingToken,

    /// The login request never produced a response (DNS, TCP, timeout).
    #[error("login request failed: {0}")]
    Transport(String),

    /// The platform kept answering 401 right after a fresh login.
    #[error("token refused immediately after re-login")]
    TokenRefused,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No HTTP response at all (status sentinel `0`).
    #[error("platform unreachable: {0}")]
    Unreachable(String),

    /// An HTTP response other than 200 / 401.
    #[error("unexpected HTTP {status}")]
    Status { status: u16 },
}

impl TransportError {
    /// Classify a non-success status code reported through the `0` sentinel
    /// convention of the platform ports.
    pub fn from_status(status: u16, detail: &str) -> Self {
        if status == 0 {
            Self::Unreachable(detail.to_string())
        } else {
            Self::Status { status }
        }
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Failures of the external advisory oracle.  Never surfaced to the loop:
/// the advisory gateway turns each of these into the degraded decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle timed out")]
    Timeout,

    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle reply contained no JSON object")]
    NoJsonObject,

    #[error("oracle reply malformed: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required setting was not provided by any source.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A setting failed range validation.  The message names the field.
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),

    /// The config file could not be read.
    #[error("cannot read config file: {0}")]
    Io(String),

    /// The config file is not valid JSON for [`SupervisorConfig`](crate::config::SupervisorConfig).
    #[error("cannot parse config file: {0}")]
    Parse(String),
}
