//! Port traits: the hexagonal boundary between the supervisor and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Supervisor (domain)
//! ```
//!
//! Driven adapters (platform REST client, oracle client, clock, event sinks,
//! config loader) implement these traits.  The
//! [`Supervisor`](super::service::Supervisor) consumes them via generics at
//! call sites, so the domain core never opens a socket itself.
//!
//! ## Security notes
//!
//! - Tokens and passwords cross these ports as plain `&str`; adapters must
//!   never log them.
//! - **ConfigPort** implementations MUST validate before returning.

use crate::config::SupervisorConfig;
use crate::dispatch::RpcCall;
use crate::error::{AuthError, ConfigError, OracleError};

/// HTTP status used when no response was received at all (connect error,
/// timeout, TLS failure).
pub const STATUS_TRANSPORT: u16 = 0;

/// Raw reply from a platform call: status plus body text.
///
/// `status == STATUS_TRANSPORT` means the request never produced a response;
/// `body` then carries a short diagnostic instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Reply for a request that never reached the server.
    pub fn transport_failure(detail: impl Into<String>) -> Self {
        Self::new(STATUS_TRANSPORT, detail)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

// ───────────────────────────────────────────────────────────────
// Platform ports (driven adapter: domain ↔ device-management platform)
// ───────────────────────────────────────────────────────────────

/// Credential exchange.
pub trait AuthPort {
    /// Post credentials and return the bearer token.
    fn login(&mut self, username: &str, password: &str) -> Result<String, AuthError>;
}

/// Latest-value telemetry read.
pub trait TelemetryPort {
    /// Fetch the latest value of each of `keys` for the configured device.
    fn latest_values(&mut self, token: &str, keys: &[&str]) -> HttpReply;
}

/// One-way RPC to the device.
pub trait CommandPort {
    fn send_oneway(&mut self, token: &str, call: &RpcCall) -> HttpReply;
}

/// Everything the control loop needs from the platform.  Implemented
/// automatically for any adapter that covers all three concerns.
pub trait PlatformPort: AuthPort + TelemetryPort + CommandPort {}

impl<T: AuthPort + TelemetryPort + CommandPort> PlatformPort for T {}

// ───────────────────────────────────────────────────────────────
// Oracle port (driven adapter: domain → chat-completion service)
// ───────────────────────────────────────────────────────────────

/// Free-text completion service used as the advisory oracle.
pub trait OraclePort {
    /// Send one system + user message pair; return the raw reply text.
    fn complete(&self, system: &str, user: &str) -> Result<String, OracleError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / dashboards)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads supervisor configuration.
///
/// # Security
///
/// Implementations MUST run [`SupervisorConfig::validate`] before returning.
/// Invalid values are rejected with [`ConfigError::ValidationFailed`], not
/// silently clamped.
pub trait ConfigPort {
    fn load(&self) -> Result<SupervisorConfig, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic time source.  Session timestamps, the dispatch rate gate and
/// the link heartbeat all read it.
pub trait TimePort {
    /// Milliseconds since an arbitrary fixed origin.  Never decreases.
    fn uptime_ms(&self) -> u64;
}
