//! Supervisor configuration parameters
//!
//! All tunable parameters for the SmartIron supervisor.
//! Values come from an optional JSON file and the process environment
//! (see [`EnvConfigAdapter`](crate::adapters::env_config::EnvConfigAdapter)).

use core::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// How the advisory oracle is scheduled relative to the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryMode {
    /// A background worker refreshes the advisory on its own cadence;
    /// the loop reads the most recently completed decision.
    Background,
    /// The loop calls the oracle synchronously every iteration.
    Inline,
}

/// Core supervisor configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    // --- Platform ---
    /// Base URL of the device-management platform
    pub platform_url: String,
    /// Platform account user name
    pub username: String,
    /// Platform account password
    pub password: String,
    /// Device whose telemetry is read and to which RPCs are sent
    pub device_id: String,

    // --- Oracle ---
    /// Base URL of the chat-completion service acting as advisory oracle
    pub oracle_url: String,
    /// Model name passed to the oracle
    pub oracle_model: String,
    /// How the oracle is scheduled
    pub advisory_mode: AdvisoryMode,
    /// Background advice older than this many snapshots is discarded and
    /// replaced by the degraded decision
    pub max_advisory_lag: u32,

    // --- Sensor handling ---
    /// Invert the fabric-presence reading (sensor wired active-low)
    pub invert_fabric_sensor: bool,
    /// Link is reported offline when no poll succeeded for this long (seconds)
    pub stale_after_secs: u32,

    // --- Timing ---
    /// Delay between control-loop iterations (milliseconds)
    pub poll_interval_ms: u32,
    /// Minimum spacing between two command dispatches (milliseconds)
    pub dispatch_interval_ms: u32,
    /// Back-off after a failed iteration (milliseconds)
    pub error_backoff_ms: u32,
    /// Background advisory refresh cadence (milliseconds)
    pub advisory_refresh_ms: u32,
    /// Timeout for every platform call (milliseconds)
    pub platform_timeout_ms: u32,
    /// Timeout for one oracle query (milliseconds)
    pub oracle_timeout_ms: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            // Platform
            platform_url: "https://demo.thingsboard.io".into(),
            username: String::new(),
            password: String::new(),
            device_id: String::new(),

            // Oracle
            oracle_url: "http://localhost:11434".into(),
            oracle_model: "llama3".into(),
            advisory_mode: AdvisoryMode::Background,
            // One oracle timeout plus one refresh at the default poll rate.
            max_advisory_lag: 16,

            // Sensor handling
            invert_fabric_sensor: false,
            stale_after_secs: 15,

            // Timing
            poll_interval_ms: 2000,
            dispatch_interval_ms: 2000,
            error_backoff_ms: 5000,
            advisory_refresh_ms: 1000,
            platform_timeout_ms: 2000,
            oracle_timeout_ms: 30_000,
        }
    }
}

// Hand-written so the password never reaches a log line.
impl core::fmt::Debug for SupervisorConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupervisorConfig")
            .field("platform_url", &self.platform_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("oracle_url", &self.oracle_url)
            .field("oracle_model", &self.oracle_model)
            .field("advisory_mode", &self.advisory_mode)
            .field("max_advisory_lag", &self.max_advisory_lag)
            .field("invert_fabric_sensor", &self.invert_fabric_sensor)
            .field("stale_after_secs", &self.stale_after_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("dispatch_interval_ms", &self.dispatch_interval_ms)
            .field("error_backoff_ms", &self.error_backoff_ms)
            .field("advisory_refresh_ms", &self.advisory_refresh_ms)
            .field("platform_timeout_ms", &self.platform_timeout_ms)
            .field("oracle_timeout_ms", &self.oracle_timeout_ms)
            .finish()
    }
}

impl SupervisorConfig {
    /// Reject out-of-range values.  Nothing is clamped: a config that would
    /// silently change loop timing or point at nowhere is refused outright.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("platform_url must not be empty"));
        }
        if self.oracle_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("oracle_url must not be empty"));
        }
        if self.oracle_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("oracle_model must not be empty"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("TB_USERNAME"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("TB_PASSWORD"));
        }
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Missing("DEVICE_ID"));
        }
        let timings = [
            (self.poll_interval_ms, "poll_interval_ms must be > 0"),
            (self.dispatch_interval_ms, "dispatch_interval_ms must be > 0"),
            (self.error_backoff_ms, "error_backoff_ms must be > 0"),
            (self.advisory_refresh_ms, "advisory_refresh_ms must be > 0"),
            (self.platform_timeout_ms, "platform_timeout_ms must be > 0"),
            (self.oracle_timeout_ms, "oracle_timeout_ms must be > 0"),
        ];
        if let Some((_, msg)) = timings.iter().find(|(v, _)| *v == 0) {
            return Err(ConfigError::ValidationFailed(msg));
        }
        if self.max_advisory_lag == 0 {
            return Err(ConfigError::ValidationFailed("max_advisory_lag must be > 0"));
        }
        if self.stale_after_secs == 0 {
            return Err(ConfigError::ValidationFailed("stale_after_secs must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(u64::from(self.error_backoff_ms))
    }

    pub fn advisory_refresh(&self) -> Duration {
        Duration::from_millis(u64::from(self.advisory_refresh_ms))
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.platform_timeout_ms))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.oracle_timeout_ms))
    }
}
