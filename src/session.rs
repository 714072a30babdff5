//! Session manager.
//!
//! Owns the bearer token.  A [`Session`] is immutable once issued; renewal
//! builds a new one and swaps the `Arc`, so holders of the old handle keep a
//! whole (if stale) token and never observe a half-written one.  Only the
//! manager replaces it.

use std::sync::Arc;

use log::{info, warn};

use crate::app::ports::{AuthPort, TimePort};
use crate::error::AuthError;

/// HTTP status that means "token no longer accepted".
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// One issued bearer token.
pub struct Session {
    token: String,
    issued_at_ms: u64,
}

impl Session {
    pub fn new(token: impl Into<String>, issued_at_ms: u64) -> Self {
        Self {
            token: token.into(),
            issued_at_ms,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at_ms(&self) -> u64 {
        self.issued_at_ms
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("token_len", &self.token.len())
            .field("issued_at_ms", &self.issued_at_ms)
            .finish()
    }
}

pub struct SessionManager {
    username: String,
    password: String,
    current: Option<Arc<Session>>,
    /// Successful logins since construction.
    logins: u32,
}

impl SessionManager {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            current: None,
            logins: 0,
        }
    }

    /// Exchange credentials for a token and install it as the current
    /// session.  On failure the previous session (if any) is left untouched.
    pub fn login(
        &mut self,
        auth: &mut impl AuthPort,
        clock: &impl TimePort,
    ) -> Result<Arc<Session>, AuthError> {
        let token = auth.login(&self.username, &self.password)?;
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let session = Arc::new(Session::new(token, clock.uptime_ms()));
        self.current = Some(Arc::clone(&session));
        self.logins += 1;
        info!(
            "Logged in as {} (token {} bytes)",
            self.username,
            session.token().len()
        );
        Ok(session)
    }

    /// Discard the current token unconditionally, then log in again.
    pub fn renew(
        &mut self,
        auth: &mut impl AuthPort,
        clock: &impl TimePort,
    ) -> Result<Arc<Session>, AuthError> {
        self.discard();
        self.login(auth, clock).inspect_err(|e| {
            warn!("Re-login failed: {e}");
        })
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.clone()
    }

    pub fn discard(&mut self) {
        if self.current.take().is_some() {
            info!("Session discarded");
        }
    }

    /// Whether `status` means the token has expired or been revoked.
    pub fn is_expired_response(status: u16) -> bool {
        status == STATUS_UNAUTHORIZED
    }

    pub fn logins(&self) -> u32 {
        self.logins
    }
}
