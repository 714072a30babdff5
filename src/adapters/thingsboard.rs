//! ThingsBoard REST adapter.
//!
//! Implements [`AuthPort`], [`TelemetryPort`] and [`CommandPort`] over the
//! platform's HTTP API:
//!
//! | Port          | Request                                                        |
//! |---------------|----------------------------------------------------------------|
//! | AuthPort      | `POST /api/auth/login` `{username, password}` → `{token}`      |
//! | TelemetryPort | `GET /api/plugins/telemetry/DEVICE/{id}/values/timeseries`     |
//! | CommandPort   | `POST /api/plugins/rpc/oneway/{id}` `{method, params}`         |
//!
//! Every call is bounded by the configured platform timeout.  Transport
//! failures never raise: they come back as the status-0 [`HttpReply`].

use log::debug;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::app::ports::{AuthPort, CommandPort, HttpReply, TelemetryPort};
use crate::config::SupervisorConfig;
use crate::dispatch::RpcCall;
use crate::error::{AuthError, TransportError};

/// Header carrying the JWT on every authenticated call.
pub const AUTH_HEADER: &str = "X-Authorization";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginReply {
    #[serde(default)]
    token: Option<String>,
}

pub struct ThingsBoardClient {
    http: Client,
    base_url: String,
    device_id: String,
}

impl ThingsBoardClient {
    pub fn new(config: &SupervisorConfig) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(config.platform_timeout())
            .build()
            .map_err(|e| TransportError::Unreachable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.platform_url.trim_end_matches('/').to_string(),
            device_id: config.device_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(req: RequestBuilder, token: &str) -> RequestBuilder {
        req.header(AUTH_HEADER, format!("Bearer {token}"))
    }

    /// Send `req`, folding every failure into an [`HttpReply`].
    fn exchange(req: RequestBuilder) -> HttpReply {
        match req.send() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().unwrap_or_default();
                HttpReply::new(status, body)
            }
            Err(e) => HttpReply::transport_failure(describe(&e)),
        }
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".into()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

impl AuthPort for ThingsBoardClient {
    fn login(&mut self, username: &str, password: &str) -> Result<String, AuthError> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest { username, password })
            .send()
            .map_err(|e| AuthError::Transport(describe(&e)))?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(AuthError::Rejected { status });
        }
        let reply: LoginReply = resp.json().map_err(|_| AuthError::MissingToken)?;
        reply
            .token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)
    }
}

impl TelemetryPort for ThingsBoardClient {
    fn latest_values(&mut self, token: &str, keys: &[&str]) -> HttpReply {
        let url = self.url(&format!(
            "/api/plugins/telemetry/DEVICE/{}/values/timeseries",
            self.device_id
        ));
        let req = self.http.get(url).query(&[
            ("keys", keys.join(",")),
            ("useStrictDataTypes", "true".to_string()),
        ]);
        let reply = Self::exchange(Self::bearer(req, token));
        debug!("Telemetry read -> HTTP {}", reply.status);
        reply
    }
}

impl CommandPort for ThingsBoardClient {
    fn send_oneway(&mut self, token: &str, call: &RpcCall) -> HttpReply {
        let url = self.url(&format!("/api/plugins/rpc/oneway/{}", self.device_id));
        let req = self.http.post(url).json(call);
        Self::exchange(Self::bearer(req, token))
    }
}
