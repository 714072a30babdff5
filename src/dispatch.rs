//! Actuation dispatcher and the dispatch rate gate.
//!
//! ```text
//!  FinalCommand ──▶ Dispatcher ──▶ setRelay(relay)              always
//!                       │      ──▶ setBuzzer(true)              buzzer on
//!                       │      ──▶ setBuzzer(false)             once, after a
//!                       │                                       delivered "on"
//!                       └──▶ DispatchOutcome
//! ```
//!
//! The buzzer "off" message is edge-triggered: it is sent only when the
//! device last received `setBuzzer(true)` from us, and repeated on later
//! dispatches until it is delivered.  Delivery failure is never retried
//! within the same dispatch.

use log::{debug, warn};
use serde::Serialize;

use crate::app::ports::CommandPort;
use crate::fsm::context::FinalCommand;
use crate::session::{Session, SessionManager};

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RpcMethod {
    #[serde(rename = "setRelay")]
    SetRelay,
    #[serde(rename = "setBuzzer")]
    SetBuzzer,
}

/// One-way RPC body: `{"method": "setRelay", "params": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RpcCall {
    pub method: RpcMethod,
    pub params: bool,
}

impl RpcCall {
    pub const fn relay(on: bool) -> Self {
        Self {
            method: RpcMethod::SetRelay,
            params: on,
        }
    }

    pub const fn buzzer(on: bool) -> Self {
        Self {
            method: RpcMethod::SetBuzzer,
            params: on,
        }
    }
}

// ---------------------------------------------------------------------------
// Rate gate
// ---------------------------------------------------------------------------

/// Time of the last dispatch attempt.  Owned by the control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    last_dispatch_ms: Option<u64>,
}

impl RateLimitState {
    /// Whether at least `interval_ms` elapsed since the last attempt.
    pub fn ready(&self, now_ms: u64, interval_ms: u64) -> bool {
        self.last_dispatch_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= interval_ms)
    }

    /// Record an attempt at `now_ms`, delivered or not.
    pub fn mark(&mut self, now_ms: u64) {
        self.last_dispatch_ms = Some(now_ms);
    }

    pub fn last_dispatch_ms(&self) -> Option<u64> {
        self.last_dispatch_ms
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every message of this dispatch returned HTTP 200.
    Delivered,
    /// At least one message failed; `status` is the first failure (0 = transport).
    Failed { status: u16 },
    /// The platform refused the token; remaining messages were not sent.
    Unauthorized,
}

impl DispatchOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Delivered
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    /// Device last acknowledged `setBuzzer(true)`.
    buzzer_latched: bool,
    /// Messages acknowledged with HTTP 200.
    delivered: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `command` to the device.
    pub fn dispatch(
        &mut self,
        session: &Session,
        command: &FinalCommand,
        port: &mut impl CommandPort,
    ) -> DispatchOutcome {
        // At most one relay and one buzzer message: the pushes cannot overflow.
        let mut calls: heapless::Vec<RpcCall, 2> = heapless::Vec::new();
        let _ = calls.push(RpcCall::relay(command.relay));
        if command.buzzer {
            let _ = calls.push(RpcCall::buzzer(true));
        } else if self.buzzer_latched {
            let _ = calls.push(RpcCall::buzzer(false));
        }

        let mut first_failure = None;
        for call in &calls {
            let reply = port.send_oneway(session.token(), call);
            if SessionManager::is_expired_response(reply.status) {
                warn!("RPC {:?} refused: token expired", call.method);
                return DispatchOutcome::Unauthorized;
            }
            if reply.is_ok() {
                self.delivered += 1;
                if call.method == RpcMethod::SetBuzzer {
                    self.buzzer_latched = call.params;
                }
                debug!("RPC {:?}({}) delivered", call.method, call.params);
            } else {
                warn!(
                    "RPC {:?}({}) failed with HTTP {}",
                    call.method, call.params, reply.status
                );
                first_failure.get_or_insert(reply.status);
            }
        }

        match first_failure {
            None => DispatchOutcome::Delivered,
            Some(status) => DispatchOutcome::Failed { status },
        }
    }

    pub fn buzzer_latched(&self) -> bool {
        self.buzzer_latched
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}
