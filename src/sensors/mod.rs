//! Telemetry client: authenticated latest-value reads.
//!
//! [`TelemetryClient::fetch`] always returns a structurally valid
//! [`FetchResult`].  Transport failure is the `status == 0` sentinel, an
//! expired token is `status == 401`; in both cases, and for any other
//! non-200 reply, the snapshot is the all-defaults one and the caller
//! decides what to do.

pub mod normalize;

use heapless::Vec;
use log::{debug, warn};

use crate::app::ports::TelemetryPort;
use crate::fsm::context::SensorSnapshot;
use crate::session::Session;

use normalize::{Normalized, TELEMETRY_KEYS};

/// Outcome of one telemetry read.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub snapshot: SensorSnapshot,
    /// HTTP status; `0` when no response was received.
    pub status: u16,
    pub raw_body: String,
    /// Keys that were missing or unusable and fell back to defaults.
    pub defaulted: Vec<&'static str, 3>,
}

impl FetchResult {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

pub struct TelemetryClient {
    invert_fabric: bool,
}

impl TelemetryClient {
    pub fn new(invert_fabric: bool) -> Self {
        Self { invert_fabric }
    }

    pub fn set_inverted(&mut self, invert: bool) {
        self.invert_fabric = invert;
    }

    pub fn is_inverted(&self) -> bool {
        self.invert_fabric
    }

    pub fn fetch(&self, session: &Session, port: &mut impl TelemetryPort) -> FetchResult {
        let reply = port.latest_values(session.token(), &TELEMETRY_KEYS);
        let Normalized {
            snapshot,
            defaulted,
        } = if reply.is_ok() {
            normalize::normalize(&reply.body, self.invert_fabric)
        } else {
            Normalized::all_defaults()
        };

        if reply.is_ok() && !defaulted.is_empty() {
            warn!("Telemetry incomplete, defaulted {:?}", defaulted.as_slice());
        }
        debug!(
            "Telemetry HTTP {}: T={:.1} H={:.1} fabric={}",
            reply.status, snapshot.temperature, snapshot.humidity, snapshot.fabric_present
        );

        FetchResult {
            snapshot,
            status: reply.status,
            raw_body: reply.body,
            defaulted,
        }
    }
}
