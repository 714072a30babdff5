//! Application core: the control loop and its boundary.
//!
//! The business rules (session upkeep, polling, advisory, arbitration,
//! rate-limited dispatch) live in [`service`].  All interaction with the
//! platform and the oracle happens through **port traits** defined in
//! [`ports`], keeping this layer testable without a network.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
