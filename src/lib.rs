//! SmartIron supervisor library.
//!
//! Exposes the control loop, its ports and the concrete adapters so the
//! binary and the integration tests build on the same pieces.

#![deny(unused_must_use)]

pub mod adapters;
pub mod advisory;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fsm;
pub mod history;
pub mod safety;
pub mod sensors;
pub mod session;
