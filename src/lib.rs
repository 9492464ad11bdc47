//! RelayNode firmware library.
//!
//! Exposes the pure-logic layers (device controller, outbound queue,
//! link/discovery/session/orchestrator stages, wire formats) for
//! integration testing.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module and has a host
//! simulation counterpart.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod net;
pub mod pins;
pub mod proto;

pub mod adapters;
pub mod drivers;
