//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises one subsystem against the mock adapters in
//! `mocks`.  Everything runs on the host with no real hardware; session
//! tests use loopback TCP.

#![cfg(not(target_os = "espidf"))]

mod controller_tests;
mod mocks;
mod orchestrator_tests;
mod session_tests;
