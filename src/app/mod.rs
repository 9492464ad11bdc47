//! Application core: device state and the outbound queue, zero I/O.
//!
//! Hardware and network access go through the **port traits** in
//! [`ports`], so the controller and queue are fully testable with mock
//! capability handles.

pub mod backoff;
pub mod commands;
pub mod controller;
pub mod events;
pub mod ports;
pub mod queue;
