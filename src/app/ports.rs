//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   GPIO / WiFi / UDP / clock ──▶ Port trait ──▶ DeviceController, net::*
//! ```
//!
//! Adapters in [`crate::adapters`] and [`crate::drivers`] implement these
//! traits for ESP-IDF (and for the host simulation).  The controller and
//! the network stages consume them via generics or trait objects, so the
//! core never touches hardware or sockets directly and every stage can be
//! driven by mocks in tests.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::error::LinkError;

use super::commands::RemoteCommand;
use super::events::{DeviceInfo, OutboundEvent};

// ───────────────────────────────────────────────────────────────
// Device capability handles (driven adapter: domain ↔ GPIO)
// ───────────────────────────────────────────────────────────────

/// Read side of a device: the physical toggle input.
pub trait InputSense: Send {
    /// Current logic level of the input.
    fn is_high(&mut self) -> bool;
}

/// Write side of a device: the relay output.
pub trait OutputDrive: Send {
    /// Drive the output (`true` = energised).
    fn drive(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Health indicator (driven adapter: domain → LED / console)
// ───────────────────────────────────────────────────────────────

/// What the node wants to tell the person looking at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSignal {
    /// Connected and in session.
    Steady,
    /// Disconnected.
    Off,
    /// A stage failed; blink `times` times.
    Blink { times: u8 },
}

pub trait HealthIndicator: Send + Sync {
    fn signal(&self, signal: HealthSignal);
}

impl<T: HealthIndicator + ?Sized> HealthIndicator for Arc<T> {
    fn signal(&self, signal: HealthSignal) {
        (**self).signal(signal);
    }
}

// ───────────────────────────────────────────────────────────────
// Clock (driven adapter: domain ↔ system timer)
// ───────────────────────────────────────────────────────────────

/// Monotonic time, blocking sleeps and wall-clock timestamps.
///
/// Every wait in the link, discovery and orchestrator stages goes through
/// this port so tests can run them without real delays.
pub trait ClockPort {
    /// Milliseconds since boot (monotonic).
    fn now_ms(&self) -> u64;

    fn sleep(&self, duration: Duration);

    /// Local wall-clock time, used for announcement timestamps.
    fn wall_clock(&self) -> DateTime<FixedOffset>;
}

impl<T: ClockPort + ?Sized> ClockPort for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
    fn wall_clock(&self) -> DateTime<FixedOffset> {
        (**self).wall_clock()
    }
}

impl<T: ClockPort + ?Sized> ClockPort for Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
    fn wall_clock(&self) -> DateTime<FixedOffset> {
        (**self).wall_clock()
    }
}

// ───────────────────────────────────────────────────────────────
// Link driver (driven adapter: domain ↔ WiFi STA)
// ───────────────────────────────────────────────────────────────

/// Association status as reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    /// Associated and holding an address.
    Up,
    /// Hard failure code from the driver (wrong password, AP gone, ...).
    Failed(i32),
}

/// Low-level association primitives; the retry policy lives in
/// [`LinkManager`](crate::net::link::LinkManager).
pub trait LinkDriver {
    /// SSIDs currently visible.
    fn scan(&mut self) -> Result<Vec<String>, LinkError>;

    /// Kick off a non-blocking association.
    fn begin_join(&mut self, ssid: &str, password: &str, country: &str) -> Result<(), LinkError>;

    fn status(&mut self) -> LinkStatus;

    /// Address assigned to this node, once [`LinkStatus::Up`].
    fn local_ip(&self) -> Option<Ipv4Addr>;

    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Datagram transport (driven adapter: domain ↔ UDP)
// ───────────────────────────────────────────────────────────────

pub trait DatagramSocket {
    /// Send one datagram (broadcast destinations allowed).
    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> io::Result<()>;

    /// Wait up to `timeout` for one datagram.  `Ok(None)` on timeout.
    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;
}

pub trait DatagramBinder {
    type Socket: DatagramSocket;

    /// Bind a broadcast-capable socket on `port` (0 = ephemeral).
    fn bind(&mut self, port: u16) -> io::Result<Self::Socket>;
}

// ───────────────────────────────────────────────────────────────
// Session ↔ controller bridge
// ───────────────────────────────────────────────────────────────

/// Where the session sender takes its frames from.
pub trait OutboundSource: Send + Sync {
    /// Atomically remove and return the oldest event, if any.
    fn pop_if_any(&self) -> Option<OutboundEvent>;
}

/// Where the session receiver delivers remote commands.
pub trait CommandSink: Send + Sync {
    fn apply_command(&self, command: &RemoteCommand);
}

/// Snapshot of every device, sent as `device_info` when a session opens.
pub trait DeviceDirectory: Send + Sync {
    fn device_infos(&self) -> Vec<DeviceInfo>;
}
