//! Discovery: find the peer by broadcasting a self-announcement.
//!
//! ```text
//!  bind (≤ bind_retries) ─▶ ┌─ attempt 1..=N ─────────────────────────────┐
//!                           │ send announce ─▶ wait until deadline:       │
//!                           │   ack with our id ─▶ Ok(peer)               │
//!                           │   anything else   ─▶ log, keep waiting      │
//!                           └─────────────────────────────────────────────┘
//!                           exhausted ─▶ NoAck { attempts }
//! ```
//!
//! The broadcast address comes from the local address and the configured
//! prefix length; the default /24 gives `a.b.c.255`.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::ports::{ClockPort, DatagramBinder, DatagramSocket, HealthIndicator, HealthSignal};
use crate::config::{NetworkConfig, TimingConfig};
use crate::error::DiscoveryError;
use crate::proto::announce::{Announce, parse_ack};

/// Blink count signalled when discovery gives up.
pub const DISCOVERY_FAILURE_BLINKS: u8 = 2;

const MAX_DATAGRAM: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Port the announcement is sent to (and bound locally).
    pub port: u16,
    /// Session port advertised in the announcement.
    pub advertised_port: u16,
    pub subnet_prefix: u8,
    pub attempts: u32,
    pub timeout: Duration,
    pub bind_retries: u32,
    pub bind_pause: Duration,
}

impl DiscoverySettings {
    pub fn new(network: &NetworkConfig, timing: &TimingConfig) -> Self {
        Self {
            port: network.discovery_port,
            advertised_port: network.session_port,
            subnet_prefix: network.subnet_prefix,
            attempts: timing.discovery_attempts.max(1),
            timeout: Duration::from_millis(timing.discovery_timeout_ms),
            bind_retries: timing.discovery_bind_retries.max(1),
            bind_pause: Duration::from_millis(timing.discovery_bind_pause_ms),
        }
    }
}

/// Directed broadcast address of `local`'s subnet.
pub fn broadcast_address(local: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix.min(32));
    let host_mask = u32::MAX.checked_shr(prefix).unwrap_or(0);
    Ipv4Addr::from(u32::from(local) | host_mask)
}

pub struct Discovery<B, H, C> {
    binder: B,
    health: H,
    clock: C,
    settings: DiscoverySettings,
    node_id: String,
    mac: String,
}

impl<B, H, C> Discovery<B, H, C>
where
    B: DatagramBinder,
    H: HealthIndicator,
    C: ClockPort,
{
    pub fn new(
        binder: B,
        health: H,
        clock: C,
        settings: DiscoverySettings,
        node_id: impl Into<String>,
        mac: impl Into<String>,
    ) -> Self {
        Self {
            binder,
            health,
            clock,
            settings,
            node_id: node_id.into(),
            mac: mac.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Announce `self_id` at `local` and wait for a matching ack.
    pub fn announce(&mut self, self_id: &str, local: Ipv4Addr) -> Result<SocketAddrV4, DiscoveryError> {
        let result = self.announce_inner(self_id, local);
        if let Err(e) = &result {
            warn!("Discovery: {}", e);
            self.health.signal(HealthSignal::Blink {
                times: DISCOVERY_FAILURE_BLINKS,
            });
        }
        result
    }

    fn announce_inner(&mut self, self_id: &str, local: Ipv4Addr) -> Result<SocketAddrV4, DiscoveryError> {
        let mut socket = self.bind()?;
        let dest = SocketAddrV4::new(
            broadcast_address(local, self.settings.subnet_prefix),
            self.settings.port,
        );
        let attempts = self.settings.attempts;
        let mut sent_any = false;

        for attempt in 1..=attempts {
            let payload = Announce::new(
                self_id,
                local,
                self.settings.advertised_port,
                &self.mac,
                self.clock.wall_clock(),
            )
            .encode()
            .map_err(|_| DiscoveryError::Send)?;

            info!("Discovery: announce {}/{} to {}", attempt, attempts, dest);
            if let Err(e) = socket.send_to(&payload, dest) {
                warn!("Discovery: send failed: {}", e);
                continue;
            }
            sent_any = true;

            if let Some(peer) = self.await_ack(&mut socket, self_id) {
                info!("Discovery: peer at {}", peer);
                return Ok(peer);
            }
        }

        if sent_any {
            Err(DiscoveryError::NoAck { attempts })
        } else {
            Err(DiscoveryError::Send)
        }
    }

    fn bind(&mut self) -> Result<B::Socket, DiscoveryError> {
        let retries = self.settings.bind_retries;
        for attempt in 1..=retries {
            match self.binder.bind(self.settings.port) {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    warn!(
                        "Discovery: bind :{} attempt {}/{} failed: {}",
                        self.settings.port, attempt, retries, e
                    );
                    if attempt < retries {
                        self.clock.sleep(self.settings.bind_pause);
                    }
                }
            }
        }
        Err(DiscoveryError::Bind)
    }

    /// Wait for one attempt's deadline, ignoring everything but our ack.
    fn await_ack(&mut self, socket: &mut B::Socket, self_id: &str) -> Option<SocketAddrV4> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let deadline = self.clock.now_ms() + self.settings.timeout.as_millis() as u64;

        loop {
            let remaining = deadline.saturating_sub(self.clock.now_ms());
            if remaining == 0 {
                return None;
            }
            match socket.recv_from(&mut buf, Duration::from_millis(remaining)) {
                Ok(Some((len, from))) => match parse_ack(&buf[..len], self_id, from) {
                    Ok(peer) => return Some(peer),
                    Err(e) => debug!("Discovery: ignoring reply from {}: {}", from, e),
                },
                Ok(None) => return None,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return None;
                }
                Err(e) => {
                    warn!("Discovery: receive failed: {}", e);
                    return None;
                }
            }
        }
    }
}
