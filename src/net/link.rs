//! Link manager: acquires and watches the wireless association.
//!
//! ```text
//!  acquire():
//!    scan ──▶ SSID visible? ──no──▶ SsidNotFound
//!      │ yes
//!      ▼
//!    ┌─ sub-attempt 1..=N ──────────────────────────────────┐
//!    │  begin_join ─▶ poll status every `poll_interval`     │
//!    │     Up ─▶ settle ─▶ Steady ─▶ Ok(ip)                 │
//!    │     Failed(code) / join timeout ─▶ blink, pause ──┐  │
//!    └───────────────────────────────────────────────────┘──┘
//!    all sub-attempts failed ─▶ Off ─▶ Err
//! ```
//!
//! Backoff between whole acquisitions belongs to the orchestrator; this
//! module only bounds the work done by one `acquire()`.

use std::net::Ipv4Addr;
use std::time::Duration;

use log::{info, warn};

use crate::app::ports::{ClockPort, HealthIndicator, HealthSignal, LinkDriver, LinkStatus};
use crate::config::{NetworkConfig, TimingConfig};
use crate::error::LinkError;

/// Blink count signalled when a link sub-attempt fails.
pub const LINK_FAILURE_BLINKS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    Down,
    Connecting,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub attempts: u32,
    pub join_timeout: Duration,
    pub poll_interval: Duration,
    pub settle: Duration,
    pub retry_pause: Duration,
}

impl From<&TimingConfig> for LinkSettings {
    fn from(t: &TimingConfig) -> Self {
        Self {
            attempts: t.link_attempts.max(1),
            join_timeout: Duration::from_millis(t.link_join_timeout_ms),
            poll_interval: Duration::from_millis(t.link_poll_interval_ms),
            settle: Duration::from_millis(t.link_settle_ms),
            retry_pause: Duration::from_millis(t.link_retry_pause_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
    pub country: String,
}

impl From<&NetworkConfig> for Credentials {
    fn from(n: &NetworkConfig) -> Self {
        Self {
            ssid: n.wifi_ssid.clone(),
            password: n.wifi_password.clone(),
            country: n.country_code.clone(),
        }
    }
}

pub struct LinkManager<D, H, C> {
    driver: D,
    health: H,
    clock: C,
    credentials: Credentials,
    settings: LinkSettings,
    state: AssociationState,
    local_ip: Option<Ipv4Addr>,
}

impl<D, H, C> LinkManager<D, H, C>
where
    D: LinkDriver,
    H: HealthIndicator,
    C: ClockPort,
{
    pub fn new(driver: D, health: H, clock: C, credentials: Credentials, settings: LinkSettings) -> Self {
        Self {
            driver,
            health,
            clock,
            credentials,
            settings,
            state: AssociationState::Down,
            local_ip: None,
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.local_ip
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Associate and return this node's address.
    pub fn acquire(&mut self) -> Result<Ipv4Addr, LinkError> {
        if self.credentials.ssid.is_empty() {
            self.fail(LinkError::NoCredentials);
            return Err(LinkError::NoCredentials);
        }

        if self.state == AssociationState::Up && self.is_up() {
            if let Some(ip) = self.local_ip {
                return Ok(ip);
            }
        }

        self.precheck()?;

        self.state = AssociationState::Connecting;
        let attempts = self.settings.attempts;
        let mut last_err = LinkError::Timeout;

        for attempt in 1..=attempts {
            info!(
                "Link: joining '{}' (attempt {}/{})",
                self.credentials.ssid, attempt, attempts
            );
            match self.join_once() {
                Ok(ip) => {
                    info!("Link: up, IP {} (settling {:?})", ip, self.settings.settle);
                    self.clock.sleep(self.settings.settle);
                    self.state = AssociationState::Up;
                    self.local_ip = Some(ip);
                    self.health.signal(HealthSignal::Steady);
                    return Ok(ip);
                }
                Err(e) => {
                    warn!("Link: attempt {}/{} failed: {}", attempt, attempts, e);
                    self.driver.disconnect();
                    self.health.signal(HealthSignal::Blink {
                        times: LINK_FAILURE_BLINKS,
                    });
                    last_err = e;
                    if attempt < attempts {
                        self.clock.sleep(self.settings.retry_pause);
                    }
                }
            }
        }

        self.fail(last_err.clone());
        Err(last_err)
    }

    /// Cheap liveness check; does not retry anything.
    pub fn is_up(&mut self) -> bool {
        if self.state != AssociationState::Up {
            return false;
        }
        if self.driver.status() == LinkStatus::Up {
            return true;
        }
        warn!("Link: {}", LinkError::Lost);
        self.state = AssociationState::Down;
        self.local_ip = None;
        self.health.signal(HealthSignal::Off);
        false
    }

    /// Drop the association (used before a full pipeline restart).
    pub fn release(&mut self) {
        self.driver.disconnect();
        self.state = AssociationState::Down;
        self.local_ip = None;
    }

    // ── Internals ─────────────────────────────────────────────

    fn precheck(&mut self) -> Result<(), LinkError> {
        match self.driver.scan() {
            Ok(visible) if visible.iter().any(|s| *s == self.credentials.ssid) => Ok(()),
            Ok(visible) => {
                warn!(
                    "Link: SSID '{}' not among {} visible network(s)",
                    self.credentials.ssid,
                    visible.len()
                );
                self.fail(LinkError::SsidNotFound);
                Err(LinkError::SsidNotFound)
            }
            Err(e) => {
                // Some drivers cannot scan while idle; joining still tells us.
                warn!("Link: scan failed ({}), trying to join anyway", e);
                Ok(())
            }
        }
    }

    fn join_once(&mut self) -> Result<Ipv4Addr, LinkError> {
        self.driver.begin_join(
            &self.credentials.ssid,
            &self.credentials.password,
            &self.credentials.country,
        )?;

        let timeout_ms = self.settings.join_timeout.as_millis() as u64;
        let start = self.clock.now_ms();
        loop {
            match self.driver.status() {
                LinkStatus::Up => {
                    if let Some(ip) = self.driver.local_ip() {
                        return Ok(ip);
                    }
                }
                LinkStatus::Failed(status) => return Err(LinkError::AssociationFailed { status }),
                LinkStatus::Idle | LinkStatus::Connecting => {}
            }
            if self.clock.now_ms().saturating_sub(start) >= timeout_ms {
                return Err(LinkError::Timeout);
            }
            self.clock.sleep(self.settings.poll_interval);
        }
    }

    fn fail(&mut self, e: LinkError) {
        warn!("Link: acquisition failed: {}", e);
        self.state = AssociationState::Down;
        self.local_ip = None;
        self.health.signal(HealthSignal::Blink {
            times: LINK_FAILURE_BLINKS,
        });
        self.health.signal(HealthSignal::Off);
    }
}
