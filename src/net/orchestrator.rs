//! Orchestrator: the node's permanent run-loop.
//!
//! ```text
//!  ┌──────────▶ Link.acquire ──err──▶ sleep(link backoff) ─────────┐
//!  │                 │ ok (reset link backoff)                      │
//!  │                 ▼                                              │
//!  │          Discovery.announce ──err──▶ sleep(discovery backoff) ─┤
//!  │                 │ ok (reset discovery backoff)                 │
//!  │                 ▼                                              │
//!  │          Session.connect ──err──▶ sleep(session backoff) ──────┤
//!  │                 │ ok (reset session backoff)                   │
//!  │                 ▼                                              │
//!  │          Session.run ──ended──▶ sleep(session backoff) ────────┤
//!  └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure restarts the whole pipeline from the link stage.  Each
//! stage keeps its own backoff, reset when that stage next succeeds.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use log::{info, warn};

use crate::app::backoff::Backoff;
use crate::app::ports::{
    ClockPort, CommandSink, DatagramBinder, DeviceDirectory, HealthIndicator, LinkDriver,
    OutboundSource,
};
use crate::config::TimingConfig;
use crate::error::{DiscoveryError, LinkError, SessionError};

use super::discovery::Discovery;
use super::link::{AssociationState, LinkManager};
use super::session::SessionProtocol;

// ───────────────────────────────────────────────────────────────
// Stage seams
// ───────────────────────────────────────────────────────────────

pub trait LinkStage {
    fn acquire(&mut self) -> Result<Ipv4Addr, LinkError>;
    fn is_up(&mut self) -> bool;
    fn association(&self) -> AssociationState;
}

pub trait DiscoveryStage {
    fn discover(&mut self, local: Ipv4Addr) -> Result<SocketAddrV4, DiscoveryError>;
}

pub trait SessionStage {
    fn connect(&mut self, peer: SocketAddrV4) -> Result<(), SessionError>;
    /// Run until the session ends; returns why.
    fn run(&mut self, link_up: &mut dyn FnMut() -> bool) -> SessionError;
}

impl<D: LinkDriver, H: HealthIndicator, C: ClockPort> LinkStage for LinkManager<D, H, C> {
    fn acquire(&mut self) -> Result<Ipv4Addr, LinkError> {
        LinkManager::acquire(self)
    }
    fn is_up(&mut self) -> bool {
        LinkManager::is_up(self)
    }
    fn association(&self) -> AssociationState {
        self.state()
    }
}

impl<B: DatagramBinder, H: HealthIndicator, C: ClockPort> DiscoveryStage for Discovery<B, H, C> {
    fn discover(&mut self, local: Ipv4Addr) -> Result<SocketAddrV4, DiscoveryError> {
        let id = self.node_id().to_owned();
        self.announce(&id, local)
    }
}

impl<B, H> SessionStage for SessionProtocol<B, H>
where
    B: OutboundSource + CommandSink + DeviceDirectory,
    H: HealthIndicator,
{
    fn connect(&mut self, peer: SocketAddrV4) -> Result<(), SessionError> {
        SessionProtocol::connect(self, peer)
    }
    fn run(&mut self, link_up: &mut dyn FnMut() -> bool) -> SessionError {
        SessionProtocol::run(self, link_up)
    }
}

// ───────────────────────────────────────────────────────────────
// LinkState
// ───────────────────────────────────────────────────────────────

/// Which stage a backoff belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Link,
    Discovery,
    Session,
}

/// Association status plus one backoff per failing stage.
#[derive(Debug, Clone)]
pub struct LinkState {
    pub association: AssociationState,
    pub link: Backoff,
    pub discovery: Backoff,
    pub session: Backoff,
}

impl LinkState {
    pub fn new(timing: &TimingConfig) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(timing.backoff_initial_ms),
            Duration::from_millis(timing.backoff_max_ms),
        );
        Self {
            association: AssociationState::Down,
            link: backoff.clone(),
            discovery: backoff.clone(),
            session: backoff,
        }
    }

    pub fn backoff_mut(&mut self, stage: Stage) -> &mut Backoff {
        match stage {
            Stage::Link => &mut self.link,
            Stage::Discovery => &mut self.discovery,
            Stage::Session => &mut self.session,
        }
    }
}

/// How one pass through the pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    LinkFailed(LinkError),
    DiscoveryFailed(DiscoveryError),
    ConnectFailed(SessionError),
    /// The session was established and later ended.
    SessionEnded(SessionError),
}

impl CycleOutcome {
    pub fn stage(&self) -> Stage {
        match self {
            Self::LinkFailed(_) => Stage::Link,
            Self::DiscoveryFailed(_) => Stage::Discovery,
            Self::ConnectFailed(_) | Self::SessionEnded(_) => Stage::Session,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Orchestrator
// ───────────────────────────────────────────────────────────────

pub struct Orchestrator<L, D, S, C> {
    link: L,
    discovery: D,
    session: S,
    clock: C,
    state: LinkState,
    cycles: u64,
}

impl<L, D, S, C> Orchestrator<L, D, S, C>
where
    L: LinkStage,
    D: DiscoveryStage,
    S: SessionStage,
    C: ClockPort,
{
    pub fn new(link: L, discovery: D, session: S, clock: C, timing: &TimingConfig) -> Self {
        Self {
            link,
            discovery,
            session,
            clock,
            state: LinkState::new(timing),
            cycles: 0,
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// One Link → Discovery → Session pass, including the backoff sleep
    /// for the stage that failed.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        let outcome = self.attempt();
        self.state.association = self.link.association();

        let stage = outcome.stage();
        let delay = self.state.backoff_mut(stage).next_delay();
        warn!(
            "Orchestrator: cycle {} ended at {:?} stage ({:?}); retrying in {:?}",
            self.cycles, stage, outcome, delay
        );
        self.clock.sleep(delay);
        outcome
    }

    /// Never returns.
    pub fn run_forever(&mut self) -> ! {
        info!("Orchestrator: starting network pipeline");
        loop {
            self.run_cycle();
        }
    }

    fn attempt(&mut self) -> CycleOutcome {
        let local = match self.link.acquire() {
            Ok(ip) => ip,
            Err(e) => return CycleOutcome::LinkFailed(e),
        };
        self.state.link.reset();
        self.state.association = AssociationState::Up;

        let peer = match self.discovery.discover(local) {
            Ok(peer) => peer,
            Err(e) => return CycleOutcome::DiscoveryFailed(e),
        };
        self.state.discovery.reset();

        if let Err(e) = self.session.connect(peer) {
            return CycleOutcome::ConnectFailed(e);
        }
        self.state.session.reset();

        let link = &mut self.link;
        let reason = self.session.run(&mut || link.is_up());
        CycleOutcome::SessionEnded(reason)
    }
}
