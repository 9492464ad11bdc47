//! Orchestrator pipeline with scripted stages.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use relaynode::app::controller::DeviceController;
use relaynode::app::ports::HealthSignal;
use relaynode::config::TimingConfig;
use relaynode::error::{DiscoveryError, LinkError, SessionError};
use relaynode::net::link::AssociationState;
use relaynode::net::orchestrator::{
    CycleOutcome, DiscoveryStage, LinkStage, Orchestrator, SessionStage, Stage,
};
use relaynode::net::session::SessionProtocol;

use crate::mocks::{MockClock, RecordingHealth, rig};

const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 40);
const PEER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 6000);

/// Shared call log so tests can assert stage order across mocks.
type Calls = Rc<RefCell<Vec<&'static str>>>;

struct ScriptedLink {
    script: VecDeque<Result<Ipv4Addr, LinkError>>,
    up: bool,
    calls: Calls,
}

impl LinkStage for ScriptedLink {
    fn acquire(&mut self) -> Result<Ipv4Addr, LinkError> {
        self.calls.borrow_mut().push("link");
        let r = self.script.pop_front().unwrap_or(Ok(LOCAL));
        self.up = r.is_ok();
        r
    }
    fn is_up(&mut self) -> bool {
        self.up
    }
    fn association(&self) -> AssociationState {
        if self.up {
            AssociationState::Up
        } else {
            AssociationState::Down
        }
    }
}

struct ScriptedDiscovery {
    script: VecDeque<Result<SocketAddrV4, DiscoveryError>>,
    calls: Calls,
}

impl DiscoveryStage for ScriptedDiscovery {
    fn discover(&mut self, local: Ipv4Addr) -> Result<SocketAddrV4, DiscoveryError> {
        assert_eq!(local, LOCAL);
        self.calls.borrow_mut().push("discovery");
        self.script.pop_front().unwrap_or(Ok(PEER))
    }
}

struct ScriptedSession {
    connects: VecDeque<Result<(), SessionError>>,
    endings: VecDeque<SessionError>,
    calls: Calls,
}

impl SessionStage for ScriptedSession {
    fn connect(&mut self, peer: SocketAddrV4) -> Result<(), SessionError> {
        assert_eq!(peer, PEER);
        self.calls.borrow_mut().push("connect");
        self.connects.pop_front().unwrap_or(Ok(()))
    }
    fn run(&mut self, link_up: &mut dyn FnMut() -> bool) -> SessionError {
        self.calls.borrow_mut().push("run");
        assert!(link_up());
        self.endings.pop_front().unwrap_or(SessionError::Closed)
    }
}

#[derive(Default)]
struct Script {
    link: Vec<Result<Ipv4Addr, LinkError>>,
    discovery: Vec<Result<SocketAddrV4, DiscoveryError>>,
    connects: Vec<Result<(), SessionError>>,
    endings: Vec<SessionError>,
}

type Orch = Orchestrator<ScriptedLink, ScriptedDiscovery, ScriptedSession, Arc<MockClock>>;

fn orchestrator(script: Script) -> (Orch, Arc<MockClock>, Calls) {
    let calls: Calls = Rc::default();
    let clock = MockClock::new();
    let o = Orchestrator::new(
        ScriptedLink {
            script: script.link.into(),
            up: false,
            calls: Rc::clone(&calls),
        },
        ScriptedDiscovery {
            script: script.discovery.into(),
            calls: Rc::clone(&calls),
        },
        ScriptedSession {
            connects: script.connects.into(),
            endings: script.endings.into(),
            calls: Rc::clone(&calls),
        },
        Arc::clone(&clock),
        &TimingConfig::default(),
    );
    (o, clock, calls)
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[test]
fn full_cycle_runs_stages_in_order() {
    let (mut o, clock, calls) = orchestrator(Script::default());

    assert_eq!(o.run_cycle(), CycleOutcome::SessionEnded(SessionError::Closed));
    assert_eq!(*calls.borrow(), vec!["link", "discovery", "connect", "run"]);
    assert_eq!(clock.sleeps(), vec![secs(1)]);
    assert_eq!(o.state().association, AssociationState::Up);
    assert_eq!(o.cycles(), 1);
}

#[test]
fn link_backoff_doubles_to_the_cap() {
    let (mut o, clock, calls) = orchestrator(Script {
        link: vec![Err(LinkError::Timeout); 8],
        ..Script::default()
    });

    for _ in 0..8 {
        assert_eq!(o.run_cycle(), CycleOutcome::LinkFailed(LinkError::Timeout));
    }
    assert_eq!(
        clock.sleeps(),
        [1, 2, 4, 8, 16, 32, 60, 60].map(secs).to_vec()
    );
    assert!(calls.borrow().iter().all(|c| *c == "link"));
    assert_eq!(o.state().association, AssociationState::Down);
}

#[test]
fn discovery_failure_restarts_from_link() {
    let (mut o, clock, calls) = orchestrator(Script {
        discovery: vec![
            Err(DiscoveryError::NoAck { attempts: 5 }),
            Err(DiscoveryError::NoAck { attempts: 5 }),
        ],
        ..Script::default()
    });

    assert_eq!(o.run_cycle().stage(), Stage::Discovery);
    assert_eq!(o.run_cycle().stage(), Stage::Discovery);
    assert_eq!(
        o.run_cycle(),
        CycleOutcome::SessionEnded(SessionError::Closed)
    );
    assert_eq!(
        *calls.borrow(),
        vec![
            "link", "discovery", //
            "link", "discovery", //
            "link", "discovery", "connect", "run",
        ]
    );
    // Discovery backoff 1 s, 2 s; then the session's own first step.
    assert_eq!(clock.sleeps(), vec![secs(1), secs(2), secs(1)]);
}

#[test]
fn each_stage_resets_only_its_own_backoff() {
    let (mut o, clock, _) = orchestrator(Script {
        link: vec![Err(LinkError::Lost), Err(LinkError::Lost), Ok(LOCAL), Err(LinkError::Lost)],
        connects: vec![Err(SessionError::Connect { attempts: 3 })],
        ..Script::default()
    });

    o.run_cycle(); // link 1 s
    o.run_cycle(); // link 2 s
    assert_eq!(
        o.run_cycle(),
        CycleOutcome::ConnectFailed(SessionError::Connect { attempts: 3 })
    ); // session 1 s, link backoff reset
    o.run_cycle(); // link 1 s again

    assert_eq!(clock.sleeps(), vec![secs(1), secs(2), secs(1), secs(1)]);
    assert_eq!(o.state().session.peek(), secs(2));
    assert_eq!(o.state().link.peek(), secs(2));
}

#[test]
fn ended_sessions_back_off_until_one_connects_again() {
    let (mut o, clock, _) = orchestrator(Script {
        connects: vec![
            Ok(()),
            Err(SessionError::Connect { attempts: 3 }),
            Err(SessionError::Connect { attempts: 3 }),
        ],
        endings: vec![SessionError::Write, SessionError::LinkLost],
        ..Script::default()
    });

    assert_eq!(o.run_cycle(), CycleOutcome::SessionEnded(SessionError::Write));
    assert!(matches!(o.run_cycle(), CycleOutcome::ConnectFailed(_)));
    assert!(matches!(o.run_cycle(), CycleOutcome::ConnectFailed(_)));
    // Connect succeeds: session backoff resets before it is used again.
    assert_eq!(o.run_cycle(), CycleOutcome::SessionEnded(SessionError::LinkLost));

    assert_eq!(clock.sleeps(), vec![secs(1), secs(2), secs(4), secs(1)]);
}

// ── Real session over loopback ────────────────────────────────

struct LoopbackDiscovery {
    peer: SocketAddrV4,
    calls: Calls,
}

impl DiscoveryStage for LoopbackDiscovery {
    fn discover(&mut self, _local: Ipv4Addr) -> Result<SocketAddrV4, DiscoveryError> {
        self.calls.borrow_mut().push("discovery");
        Ok(self.peer)
    }
}

fn fast_timing() -> TimingConfig {
    TimingConfig {
        session_connect_attempts: 2,
        session_connect_delay_ms: 10,
        session_connect_timeout_ms: 500,
        heartbeat_interval_ms: 10_000,
        sender_idle_ms: 5,
        read_timeout_ms: 20,
        write_timeout_ms: 300,
        link_check_interval_ms: 20,
        ..TimingConfig::default()
    }
}

#[test]
fn peer_closing_mid_session_restarts_the_whole_pipeline() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, listener.local_addr().unwrap().port());

    // Accept twice; each time read device_info, then hang up.
    let server = thread::spawn(move || {
        let mut kinds = Vec::new();
        for _ in 0..2 {
            let (stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line).unwrap();
            let frame: Value = serde_json::from_str(&line).unwrap();
            kinds.push(frame["type"].as_str().unwrap_or_default().to_owned());
        }
        kinds
    });

    let r = rig(&["Pump"], Duration::from_millis(200));
    let health = RecordingHealth::new();
    let calls: Calls = Rc::default();
    let clock = MockClock::new();
    let timing = fast_timing();
    let session: SessionProtocol<DeviceController, Arc<RecordingHealth>> =
        SessionProtocol::new(r.controller.clone(), Arc::clone(&health), (&timing).into(), "node-1");
    let mut o = Orchestrator::new(
        ScriptedLink {
            script: VecDeque::new(),
            up: false,
            calls: Rc::clone(&calls),
        },
        LoopbackDiscovery {
            peer,
            calls: Rc::clone(&calls),
        },
        session,
        Arc::clone(&clock),
        &timing,
    );

    assert_eq!(o.run_cycle(), CycleOutcome::SessionEnded(SessionError::Closed));
    assert_eq!(o.run_cycle(), CycleOutcome::SessionEnded(SessionError::Closed));

    assert_eq!(server.join().unwrap(), ["device_info", "device_info"]);
    assert_eq!(*calls.borrow(), vec!["link", "discovery", "link", "discovery"]);
    assert_eq!(o.cycles(), 2);
    // A session that connected resets its backoff, so both waits are 1 s.
    assert_eq!(clock.sleeps(), vec![secs(1), secs(1)]);
    assert_eq!(health.last(), Some(HealthSignal::Off));
}
