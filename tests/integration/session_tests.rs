//! Session protocol over real loopback TCP with short timings.

use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;

use relaynode::app::commands::RemoteCommand;
use relaynode::app::controller::DeviceController;
use relaynode::app::ports::HealthSignal;
use relaynode::error::SessionError;
use relaynode::net::session::{SESSION_FAILURE_BLINKS, SessionProtocol, SessionSettings, SessionState};

use crate::mocks::{RecordingHealth, rig};

type Session = SessionProtocol<DeviceController, Arc<RecordingHealth>>;

fn settings() -> SessionSettings {
    SessionSettings {
        connect_attempts: 2,
        connect_delay: Duration::from_millis(10),
        connect_timeout: Duration::from_millis(500),
        heartbeat_interval: Duration::from_millis(150),
        idle_sleep: Duration::from_millis(5),
        read_timeout: Duration::from_millis(20),
        write_timeout: Duration::from_millis(300),
        max_decode_failures: 3,
        link_check_interval: Duration::from_millis(20),
    }
}

struct Peer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Peer {
    fn next_frame(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        assert!(line.ends_with('\n'), "frame not newline-terminated: {line:?}");
        serde_json::from_str(&line).unwrap()
    }

    fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\n").unwrap();
    }
}

/// Connect a session to a fresh loopback listener.
fn connected(controller: &DeviceController) -> (Session, Peer, Arc<RecordingHealth>) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let health = RecordingHealth::new();
    let mut session = SessionProtocol::new(controller.clone(), Arc::clone(&health), settings(), "node-1");

    session
        .connect(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
        .unwrap();
    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let peer = Peer {
        reader: BufReader::new(stream.try_clone().unwrap()),
        writer: stream,
    };
    (session, peer, health)
}

fn spawn_run(
    mut session: Session,
    mut link_up: impl FnMut() -> bool + Send + 'static,
) -> JoinHandle<(Session, SessionError)> {
    thread::spawn(move || {
        let reason = session.run(&mut link_up);
        (session, reason)
    })
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn device_info_then_queue_then_heartbeat() {
    let r = rig(&["Pump"], Duration::from_millis(200));
    r.controller.setup();
    let (session, mut peer, health) = connected(&r.controller);
    assert_eq!(session.state(), SessionState::Established);
    assert_eq!(health.last(), Some(HealthSignal::Steady));

    let info = peer.next_frame();
    assert_eq!(info["type"], "device_info");
    assert_eq!(info["data"]["target_id"], "node-1");
    assert_eq!(info["data"]["devices"][0]["label"], "Pump");

    let run = spawn_run(session, || true);

    let status = peer.next_frame();
    assert_eq!(status["type"], "status");
    assert_eq!(status["data"]["devices"][0]["state"], "off");

    let heartbeat = peer.next_frame();
    assert_eq!(heartbeat["type"], "heartbeat");
    assert_eq!(heartbeat["data"]["target_id"], "node-1");

    drop(peer);
    let (session, reason) = run.join().unwrap();
    assert_eq!(reason, SessionError::Closed);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(health.last(), Some(HealthSignal::Off));
}

#[test]
fn new_session_reports_current_state() {
    let r = rig(&["Pump", "Light"], Duration::from_millis(200));
    r.controller.on_edge(1, 1_000);
    let (_session, mut peer, _) = connected(&r.controller);

    let info = peer.next_frame();
    assert_eq!(info["data"]["devices"][0]["state"], "off");
    assert_eq!(info["data"]["devices"][1]["state"], "on");
}

#[test]
fn peer_commands_reach_the_device() {
    let r = rig(&["Pump"], Duration::from_millis(200));
    let (session, mut peer, _) = connected(&r.controller);
    peer.next_frame();
    let run = spawn_run(session, || true);

    peer.send(r#"{"type":"command","data":{"devices":[{"label":"pump","state":"ON"}]}}"#);
    wait_for(|| r.controller.state_of("Pump") == Some(true));
    assert!(r.outputs[0].get());

    let status = peer.next_frame();
    assert_eq!(status["type"], "status");
    assert_eq!(status["data"]["devices"][0]["label"], "Pump");
    assert_eq!(status["data"]["devices"][0]["state"], "on");

    // Single-device form; an unknown device is ignored without a status.
    peer.send(r#"{"type":"command","data":{"device":"Heater","state":"on"}}"#);
    peer.send(r#"{"type":"command","data":{"device":"Pump","state":"off"}}"#);
    wait_for(|| r.controller.state_of("Pump") == Some(false));
    let status = peer.next_frame();
    assert_eq!(status["data"]["devices"][0]["state"], "off");

    drop(peer);
    assert_eq!(run.join().unwrap().1, SessionError::Closed);
}

#[test]
fn one_bad_frame_is_tolerated_but_a_stream_of_them_is_not() {
    let r = rig(&["Pump"], Duration::from_millis(200));
    let (session, mut peer, _) = connected(&r.controller);
    peer.next_frame();
    let run = spawn_run(session, || true);

    peer.send("garbage");
    peer.send(r#"{"type":"command","data":{"device":"Pump","state":"on"}}"#);
    wait_for(|| r.controller.state_of("Pump") == Some(true));

    peer.send("{");
    peer.send(r#"{"type":"command","data":{"device":"Pump","state":"maybe"}}"#);
    peer.send("[]");

    let (_, reason) = run.join().unwrap();
    assert_eq!(reason, SessionError::Decode { failures: 3 });
}

#[test]
fn peer_that_stops_reading_ends_the_session() {
    let r = rig(&["Pump"], Duration::from_millis(200));
    let (session, mut peer, health) = connected(&r.controller);
    peer.next_frame();

    // Far more than the loopback socket buffers can hold.
    for i in 0..200_000 {
        r.controller.apply(&RemoteCommand::new("pump", i % 2 == 0));
    }
    let run = spawn_run(session, || true);

    let deadline = Instant::now() + Duration::from_secs(20);
    while !run.is_finished() {
        assert!(Instant::now() < deadline, "sender still blocked on a stalled peer");
        thread::sleep(Duration::from_millis(20));
    }
    let (session, reason) = run.join().unwrap();
    assert_eq!(reason, SessionError::Write);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(health.last(), Some(HealthSignal::Off));
    assert!(r.controller.pending() > 0);
    drop(peer);
}

#[test]
fn link_loss_ends_the_session() {
    let r = rig(&["Pump"], Duration::from_millis(200));
    let (session, mut peer, health) = connected(&r.controller);
    peer.next_frame();

    let mut checks = 0;
    let run = spawn_run(session, move || {
        checks += 1;
        checks < 3
    });

    let (session, reason) = run.join().unwrap();
    assert_eq!(reason, SessionError::LinkLost);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(health.last(), Some(HealthSignal::Off));
}

#[test]
fn refused_connection_exhausts_attempts() {
    let port = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let r = rig(&["Pump"], Duration::from_millis(200));
    let health = RecordingHealth::new();
    let mut session = SessionProtocol::new(r.controller.clone(), Arc::clone(&health), settings(), "node-1");

    assert_eq!(
        session.connect(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)),
        Err(SessionError::Connect { attempts: 2 })
    );
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(
        health.signals(),
        vec![
            HealthSignal::Blink {
                times: SESSION_FAILURE_BLINKS
            },
            HealthSignal::Off,
        ]
    );
    assert_eq!(session.run(&mut || true), SessionError::NoPeer);
}
