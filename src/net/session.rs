//! Session protocol: the long-lived TCP connection to the peer.
//!
//! ```text
//!   Disconnected ──connect()──▶ Connecting ──device_info sent──▶ Established
//!        ▲                                                          │
//!        └──────────────── teardown (first fatal error) ◀───────────┘
//!
//!   Established, inside run():
//!   ┌────────────┐  pop_if_any / heartbeat   ┌──────────┐
//!   │ session-tx │──────────────────────────▶│          │
//!   └────────────┘                           │  TCP     │
//!   ┌────────────┐  line ─▶ frame ─▶ command │  stream  │
//!   │ session-rx │◀──────────────────────────│          │
//!   └────────────┘                           └──────────┘
//!          ▲ both check/flip one ConnectionFlag ▲
//!          └──────── supervisor polls link_up ──┘
//! ```
//!
//! The sender only writes and the receiver only reads.  Whichever side
//! hits a fatal error first closes the [`ConnectionFlag`] and records the
//! reason; the other side sees the flag on its next check and exits, and
//! the stream is shut down so neither stays blocked on I/O.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddrV4, TcpStream};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::app::commands::state_str;
use crate::app::events::OutboundEvent;
use crate::app::ports::{CommandSink, DeviceDirectory, HealthIndicator, HealthSignal, OutboundSource};
use crate::config::TimingConfig;
use crate::error::SessionError;
use crate::proto::codec::{LineDecoder, encode_line};
use crate::proto::frames::{InboundFrame, encode_event, parse_frame};

/// Blink count signalled when a session cannot be opened.
pub const SESSION_FAILURE_BLINKS: u8 = 1;

const SESSION_THREAD_STACK: usize = 8 * 1024;
const READ_CHUNK: usize = 512;
/// Granularity of the supervisor's flag check.
const SUPERVISE_TICK: Duration = Duration::from_millis(20);

// ───────────────────────────────────────────────────────────────
// Settings
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub connect_attempts: u32,
    pub connect_delay: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub idle_sleep: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_decode_failures: u32,
    pub link_check_interval: Duration,
}

impl From<&TimingConfig> for SessionSettings {
    fn from(t: &TimingConfig) -> Self {
        Self {
            connect_attempts: t.session_connect_attempts.max(1),
            connect_delay: Duration::from_millis(t.session_connect_delay_ms),
            connect_timeout: Duration::from_millis(t.session_connect_timeout_ms.max(1)),
            heartbeat_interval: Duration::from_millis(t.heartbeat_interval_ms),
            idle_sleep: Duration::from_millis(t.sender_idle_ms.max(1)),
            read_timeout: Duration::from_millis(t.read_timeout_ms.max(1)),
            write_timeout: Duration::from_millis(t.write_timeout_ms.max(1)),
            max_decode_failures: t.max_decode_failures.max(1),
            link_check_interval: Duration::from_millis(t.link_check_interval_ms),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Connection flag
// ───────────────────────────────────────────────────────────────

/// Shared `connected` flag; closes exactly once.
#[derive(Debug)]
pub struct ConnectionFlag {
    connected: AtomicBool,
    reason: Mutex<Option<SessionError>>,
}

impl Default for ConnectionFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFlag {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            reason: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Flip to disconnected.  Returns `true` only for the first caller,
    /// whose `reason` is kept.
    pub fn close(&self, reason: SessionError) -> bool {
        if self
            .connected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Ok(mut slot) = self.reason.lock() {
            *slot = Some(reason);
        }
        true
    }

    pub fn reason(&self) -> Option<SessionError> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Established,
}

/// The one live connection.
#[derive(Debug)]
pub struct PeerSession {
    pub peer: SocketAddrV4,
    stream: TcpStream,
}

pub struct SessionProtocol<B, H> {
    bridge: B,
    health: H,
    settings: SessionSettings,
    node_id: String,
    state: SessionState,
    active: Option<PeerSession>,
}

impl<B, H> SessionProtocol<B, H>
where
    B: OutboundSource + CommandSink + DeviceDirectory,
    H: HealthIndicator,
{
    pub fn new(bridge: B, health: H, settings: SessionSettings, node_id: impl Into<String>) -> Self {
        Self {
            bridge,
            health,
            settings,
            node_id: node_id.into(),
            state: SessionState::Disconnected,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> Option<SocketAddrV4> {
        self.active.as_ref().map(|s| s.peer)
    }

    /// Open the connection and send `device_info`.
    ///
    /// Any previous session is torn down first.
    pub fn connect(&mut self, peer: SocketAddrV4) -> Result<(), SessionError> {
        self.close();
        self.state = SessionState::Connecting;

        let result = self.open(peer).and_then(|mut stream| {
            self.send_device_info(&mut stream)?;
            Ok(stream)
        });

        match result {
            Ok(stream) => {
                info!("Session: established with {}", peer);
                self.state = SessionState::Established;
                self.active = Some(PeerSession { peer, stream });
                self.health.signal(HealthSignal::Steady);
                Ok(())
            }
            Err(e) => {
                warn!("Session: connect to {} failed: {}", peer, e);
                self.state = SessionState::Disconnected;
                self.health.signal(HealthSignal::Blink {
                    times: SESSION_FAILURE_BLINKS,
                });
                self.health.signal(HealthSignal::Off);
                Err(e)
            }
        }
    }

    /// Run the sender and receiver until the session ends.
    ///
    /// `link_up` is polled every `link_check_interval`; returning `false`
    /// ends the session with [`SessionError::LinkLost`].  Always returns
    /// the reason the session ended, after teardown.
    pub fn run(&mut self, link_up: &mut dyn FnMut() -> bool) -> SessionError {
        let Some(session) = self.active.take() else {
            return SessionError::NoPeer;
        };

        let flag = ConnectionFlag::new();
        let reader = match session.stream.try_clone() {
            Ok(r) => r,
            Err(e) => {
                error!("Session: cannot clone stream: {}", e);
                flag.close(SessionError::Read);
                return self.teardown(&session, &flag);
            }
        };
        if let Err(e) = reader.set_read_timeout(Some(self.settings.read_timeout)) {
            warn!("Session: set_read_timeout failed: {}", e);
        }

        let bridge = &self.bridge;
        let settings = &self.settings;
        let node_id = self.node_id.as_str();
        let writer = &session.stream;
        let flag_ref = &flag;

        thread::scope(|s| {
            let tx = thread::Builder::new()
                .name("session-tx".into())
                .stack_size(SESSION_THREAD_STACK)
                .spawn_scoped(s, move || sender_loop(writer, bridge, flag_ref, settings, node_id));
            let rx = thread::Builder::new()
                .name("session-rx".into())
                .stack_size(SESSION_THREAD_STACK)
                .spawn_scoped(s, move || receiver_loop(reader, bridge, flag_ref, settings));
            if let Err(e) = tx.as_ref().map(|_| ()).and(rx.as_ref().map(|_| ())) {
                error!("Session: thread spawn failed: {}", e);
                flag.close(SessionError::Closed);
            }

            let mut last_check = Instant::now();
            while flag.is_connected() {
                thread::sleep(SUPERVISE_TICK);
                if last_check.elapsed() >= settings.link_check_interval {
                    last_check = Instant::now();
                    if !link_up() {
                        flag.close(SessionError::LinkLost);
                    }
                }
            }
            // Unblock whichever side is still inside read/write.
            let _ = session.stream.shutdown(Shutdown::Both);
        });

        self.teardown(&session, &flag)
    }

    /// Drop the active session, if any, without waiting for the loops.
    pub fn close(&mut self) {
        if let Some(session) = self.active.take() {
            let _ = session.stream.shutdown(Shutdown::Both);
            info!("Session: closed connection to {}", session.peer);
        }
        self.state = SessionState::Disconnected;
    }

    // ── Internals ─────────────────────────────────────────────

    fn open(&mut self, peer: SocketAddrV4) -> Result<TcpStream, SessionError> {
        let attempts = self.settings.connect_attempts;
        for attempt in 1..=attempts {
            info!("Session: connecting to {} ({}/{})", peer, attempt, attempts);
            match TcpStream::connect_timeout(&peer.into(), self.settings.connect_timeout) {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Session: set_nodelay failed: {}", e);
                    }
                    // Bounds how long a peer that stops reading can hold the sender.
                    if let Err(e) = stream.set_write_timeout(Some(self.settings.write_timeout)) {
                        error!("Session: set_write_timeout failed: {}", e);
                        return Err(SessionError::Write);
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    warn!("Session: connect attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        thread::sleep(self.settings.connect_delay);
                    }
                }
            }
        }
        Err(SessionError::Connect { attempts })
    }

    fn send_device_info(&self, stream: &mut TcpStream) -> Result<(), SessionError> {
        let event = OutboundEvent::DeviceInfo {
            node_id: self.node_id.clone(),
            devices: self.bridge.device_infos(),
        };
        let payload = encode_event(&event).map_err(|_| SessionError::Write)?;
        let mut line = Vec::with_capacity(payload.len() + 1);
        encode_line(&payload, &mut line);
        stream.write_all(&line).map_err(|_| SessionError::Write)
    }

    fn teardown(&mut self, session: &PeerSession, flag: &ConnectionFlag) -> SessionError {
        let _ = session.stream.shutdown(Shutdown::Both);
        let reason = flag.reason().unwrap_or(SessionError::Closed);
        warn!("Session: with {} ended: {}", session.peer, reason);
        self.state = SessionState::Disconnected;
        self.health.signal(HealthSignal::Off);
        reason
    }
}

// ───────────────────────────────────────────────────────────────
// Loops
// ───────────────────────────────────────────────────────────────

fn sender_loop<Q: OutboundSource + ?Sized>(
    mut writer: &TcpStream,
    source: &Q,
    flag: &ConnectionFlag,
    settings: &SessionSettings,
    node_id: &str,
) {
    let mut last_sent = Instant::now();
    let mut line = Vec::with_capacity(256);

    while flag.is_connected() {
        let event = match source.pop_if_any() {
            Some(event) => event,
            None if last_sent.elapsed() >= settings.heartbeat_interval => OutboundEvent::Heartbeat {
                target_id: node_id.into(),
            },
            None => {
                thread::sleep(settings.idle_sleep);
                continue;
            }
        };

        let payload = match encode_event(&event) {
            Ok(p) => p,
            Err(e) => {
                error!("Session: cannot encode {} event: {}", event.kind(), e);
                continue;
            }
        };
        line.clear();
        encode_line(&payload, &mut line);

        if let Err(e) = writer.write_all(&line) {
            if flag.close(SessionError::Write) {
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) {
                    warn!("Session: peer stopped reading ({:?} write timeout)", settings.write_timeout);
                } else {
                    warn!("Session: write failed: {}", e);
                }
            }
            break;
        }
        last_sent = Instant::now();

        match &event {
            OutboundEvent::Status { label, state, .. } => {
                info!("Session: sent status {} {}", label, state_str(*state));
            }
            other => debug!("Session: sent {}", other.kind()),
        }
    }
}

fn receiver_loop<S: CommandSink + ?Sized>(
    mut reader: TcpStream,
    sink: &S,
    flag: &ConnectionFlag,
    settings: &SessionSettings,
) {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut failures = 0u32;
    let max_failures = settings.max_decode_failures;

    while flag.is_connected() {
        match reader.read(&mut buf) {
            Ok(0) => {
                if flag.close(SessionError::Closed) {
                    info!("Session: peer closed the connection");
                }
                break;
            }
            Ok(n) => {
                decoder.feed(&buf[..n], |line| {
                    let frame = line
                        .map_err(|e| e.to_string())
                        .and_then(|l| parse_frame(l).map_err(|e| e.to_string()));
                    match frame {
                        Ok(frame) => {
                            failures = 0;
                            dispatch(frame, sink);
                        }
                        Err(e) => {
                            failures += 1;
                            warn!("Session: dropping frame ({}/{}): {}", failures, max_failures, e);
                        }
                    }
                });
                if failures >= max_failures {
                    flag.close(SessionError::Decode { failures });
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                if flag.close(SessionError::Read) {
                    warn!("Session: read failed: {}", e);
                }
                break;
            }
        }
    }
}

fn dispatch<S: CommandSink + ?Sized>(frame: InboundFrame, sink: &S) {
    match frame {
        InboundFrame::Command(commands) => {
            for command in &commands {
                sink.apply_command(command);
            }
        }
        InboundFrame::Heartbeat => debug!("Session: peer heartbeat"),
        InboundFrame::Status(devices) => {
            for d in &devices {
                info!(
                    "Session: peer reports {} {}",
                    d.key(),
                    d.state.as_deref().unwrap_or("?")
                );
            }
        }
        InboundFrame::Other(kind) => debug!("Session: ignoring '{}' frame", kind),
    }
}
