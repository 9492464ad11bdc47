//! Mock adapters for integration tests.
//!
//! The clock is virtual: `sleep` advances it instantly and records the
//! requested duration, so backoff and timeout sequences can be asserted
//! exactly.  Sockets and pins record every call.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};

use relaynode::app::controller::{Device, DeviceController};
use relaynode::app::ports::{
    ClockPort, DatagramBinder, DatagramSocket, HealthIndicator, HealthSignal, InputSense,
    OutputDrive,
};

// ── Clock ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockClock {
    now_ms: Mutex<u64>,
    sleeps: Mutex<Vec<Duration>>,
}

impl MockClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advance(&self, d: Duration) {
        *self.now_ms.lock().unwrap() += d.as_millis() as u64;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn clear_sleeps(&self) {
        self.sleeps.lock().unwrap().clear();
    }
}

impl ClockPort for MockClock {
    fn now_ms(&self) -> u64 {
        *self.now_ms.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }

    fn wall_clock(&self) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
            .unwrap()
    }
}

// ── Health ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingHealth {
    signals: Mutex<Vec<HealthSignal>>,
}

impl RecordingHealth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signals(&self) -> Vec<HealthSignal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<HealthSignal> {
        self.signals.lock().unwrap().last().copied()
    }
}

impl HealthIndicator for RecordingHealth {
    fn signal(&self, signal: HealthSignal) {
        self.signals.lock().unwrap().push(signal);
    }
}

// ── Pins ──────────────────────────────────────────────────────

/// A wire both ends can see: tests set the input level and read the
/// output level through clones.
#[derive(Clone, Default)]
pub struct SharedPin(Arc<AtomicBool>);

impl SharedPin {
    pub fn new(high: bool) -> Self {
        Self(Arc::new(AtomicBool::new(high)))
    }

    pub fn set(&self, high: bool) {
        self.0.store(high, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl InputSense for SharedPin {
    fn is_high(&mut self) -> bool {
        self.get()
    }
}

impl OutputDrive for SharedPin {
    fn drive(&mut self, on: bool) {
        self.set(on);
    }
}

pub struct Rig {
    pub controller: DeviceController,
    pub inputs: Vec<SharedPin>,
    pub outputs: Vec<SharedPin>,
}

/// Controller over `labels`, ids `"<label lowercase>"`, inputs held high.
pub fn rig(labels: &[&str], debounce: Duration) -> Rig {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let devices = labels
        .iter()
        .map(|label| {
            let input = SharedPin::new(true);
            let output = SharedPin::new(false);
            inputs.push(input.clone());
            outputs.push(output.clone());
            Device::new(
                label.to_lowercase(),
                *label,
                Box::new(input),
                Box::new(output),
                debounce,
            )
        })
        .collect();
    Rig {
        controller: DeviceController::new(devices),
        inputs,
        outputs,
    }
}

// ── Datagrams ─────────────────────────────────────────────────

/// What the next `recv_from` call sees.
#[derive(Debug, Clone)]
pub enum Reply {
    Datagram(Vec<u8>, SocketAddr),
    /// Nothing arrives; the clock jumps by this much first.
    Silence(Duration),
}

#[derive(Default)]
pub struct NetLog {
    pub sent: Mutex<Vec<(Vec<u8>, SocketAddrV4)>>,
    pub replies: Mutex<VecDeque<Reply>>,
    pub bind_failures: Mutex<u32>,
    pub bound_ports: Mutex<Vec<u16>>,
}

impl NetLog {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

pub struct MockBinder {
    pub log: Arc<NetLog>,
    pub clock: Arc<MockClock>,
}

impl MockBinder {
    pub fn new(clock: Arc<MockClock>) -> (Self, Arc<NetLog>) {
        let log = Arc::new(NetLog::default());
        (
            Self {
                log: Arc::clone(&log),
                clock,
            },
            log,
        )
    }
}

impl DatagramBinder for MockBinder {
    type Socket = MockSocket;

    fn bind(&mut self, port: u16) -> io::Result<MockSocket> {
        let mut failures = self.log.bind_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "port busy"));
        }
        self.log.bound_ports.lock().unwrap().push(port);
        Ok(MockSocket {
            log: Arc::clone(&self.log),
            clock: Arc::clone(&self.clock),
        })
    }
}

pub struct MockSocket {
    log: Arc<NetLog>,
    clock: Arc<MockClock>,
}

impl DatagramSocket for MockSocket {
    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> io::Result<()> {
        self.log.sent.lock().unwrap().push((payload.to_vec(), dest));
        Ok(())
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        let next = self.log.replies.lock().unwrap().pop_front();
        match next {
            Some(Reply::Datagram(bytes, from)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                self.clock.advance(Duration::from_millis(10));
                Ok(Some((n, from)))
            }
            Some(Reply::Silence(d)) => {
                self.clock.advance(d.min(timeout));
                Ok(None)
            }
            None => {
                self.clock.advance(timeout);
                Ok(None)
            }
        }
    }
}
