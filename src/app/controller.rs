//! Device controller: owns every relay's state.
//!
//! ```text
//!  edge dispatcher ──▶ on_edge(idx, t) ──┐
//!                                        ├──▶ [lock] state · output · queue
//!  session receiver ─▶ apply(command) ───┘
//! ```
//!
//! Two input paths mutate a device:
//!
//! - **Hardware edge**: debounce-gated toggle.  Accepted only when the
//!   debounce window has elapsed since the last accepted transition and
//!   the input still reads high.
//! - **Remote command**: explicit on/off, no debounce.
//!
//! Both run entirely inside [`SharedState::lock`], so the device state,
//! the output level and the queued `status` event can never disagree, and
//! concurrent edge/command pairs queue in the order they won the lock.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::DeviceDescriptor;
use crate::error::ConfigError;

use super::commands::{RemoteCommand, state_str};
use super::events::{DeviceInfo, OutboundEvent};
use super::ports::{CommandSink, DeviceDirectory, InputSense, OutboundSource, OutputDrive};
use super::queue::SharedState;

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

/// One input/output pair plus its current state.
pub struct Device {
    id: String,
    label: String,
    device_type: String,
    input: Box<dyn InputSense>,
    output: Box<dyn OutputDrive>,
    state: bool,
    /// Timestamp (ms) of the last accepted edge.
    last_transition: Option<u64>,
    debounce_window_ms: u64,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        input: Box<dyn InputSense>,
        output: Box<dyn OutputDrive>,
        debounce_window: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            device_type: "relay".into(),
            input,
            output,
            state: false,
            last_transition: None,
            debounce_window_ms: debounce_window.as_millis() as u64,
        }
    }

    fn matches(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || self.label.eq_ignore_ascii_case(key)
    }

    fn status_event(&self) -> OutboundEvent {
        OutboundEvent::Status {
            device_id: self.id.clone(),
            label: self.label.clone(),
            state: self.state,
        }
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            label: self.label.clone(),
            device_type: self.device_type.clone(),
            state: self.state,
        }
    }

    fn set(&mut self, on: bool) {
        self.state = on;
        self.output.drive(on);
    }
}

// ───────────────────────────────────────────────────────────────
// Outcomes
// ───────────────────────────────────────────────────────────────

/// What happened to one hardware edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Toggle accepted; carries the new state.
    Accepted(bool),
    /// Inside the debounce window of the previous accepted edge.
    Debounced,
    /// The input no longer reads high (spurious edge).
    NotPressed,
    /// No device at that index.
    UnknownDevice,
}

/// What happened to one remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied(bool),
    UnknownDevice,
}

// ───────────────────────────────────────────────────────────────
// DeviceController
// ───────────────────────────────────────────────────────────────

/// Cheap to clone; every clone shares the same devices and queue.
#[derive(Clone)]
pub struct DeviceController {
    shared: Arc<SharedState<Vec<Device>>>,
    labels: Arc<[String]>,
}

impl DeviceController {
    pub fn new(devices: Vec<Device>) -> Self {
        let labels: Arc<[String]> = devices.iter().map(|d| d.label.clone()).collect();
        Self {
            shared: Arc::new(SharedState::new(devices)),
            labels,
        }
    }

    /// Build devices from validated descriptors.
    ///
    /// `bind` turns a descriptor into its capability handles; a descriptor
    /// whose handles cannot be created is logged and skipped.
    pub fn from_descriptors<F>(
        descriptors: &[DeviceDescriptor],
        debounce_window: Duration,
        mut bind: F,
    ) -> Self
    where
        F: FnMut(&DeviceDescriptor) -> Result<(Box<dyn InputSense>, Box<dyn OutputDrive>), ConfigError>,
    {
        let mut devices = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            match bind(desc) {
                Ok((input, output)) => {
                    let mut device = Device::new(desc.id(), &desc.label, input, output, debounce_window);
                    device.device_type.clone_from(&desc.device_type);
                    devices.push(device);
                }
                Err(e) => warn!("Relay: skipping '{}': {}", desc.label, e),
            }
        }
        Self::new(devices)
    }

    /// Drive every output off and queue one `status` per device so a fresh
    /// session learns the full state.
    pub fn setup(&self) {
        self.shared.lock(|devices, queue| {
            for device in devices.iter_mut() {
                device.set(false);
                queue.push(device.status_event());
            }
        });
        info!("Relay: {} device(s) initialised off", self.labels.len());
    }

    // ── Hardware edge path ────────────────────────────────────

    /// Rising edge on device `index` at `now_ms`.
    pub fn on_edge(&self, index: usize, now_ms: u64) -> EdgeOutcome {
        let outcome = self.shared.lock(|devices, queue| {
            let Some(device) = devices.get_mut(index) else {
                return EdgeOutcome::UnknownDevice;
            };
            if let Some(last) = device.last_transition {
                if now_ms.saturating_sub(last) < device.debounce_window_ms {
                    return EdgeOutcome::Debounced;
                }
            }
            if !device.input.is_high() {
                return EdgeOutcome::NotPressed;
            }
            let next = !device.state;
            device.set(next);
            device.last_transition = Some(now_ms);
            queue.push(device.status_event());
            EdgeOutcome::Accepted(next)
        });

        match outcome {
            EdgeOutcome::Accepted(on) => info!(
                "Relay: {} toggled {} by button",
                self.label_of(index),
                state_str(on)
            ),
            EdgeOutcome::Debounced => debug!("Relay: edge on #{} debounced", index),
            EdgeOutcome::NotPressed => debug!("Relay: spurious edge on #{}", index),
            EdgeOutcome::UnknownDevice => warn!("Relay: edge for unknown device #{}", index),
        }
        outcome
    }

    // ── Remote command path ───────────────────────────────────

    /// Set a device by id or label; bypasses debounce.
    pub fn apply(&self, command: &RemoteCommand) -> CommandOutcome {
        let outcome = self.shared.lock(|devices, queue| {
            let Some(device) = devices.iter_mut().find(|d| d.matches(&command.device)) else {
                return CommandOutcome::UnknownDevice;
            };
            device.set(command.state);
            queue.push(device.status_event());
            CommandOutcome::Applied(command.state)
        });

        match outcome {
            CommandOutcome::Applied(on) => {
                info!("Relay: {} set {} by peer", command.device, state_str(on));
            }
            CommandOutcome::UnknownDevice => {
                warn!("Relay: command for unknown device '{}' ignored", command.device);
            }
        }
        outcome
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state_of(&self, device: &str) -> Option<bool> {
        self.shared
            .lock(|devices, _| devices.iter().find(|d| d.matches(device)).map(|d| d.state))
    }

    /// Human-readable state, e.g. `"Pump on"`.
    pub fn describe(&self, device: &str) -> Option<String> {
        self.shared.lock(|devices, _| {
            devices
                .iter()
                .find(|d| d.matches(device))
                .map(|d| format!("{} {}", d.label, state_str(d.state)))
        })
    }

    /// Every device with its current state.
    pub fn device_infos(&self) -> Vec<DeviceInfo> {
        self.shared.lock(|devices, _| devices.iter().map(Device::info).collect())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Events waiting for the session sender.
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    fn label_of(&self, index: usize) -> &str {
        self.labels.get(index).map_or("?", String::as_str)
    }
}

impl OutboundSource for DeviceController {
    fn pop_if_any(&self) -> Option<OutboundEvent> {
        self.shared.pop_if_any()
    }
}

impl DeviceDirectory for DeviceController {
    fn device_infos(&self) -> Vec<DeviceInfo> {
        DeviceController::device_infos(self)
    }
}

impl CommandSink for DeviceController {
    fn apply_command(&self, command: &RemoteCommand) {
        self.apply(command);
    }
}
