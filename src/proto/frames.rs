//! Session frames.
//!
//! Every frame is one JSON object on its own line:
//!
//! ```text
//! {"type":"status","data":{"devices":[{"id":"pump","device_type":"relay","label":"Pump","state":"on"}]}}
//! {"type":"device_info","data":{"target_id":"pico-1","devices":[...]}}
//! {"type":"heartbeat","data":{"target_id":"pico-1"}}
//! {"type":"command","data":{"devices":[{"label":"Pump","state":"off"}]}}
//! {"type":"command","data":{"device":"Pump","state":"off"}}
//! ```
//!
//! Commands are accepted in both the `devices` list form and the
//! single-device form; fields missing from `data` are also looked up on
//! the top-level object.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::commands::{RemoteCommand, parse_state, state_str};
use crate::app::events::OutboundEvent;

// ───────────────────────────────────────────────────────────────
// Wire types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

fn default_device_type() -> String {
    "relay".into()
}

/// One entry of a `devices` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl WireDevice {
    /// Id if present, else label.
    pub fn key(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.label)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DevicesPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,
    #[serde(default)]
    devices: Vec<WireDevice>,
}

#[derive(Debug, Serialize)]
struct HeartbeatPayload<'a> {
    target_id: &'a str,
}

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not JSON, or not an object with a string `type`.
    Json(String),
    /// A command without a device or state.
    MissingField(&'static str),
    /// A state other than `on`/`off`.
    BadState(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "invalid frame: {msg}"),
            Self::MissingField(field) => write!(f, "command missing '{field}'"),
            Self::BadState(s) => write!(f, "invalid state '{s}'"),
        }
    }
}

impl std::error::Error for FrameError {}

// ───────────────────────────────────────────────────────────────
// Encoding
// ───────────────────────────────────────────────────────────────

/// Serialize one outbound event as a frame (without the newline).
pub fn encode_event(event: &OutboundEvent) -> Result<Vec<u8>, serde_json::Error> {
    let data = match event {
        OutboundEvent::Status {
            device_id,
            label,
            state,
        } => serde_json::to_value(DevicesPayload {
            target_id: None,
            devices: vec![WireDevice {
                id: Some(device_id.clone()),
                device_type: default_device_type(),
                label: label.clone(),
                state: Some(state_str(*state).into()),
            }],
        })?,
        OutboundEvent::DeviceInfo { node_id, devices } => serde_json::to_value(DevicesPayload {
            target_id: Some(node_id.clone()),
            devices: devices
                .iter()
                .map(|d| WireDevice {
                    id: Some(d.id.clone()),
                    device_type: d.device_type.clone(),
                    label: d.label.clone(),
                    state: Some(state_str(d.state).into()),
                })
                .collect(),
        })?,
        OutboundEvent::Heartbeat { target_id } => {
            serde_json::to_value(HeartbeatPayload { target_id })?
        }
    };

    serde_json::to_vec(&RawFrame {
        kind: event.kind().into(),
        data,
    })
}

// ───────────────────────────────────────────────────────────────
// Decoding
// ───────────────────────────────────────────────────────────────

/// A frame received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Command(Vec<RemoteCommand>),
    Heartbeat,
    /// Status echoed by the peer.
    Status(Vec<WireDevice>),
    /// Well-formed frame of a type the node does not act on.
    Other(String),
}

/// Parse one line received from the peer.
pub fn parse_frame(line: &[u8]) -> Result<InboundFrame, FrameError> {
    let root: Value = serde_json::from_slice(line).map_err(|e| FrameError::Json(e.to_string()))?;
    let kind = root
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FrameError::Json("missing 'type'".into()))?;

    let data = match root.get("data") {
        Some(d) if d.is_object() => d,
        _ => &root,
    };

    match kind {
        "command" => parse_command(data, &root).map(InboundFrame::Command),
        "heartbeat" => Ok(InboundFrame::Heartbeat),
        "status" => {
            let payload = DevicesPayload::deserialize(data)
                .map_err(|e| FrameError::Json(e.to_string()))?;
            Ok(InboundFrame::Status(payload.devices))
        }
        other => Ok(InboundFrame::Other(other.into())),
    }
}

fn parse_command(data: &Value, root: &Value) -> Result<Vec<RemoteCommand>, FrameError> {
    if data.get("devices").is_some() {
        let payload =
            DevicesPayload::deserialize(data).map_err(|e| FrameError::Json(e.to_string()))?;
        if payload.devices.is_empty() {
            return Err(FrameError::MissingField("devices"));
        }
        return payload
            .devices
            .iter()
            .map(|d| {
                if d.key().is_empty() {
                    return Err(FrameError::MissingField("label"));
                }
                let raw = d.state.as_deref().ok_or(FrameError::MissingField("state"))?;
                let state = parse_state(raw).ok_or_else(|| FrameError::BadState(raw.into()))?;
                Ok(RemoteCommand::new(d.key(), state))
            })
            .collect();
    }

    let field = |name: &str| {
        data.get(name)
            .or_else(|| root.get(name))
            .and_then(Value::as_str)
    };
    let device = field("device")
        .or_else(|| field("label"))
        .or_else(|| field("id"))
        .filter(|d| !d.is_empty())
        .ok_or(FrameError::MissingField("device"))?;
    let raw = field("state").ok_or(FrameError::MissingField("state"))?;
    let state = parse_state(raw).ok_or_else(|| FrameError::BadState(raw.into()))?;
    Ok(vec![RemoteCommand::new(device, state)])
}
