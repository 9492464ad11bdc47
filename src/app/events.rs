//! Outbound events.
//!
//! Produced by the [`DeviceController`](super::controller::DeviceController)
//! and the session protocol, queued on the
//! [`OutboundQueue`](super::queue::OutboundQueue), and consumed exactly
//! once by the session sender, which turns each into one wire frame.

/// One device as listed in `device_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub device_type: String,
    /// State at the time the snapshot was taken.
    pub state: bool,
}

/// Everything the node ever sends to its peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// A device changed state (or reports its initial state).
    Status {
        device_id: String,
        label: String,
        state: bool,
    },

    /// Identity and device list, sent first on every new session.
    DeviceInfo {
        node_id: String,
        devices: Vec<DeviceInfo>,
    },

    /// Keep-alive, sent when nothing else went out for a while.
    Heartbeat { target_id: String },
}

impl OutboundEvent {
    /// Wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::DeviceInfo { .. } => "device_info",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}
