//! Inbound commands from the peer.
//!
//! Decoded by the session receiver from `command` frames and handed to
//! the [`DeviceController`](super::controller::DeviceController) through
//! the [`CommandSink`](super::ports::CommandSink) port.

/// Set one device to an explicit state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Device id or label, matched case-insensitively.
    pub device: String,
    pub state: bool,
}

impl RemoteCommand {
    pub fn new(device: impl Into<String>, state: bool) -> Self {
        Self {
            device: device.into(),
            state,
        }
    }
}

/// Parse a wire state string (`"on"` / `"off"`, any case).
pub fn parse_state(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("on") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        None
    }
}

/// Inverse of [`parse_state`].
pub fn state_str(state: bool) -> &'static str {
    if state { "on" } else { "off" }
}
