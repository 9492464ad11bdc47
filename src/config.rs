//! Node configuration.
//!
//! Parsed from the JSON document the node ships with:
//!
//! ```json
//! {
//!   "config":  { "wifi_ssid": "...", "wifi_password": "...", "target_id": "pico-1",
//!                "UdpPort": 5000, "TcpPort": 5001, "timezone": 0 },
//!   "timing":  { "heartbeat_interval_ms": 30000 },
//!   "devices": [ { "label": "Pump", "button_pin": 4, "relay_pin": 5 } ]
//! }
//! ```
//!
//! Every section is optional.  Ports are validated up front and fail fast;
//! device descriptors are validated one at a time and a bad entry only
//! drops that device.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::{device_id, utils};
use crate::error::ConfigError;
use crate::pins;

pub const DEFAULT_DISCOVERY_PORT: u16 = 5000;
pub const DEFAULT_SESSION_PORT: u16 = 5001;
pub const DEFAULT_COUNTRY_CODE: &str = "US";
/// Longest label accepted for a device (bounded by the wire payload budget).
pub const MAX_LABEL_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Network section
// ---------------------------------------------------------------------------

/// Identity and addressing of this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_password: String,
    /// Regulatory domain applied before joining.
    pub country_code: String,
    /// Id announced during discovery and echoed back in the peer's ack.
    pub node_id: String,
    pub discovery_port: u16,
    /// TCP port advertised in the announcement.
    pub session_port: u16,
    /// Offset from UTC, in whole hours, applied to announcement timestamps.
    pub utc_offset_hours: i32,
    /// Prefix length used to derive the broadcast address.
    pub subnet_prefix: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            country_code: DEFAULT_COUNTRY_CODE.into(),
            node_id: device_id::default_node_id(&device_id::read_mac()).as_str().into(),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            session_port: DEFAULT_SESSION_PORT,
            utc_offset_hours: 0,
            subnet_prefix: 24,
        }
    }
}

// ---------------------------------------------------------------------------
// Timing section
// ---------------------------------------------------------------------------

/// Every protocol constant, in milliseconds unless the name says otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    // --- Link ---
    pub link_attempts: u32,
    pub link_join_timeout_ms: u64,
    pub link_poll_interval_ms: u64,
    pub link_settle_ms: u64,
    pub link_retry_pause_ms: u64,
    /// How often the orchestrator checks the link while a session runs.
    pub link_check_interval_ms: u64,

    // --- Backoff (shared shape, separate counter per stage) ---
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,

    // --- Discovery ---
    pub discovery_attempts: u32,
    pub discovery_timeout_ms: u64,
    pub discovery_bind_retries: u32,
    pub discovery_bind_pause_ms: u64,

    // --- Session ---
    pub session_connect_attempts: u32,
    pub session_connect_delay_ms: u64,
    pub session_connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub sender_idle_ms: u64,
    pub read_timeout_ms: u64,
    /// A peer that stops reading for this long ends the session.
    pub write_timeout_ms: u64,
    pub max_decode_failures: u32,

    // --- Devices ---
    pub debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            link_attempts: 5,
            link_join_timeout_ms: 30_000,
            link_poll_interval_ms: 1_000,
            link_settle_ms: 2_000,
            link_retry_pause_ms: 5_000,
            link_check_interval_ms: 1_000,

            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,

            discovery_attempts: 5,
            discovery_timeout_ms: 5_000,
            discovery_bind_retries: 5,
            discovery_bind_pause_ms: 500,

            session_connect_attempts: 3,
            session_connect_delay_ms: 2_000,
            session_connect_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            sender_idle_ms: 1_000,
            read_timeout_ms: 1_000,
            write_timeout_ms: 5_000,
            max_decode_failures: 5,

            debounce_ms: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// Device descriptors
// ---------------------------------------------------------------------------

fn default_device_type() -> String {
    "relay".into()
}

/// One physical toggle input paired with one controllable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable id; defaults to the label when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub label: String,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Input sense GPIO (rising edge = toggle request).
    #[serde(alias = "input")]
    pub button_pin: i64,
    /// Output drive GPIO (HIGH = relay energised).
    #[serde(alias = "output")]
    pub relay_pin: i64,
}

impl DeviceDescriptor {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.label)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.device_type.eq_ignore_ascii_case("relay") {
            return Err(ConfigError::UnsupportedDevice(self.device_type.clone()));
        }
        let label = self.label.trim();
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(ConfigError::Malformed(format!(
                "label must be 1-{MAX_LABEL_LEN} characters"
            )));
        }
        for pin in [self.button_pin, self.relay_pin] {
            if !pins::is_usable_gpio(pin) {
                return Err(ConfigError::InvalidPin(pin));
            }
        }
        if self.button_pin == self.relay_pin {
            return Err(ConfigError::Malformed(format!(
                "button and relay share GPIO {}",
                self.relay_pin
            )));
        }
        Ok(())
    }
}

/// Decode each entry on its own, dropping the ones that fail.
///
/// Entries that do not decode, fail [`DeviceDescriptor::validate`], or
/// reuse a label/id/pin already taken by an earlier entry are logged and
/// skipped.
pub fn parse_device_descriptors(entries: &[Value]) -> Vec<DeviceDescriptor> {
    let mut accepted: Vec<DeviceDescriptor> = Vec::with_capacity(entries.len());

    for (idx, entry) in entries.iter().enumerate() {
        let result = DeviceDescriptor::deserialize(entry)
            .map_err(|e| ConfigError::Malformed(e.to_string()))
            .and_then(|d| {
                d.validate()?;
                Ok(d)
            })
            .and_then(|d| {
                let clash = accepted.iter().any(|a| {
                    a.label.eq_ignore_ascii_case(&d.label)
                        || a.id() == d.id()
                        || [a.button_pin, a.relay_pin].contains(&d.button_pin)
                        || [a.button_pin, a.relay_pin].contains(&d.relay_pin)
                });
                if clash {
                    Err(ConfigError::DuplicateDevice(d.label.clone()))
                } else {
                    Ok(d)
                }
            });

        match result {
            Ok(d) => {
                info!(
                    "Config: device '{}' (button GPIO{}, relay GPIO{})",
                    d.label, d.button_pin, d.relay_pin
                );
                accepted.push(d);
            }
            Err(e) => warn!("Config: skipping device #{}: {}", idx, e),
        }
    }

    accepted
}

// ---------------------------------------------------------------------------
// Whole document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub devices: Vec<DeviceDescriptor>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawNetwork {
    wifi_ssid: String,
    wifi_password: String,
    country_code: Option<String>,
    target_id: Option<String>,
    #[serde(rename = "UdpPort")]
    udp_port: Option<Value>,
    #[serde(rename = "TcpPort")]
    tcp_port: Option<Value>,
    timezone: i32,
    subnet_prefix: Option<u8>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawDocument {
    config: RawNetwork,
    timing: TimingConfig,
    devices: Vec<Value>,
}

fn validate_credentials(raw: &RawNetwork) -> Result<(), ConfigError> {
    if raw.wifi_ssid.is_empty() {
        return Ok(());
    }
    utils::validate_ssid(&raw.wifi_ssid)?;
    utils::validate_password(&raw.wifi_password)
}

fn parse_port(name: &'static str, raw: Option<&Value>, default: u16) -> Result<u16, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    value
        .as_u64()
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| ConfigError::InvalidPort {
            name,
            value: value.to_string(),
        })
}

impl NodeConfig {
    /// Parse and validate a configuration document.
    ///
    /// Only an unreadable document or a bad port is an error.  A bad
    /// network field falls back on its own (invalid credentials leave the
    /// SSID empty) and device entries are vetted one by one, so the
    /// devices that parse are always kept.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let raw: RawDocument =
            serde_json::from_str(doc).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let defaults = NetworkConfig::default();

        let discovery_port =
            parse_port("UdpPort", raw.config.udp_port.as_ref(), defaults.discovery_port)?;
        let session_port =
            parse_port("TcpPort", raw.config.tcp_port.as_ref(), defaults.session_port)?;

        let subnet_prefix = match raw.config.subnet_prefix {
            Some(p) if (8..=30).contains(&p) => p,
            Some(p) => {
                warn!(
                    "Config: subnet_prefix {} outside 8..=30, using /{}",
                    p, defaults.subnet_prefix
                );
                defaults.subnet_prefix
            }
            None => defaults.subnet_prefix,
        };

        // Bad credentials only disable the link; devices still come up.
        let (wifi_ssid, wifi_password) = match validate_credentials(&raw.config) {
            Ok(()) => (raw.config.wifi_ssid, raw.config.wifi_password),
            Err(e) => {
                warn!("Config: {}; WiFi disabled", e);
                (String::new(), String::new())
            }
        };

        let network = NetworkConfig {
            wifi_ssid,
            wifi_password,
            country_code: raw
                .config
                .country_code
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.country_code),
            node_id: raw
                .config
                .target_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or(defaults.node_id),
            discovery_port,
            session_port,
            utc_offset_hours: raw.config.timezone.clamp(-12, 14),
            subnet_prefix,
        };

        let devices = parse_device_descriptors(&raw.devices);
        if devices.is_empty() {
            warn!("Config: no usable devices configured");
        }

        Ok(Self {
            network,
            timing: raw.timing,
            devices,
        })
    }
}
