//! Discovery datagrams.
//!
//! ```text
//! node ──▶ broadcast:  {"action":"announce","id":"pico-1","timestamp":"2025-03-01T12:00:00+01:00",
//!                       "data":{"ip":"192.168.1.40","tcp_port":5001,"mac":"de:ad:be:ef:ca:fe"}}
//! peer ──▶ node:       {"action":"ack","id":"pico-1","data":{"server_ip":"192.168.1.10","tcp_port":6000}}
//! ```

use core::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceData {
    pub ip: String,
    pub tcp_port: u16,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announce {
    pub action: String,
    pub id: String,
    pub timestamp: String,
    pub data: AnnounceData,
}

impl Announce {
    pub fn new(
        id: &str,
        ip: Ipv4Addr,
        tcp_port: u16,
        mac: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            action: "announce".into(),
            id: id.into(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            data: AnnounceData {
                ip: ip.to_string(),
                tcp_port,
                mac: mac.into(),
            },
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Deserialize)]
struct AckData {
    #[serde(default)]
    server_ip: String,
    tcp_port: u16,
}

#[derive(Debug, Deserialize)]
struct RawAck {
    action: String,
    id: String,
    data: AckData,
}

/// Why a reply was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    Malformed(String),
    /// Well-formed, but not an `ack` (e.g. another node's announce).
    NotAck(String),
    /// An ack addressed to another node.
    WrongId(String),
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed reply: {msg}"),
            Self::NotAck(action) => write!(f, "not an ack (action '{action}')"),
            Self::WrongId(id) => write!(f, "ack for '{id}'"),
        }
    }
}

impl std::error::Error for AckError {}

/// Accept `payload` only if it is an ack carrying `self_id`.
///
/// A missing or empty `server_ip` falls back to the datagram's source.
pub fn parse_ack(payload: &[u8], self_id: &str, from: SocketAddr) -> Result<SocketAddrV4, AckError> {
    let ack: RawAck =
        serde_json::from_slice(payload).map_err(|e| AckError::Malformed(e.to_string()))?;
    if ack.action != "ack" {
        return Err(AckError::NotAck(ack.action));
    }
    if ack.id != self_id {
        return Err(AckError::WrongId(ack.id));
    }

    let ip = if ack.data.server_ip.is_empty() {
        match from.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => return Err(AckError::Malformed("IPv6 source".into())),
        }
    } else {
        ack.data
            .server_ip
            .parse::<Ipv4Addr>()
            .map_err(|_| AckError::Malformed(format!("server_ip '{}'", ack.data.server_ip)))?
    };
    if ack.data.tcp_port == 0 {
        return Err(AckError::Malformed("tcp_port 0".into()));
    }
    Ok(SocketAddrV4::new(ip, ack.data.tcp_port))
}
