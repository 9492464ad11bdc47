//! Error taxonomy for the relay node.
//!
//! One enum per failure domain.  The three network-stage errors
//! ([`LinkError`], [`DiscoveryError`], [`SessionError`]) are always
//! recovered by the orchestrator through backoff-and-retry; none of them
//! is ever fatal to the process.  [`ConfigError`] is isolated per device
//! descriptor, except for invalid ports which fail fast at boot.

use core::fmt;

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

/// The wireless association could not be acquired or was lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No SSID configured.
    NoCredentials,
    /// The configured SSID did not show up in the pre-join scan.
    SsidNotFound,
    /// The driver reported a hard failure code during association.
    AssociationFailed { status: i32 },
    /// Every sub-attempt ran into its join timeout.
    Timeout,
    /// The association dropped while it was in use.
    Lost,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::SsidNotFound => write!(f, "configured SSID not visible"),
            Self::AssociationFailed { status } => {
                write!(f, "association failed (status {status})")
            }
            Self::Timeout => write!(f, "association timed out"),
            Self::Lost => write!(f, "association lost"),
        }
    }
}

impl std::error::Error for LinkError {}

// ---------------------------------------------------------------------------
// Discovery errors
// ---------------------------------------------------------------------------

/// No usable acknowledgment was received for our announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The datagram socket could not be bound after every retry.
    Bind,
    /// Sending the broadcast datagram failed.
    Send,
    /// All attempts were exhausted without an accepted acknowledgment.
    NoAck { attempts: u32 },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => write!(f, "could not bind discovery socket"),
            Self::Send => write!(f, "announce send failed"),
            Self::NoAck { attempts } => {
                write!(f, "no matching ack after {attempts} attempts")
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Anything that ends, or prevents, a peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `run` was called with no established session.
    NoPeer,
    /// Every connection attempt failed.
    Connect { attempts: u32 },
    /// Writing a frame to the peer failed.
    Write,
    /// Reading from the peer failed.
    Read,
    /// The peer closed the stream.
    Closed,
    /// Too many consecutive undecodable frames.
    Decode { failures: u32 },
    /// The underlying link went down while the session was active.
    LinkLost,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPeer => write!(f, "no established session"),
            Self::Connect { attempts } => {
                write!(f, "connect failed after {attempts} attempts")
            }
            Self::Write => write!(f, "write failed"),
            Self::Read => write!(f, "read failed"),
            Self::Closed => write!(f, "peer closed the connection"),
            Self::Decode { failures } => {
                write!(f, "{failures} consecutive undecodable frames")
            }
            Self::LinkLost => write!(f, "link lost during session"),
        }
    }
}

impl std::error::Error for SessionError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Invalid configuration input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document (or one device entry) could not be decoded.
    Malformed(String),
    /// A port is not an integer in `0..=65535`.
    InvalidPort { name: &'static str, value: String },
    /// A GPIO number is outside the board's usable range.
    InvalidPin(i64),
    /// SSID or password failed validation.
    InvalidCredentials(&'static str),
    /// Two descriptors share a label.
    DuplicateDevice(String),
    /// Descriptor names a device type this node cannot drive.
    UnsupportedDevice(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed config: {msg}"),
            Self::InvalidPort { name, value } => {
                write!(f, "{name} must be an integer in 0..=65535 (got {value})")
            }
            Self::InvalidPin(pin) => write!(f, "GPIO {pin} out of range"),
            Self::InvalidCredentials(msg) => write!(f, "invalid credentials: {msg}"),
            Self::DuplicateDevice(label) => write!(f, "duplicate device label '{label}'"),
            Self::UnsupportedDevice(kind) => write!(f, "unsupported device type '{kind}'"),
        }
    }
}

impl std::error::Error for ConfigError {}
