//! Credential validation shared by the link adapter and config loading.

use crate::error::ConfigError;

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
pub(crate) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// 1-32 printable ASCII bytes.
pub(crate) fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConfigError::InvalidCredentials(
            "SSID must be 1-32 printable ASCII bytes",
        ));
    }
    Ok(())
}

/// Empty for an open network, otherwise 8-64 bytes (WPA2).
pub(crate) fn validate_password(password: &str) -> Result<(), ConfigError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConfigError::InvalidCredentials(
            "password must be 8-64 bytes, or empty for open networks",
        ));
    }
    Ok(())
}
