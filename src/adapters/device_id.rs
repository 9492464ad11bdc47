//! Node identity derived from the ESP32 factory MAC address.
//!
//! The MAC is reported in every discovery announcement, and its last three
//! bytes form the fallback node id (`relay-xxyyzz`) used when the
//! configuration does not name one.

use core::fmt::Write;

/// Fallback node id: "relay-xxyyzz".
pub type NodeIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Colon-separated lowercase hex, as carried in the announcement payload.
pub fn mac_string(mac: &MacAddress) -> heapless::String<17> {
    let mut s = heapless::String::<17>::new();
    for (i, b) in mac.iter().enumerate() {
        let sep = if i == 0 { "" } else { ":" };
        let _ = write!(s, "{sep}{b:02x}");
    }
    s
}

/// Node id used when none is configured.
pub fn default_node_id(mac: &MacAddress) -> NodeIdString {
    let mut id = NodeIdString::new();
    let _ = write!(id, "relay-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    id
}
