//! Fuzz target: `NodeConfig::from_json`
//!
//! A corrupt config must degrade, not crash: parsing never panics, and any
//! accepted config only contains devices that pass validation with
//! distinct labels.
//!
//! cargo fuzz run fuzz_node_config

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaynode::config::NodeConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(cfg) = NodeConfig::from_json(text) {
        for (i, d) in cfg.devices.iter().enumerate() {
            assert!(d.validate().is_ok(), "accepted an invalid device");
            assert!(
                cfg.devices[..i].iter().all(|o| o.label != d.label),
                "accepted a duplicate label"
            );
        }
    }
});
