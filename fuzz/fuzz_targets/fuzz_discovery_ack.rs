//! Fuzz target: `parse_ack`
//!
//! Any datagram on the discovery port may be hostile.  Checks that the
//! ack parser never panics and never accepts a reply with port 0.
//!
//! cargo fuzz run fuzz_discovery_ack

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaynode::proto::announce::parse_ack;

const SELF_ID: &str = "relay-efcafe";

fuzz_target!(|data: &[u8]| {
    let from = "192.168.1.10:5000".parse().unwrap();
    if let Ok(peer) = parse_ack(data, SELF_ID, from) {
        assert_ne!(peer.port(), 0, "accepted an ack with port 0");
    }
});
