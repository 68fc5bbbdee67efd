//! Fuzz target for unencrypted packet parsing.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run ssh_packet -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use osprey_proto::ssh::Packet;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::from_bytes(data) {
        let serialized = packet.to_bytes();
        let reparsed =
            Packet::from_bytes(&serialized).expect("Re-serialized packet must parse");
        assert_eq!(packet.payload(), reparsed.payload());
        assert_eq!(packet.padding(), reparsed.padding());
    }
});
