//! Fuzz target for the incremental packet decoder.
//!
//! Feeds arbitrary bytes in two chunks and checks that the decoder never
//! panics and stays unusable after its first error.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run packet_decoder -- -max_total_time=300
//! ```

#![no_main]
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use osprey_proto::ssh::PacketDecoder;

fuzz_target!(|data: &[u8]| {
    let split = data.first().map(|b| *b as usize % (data.len() + 1)).unwrap_or(0);
    let mut decoder = PacketDecoder::new();
    let mut buf = BytesMut::new();

    for chunk in [&data[..split], &data[split..]] {
        buf.extend_from_slice(chunk);
        loop {
            match decoder.decode(&mut buf) {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    assert!(decoder.decode(&mut buf).is_err());
                    return;
                }
            }
        }
    }
});
