//! Property tests for parsing and the packet pipeline.

use bytes::BytesMut;
use osprey_proto::ssh::codec::{CryptoPipeline, PacketDecoder, PacketEncoder};
use osprey_proto::ssh::crypto::digest::{SHA1, SHA256, SHA512};
use osprey_proto::ssh::crypto::{
    dss_signature_from_der, dss_signature_to_der, AlgorithmRegistry, CipherMode, LockedRandom,
};
use osprey_proto::ssh::keys::{derive_key, SessionKeys};
use osprey_proto::ssh::kex::KexInit;
use osprey_proto::ssh::packet::Packet;
use osprey_proto::ssh::wire::{encode_mpint, WireReader};
use proptest::prelude::*;
use std::sync::Arc;

fn keyed_pair(cipher: &str, mac: &str, seed: u8) -> (PacketEncoder, PacketDecoder) {
    let registry = AlgorithmRegistry::with_random(Arc::new(LockedRandom::from_seed(seed as u64)));
    let keys = SessionKeys::derive(
        &SHA256,
        &[seed; 32],
        &[seed ^ 0xff; 32],
        &[seed ^ 0xff; 32],
        registry.cipher(cipher).unwrap(),
        registry.cipher(cipher).unwrap(),
        registry.mac(mac).unwrap(),
        registry.mac(mac).unwrap(),
    );
    let make = |mode| {
        CryptoPipeline::from_keys(&registry, cipher, mac, "none", &keys.server_to_client, mode, 6)
            .unwrap()
    };

    let mut encoder = PacketEncoder::new(registry.random().clone());
    let mut decoder = PacketDecoder::new();
    encoder.install(make(CipherMode::Encrypt));
    decoder.install(make(CipherMode::Decrypt));
    (encoder, decoder)
}

proptest! {
    /// Arbitrary input never panics the unencrypted parser.
    #[test]
    fn test_packet_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = Packet::from_bytes(&data);
    }

    #[test]
    fn test_kexinit_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        let _ = KexInit::from_bytes(&data);
    }

    /// Payloads survive the keyed pipeline in order, however the wire
    /// bytes are chunked.
    #[test]
    fn test_codec_preserves_payloads(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..600), 1..8),
        chunk in 1usize..97,
        cipher in prop::sample::select(vec!["aes128-ctr", "aes256-cbc", "none"]),
        mac in prop::sample::select(vec!["hmac-sha2-256", "hmac-sha1-96"]),
        seed in any::<u8>(),
    ) {
        let (mut encoder, mut decoder) = keyed_pair(cipher, mac, seed);
        let mut wire = Vec::new();
        for payload in &payloads {
            wire.extend(encoder.encode(payload).unwrap());
        }

        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(payload) = decoder.decode(&mut buf).unwrap() {
                out.push(payload);
            }
        }
        prop_assert_eq!(out, payloads);
        prop_assert!(buf.is_empty());
        prop_assert!(!decoder.is_mid_packet());
    }

    /// Longer derivations extend shorter ones.
    #[test]
    fn test_derive_key_prefix_stable(
        secret in prop::collection::vec(any::<u8>(), 1..64),
        hash in prop::collection::vec(any::<u8>(), 20..64),
        short in 0usize..40,
        extra in 0usize..200,
        letter in b'A'..=b'F',
    ) {
        for digest in [&SHA1, &SHA256, &SHA512] {
            let a = derive_key(digest, &secret, &hash, &hash, letter, short);
            let b = derive_key(digest, &secret, &hash, &hash, letter, short + extra);
            prop_assert_eq!(a.len(), short);
            prop_assert_eq!(b.len(), short + extra);
            prop_assert_eq!(&a[..], &b[..short]);
        }
    }

    /// mpint encoding is minimal and reads back to the trimmed magnitude.
    #[test]
    fn test_mpint_minimal(magnitude in prop::collection::vec(any::<u8>(), 0..80)) {
        let encoded = encode_mpint(&magnitude);
        let mut reader = WireReader::new(&encoded);
        let body = reader.read_string().unwrap();

        let trimmed: Vec<u8> = magnitude.iter().copied().skip_while(|b| *b == 0).collect();
        if trimmed.is_empty() {
            prop_assert!(body.is_empty());
        } else {
            let unsigned = if body[0] == 0 { &body[1..] } else { body };
            prop_assert_eq!(unsigned, trimmed.as_slice());
            prop_assert!(body[0] & 0x80 == 0);
            prop_assert!(body.len() == 1 || body[0] != 0 || body[1] & 0x80 != 0);
        }
    }

    #[test]
    fn test_dss_signature_der_conversion(
        wire in prop::array::uniform32(any::<u8>()),
        tail in prop::array::uniform8(any::<u8>()),
    ) {
        let mut signature = [0u8; 40];
        signature[..32].copy_from_slice(&wire);
        signature[32..].copy_from_slice(&tail);

        let der = dss_signature_to_der(&signature).unwrap();
        prop_assert_eq!(der[0], 0x30);
        prop_assert_eq!(dss_signature_from_der(&der).unwrap(), signature);
    }
}
