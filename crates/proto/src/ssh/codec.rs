//! Binary packet codec (RFC 4253 Section 6).
//!
//! A [`PacketEncoder`] and a [`PacketDecoder`] each own one direction's
//! [`CryptoPipeline`]: cipher, MAC, compression and sequence number. The
//! two directions share nothing and may be driven independently.
//!
//! # Encoding
//!
//! ```text
//! payload -> compress -> Packet (length, padding length, payload, padding)
//!         -> mac = MAC(seq || plaintext packet) -> encrypt(packet) || mac
//! ```
//!
//! # Decoding
//!
//! The decoder is incremental. It decrypts the first cipher block to learn
//! `packet_length`, checks it, waits for the rest of the packet and the MAC,
//! and verifies the MAC before the payload is parsed or decompressed. A
//! length that cannot be valid is reported as an integrity failure once a
//! MAC is active, since it can only come from tampering or wrong keys.
//!
//! Sequence numbers count every packet in their direction from the start
//! of the connection, wrap at 2^32 and are never reset by rekeying.
//!
//! After any error a decoder or encoder refuses further work: the cipher
//! and compression state can no longer be trusted to match the peer's.
//!
//! # Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use osprey_proto::ssh::codec::{PacketDecoder, PacketEncoder};
//! use osprey_proto::ssh::crypto::LockedRandom;
//! use std::sync::Arc;
//!
//! let mut encoder = PacketEncoder::new(Arc::new(LockedRandom::from_seed(1)));
//! let mut decoder = PacketDecoder::new();
//!
//! let mut wire = BytesMut::from(&encoder.encode(b"\x02hello").unwrap()[..]);
//! assert_eq!(decoder.decode(&mut wire).unwrap().unwrap(), b"\x02hello");
//! assert!(wire.is_empty());
//! ```

use crate::ssh::crypto::{
    cipher, compression, AlgorithmRegistry, Cipher, CipherMode, Compression, CompressionMode, Mac,
    Random,
};
use crate::ssh::keys::DirectionKeys;
use crate::ssh::logging::log_integrity_failure;
use crate::ssh::packet::{Packet, MAX_PACKET_SIZE, MIN_BLOCK_SIZE, MIN_PADDING_LEN};
use bytes::{Buf, BytesMut};
use osprey_platform::{OspreyError, OspreyResult};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Cipher, MAC and compression for one direction of one key generation.
pub struct CryptoPipeline {
    cipher: Box<dyn Cipher>,
    mac: Option<Box<dyn Mac>>,
    compression: Box<dyn Compression>,
    compression_active: bool,
}

impl std::fmt::Debug for CryptoPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoPipeline")
            .field("cipher", &self.cipher.name())
            .field("mac", &self.mac_name())
            .field("compression", &self.compression.name())
            .field("compression_active", &self.compression_active)
            .finish()
    }
}

impl CryptoPipeline {
    /// The pipeline in force before the first NEWKEYS: no cipher, no MAC,
    /// no compression.
    pub fn initial() -> Self {
        Self {
            cipher: Box::new(cipher::NoneCipher),
            mac: None,
            compression: Box::new(compression::NoneCompression),
            compression_active: false,
        }
    }

    /// Builds a pipeline from negotiated names and derived keys.
    ///
    /// `mode` selects the direction: [`CipherMode::Encrypt`] for outgoing
    /// packets, [`CipherMode::Decrypt`] for incoming ones. A delayed
    /// compression method starts inactive.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Configuration`] if a name is not registered
    /// or the key material is too short.
    pub fn from_keys(
        registry: &AlgorithmRegistry,
        cipher: &str,
        mac: &str,
        compression: &str,
        keys: &DirectionKeys,
        mode: CipherMode,
        compression_level: u32,
    ) -> OspreyResult<Self> {
        let cipher_alg = registry.cipher(cipher)?;
        let mac_alg = registry.mac(mac)?;
        let compression_alg = registry.compression(compression)?;

        let compression_mode = match mode {
            CipherMode::Encrypt => CompressionMode::Compress,
            CipherMode::Decrypt => CompressionMode::Decompress,
        };

        Ok(Self {
            cipher: (cipher_alg.make)(mode, &keys.encryption, &keys.iv)?,
            mac: Some((mac_alg.make)(&keys.integrity)?),
            compression: (compression_alg.make)(compression_mode, compression_level)?,
            compression_active: !compression_alg.delayed,
        })
    }

    /// Alignment for packet lengths.
    pub fn block_size(&self) -> usize {
        self.cipher.block_size().max(MIN_BLOCK_SIZE)
    }

    /// Length of the MAC trailing each packet (0 without a MAC).
    pub fn mac_size(&self) -> usize {
        self.mac.as_ref().map_or(0, |m| m.mac_size())
    }

    /// Cipher name.
    pub fn cipher_name(&self) -> &'static str {
        self.cipher.name()
    }

    /// MAC name, `none` without a MAC.
    pub fn mac_name(&self) -> &'static str {
        self.mac.as_ref().map_or("none", |m| m.name())
    }

    /// Compression name.
    pub fn compression_name(&self) -> &'static str {
        self.compression.name()
    }

    /// Whether payloads are currently compressed.
    pub fn compression_active(&self) -> bool {
        self.compression_active
    }

    /// Switches on a delayed compression method.
    pub fn activate_compression(&mut self) {
        self.compression_active = true;
    }

    fn compute_mac(&mut self, sequence: u32, packet: &[u8]) -> Option<Vec<u8>> {
        self.mac.as_mut().map(|mac| {
            mac.update(&sequence.to_be_bytes());
            mac.update(packet);
            mac.finalize()
        })
    }
}

fn poisoned() -> OspreyError {
    OspreyError::Protocol("Packet codec is unusable after a previous error".to_string())
}

/// Outgoing half of the codec.
pub struct PacketEncoder {
    pipeline: CryptoPipeline,
    sequence: u32,
    random: Arc<dyn Random>,
    failed: bool,
}

impl std::fmt::Debug for PacketEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketEncoder")
            .field("pipeline", &self.pipeline)
            .field("sequence", &self.sequence)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl PacketEncoder {
    /// Creates an encoder with the initial pipeline; `random` supplies padding.
    pub fn new(random: Arc<dyn Random>) -> Self {
        Self {
            pipeline: CryptoPipeline::initial(),
            sequence: 0,
            random,
            failed: false,
        }
    }

    /// Encodes one payload into wire bytes and advances the sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Protocol`] if the packet would exceed
    /// [`MAX_PACKET_SIZE`] or compression fails; the encoder is unusable
    /// afterwards.
    pub fn encode(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>> {
        if self.failed {
            return Err(poisoned());
        }
        let result = self.encode_inner(payload);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn encode_inner(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>> {
        let body = if self.pipeline.compression_active {
            self.pipeline.compression.compress(payload)?
        } else {
            payload.to_vec()
        };

        let packet = Packet::new(body, self.pipeline.block_size(), self.random.as_ref())?;
        let mut wire = packet.to_bytes();
        let mac = self.pipeline.compute_mac(self.sequence, &wire);
        self.pipeline.cipher.transform(&mut wire)?;
        if let Some(mac) = mac {
            wire.extend_from_slice(&mac);
        }

        self.sequence = self.sequence.wrapping_add(1);
        Ok(wire)
    }

    /// Replaces the pipeline. Called right after sending NEWKEYS.
    pub fn install(&mut self, pipeline: CryptoPipeline) {
        self.pipeline = pipeline;
    }

    /// Sequence number of the next packet.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Current pipeline.
    pub fn pipeline(&self) -> &CryptoPipeline {
        &self.pipeline
    }

    /// Switches on delayed compression for outgoing packets.
    pub fn activate_compression(&mut self) {
        self.pipeline.activate_compression();
    }
}

/// Incoming half of the codec.
#[derive(Debug)]
pub struct PacketDecoder {
    pipeline: CryptoPipeline,
    sequence: u32,
    max_packet_len: usize,
    first_block: Option<Vec<u8>>,
    failed: bool,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDecoder {
    /// Creates a decoder with the initial pipeline.
    pub fn new() -> Self {
        Self {
            pipeline: CryptoPipeline::initial(),
            sequence: 0,
            max_packet_len: MAX_PACKET_SIZE,
            first_block: None,
            failed: false,
        }
    }

    /// Sets the largest accepted `packet_length`.
    pub fn with_max_packet_len(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    /// Decodes one packet from the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not yet hold a whole packet; the
    /// bytes consumed so far are remembered and the call can be repeated
    /// once more data has arrived.
    ///
    /// # Errors
    ///
    /// - [`OspreyError::Integrity`]: MAC mismatch, or an impossible length
    ///   while a MAC is active
    /// - [`OspreyError::Protocol`]: malformed framing before keys are in
    ///   place, bad padding, or a corrupt compressed payload
    ///
    /// The decoder is unusable after an error.
    pub fn decode(&mut self, buf: &mut BytesMut) -> OspreyResult<Option<Vec<u8>>> {
        if self.failed {
            return Err(poisoned());
        }
        let result = self.decode_inner(buf);
        if result.is_err() {
            self.failed = true;
            self.first_block = None;
        }
        result
    }

    fn decode_inner(&mut self, buf: &mut BytesMut) -> OspreyResult<Option<Vec<u8>>> {
        let block = self.pipeline.block_size();

        if self.first_block.is_none() {
            if buf.len() < block {
                return Ok(None);
            }
            let mut first = buf.split_to(block).to_vec();
            self.pipeline.cipher.transform(&mut first)?;
            self.check_length(packet_length(&first), block)?;
            self.first_block = Some(first);
        }

        let packet_len = self.first_block.as_deref().map_or(0, packet_length);
        let body_len = 4 + packet_len - block;
        let mac_size = self.pipeline.mac_size();
        if buf.len() < body_len + mac_size {
            return Ok(None);
        }

        let mut frame = self.first_block.take().unwrap_or_default();
        let mut rest = buf.split_to(body_len).to_vec();
        self.pipeline.cipher.transform(&mut rest)?;
        frame.extend_from_slice(&rest);

        let received_mac = buf.split_to(mac_size);
        if let Some(computed) = self.pipeline.compute_mac(self.sequence, &frame) {
            if !bool::from(computed.as_slice().ct_eq(&received_mac[..])) {
                log_integrity_failure(self.sequence, "MAC mismatch");
                return Err(OspreyError::Integrity(format!(
                    "MAC verification failed for packet {}",
                    self.sequence
                )));
            }
        }

        let packet = Packet::from_bytes(&frame)?;
        self.sequence = self.sequence.wrapping_add(1);

        if self.pipeline.compression_active {
            self.pipeline.compression.decompress(packet.payload()).map(Some)
        } else {
            Ok(Some(packet.into_payload()))
        }
    }

    fn check_length(&self, packet_len: usize, block: usize) -> OspreyResult<()> {
        let problem = if packet_len > self.max_packet_len {
            Some(format!(
                "Packet length {} exceeds maximum {}",
                packet_len, self.max_packet_len
            ))
        } else if packet_len < 1 + MIN_PADDING_LEN {
            Some(format!("Packet length {} too small", packet_len))
        } else if (4 + packet_len) % block != 0 {
            Some(format!(
                "Packet length {} not aligned to block size {}",
                packet_len, block
            ))
        } else {
            None
        };

        match problem {
            None => Ok(()),
            Some(detail) if self.pipeline.mac.is_some() => {
                log_integrity_failure(self.sequence, &detail);
                Err(OspreyError::Integrity(detail))
            }
            Some(detail) => Err(OspreyError::Protocol(detail)),
        }
    }

    /// Replaces the pipeline. Called right after receiving NEWKEYS.
    pub fn install(&mut self, pipeline: CryptoPipeline) {
        self.pipeline = pipeline;
    }

    /// Sequence number of the next packet.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Current pipeline.
    pub fn pipeline(&self) -> &CryptoPipeline {
        &self.pipeline
    }

    /// Switches on delayed compression for incoming packets.
    pub fn activate_compression(&mut self) {
        self.pipeline.activate_compression();
    }

    /// Whether part of a packet has been consumed.
    pub fn is_mid_packet(&self) -> bool {
        self.first_block.is_some()
    }
}

fn packet_length(first_block: &[u8]) -> usize {
    let mut len = &first_block[..4];
    len.get_u32() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::crypto::digest::SHA256;
    use crate::ssh::crypto::LockedRandom;
    use crate::ssh::keys::SessionKeys;

    fn registry() -> AlgorithmRegistry {
        AlgorithmRegistry::with_random(Arc::new(LockedRandom::from_seed(21)))
    }

    fn keys(seed: u8, cipher: &str, mac: &str) -> SessionKeys {
        let registry = registry();
        let cipher = registry.cipher(cipher).unwrap();
        let mac = registry.mac(mac).unwrap();
        SessionKeys::derive(
            &SHA256,
            &[seed; 32],
            &[seed.wrapping_add(1); 32],
            &[0x55; 32],
            cipher,
            cipher,
            mac,
            mac,
        )
    }

    fn pair(
        cipher: &str,
        mac: &str,
        compression: &str,
        seed: u8,
    ) -> (PacketEncoder, PacketDecoder) {
        let registry = registry();
        let keys = keys(seed, cipher, mac);
        let mut encoder = PacketEncoder::new(registry.random().clone());
        let mut decoder = PacketDecoder::new();
        encoder.install(
            CryptoPipeline::from_keys(
                &registry,
                cipher,
                mac,
                compression,
                &keys.client_to_server,
                CipherMode::Encrypt,
                6,
            )
            .unwrap(),
        );
        decoder.install(
            CryptoPipeline::from_keys(
                &registry,
                cipher,
                mac,
                compression,
                &keys.client_to_server,
                CipherMode::Decrypt,
                6,
            )
            .unwrap(),
        );
        (encoder, decoder)
    }

    fn decode_all(decoder: &mut PacketDecoder, wire: &[u8]) -> OspreyResult<Option<Vec<u8>>> {
        let mut buf = BytesMut::from(wire);
        decoder.decode(&mut buf)
    }

    #[test]
    fn test_initial_round_trip() {
        let mut encoder = PacketEncoder::new(Arc::new(LockedRandom::from_seed(1)));
        let mut decoder = PacketDecoder::new();
        for payload in [&b""[..], b"\x14kexinit", &[0xaa; 1000]] {
            let wire = encoder.encode(payload).unwrap();
            assert_eq!(wire.len() % 8, 0);
            assert_eq!(decode_all(&mut decoder, &wire).unwrap().unwrap(), payload);
        }
        assert_eq!(encoder.sequence(), 3);
        assert_eq!(decoder.sequence(), 3);
    }

    #[test]
    fn test_keyed_round_trip_all_ciphers() {
        for cipher in [
            "aes128-ctr",
            "aes192-ctr",
            "aes256-ctr",
            "aes128-cbc",
            "aes192-cbc",
            "aes256-cbc",
        ] {
            for mac in ["hmac-sha1", "hmac-sha1-96", "hmac-sha2-256", "hmac-sha2-512"] {
                let (mut encoder, mut decoder) = pair(cipher, mac, "none", 1);
                let mut stream = BytesMut::new();
                let payloads: Vec<Vec<u8>> = (0..5).map(|i| vec![i as u8; i * 37]).collect();
                for p in &payloads {
                    stream.extend_from_slice(&encoder.encode(p).unwrap());
                }
                for p in &payloads {
                    assert_eq!(&decoder.decode(&mut stream).unwrap().unwrap(), p);
                }
                assert!(stream.is_empty(), "{} {}", cipher, mac);
            }
        }
    }

    #[test]
    fn test_incremental_decode() {
        let (mut encoder, mut decoder) = pair("aes128-ctr", "hmac-sha2-256", "none", 2);
        let wire = encoder.encode(b"split across reads").unwrap();

        let mut buf = BytesMut::new();
        for byte in &wire[..wire.len() - 1] {
            buf.extend_from_slice(&[*byte]);
            assert!(decoder.decode(&mut buf).unwrap().is_none());
        }
        buf.extend_from_slice(&wire[wire.len() - 1..]);
        assert_eq!(
            decoder.decode(&mut buf).unwrap().unwrap(),
            b"split across reads"
        );
    }

    #[test]
    fn test_wire_layout() {
        let (mut encoder, _) = pair("aes256-cbc", "hmac-sha1-96", "none", 3);
        let wire = encoder.encode(&[0u8; 10]).unwrap();
        // 16-byte aligned packet followed by a 12-byte MAC
        assert_eq!((wire.len() - 12) % 16, 0);
    }

    #[test]
    fn test_every_bit_flip_is_integrity_error() {
        let (mut encoder, _) = pair("aes128-ctr", "hmac-sha2-256", "none", 4);
        let wire = encoder.encode(b"authenticated payload").unwrap();

        for bit in 0..wire.len() * 8 {
            let (_, mut decoder) = pair("aes128-ctr", "hmac-sha2-256", "none", 4);
            let mut tampered = wire.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);

            // A flipped length may ask for more data; supply it.
            let mut buf = BytesMut::from(&tampered[..]);
            buf.extend_from_slice(&vec![0u8; MAX_PACKET_SIZE + 64]);
            match decoder.decode(&mut buf) {
                Err(OspreyError::Integrity(_)) => {}
                other => panic!("bit {}: expected Integrity error, got {:?}", bit, other),
            }
        }
    }

    #[test]
    fn test_decoder_poisoned_after_error() {
        let (mut encoder, mut decoder) = pair("aes128-ctr", "hmac-sha1", "none", 5);
        let mut wire = encoder.encode(b"one").unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xff;
        assert!(decode_all(&mut decoder, &wire).is_err());

        let good = encoder.encode(b"two").unwrap();
        assert!(matches!(
            decode_all(&mut decoder, &good),
            Err(OspreyError::Protocol(_))
        ));
    }

    #[test]
    fn test_old_keys_rejected_after_install() {
        let registry = registry();
        let (mut old_encoder, mut decoder) = pair("aes128-ctr", "hmac-sha2-256", "none", 6);
        let wire = old_encoder.encode(b"before rekey").unwrap();
        assert!(decode_all(&mut decoder, &wire).unwrap().is_some());

        let new_keys = keys(7, "aes128-ctr", "hmac-sha2-256");
        decoder.install(
            CryptoPipeline::from_keys(
                &registry,
                "aes128-ctr",
                "hmac-sha2-256",
                "none",
                &new_keys.client_to_server,
                CipherMode::Decrypt,
                6,
            )
            .unwrap(),
        );

        let stale = old_encoder.encode(b"after rekey").unwrap();
        let mut buf = BytesMut::from(&stale[..]);
        buf.extend_from_slice(&vec![0u8; MAX_PACKET_SIZE + 64]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(OspreyError::Integrity(_))
        ));
    }

    #[test]
    fn test_invalid_length_without_mac_is_protocol_error() {
        let mut decoder = PacketDecoder::new();
        let mut buf = BytesMut::from(&[0xff, 0xff, 0xff, 0xff, 4, 0, 0, 0][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(OspreyError::Protocol(_))
        ));

        let mut decoder = PacketDecoder::new();
        let mut buf = BytesMut::from(&[0, 0, 0, 13, 4, 0, 0, 0][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(OspreyError::Protocol(_))
        ));
    }

    #[test]
    fn test_max_packet_len() {
        let mut encoder = PacketEncoder::new(Arc::new(LockedRandom::from_seed(8)));
        let mut decoder = PacketDecoder::new().with_max_packet_len(64);
        let wire = encoder.encode(&[0u8; 100]).unwrap();
        match decode_all(&mut decoder, &wire) {
            Err(OspreyError::Protocol(msg)) => assert!(msg.contains("exceeds maximum")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_encoder_rejects_oversized_payload() {
        let mut encoder = PacketEncoder::new(Arc::new(LockedRandom::from_seed(9)));
        assert!(encoder.encode(&vec![0u8; MAX_PACKET_SIZE]).is_err());
        assert!(encoder.encode(b"small").is_err());
        assert_eq!(encoder.sequence(), 0);
    }

    #[test]
    fn test_sequence_wraps() {
        let (mut encoder, mut decoder) = pair("aes128-ctr", "hmac-sha1", "none", 10);
        encoder.sequence = u32::MAX;
        decoder.sequence = u32::MAX;

        let wire = encoder.encode(b"last").unwrap();
        assert_eq!(encoder.sequence(), 0);
        assert_eq!(decode_all(&mut decoder, &wire).unwrap().unwrap(), b"last");
        assert_eq!(decoder.sequence(), 0);

        let wire = encoder.encode(b"first again").unwrap();
        assert_eq!(
            decode_all(&mut decoder, &wire).unwrap().unwrap(),
            b"first again"
        );
    }

    #[test]
    fn test_sequence_mismatch_fails_mac() {
        let (mut encoder, mut decoder) = pair("aes128-ctr", "hmac-sha1", "none", 11);
        decoder.sequence = 5;
        let wire = encoder.encode(b"out of step").unwrap();
        assert!(matches!(
            decode_all(&mut decoder, &wire),
            Err(OspreyError::Integrity(_))
        ));
    }

    #[test]
    fn test_zlib_round_trip() {
        let (mut encoder, mut decoder) = pair("aes128-ctr", "hmac-sha2-256", "zlib", 12);
        assert!(encoder.pipeline().compression_active());

        let payload = b"compressible ".repeat(200);
        let mut stream = BytesMut::new();
        for _ in 0..3 {
            let wire = encoder.encode(&payload).unwrap();
            assert!(wire.len() < payload.len());
            stream.extend_from_slice(&wire);
        }
        for _ in 0..3 {
            assert_eq!(decoder.decode(&mut stream).unwrap().unwrap(), payload);
        }
    }

    #[test]
    fn test_delayed_compression() {
        let (mut encoder, mut decoder) =
            pair("aes128-ctr", "hmac-sha2-256", "zlib@openssh.com", 13);
        assert!(!encoder.pipeline().compression_active());

        let payload = vec![b'x'; 2000];
        let wire = encoder.encode(&payload).unwrap();
        assert!(wire.len() > payload.len());
        assert_eq!(decode_all(&mut decoder, &wire).unwrap().unwrap(), payload);

        encoder.activate_compression();
        decoder.activate_compression();
        let wire = encoder.encode(&payload).unwrap();
        assert!(wire.len() < payload.len());
        assert_eq!(decode_all(&mut decoder, &wire).unwrap().unwrap(), payload);
    }

    #[test]
    fn test_unknown_algorithm_is_configuration_error() {
        let registry = registry();
        let keys = keys(14, "aes128-ctr", "hmac-sha1");
        let result = CryptoPipeline::from_keys(
            &registry,
            "aes128-gcm@openssh.com",
            "hmac-sha1",
            "none",
            &keys.client_to_server,
            CipherMode::Encrypt,
            6,
        );
        assert!(matches!(result, Err(OspreyError::Configuration(_))));
    }
}
