//! SSH binary packet framing (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac
//! ```
//!
//! [`Packet`] is the plaintext frame, everything before the MAC. Encryption,
//! MAC and sequence numbers live in [`codec`](crate::ssh::codec).
//!
//! # Constraints
//!
//! - `packet_length` excludes itself and the MAC
//! - `padding_length` is at least 4 and at most 255
//! - `4 + packet_length` is a multiple of `max(cipher block size, 8)`
//! - `packet_length` never exceeds 35000
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::crypto::LockedRandom;
//! use osprey_proto::ssh::packet::Packet;
//!
//! let random = LockedRandom::from_seed(1);
//! let packet = Packet::new(b"SSH_MSG_IGNORE".to_vec(), 16, &random).unwrap();
//! let bytes = packet.to_bytes();
//! assert_eq!(bytes.len() % 16, 0);
//!
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), b"SSH_MSG_IGNORE");
//! ```

use crate::ssh::crypto::Random;
use bytes::{BufMut, BytesMut};
use osprey_platform::{OspreyError, OspreyResult};

/// Maximum `packet_length` accepted or produced.
pub const MAX_PACKET_SIZE: usize = 35000;

/// Minimum padding length in bytes.
pub const MIN_PADDING_LEN: usize = 4;

/// Maximum padding length in bytes.
pub const MAX_PADDING_LEN: usize = 255;

/// Alignment used when the cipher's block is smaller (or there is none).
pub const MIN_BLOCK_SIZE: usize = 8;

/// Plaintext SSH packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    padding: Vec<u8>,
}

/// Smallest valid padding length for a payload at the given block size.
///
/// The aligned span is the whole packet including its 4-byte length field:
/// `4 + 1 + payload_len + padding` is a multiple of the block size.
pub fn padding_length(payload_len: usize, block_size: usize) -> usize {
    let block = block_size.max(MIN_BLOCK_SIZE);
    let unpadded = 5 + payload_len;
    let mut padding = block - unpadded % block;
    if padding < MIN_PADDING_LEN {
        padding += block;
    }
    padding
}

impl Packet {
    /// Frames `payload` with random padding aligned to `block_size`.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Protocol`] if the framed packet would exceed
    /// [`MAX_PACKET_SIZE`].
    pub fn new(payload: Vec<u8>, block_size: usize, random: &dyn Random) -> OspreyResult<Self> {
        let padding_len = padding_length(payload.len(), block_size);
        let packet_length = 1 + payload.len() + padding_len;
        if packet_length > MAX_PACKET_SIZE {
            return Err(OspreyError::Protocol(format!(
                "Packet size {} exceeds maximum {}",
                packet_length, MAX_PACKET_SIZE
            )));
        }

        let mut padding = vec![0u8; padding_len];
        random.fill(&mut padding);

        Ok(Self { payload, padding })
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Padding bytes.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Value of the `packet_length` field.
    pub fn packet_length(&self) -> usize {
        1 + self.payload.len() + self.padding.len()
    }

    /// Serializes the plaintext frame (length, padding length, payload, padding).
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_length = self.packet_length();
        let mut buf = BytesMut::with_capacity(4 + packet_length);
        buf.put_u32(packet_length as u32);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.padding);
        buf.to_vec()
    }

    /// Parses exactly one plaintext frame.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Protocol`] if:
    /// - the data is shorter than the 5-byte header
    /// - `packet_length` exceeds [`MAX_PACKET_SIZE`] or disagrees with the data
    /// - the padding is shorter than 4 bytes or longer than the packet
    pub fn from_bytes(data: &[u8]) -> OspreyResult<Self> {
        if data.len() < 5 {
            return Err(OspreyError::Protocol(format!(
                "Packet too short: {} bytes (minimum 5)",
                data.len()
            )));
        }

        let packet_length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if packet_length > MAX_PACKET_SIZE {
            return Err(OspreyError::Protocol(format!(
                "Packet too large: {} bytes (maximum {})",
                packet_length, MAX_PACKET_SIZE
            )));
        }
        if data.len() - 4 != packet_length {
            return Err(OspreyError::Protocol(format!(
                "Packet length mismatch: header says {}, got {} bytes",
                packet_length,
                data.len() - 4
            )));
        }

        let padding_len = data[4] as usize;
        if padding_len < MIN_PADDING_LEN {
            return Err(OspreyError::Protocol(format!(
                "Padding too short: {} bytes (minimum {})",
                padding_len, MIN_PADDING_LEN
            )));
        }
        if packet_length < 1 + padding_len {
            return Err(OspreyError::Protocol(format!(
                "Invalid packet: packet_length ({}) too small for padding ({})",
                packet_length, padding_len
            )));
        }

        let payload_end = 4 + packet_length - padding_len;
        Ok(Self {
            payload: data[5..payload_end].to_vec(),
            padding: data[payload_end..].to_vec(),
        })
    }
}
