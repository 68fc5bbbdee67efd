//! SSH transport layer message numbers (RFC 4253 Section 12).
//!
//! Only the transport range is handled here:
//!
//! - **Transport layer generic** (1-19): disconnect, ignore, debug, service
//! - **Algorithm negotiation** (20-29): KEXINIT, NEWKEYS
//! - **Key exchange method** (30-49): KEXDH_INIT, KEXDH_REPLY
//!
//! Higher layers (authentication, connection) travel as opaque payloads.
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::message::MessageType;
//!
//! let msg_type = MessageType::KexInit;
//! assert_eq!(msg_type as u8, 20);
//! ```

use crate::ssh::wire::{put_string, WireReader};
use bytes::{BufMut, BytesMut};
use osprey_platform::{OspreyError, OspreyResult};

/// Transport layer message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Disconnect message - terminates the connection.
    Disconnect = 1,
    /// Ignore message - padding or keep-alive.
    Ignore = 2,
    /// Unimplemented message - response to unknown message type.
    Unimplemented = 3,
    /// Debug message - debugging information.
    Debug = 4,
    /// Service request.
    ServiceRequest = 5,
    /// Service accept.
    ServiceAccept = 6,
    /// Key exchange init - algorithm negotiation.
    KexInit = 20,
    /// New keys - signals transition to new keys.
    NewKeys = 21,
    /// Diffie-Hellman / X25519 key exchange init.
    KexdhInit = 30,
    /// Diffie-Hellman / X25519 key exchange reply.
    KexdhReply = 31,
}

impl MessageType {
    /// Converts a byte to a message type.
    ///
    /// # Example
    ///
    /// ```rust
    /// use osprey_proto::ssh::message::MessageType;
    ///
    /// assert_eq!(MessageType::from_u8(20), Some(MessageType::KexInit));
    /// assert_eq!(MessageType::from_u8(94), None);
    /// ```
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageType::Disconnect),
            2 => Some(MessageType::Ignore),
            3 => Some(MessageType::Unimplemented),
            4 => Some(MessageType::Debug),
            5 => Some(MessageType::ServiceRequest),
            6 => Some(MessageType::ServiceAccept),
            20 => Some(MessageType::KexInit),
            21 => Some(MessageType::NewKeys),
            30 => Some(MessageType::KexdhInit),
            31 => Some(MessageType::KexdhReply),
            _ => None,
        }
    }

    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Disconnect => "SSH_MSG_DISCONNECT",
            MessageType::Ignore => "SSH_MSG_IGNORE",
            MessageType::Unimplemented => "SSH_MSG_UNIMPLEMENTED",
            MessageType::Debug => "SSH_MSG_DEBUG",
            MessageType::ServiceRequest => "SSH_MSG_SERVICE_REQUEST",
            MessageType::ServiceAccept => "SSH_MSG_SERVICE_ACCEPT",
            MessageType::KexInit => "SSH_MSG_KEXINIT",
            MessageType::NewKeys => "SSH_MSG_NEWKEYS",
            MessageType::KexdhInit => "SSH_MSG_KEXDH_INIT",
            MessageType::KexdhReply => "SSH_MSG_KEXDH_REPLY",
        }
    }

    /// Whether the number belongs to the key exchange ranges (20-49).
    pub fn is_kex(byte: u8) -> bool {
        (20..=49).contains(&byte)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// Disconnect reason codes (RFC 4253 Section 11.1).
pub struct DisconnectReason;

impl DisconnectReason {
    /// SSH_DISCONNECT_HOST_NOT_ALLOWED_TO_CONNECT
    pub const HOST_NOT_ALLOWED_TO_CONNECT: u32 = 1;
    /// SSH_DISCONNECT_PROTOCOL_ERROR
    pub const PROTOCOL_ERROR: u32 = 2;
    /// SSH_DISCONNECT_KEY_EXCHANGE_FAILED
    pub const KEY_EXCHANGE_FAILED: u32 = 3;
    /// SSH_DISCONNECT_MAC_ERROR
    pub const MAC_ERROR: u32 = 5;
    /// SSH_DISCONNECT_COMPRESSION_ERROR
    pub const COMPRESSION_ERROR: u32 = 6;
    /// SSH_DISCONNECT_PROTOCOL_VERSION_NOT_SUPPORTED
    pub const PROTOCOL_VERSION_NOT_SUPPORTED: u32 = 8;
    /// SSH_DISCONNECT_HOST_KEY_NOT_VERIFIABLE
    pub const HOST_KEY_NOT_VERIFIABLE: u32 = 9;
    /// SSH_DISCONNECT_CONNECTION_LOST
    pub const CONNECTION_LOST: u32 = 10;
    /// SSH_DISCONNECT_BY_APPLICATION
    pub const BY_APPLICATION: u32 = 11;
}

/// SSH_MSG_DISCONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Reason code
    pub reason: u32,
    /// Human readable description
    pub description: String,
    /// Language tag, usually empty
    pub language: String,
}

impl Disconnect {
    /// Creates a disconnect message with an empty language tag.
    pub fn new(reason: u32, description: impl Into<String>) -> Self {
        Self {
            reason,
            description: description.into(),
            language: String::new(),
        }
    }

    /// Serializes the message including its type byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(13 + self.description.len());
        buf.put_u8(MessageType::Disconnect as u8);
        buf.put_u32(self.reason);
        put_string(&mut buf, self.description.as_bytes());
        put_string(&mut buf, self.language.as_bytes());
        buf.to_vec()
    }

    /// Parses a disconnect payload including its type byte.
    pub fn from_bytes(data: &[u8]) -> OspreyResult<Self> {
        let mut reader = WireReader::new(data);
        if reader.read_u8()? != MessageType::Disconnect as u8 {
            return Err(OspreyError::Protocol(
                "Expected SSH_MSG_DISCONNECT".to_string(),
            ));
        }
        let reason = reader.read_u32()?;
        let description = String::from_utf8_lossy(reader.read_string()?).into_owned();
        // Some peers omit the language tag.
        let language = if reader.is_empty() {
            String::new()
        } else {
            String::from_utf8_lossy(reader.read_string()?).into_owned()
        };
        Ok(Self {
            reason,
            description,
            language,
        })
    }
}

impl From<Disconnect> for OspreyError {
    fn from(msg: Disconnect) -> Self {
        OspreyError::Disconnected {
            reason: msg.reason,
            description: msg.description,
        }
    }
}

/// Builds an SSH_MSG_IGNORE carrying `data`.
pub fn ignore_message(data: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5 + data.len());
    buf.put_u8(MessageType::Ignore as u8);
    put_string(&mut buf, data);
    buf.to_vec()
}
