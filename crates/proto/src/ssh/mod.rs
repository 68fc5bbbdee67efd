//! SSH transport layer (RFC 4253).
//!
//! # Architecture
//!
//! The transport is layered bottom-up:
//!
//! 1. **Wire encoding** ([`wire`]) - RFC 4251 data types
//! 2. **Primitives** ([`crypto`]) - ciphers, MACs, digests, compression,
//!    signatures and randomness behind small traits, created by name
//!    through an [`AlgorithmRegistry`]
//! 3. **Binary packets** ([`packet`], [`codec`]) - framing, padding,
//!    encryption, MAC and sequence numbers
//! 4. **Key exchange** ([`kex`], [`negotiate`], [`kex_dh`], [`keys`]) -
//!    KEXINIT, algorithm negotiation, Diffie-Hellman and key derivation
//! 5. **Session** ([`transport`]) - identification, rekeying and the
//!    payload stream handed to the layers above
//!
//! User authentication and the connection protocol are not part of this
//! crate; they consume [`TransportSession::send`] and
//! [`TransportSession::recv`].
//!
//! # Security Considerations
//!
//! - **Input Validation**: packet lengths are checked against a configurable
//!   maximum (35000 bytes by default) before any allocation
//! - **Integrity First**: no field of a MAC-protected packet is interpreted
//!   before its MAC verifies
//! - **Constant-Time Operations**: MAC tags and pinned host keys are
//!   compared with [`subtle`]
//! - **Memory Safety**: shared secrets and derived keys are zeroized on drop
//! - **No Unsafe Code**
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::{LockedRandom, Packet};
//!
//! let random = LockedRandom::from_seed(7);
//! let packet = Packet::new(b"\x5epayload".to_vec(), 8, &random).unwrap();
//! let bytes = packet.to_bytes();
//!
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), b"\x5epayload");
//! ```
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 5656](https://datatracker.ietf.org/doc/html/rfc5656) - ECDSA host keys
//! - [RFC 8731](https://datatracker.ietf.org/doc/html/rfc8731) - Curve25519 key exchange

pub mod codec;
pub mod crypto;
pub mod hostkey;
pub mod kex;
pub mod kex_dh;
pub mod keys;
pub mod logging;
pub mod message;
pub mod negotiate;
pub mod packet;
pub mod rekey;
pub mod transport;
pub mod version;
pub mod wire;

// Re-export main types
pub use codec::{CryptoPipeline, PacketDecoder, PacketEncoder};
pub use crypto::{AlgorithmRegistry, CipherMode, CompressionMode, LockedRandom, OsRandom};
pub use hostkey::{
    fingerprint, AcceptAnyHostKey, DssHostKey, EcdsaP256HostKey, Ed25519HostKey, HostKey,
    HostKeyVerifier, PinnedHostKey,
};
pub use kex::{AlgorithmPreferences, KexInit, NewKeys};
pub use kex_dh::{KexContext, KexDhClient, KexOutput};
pub use keys::{derive_key, DirectionKeys, SessionKeys};
pub use message::{Disconnect, DisconnectReason, MessageType};
pub use negotiate::{negotiate, NegotiatedAlgorithms};
pub use packet::{Packet, MAX_PACKET_SIZE};
pub use rekey::{RekeyController, RekeyReason, RekeyThresholds};
pub use transport::{Role, TransportConfig, TransportSession};
pub use version::Version;
