//! SSH transport-layer core for the Osprey ecosystem.
//!
//! This crate implements the SSH-2 transport protocol (RFC 4253): the
//! binary packet protocol, algorithm negotiation, Diffie-Hellman and
//! Curve25519 key exchange, host key signatures, key derivation and
//! rekeying. It runs over any `tokio` byte stream and hands decrypted
//! payloads to the layers above.
//!
//! # Features
//!
//! - `ssh` (default) - SSH transport support
//!
//! # Example
//!
//! ```rust,no_run
//! use osprey_proto::ssh::{
//!     AcceptAnyHostKey, AlgorithmRegistry, Ed25519HostKey, OsRandom, TransportConfig,
//!     TransportSession,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (client_io, server_io) = tokio::io::duplex(64 * 1024);
//! let host_key = Arc::new(Ed25519HostKey::generate(&OsRandom));
//!
//! let (client, server) = tokio::join!(
//!     TransportSession::client(
//!         client_io,
//!         TransportConfig::default(),
//!         AlgorithmRegistry::default(),
//!         Arc::new(AcceptAnyHostKey),
//!     ),
//!     TransportSession::server(
//!         server_io,
//!         TransportConfig::default(),
//!         AlgorithmRegistry::default(),
//!         host_key,
//!     ),
//! );
//! let (mut client, mut server) = (client?, server?);
//!
//! client.send(b"\x5ehello").await?;
//! assert_eq!(server.recv().await?, b"\x5ehello");
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - All cryptographic operations use vetted RustCrypto and dalek crates
//! - MAC tags are compared in constant time
//! - Secrets are zeroized on drop with `zeroize`
//! - Packet parsing is fuzzed (`crates/proto/fuzz`)
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
