//! Pluggable cryptographic primitives used by the SSH transport.
//!
//! Each primitive kind is a small capability trait implemented by
//! independent variant types:
//!
//! | Trait           | Variants                                               |
//! |-----------------|--------------------------------------------------------|
//! | [`Cipher`]      | `none`, `aes{128,192,256}-ctr`, `aes{128,192,256}-cbc`  |
//! | [`Mac`]         | `hmac-sha1`, `hmac-sha1-96`, `hmac-sha2-256/512`        |
//! | [`Digest`]      | `sha1`, `sha256`, `sha512`                             |
//! | [`Compression`] | `none`, `zlib`, `zlib@openssh.com` (delayed)           |
//! | [`Signature`]   | `ssh-dss`, `ssh-ed25519`, `ecdsa-sha2-nistp256`        |
//! | [`Random`]      | [`LockedRandom`], [`OsRandom`]                         |
//!
//! Instances are created by name through an [`AlgorithmRegistry`], which
//! maps every algorithm name to a constructor function. The registry is an
//! ordinary value handed to the transport session; there is no global
//! provider lookup.
//!
//! Apart from [`Random`], every instance is owned by exactly one packet
//! pipeline or key exchange and is never shared.

pub mod cipher;
pub mod compression;
pub mod digest;
pub mod mac;
pub mod random;
pub mod registry;
pub mod signature;

pub use cipher::{AesCbc, AesCtr, NoneCipher};
pub use compression::{NoneCompression, ZlibCompression};
pub use digest::HashDigest;
pub use mac::HmacMac;
pub use random::{LockedRandom, OsRandom, RandomRng};
pub use registry::{
    AlgorithmRegistry, CipherAlgorithm, CompressionAlgorithm, DigestAlgorithm, KexAlgorithm,
    MacAlgorithm, SignatureAlgorithm,
};
pub use signature::{
    dss_signature_from_der, dss_signature_to_der, public_key_type, DssSignature,
    EcdsaP256Signature, Ed25519Signature,
};

use osprey_platform::OspreyResult;

/// Direction a cipher instance operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// Outgoing packets
    Encrypt,
    /// Incoming packets
    Decrypt,
}

/// Direction a compression instance operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// Outgoing packets
    Compress,
    /// Incoming packets
    Decompress,
}

/// Symmetric packet cipher.
///
/// Keyed at construction; carries its chaining or counter state across
/// calls so consecutive packets must be transformed in order.
pub trait Cipher: Send {
    /// Algorithm name as negotiated.
    fn name(&self) -> &'static str;

    /// Cipher block size in bytes (8 for `none`).
    fn block_size(&self) -> usize;

    /// Encrypts or decrypts `buf` in place.
    ///
    /// # Errors
    ///
    /// Block modes return a protocol error when `buf` is not a whole number
    /// of blocks.
    fn transform(&mut self, buf: &mut [u8]) -> OspreyResult<()>;
}

/// Message authentication code.
pub trait Mac: Send {
    /// Algorithm name as negotiated.
    fn name(&self) -> &'static str;

    /// Size of the emitted tag (after truncation).
    fn mac_size(&self) -> usize;

    /// Feeds data into the running tag.
    fn update(&mut self, data: &[u8]);

    /// Returns the tag and resets to the keyed initial state.
    fn finalize(&mut self) -> Vec<u8>;
}

/// Hash function.
pub trait Digest: Send {
    /// Algorithm name.
    fn name(&self) -> &'static str;

    /// Output length in bytes.
    fn output_size(&self) -> usize;

    /// Feeds data into the hash.
    fn update(&mut self, data: &[u8]);

    /// Returns the hash and resets to the initial state.
    fn digest(&mut self) -> Vec<u8>;
}

/// Streaming payload compression.
///
/// One instance handles one direction of one connection; the compression
/// state spans packets.
pub trait Compression: Send {
    /// Algorithm name as negotiated.
    fn name(&self) -> &'static str;

    /// Compresses one packet payload.
    fn compress(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>>;

    /// Decompresses one packet payload.
    fn decompress(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>>;
}

/// Host key signature primitive.
///
/// Data is accumulated with [`Signature::update`]; [`Signature::sign`]
/// and [`Signature::verify`] work on full SSH signature blobs
/// (`string key-type || string signature`).
pub trait Signature: Send {
    /// Key type name (e.g. `ssh-ed25519`).
    fn name(&self) -> &'static str;

    /// Appends data to the message being signed or verified.
    fn update(&mut self, data: &[u8]);

    /// Signs the accumulated message.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no private key was supplied.
    fn sign(&mut self) -> OspreyResult<Vec<u8>>;

    /// Verifies a signature blob over the accumulated message.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match,
    /// and an error for a blob that cannot be parsed.
    fn verify(&mut self, signature_blob: &[u8]) -> OspreyResult<bool>;
}

/// Cryptographically secure random source.
///
/// Shared between key exchanges and packet padding, so implementations
/// serialize concurrent callers internally.
pub trait Random: Send + Sync {
    /// Fills `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);
}
