//! Host key suppliers and trust decisions.
//!
//! The transport core never loads key files. A server is handed something
//! implementing [`HostKey`], which exposes the public key blob, the raw
//! private key and the key type; the matching [`Signature`] primitive is
//! then created through the [`AlgorithmRegistry`]. A client is handed a
//! [`HostKeyVerifier`] that decides whether the key the server presented
//! is trusted.
//!
//! # Supported Key Types
//!
//! - `ssh-ed25519` ([`Ed25519HostKey`])
//! - `ecdsa-sha2-nistp256` ([`EcdsaP256HostKey`])
//! - `ssh-dss` ([`DssHostKey`], 1024-bit with a 160-bit subgroup)
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::crypto::{AlgorithmRegistry, LockedRandom};
//! use osprey_proto::ssh::hostkey::{
//!     fingerprint, Ed25519HostKey, HostKey, HostKeyVerifier, PinnedHostKey,
//! };
//!
//! let host_key = Ed25519HostKey::generate(&LockedRandom::from_entropy());
//! let blob = host_key.public_key_blob();
//! assert!(fingerprint(&blob).starts_with("SHA256:"));
//!
//! let registry = AlgorithmRegistry::default();
//! let mut signer = host_key.signer(&registry).unwrap();
//! signer.update(b"exchange hash");
//! let signature = signer.sign().unwrap();
//! assert!(!signature.is_empty());
//!
//! let verifier = PinnedHostKey::new(blob.clone());
//! assert!(verifier.verify("ssh-ed25519", &blob));
//! ```

use crate::ssh::crypto::signature::{
    dss_public_key_blob, ecdsa_p256_public_key_blob, ed25519_public_key_blob,
    ECDSA_SHA2_NISTP256, SSH_DSS, SSH_ED25519,
};
use crate::ssh::crypto::{AlgorithmRegistry, Random, RandomRng, Signature};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use osprey_platform::{OspreyError, OspreyResult};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// A host key the server signs exchange hashes with.
pub trait HostKey: Send + Sync {
    /// Key type name (e.g. `ssh-ed25519`).
    fn key_type(&self) -> &'static str;

    /// Public key in SSH wire format (`string key-type || ...`).
    fn public_key_blob(&self) -> Vec<u8>;

    /// Raw private key, if this supplier holds one.
    fn private_key(&self) -> Option<Zeroizing<Vec<u8>>>;

    /// Creates a signing primitive for this key through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Configuration`] if the key type is not
    /// registered or there is no private key.
    fn signer(&self, registry: &AlgorithmRegistry) -> OspreyResult<Box<dyn Signature>> {
        let private = self.private_key().ok_or_else(|| {
            OspreyError::Configuration(format!("{} host key has no private key", self.key_type()))
        })?;
        let algorithm = registry.signature(self.key_type())?;
        (algorithm.make)(&self.public_key_blob(), Some(private.as_slice()))
    }
}

/// Decides whether a server's host key is trusted.
pub trait HostKeyVerifier: Send + Sync {
    /// Returns `true` if `blob` is an acceptable host key of type `key_type`.
    fn verify(&self, key_type: &str, blob: &[u8]) -> bool;
}

/// Trusts every host key. For tests and trust-on-first-use callers that
/// check the fingerprint themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAnyHostKey;

impl HostKeyVerifier for AcceptAnyHostKey {
    fn verify(&self, _key_type: &str, _blob: &[u8]) -> bool {
        true
    }
}

/// Trusts exactly one host key blob.
#[derive(Debug, Clone)]
pub struct PinnedHostKey {
    blob: Vec<u8>,
}

impl PinnedHostKey {
    /// Pins `blob`.
    pub fn new(blob: Vec<u8>) -> Self {
        Self { blob }
    }
}

impl HostKeyVerifier for PinnedHostKey {
    fn verify(&self, _key_type: &str, blob: &[u8]) -> bool {
        self.blob.len() == blob.len() && bool::from(self.blob.ct_eq(blob))
    }
}

/// OpenSSH-style fingerprint: `SHA256:` followed by unpadded base64.
pub fn fingerprint(blob: &[u8]) -> String {
    format!("SHA256:{}", STANDARD_NO_PAD.encode(Sha256::digest(blob)))
}

/// Ed25519 host key (`ssh-ed25519`).
#[derive(Clone)]
pub struct Ed25519HostKey {
    signing_key: ed25519_dalek::SigningKey,
}

impl Ed25519HostKey {
    /// Generates a key from 32 random bytes.
    pub fn generate(random: &dyn Random) -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        random.fill(seed.as_mut());
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// Creates a key from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> OspreyResult<Self> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| {
            OspreyError::Configuration("Ed25519 secret key must be 32 bytes".to_string())
        })?;
        Ok(Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }
}

impl HostKey for Ed25519HostKey {
    fn key_type(&self) -> &'static str {
        SSH_ED25519.name
    }

    fn public_key_blob(&self) -> Vec<u8> {
        ed25519_public_key_blob(&self.signing_key.verifying_key())
    }

    fn private_key(&self) -> Option<Zeroizing<Vec<u8>>> {
        Some(Zeroizing::new(self.signing_key.to_bytes().to_vec()))
    }
}

impl std::fmt::Debug for Ed25519HostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519HostKey")
            .field("fingerprint", &fingerprint(&self.public_key_blob()))
            .finish_non_exhaustive()
    }
}

/// ECDSA P-256 host key (`ecdsa-sha2-nistp256`).
#[derive(Clone)]
pub struct EcdsaP256HostKey {
    signing_key: p256::ecdsa::SigningKey,
}

impl EcdsaP256HostKey {
    /// Generates a random key.
    pub fn generate(random: &dyn Random) -> Self {
        Self {
            signing_key: p256::ecdsa::SigningKey::random(&mut RandomRng(random)),
        }
    }

    /// Creates a key from a 32-byte big-endian scalar.
    pub fn from_scalar(scalar: &[u8]) -> OspreyResult<Self> {
        let signing_key = p256::ecdsa::SigningKey::from_slice(scalar)
            .map_err(|_| OspreyError::Configuration("Invalid P-256 private key".to_string()))?;
        Ok(Self { signing_key })
    }
}

impl HostKey for EcdsaP256HostKey {
    fn key_type(&self) -> &'static str {
        ECDSA_SHA2_NISTP256.name
    }

    fn public_key_blob(&self) -> Vec<u8> {
        ecdsa_p256_public_key_blob(self.signing_key.verifying_key())
    }

    fn private_key(&self) -> Option<Zeroizing<Vec<u8>>> {
        Some(Zeroizing::new(self.signing_key.to_bytes().to_vec()))
    }
}

impl std::fmt::Debug for EcdsaP256HostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaP256HostKey")
            .field("fingerprint", &fingerprint(&self.public_key_blob()))
            .finish_non_exhaustive()
    }
}

/// DSA host key (`ssh-dss`).
///
/// Generating domain parameters takes a noticeable amount of time.
#[derive(Clone)]
pub struct DssHostKey {
    signing_key: dsa::SigningKey,
}

impl DssHostKey {
    /// Generates fresh 1024-bit domain parameters and a key pair.
    #[allow(deprecated)]
    pub fn generate(random: &dyn Random) -> Self {
        let mut rng = RandomRng(random);
        let components = dsa::Components::generate(&mut rng, dsa::KeySize::DSA_1024_160);
        Self {
            signing_key: dsa::SigningKey::generate(&mut rng, components),
        }
    }
}

impl HostKey for DssHostKey {
    fn key_type(&self) -> &'static str {
        SSH_DSS.name
    }

    fn public_key_blob(&self) -> Vec<u8> {
        dss_public_key_blob(self.signing_key.verifying_key())
    }

    fn private_key(&self) -> Option<Zeroizing<Vec<u8>>> {
        Some(Zeroizing::new(self.signing_key.x().to_bytes_be()))
    }
}

impl std::fmt::Debug for DssHostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DssHostKey")
            .field("fingerprint", &fingerprint(&self.public_key_blob()))
            .finish_non_exhaustive()
    }
}
