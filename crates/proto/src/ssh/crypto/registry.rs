//! Name-keyed constructor tables for every primitive kind.
//!
//! Each algorithm is described by a small `Copy` entry carrying its SSH name,
//! fixed sizes and a constructor function. An [`AlgorithmRegistry`] holds one
//! table per kind plus the shared [`Random`] source, and is passed by value
//! into the transport session.
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::crypto::{AlgorithmRegistry, CipherMode};
//!
//! let registry = AlgorithmRegistry::default();
//! let aes = registry.cipher("aes128-ctr").unwrap();
//! assert_eq!(aes.block_size, 16);
//!
//! let mut encryptor = (aes.make)(CipherMode::Encrypt, &[0u8; 16], &[0u8; 16]).unwrap();
//! let mut block = [0u8; 16];
//! encryptor.transform(&mut block).unwrap();
//!
//! assert!(registry.cipher("blowfish-cbc").is_err());
//! ```

use super::{Cipher, CipherMode, Compression, CompressionMode, Digest, Mac, Random, Signature};
use super::{cipher, compression, digest, mac, random::LockedRandom, signature};
use crate::ssh::kex_dh::{self, KexGroup};
use osprey_platform::{OspreyError, OspreyResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Cipher table entry.
#[derive(Debug, Clone, Copy)]
pub struct CipherAlgorithm {
    /// SSH algorithm name
    pub name: &'static str,
    /// Block size in bytes (8 for stream-like `none`)
    pub block_size: usize,
    /// Key length in bytes
    pub key_size: usize,
    /// IV length in bytes
    pub iv_size: usize,
    /// Constructor: direction, key, IV
    pub make: fn(CipherMode, &[u8], &[u8]) -> OspreyResult<Box<dyn Cipher>>,
}

/// MAC table entry.
#[derive(Debug, Clone, Copy)]
pub struct MacAlgorithm {
    /// SSH algorithm name
    pub name: &'static str,
    /// Key length in bytes
    pub key_size: usize,
    /// Emitted tag length in bytes
    pub mac_size: usize,
    /// Constructor: key
    pub make: fn(&[u8]) -> OspreyResult<Box<dyn Mac>>,
}

/// Digest table entry.
#[derive(Debug, Clone, Copy)]
pub struct DigestAlgorithm {
    /// Digest name
    pub name: &'static str,
    /// Output length in bytes
    pub output_size: usize,
    /// Constructor
    pub make: fn() -> Box<dyn Digest>,
}

/// Compression table entry.
#[derive(Debug, Clone, Copy)]
pub struct CompressionAlgorithm {
    /// SSH algorithm name
    pub name: &'static str,
    /// Activated only once user authentication has succeeded
    pub delayed: bool,
    /// Constructor: direction, level
    pub make: fn(CompressionMode, u32) -> OspreyResult<Box<dyn Compression>>,
}

/// Signature table entry.
#[derive(Debug, Clone, Copy)]
pub struct SignatureAlgorithm {
    /// SSH key type name
    pub name: &'static str,
    /// Constructor: public key blob, optional raw private key
    pub make: fn(&[u8], Option<&[u8]>) -> OspreyResult<Box<dyn Signature>>,
}

/// Key exchange table entry.
#[derive(Debug, Clone, Copy)]
pub struct KexAlgorithm {
    /// SSH algorithm name
    pub name: &'static str,
    /// Name of the bound digest
    pub digest: &'static str,
    /// Group the exchange runs in
    pub group: KexGroup,
}

/// Explicit mapping from algorithm names to constructors.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    ciphers: HashMap<&'static str, CipherAlgorithm>,
    macs: HashMap<&'static str, MacAlgorithm>,
    digests: HashMap<&'static str, DigestAlgorithm>,
    compressions: HashMap<&'static str, CompressionAlgorithm>,
    signatures: HashMap<&'static str, SignatureAlgorithm>,
    kex: HashMap<&'static str, KexAlgorithm>,
    random: Arc<dyn Random>,
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn sorted<V>(map: &HashMap<&'static str, V>) -> Vec<&'static str> {
            let mut names: Vec<_> = map.keys().copied().collect();
            names.sort_unstable();
            names
        }
        f.debug_struct("AlgorithmRegistry")
            .field("kex", &sorted(&self.kex))
            .field("signatures", &sorted(&self.signatures))
            .field("ciphers", &sorted(&self.ciphers))
            .field("macs", &sorted(&self.macs))
            .field("compressions", &sorted(&self.compressions))
            .field("digests", &sorted(&self.digests))
            .finish_non_exhaustive()
    }
}

fn unknown(kind: &str, name: &str) -> OspreyError {
    OspreyError::Configuration(format!("Unknown {} algorithm: {}", kind, name))
}

impl AlgorithmRegistry {
    /// Creates a registry with no algorithms and the given random source.
    pub fn empty(random: Arc<dyn Random>) -> Self {
        Self {
            ciphers: HashMap::new(),
            macs: HashMap::new(),
            digests: HashMap::new(),
            compressions: HashMap::new(),
            signatures: HashMap::new(),
            kex: HashMap::new(),
            random,
        }
    }

    /// Creates a registry holding every built-in algorithm.
    pub fn with_random(random: Arc<dyn Random>) -> Self {
        let mut registry = Self::empty(random);
        for alg in cipher::DEFAULT_CIPHERS {
            registry.register_cipher(*alg);
        }
        for alg in mac::DEFAULT_MACS {
            registry.register_mac(*alg);
        }
        for alg in digest::DEFAULT_DIGESTS {
            registry.register_digest(*alg);
        }
        for alg in compression::DEFAULT_COMPRESSIONS {
            registry.register_compression(*alg);
        }
        for alg in signature::DEFAULT_SIGNATURES {
            registry.register_signature(*alg);
        }
        for alg in kex_dh::DEFAULT_KEX {
            registry.register_kex(*alg);
        }
        registry
    }

    /// Adds or replaces a cipher.
    pub fn register_cipher(&mut self, alg: CipherAlgorithm) {
        self.ciphers.insert(alg.name, alg);
    }

    /// Adds or replaces a MAC.
    pub fn register_mac(&mut self, alg: MacAlgorithm) {
        self.macs.insert(alg.name, alg);
    }

    /// Adds or replaces a digest.
    pub fn register_digest(&mut self, alg: DigestAlgorithm) {
        self.digests.insert(alg.name, alg);
    }

    /// Adds or replaces a compression method.
    pub fn register_compression(&mut self, alg: CompressionAlgorithm) {
        self.compressions.insert(alg.name, alg);
    }

    /// Adds or replaces a signature algorithm.
    pub fn register_signature(&mut self, alg: SignatureAlgorithm) {
        self.signatures.insert(alg.name, alg);
    }

    /// Adds or replaces a key exchange method.
    pub fn register_kex(&mut self, alg: KexAlgorithm) {
        self.kex.insert(alg.name, alg);
    }

    /// Looks up a cipher.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Configuration`] for an unregistered name.
    pub fn cipher(&self, name: &str) -> OspreyResult<&CipherAlgorithm> {
        self.ciphers.get(name).ok_or_else(|| unknown("cipher", name))
    }

    /// Looks up a MAC.
    pub fn mac(&self, name: &str) -> OspreyResult<&MacAlgorithm> {
        self.macs.get(name).ok_or_else(|| unknown("MAC", name))
    }

    /// Looks up a digest.
    pub fn digest(&self, name: &str) -> OspreyResult<&DigestAlgorithm> {
        self.digests.get(name).ok_or_else(|| unknown("digest", name))
    }

    /// Looks up a compression method.
    pub fn compression(&self, name: &str) -> OspreyResult<&CompressionAlgorithm> {
        self.compressions
            .get(name)
            .ok_or_else(|| unknown("compression", name))
    }

    /// Looks up a signature algorithm by key type.
    pub fn signature(&self, name: &str) -> OspreyResult<&SignatureAlgorithm> {
        self.signatures
            .get(name)
            .ok_or_else(|| unknown("signature", name))
    }

    /// Looks up a key exchange method.
    pub fn kex(&self, name: &str) -> OspreyResult<&KexAlgorithm> {
        self.kex.get(name).ok_or_else(|| unknown("key exchange", name))
    }

    /// Shared random source.
    pub fn random(&self) -> &Arc<dyn Random> {
        &self.random
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_random(Arc::new(LockedRandom::from_entropy()))
    }
}
