//! Hash functions bound to key exchange methods.

use super::registry::DigestAlgorithm;
use super::Digest;
use sha1::Sha1;
use sha2::Digest as HashFunction;
use sha2::{Sha256, Sha512};

/// `sha1`
pub const SHA1: DigestAlgorithm = DigestAlgorithm {
    name: "sha1",
    output_size: 20,
    make: make_sha1,
};

/// `sha256`
pub const SHA256: DigestAlgorithm = DigestAlgorithm {
    name: "sha256",
    output_size: 32,
    make: make_sha256,
};

/// `sha512`
pub const SHA512: DigestAlgorithm = DigestAlgorithm {
    name: "sha512",
    output_size: 64,
    make: make_sha512,
};

fn make_sha1() -> Box<dyn Digest> {
    Box::new(HashDigest::<Sha1>::new("sha1"))
}

fn make_sha256() -> Box<dyn Digest> {
    Box::new(HashDigest::<Sha256>::new("sha256"))
}

fn make_sha512() -> Box<dyn Digest> {
    Box::new(HashDigest::<Sha512>::new("sha512"))
}

/// Every digest registered by default.
pub const DEFAULT_DIGESTS: &[DigestAlgorithm] = &[SHA1, SHA256, SHA512];

/// [`Digest`] adapter over any RustCrypto hash.
#[derive(Debug, Clone)]
pub struct HashDigest<D> {
    name: &'static str,
    inner: D,
}

impl<D: HashFunction> HashDigest<D> {
    /// Creates a fresh hash state.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: D::new(),
        }
    }
}

impl<D: HashFunction + Send> Digest for HashDigest<D> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn output_size(&self) -> usize {
        <D as HashFunction>::output_size()
    }

    fn update(&mut self, data: &[u8]) {
        HashFunction::update(&mut self.inner, data);
    }

    fn digest(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.inner, D::new())
            .finalize()
            .to_vec()
    }
}
