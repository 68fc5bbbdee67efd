//! Session key derivation (RFC 4253 Section 7.2).
//!
//! # Key Derivation
//!
//! ```text
//! Initial IV client to server:     HASH(K || H || "A" || session_id)
//! Initial IV server to client:     HASH(K || H || "B" || session_id)
//! Encryption key client to server: HASH(K || H || "C" || session_id)
//! Encryption key server to client: HASH(K || H || "D" || session_id)
//! Integrity key client to server:  HASH(K || H || "E" || session_id)
//! Integrity key server to client:  HASH(K || H || "F" || session_id)
//! ```
//!
//! K is hashed as an mpint. When more bytes are needed than one digest
//! output provides, the key is extended with
//!
//! ```text
//! K2 = HASH(K || H || K1)
//! K3 = HASH(K || H || K1 || K2)
//! ```
//!
//! and truncated, so a shorter key is always a prefix of a longer one.
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::crypto::digest::SHA256;
//! use osprey_proto::ssh::keys::derive_key;
//!
//! let k = vec![0x42; 32];
//! let h = vec![0x01; 32];
//! let session_id = vec![0x02; 32];
//!
//! let key = derive_key(&SHA256, &k, &h, &session_id, b'C', 48);
//! assert_eq!(key.len(), 48);
//! assert_eq!(&key[..16], &derive_key(&SHA256, &k, &h, &session_id, b'C', 16)[..]);
//! ```

use crate::ssh::crypto::registry::{CipherAlgorithm, DigestAlgorithm, MacAlgorithm};
use crate::ssh::wire::encode_mpint;
use zeroize::Zeroizing;

/// Derives `len` bytes of key material for the slot named by `letter`.
pub fn derive_key(
    digest: &DigestAlgorithm,
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
    letter: u8,
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let k_mpint = Zeroizing::new(encode_mpint(shared_secret));
    let mut hasher = (digest.make)();

    hasher.update(&k_mpint);
    hasher.update(exchange_hash);
    hasher.update(&[letter]);
    hasher.update(session_id);
    let mut key = Zeroizing::new(hasher.digest());

    while key.len() < len {
        hasher.update(&k_mpint);
        hasher.update(exchange_hash);
        hasher.update(&key);
        let block = hasher.digest();
        key.extend_from_slice(&block);
    }

    key.truncate(len);
    key
}

/// Key material for one direction.
pub struct DirectionKeys {
    /// Initial IV
    pub iv: Zeroizing<Vec<u8>>,
    /// Encryption key
    pub encryption: Zeroizing<Vec<u8>>,
    /// Integrity key
    pub integrity: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionKeys")
            .field("iv_len", &self.iv.len())
            .field("encryption_len", &self.encryption.len())
            .field("integrity_len", &self.integrity.len())
            .finish()
    }
}

/// The six derived key materials of one key exchange.
#[derive(Debug)]
pub struct SessionKeys {
    /// Keys A, C, E
    pub client_to_server: DirectionKeys,
    /// Keys B, D, F
    pub server_to_client: DirectionKeys,
}

impl SessionKeys {
    /// Derives keys sized for the negotiated cipher and MAC of each direction.
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        digest: &DigestAlgorithm,
        shared_secret: &[u8],
        exchange_hash: &[u8],
        session_id: &[u8],
        cipher_c2s: &CipherAlgorithm,
        cipher_s2c: &CipherAlgorithm,
        mac_c2s: &MacAlgorithm,
        mac_s2c: &MacAlgorithm,
    ) -> Self {
        let derive = |letter: u8, len: usize| {
            derive_key(digest, shared_secret, exchange_hash, session_id, letter, len)
        };
        Self {
            client_to_server: DirectionKeys {
                iv: derive(b'A', cipher_c2s.iv_size),
                encryption: derive(b'C', cipher_c2s.key_size),
                integrity: derive(b'E', mac_c2s.key_size),
            },
            server_to_client: DirectionKeys {
                iv: derive(b'B', cipher_s2c.iv_size),
                encryption: derive(b'D', cipher_s2c.key_size),
                integrity: derive(b'F', mac_s2c.key_size),
            },
        }
    }
}
