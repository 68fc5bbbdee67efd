//! Packet ciphers (RFC 4253 Section 6.3, RFC 4344).
//!
//! - `none`: identity transform, block size 8
//! - `aes128-ctr`, `aes192-ctr`, `aes256-ctr`: AES in SDCTR mode, the
//!   128-bit big-endian counter starts at the derived IV
//! - `aes128-cbc`, `aes192-cbc`, `aes256-cbc`: AES-CBC chained across
//!   packets (the last ciphertext block is the next packet's IV)
//!
//! The "none" cipher is a plain primitive; whether it may be negotiated is
//! decided by the transport session.

use super::registry::CipherAlgorithm;
use super::{Cipher, CipherMode};
use aes::{Aes128, Aes192, Aes256};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, BlockSizeUser, KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use osprey_platform::{OspreyError, OspreyResult};

const AES_BLOCK: usize = 16;

/// `none`
pub const NONE: CipherAlgorithm = CipherAlgorithm {
    name: "none",
    block_size: 8,
    key_size: 0,
    iv_size: 0,
    make: make_none,
};

/// `aes128-ctr`
pub const AES128_CTR: CipherAlgorithm = CipherAlgorithm {
    name: "aes128-ctr",
    block_size: AES_BLOCK,
    key_size: 16,
    iv_size: AES_BLOCK,
    make: make_aes_ctr::<16>,
};

/// `aes192-ctr`
pub const AES192_CTR: CipherAlgorithm = CipherAlgorithm {
    name: "aes192-ctr",
    block_size: AES_BLOCK,
    key_size: 24,
    iv_size: AES_BLOCK,
    make: make_aes_ctr::<24>,
};

/// `aes256-ctr`
pub const AES256_CTR: CipherAlgorithm = CipherAlgorithm {
    name: "aes256-ctr",
    block_size: AES_BLOCK,
    key_size: 32,
    iv_size: AES_BLOCK,
    make: make_aes_ctr::<32>,
};

/// `aes128-cbc`
pub const AES128_CBC: CipherAlgorithm = CipherAlgorithm {
    name: "aes128-cbc",
    block_size: AES_BLOCK,
    key_size: 16,
    iv_size: AES_BLOCK,
    make: make_aes_cbc::<16>,
};

/// `aes192-cbc`
pub const AES192_CBC: CipherAlgorithm = CipherAlgorithm {
    name: "aes192-cbc",
    block_size: AES_BLOCK,
    key_size: 24,
    iv_size: AES_BLOCK,
    make: make_aes_cbc::<24>,
};

/// `aes256-cbc`
pub const AES256_CBC: CipherAlgorithm = CipherAlgorithm {
    name: "aes256-cbc",
    block_size: AES_BLOCK,
    key_size: 32,
    iv_size: AES_BLOCK,
    make: make_aes_cbc::<32>,
};

/// Every cipher registered by default, most preferred first.
pub const DEFAULT_CIPHERS: &[CipherAlgorithm] = &[
    AES128_CTR, AES192_CTR, AES256_CTR, AES128_CBC, AES192_CBC, AES256_CBC, NONE,
];

/// Identity cipher used before the first NEWKEYS.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneCipher;

impl Cipher for NoneCipher {
    fn name(&self) -> &'static str {
        "none"
    }

    fn block_size(&self) -> usize {
        8
    }

    fn transform(&mut self, _buf: &mut [u8]) -> OspreyResult<()> {
        Ok(())
    }
}

fn make_none(_mode: CipherMode, _key: &[u8], _iv: &[u8]) -> OspreyResult<Box<dyn Cipher>> {
    Ok(Box::new(NoneCipher))
}

enum CtrState {
    Aes128(Ctr128BE<Aes128>),
    Aes192(Ctr128BE<Aes192>),
    Aes256(Ctr128BE<Aes256>),
}

/// AES in counter mode.
///
/// Encryption and decryption are the same keystream XOR, so the mode only
/// matters for logging.
pub struct AesCtr {
    name: &'static str,
    state: CtrState,
}

impl std::fmt::Debug for AesCtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCtr")
            .field("name", &self.name)
            .field("state", &"<redacted>")
            .finish()
    }
}

impl AesCtr {
    /// Creates a CTR cipher for a 16, 24 or 32 byte key.
    ///
    /// Longer key or IV material is truncated to the required size.
    pub fn new(key: &[u8], iv: &[u8]) -> OspreyResult<Self> {
        let iv = take(iv, AES_BLOCK, "AES-CTR IV")?;
        let (name, state) = match key.len() {
            n if n >= 32 => (
                "aes256-ctr",
                CtrState::Aes256(Ctr128BE::new_from_slices(&key[..32], iv).map_err(bad_length)?),
            ),
            n if n >= 24 => (
                "aes192-ctr",
                CtrState::Aes192(Ctr128BE::new_from_slices(&key[..24], iv).map_err(bad_length)?),
            ),
            n if n >= 16 => (
                "aes128-ctr",
                CtrState::Aes128(Ctr128BE::new_from_slices(&key[..16], iv).map_err(bad_length)?),
            ),
            n => {
                return Err(OspreyError::Configuration(format!(
                    "Insufficient key material for AES-CTR: got {} bytes",
                    n
                )))
            }
        };
        Ok(Self { name, state })
    }
}

impl Cipher for AesCtr {
    fn name(&self) -> &'static str {
        self.name
    }

    fn block_size(&self) -> usize {
        AES_BLOCK
    }

    fn transform(&mut self, buf: &mut [u8]) -> OspreyResult<()> {
        match &mut self.state {
            CtrState::Aes128(c) => c.apply_keystream(buf),
            CtrState::Aes192(c) => c.apply_keystream(buf),
            CtrState::Aes256(c) => c.apply_keystream(buf),
        }
        Ok(())
    }
}

fn make_aes_ctr<const KEY: usize>(
    _mode: CipherMode,
    key: &[u8],
    iv: &[u8],
) -> OspreyResult<Box<dyn Cipher>> {
    let key = take(key, KEY, "AES-CTR key")?;
    Ok(Box::new(AesCtr::new(key, iv)?))
}

enum CbcState {
    Enc128(cbc::Encryptor<Aes128>),
    Dec128(cbc::Decryptor<Aes128>),
    Enc192(cbc::Encryptor<Aes192>),
    Dec192(cbc::Decryptor<Aes192>),
    Enc256(cbc::Encryptor<Aes256>),
    Dec256(cbc::Decryptor<Aes256>),
}

/// AES in cipher block chaining mode.
pub struct AesCbc {
    name: &'static str,
    state: CbcState,
}

impl std::fmt::Debug for AesCbc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCbc")
            .field("name", &self.name)
            .field("state", &"<redacted>")
            .finish()
    }
}

impl AesCbc {
    /// Creates a CBC cipher for the given direction and a 16, 24 or 32
    /// byte key.
    pub fn new(mode: CipherMode, key: &[u8], iv: &[u8]) -> OspreyResult<Self> {
        let iv = take(iv, AES_BLOCK, "AES-CBC IV")?;
        let (name, state) = match (key.len(), mode) {
            (32, CipherMode::Encrypt) => (
                "aes256-cbc",
                CbcState::Enc256(cbc::Encryptor::new_from_slices(key, iv).map_err(bad_length)?),
            ),
            (32, CipherMode::Decrypt) => (
                "aes256-cbc",
                CbcState::Dec256(cbc::Decryptor::new_from_slices(key, iv).map_err(bad_length)?),
            ),
            (24, CipherMode::Encrypt) => (
                "aes192-cbc",
                CbcState::Enc192(cbc::Encryptor::new_from_slices(key, iv).map_err(bad_length)?),
            ),
            (24, CipherMode::Decrypt) => (
                "aes192-cbc",
                CbcState::Dec192(cbc::Decryptor::new_from_slices(key, iv).map_err(bad_length)?),
            ),
            (16, CipherMode::Encrypt) => (
                "aes128-cbc",
                CbcState::Enc128(cbc::Encryptor::new_from_slices(key, iv).map_err(bad_length)?),
            ),
            (16, CipherMode::Decrypt) => (
                "aes128-cbc",
                CbcState::Dec128(cbc::Decryptor::new_from_slices(key, iv).map_err(bad_length)?),
            ),
            (n, _) => {
                return Err(OspreyError::Configuration(format!(
                    "Invalid AES-CBC key length: {} bytes",
                    n
                )))
            }
        };
        Ok(Self { name, state })
    }
}

impl Cipher for AesCbc {
    fn name(&self) -> &'static str {
        self.name
    }

    fn block_size(&self) -> usize {
        AES_BLOCK
    }

    fn transform(&mut self, buf: &mut [u8]) -> OspreyResult<()> {
        if buf.len() % AES_BLOCK != 0 {
            return Err(OspreyError::Protocol(format!(
                "{}: buffer of {} bytes is not a multiple of the block size",
                self.name,
                buf.len()
            )));
        }
        match &mut self.state {
            CbcState::Enc128(c) => encrypt_blocks(c, buf),
            CbcState::Dec128(c) => decrypt_blocks(c, buf),
            CbcState::Enc192(c) => encrypt_blocks(c, buf),
            CbcState::Dec192(c) => decrypt_blocks(c, buf),
            CbcState::Enc256(c) => encrypt_blocks(c, buf),
            CbcState::Dec256(c) => decrypt_blocks(c, buf),
        }
        Ok(())
    }
}

fn make_aes_cbc<const KEY: usize>(
    mode: CipherMode,
    key: &[u8],
    iv: &[u8],
) -> OspreyResult<Box<dyn Cipher>> {
    let key = take(key, KEY, "AES-CBC key")?;
    Ok(Box::new(AesCbc::new(mode, key, iv)?))
}

fn encrypt_blocks<E: BlockEncryptMut>(enc: &mut E, buf: &mut [u8]) {
    for block in buf.chunks_exact_mut(E::block_size()) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn decrypt_blocks<D: BlockDecryptMut>(dec: &mut D, buf: &mut [u8]) {
    for block in buf.chunks_exact_mut(D::block_size()) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Returns the first `len` bytes of derived key material.
fn take<'a>(material: &'a [u8], len: usize, what: &str) -> OspreyResult<&'a [u8]> {
    material.get(..len).ok_or_else(|| {
        OspreyError::Configuration(format!(
            "Insufficient material for {}: expected {} bytes, got {}",
            what,
            len,
            material.len()
        ))
    })
}

fn bad_length(_: cipher::InvalidLength) -> OspreyError {
    OspreyError::Configuration("Invalid cipher key or IV length".to_string())
}
