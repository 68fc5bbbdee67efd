//! HMAC message authentication (RFC 4253 Section 6.4, RFC 6668).
//!
//! The tag for a packet is computed over `uint32 sequence_number ||
//! unencrypted packet`; feeding those bytes is the codec's job, this module
//! only provides keyed HMAC instances.
//!
//! Truncated variants (`hmac-sha1-96`) compute the full digest-sized tag and
//! emit only its first bytes.

use super::registry::MacAlgorithm;
use super::Mac;
use hmac::Hmac;
use hmac::Mac as _;
use osprey_platform::{OspreyError, OspreyResult};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

/// `hmac-sha1`
pub const HMAC_SHA1: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha1",
    key_size: 20,
    mac_size: 20,
    make: make_hmac_sha1,
};

/// `hmac-sha1-96`
pub const HMAC_SHA1_96: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha1-96",
    key_size: 20,
    mac_size: 12,
    make: make_hmac_sha1_96,
};

/// `hmac-sha2-256`
pub const HMAC_SHA2_256: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha2-256",
    key_size: 32,
    mac_size: 32,
    make: make_hmac_sha2_256,
};

/// `hmac-sha2-512`
pub const HMAC_SHA2_512: MacAlgorithm = MacAlgorithm {
    name: "hmac-sha2-512",
    key_size: 64,
    mac_size: 64,
    make: make_hmac_sha2_512,
};

/// Every MAC registered by default, most preferred first.
pub const DEFAULT_MACS: &[MacAlgorithm] = &[HMAC_SHA2_256, HMAC_SHA2_512, HMAC_SHA1, HMAC_SHA1_96];

enum HmacState {
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
}

/// Keyed HMAC, optionally truncated.
pub struct HmacMac {
    name: &'static str,
    mac_size: usize,
    state: HmacState,
}

impl std::fmt::Debug for HmacMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacMac")
            .field("name", &self.name)
            .field("mac_size", &self.mac_size)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Mac for HmacMac {
    fn name(&self) -> &'static str {
        self.name
    }

    fn mac_size(&self) -> usize {
        self.mac_size
    }

    fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HmacState::Sha1(m) => m.update(data),
            HmacState::Sha256(m) => m.update(data),
            HmacState::Sha512(m) => m.update(data),
        }
    }

    fn finalize(&mut self) -> Vec<u8> {
        let mut tag = match &mut self.state {
            HmacState::Sha1(m) => m.finalize_reset().into_bytes().to_vec(),
            HmacState::Sha256(m) => m.finalize_reset().into_bytes().to_vec(),
            HmacState::Sha512(m) => m.finalize_reset().into_bytes().to_vec(),
        };
        tag.truncate(self.mac_size);
        tag
    }
}

fn key_prefix<'a>(alg: &MacAlgorithm, key: &'a [u8]) -> OspreyResult<&'a [u8]> {
    key.get(..alg.key_size).ok_or_else(|| {
        OspreyError::Configuration(format!(
            "Insufficient key material for {}: expected {}, got {}",
            alg.name,
            alg.key_size,
            key.len()
        ))
    })
}

fn invalid_key(_: hmac::digest::InvalidLength) -> OspreyError {
    OspreyError::Configuration("Invalid HMAC key".to_string())
}

fn make_hmac_sha1(key: &[u8]) -> OspreyResult<Box<dyn Mac>> {
    let key = key_prefix(&HMAC_SHA1, key)?;
    Ok(Box::new(HmacMac {
        name: HMAC_SHA1.name,
        mac_size: HMAC_SHA1.mac_size,
        state: HmacState::Sha1(Hmac::new_from_slice(key).map_err(invalid_key)?),
    }))
}

fn make_hmac_sha1_96(key: &[u8]) -> OspreyResult<Box<dyn Mac>> {
    let key = key_prefix(&HMAC_SHA1_96, key)?;
    Ok(Box::new(HmacMac {
        name: HMAC_SHA1_96.name,
        mac_size: HMAC_SHA1_96.mac_size,
        state: HmacState::Sha1(Hmac::new_from_slice(key).map_err(invalid_key)?),
    }))
}

fn make_hmac_sha2_256(key: &[u8]) -> OspreyResult<Box<dyn Mac>> {
    let key = key_prefix(&HMAC_SHA2_256, key)?;
    Ok(Box::new(HmacMac {
        name: HMAC_SHA2_256.name,
        mac_size: HMAC_SHA2_256.mac_size,
        state: HmacState::Sha256(Hmac::new_from_slice(key).map_err(invalid_key)?),
    }))
}

fn make_hmac_sha2_512(key: &[u8]) -> OspreyResult<Box<dyn Mac>> {
    let key = key_prefix(&HMAC_SHA2_512, key)?;
    Ok(Box::new(HmacMac {
        name: HMAC_SHA2_512.name,
        mac_size: HMAC_SHA2_512.mac_size,
        state: HmacState::Sha512(Hmac::new_from_slice(key).map_err(invalid_key)?),
    }))
}
