//! Host key signature algorithms (RFC 4253 Section 6.6, RFC 8709, RFC 5656).
//!
//! - `ssh-dss`: DSA over SHA-1, 160-bit subgroup
//! - `ssh-ed25519`: EdDSA over Curve25519
//! - `ecdsa-sha2-nistp256`: ECDSA over P-256 with SHA-256
//!
//! Public keys are SSH public key blobs (`string key-type || ...`); private
//! keys are raw scalars (DSA `x`, the 32-byte Ed25519 seed, the 32-byte
//! P-256 scalar). Signatures go in and out as full SSH signature blobs.
//!
//! # DSA signature encoding
//!
//! On the wire an `ssh-dss` signature is exactly 40 bytes: unsigned
//! big-endian `r` (20 bytes) followed by unsigned big-endian `s`
//! (20 bytes). The signing primitive works on the DER form
//!
//! ```text
//! 30 len  02 len(r) r  02 len(s) s
//! ```
//!
//! where each integer is signed, so a value whose top bit is set gains a
//! leading `00`. [`dss_signature_to_der`] and [`dss_signature_from_der`]
//! convert between the two.

use super::registry::SignatureAlgorithm;
use super::Signature;
use crate::ssh::wire::{put_mpint, put_string, trim_leading_zeros, WireReader};
use bytes::BytesMut;
use osprey_platform::{OspreyError, OspreyResult};
use sha1::{Digest as _, Sha1};
use signature::{DigestSigner, DigestVerifier, Signer, Verifier};

/// Length of each DSA integer on the wire.
const DSS_INT_LEN: usize = 20;

/// Length of a wire-format DSA signature.
pub const DSS_SIGNATURE_LEN: usize = 2 * DSS_INT_LEN;

/// `ssh-dss`
pub const SSH_DSS: SignatureAlgorithm = SignatureAlgorithm {
    name: "ssh-dss",
    make: make_dss,
};

/// `ssh-ed25519`
pub const SSH_ED25519: SignatureAlgorithm = SignatureAlgorithm {
    name: "ssh-ed25519",
    make: make_ed25519,
};

/// `ecdsa-sha2-nistp256`
pub const ECDSA_SHA2_NISTP256: SignatureAlgorithm = SignatureAlgorithm {
    name: "ecdsa-sha2-nistp256",
    make: make_ecdsa_p256,
};

/// Every signature algorithm registered by default, most preferred first.
pub const DEFAULT_SIGNATURES: &[SignatureAlgorithm] =
    &[SSH_ED25519, ECDSA_SHA2_NISTP256, SSH_DSS];

/// Returns the key type named at the start of a public key or signature blob.
pub fn public_key_type(blob: &[u8]) -> OspreyResult<String> {
    WireReader::new(blob)
        .read_utf8()
        .map(str::to_string)
        .map_err(|_| malformed("key blob has no type name"))
}

fn malformed(what: &str) -> OspreyError {
    OspreyError::KeyExchange(format!("Malformed {}", what))
}

/// Opens a signature blob and checks its type, returning the raw signature.
fn open_signature_blob<'a>(blob: &'a [u8], expected: &str) -> OspreyResult<&'a [u8]> {
    let mut reader = WireReader::new(blob);
    let kind = reader
        .read_utf8()
        .map_err(|_| malformed("signature blob"))?;
    if kind != expected {
        return Err(OspreyError::KeyExchange(format!(
            "Signature type '{}' does not match host key type '{}'",
            kind, expected
        )));
    }
    let raw = reader
        .read_string()
        .map_err(|_| malformed("signature blob"))?;
    if !reader.is_empty() {
        return Err(malformed("signature blob (trailing data)"));
    }
    Ok(raw)
}

fn signature_blob(kind: &str, raw: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + kind.len() + raw.len());
    put_string(&mut buf, kind.as_bytes());
    put_string(&mut buf, raw);
    buf.to_vec()
}

fn missing_private_key(kind: &str) -> OspreyError {
    OspreyError::Configuration(format!("{}: signing requires a private key", kind))
}

// ---------------------------------------------------------------------------
// DSA wire <-> DER conversion
// ---------------------------------------------------------------------------

/// Converts a 40-byte wire signature into the DER `SEQUENCE { r, s }`.
pub fn dss_signature_to_der(wire: &[u8]) -> OspreyResult<Vec<u8>> {
    if wire.len() != DSS_SIGNATURE_LEN {
        return Err(OspreyError::KeyExchange(format!(
            "ssh-dss signature must be {} bytes, got {}",
            DSS_SIGNATURE_LEN,
            wire.len()
        )));
    }
    let r = der_integer(&wire[..DSS_INT_LEN]);
    let s = der_integer(&wire[DSS_INT_LEN..]);

    let mut der = Vec::with_capacity(2 + r.len() + s.len());
    der.push(0x30);
    der.push((r.len() + s.len()) as u8);
    der.extend_from_slice(&r);
    der.extend_from_slice(&s);
    Ok(der)
}

/// Converts a DER `SEQUENCE { r, s }` into the 40-byte wire signature.
pub fn dss_signature_from_der(der: &[u8]) -> OspreyResult<[u8; DSS_SIGNATURE_LEN]> {
    let (r, s) = parse_der_pair(der)?;
    let mut wire = [0u8; DSS_SIGNATURE_LEN];
    left_pad_into(&mut wire[..DSS_INT_LEN], r)?;
    left_pad_into(&mut wire[DSS_INT_LEN..], s)?;
    Ok(wire)
}

/// Encodes an unsigned magnitude as a DER INTEGER (tag, length, value).
fn der_integer(magnitude: &[u8]) -> Vec<u8> {
    let trimmed = trim_leading_zeros(magnitude);
    let mut value = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.first().map_or(true, |b| b & 0x80 != 0) {
        value.push(0);
    }
    value.extend_from_slice(trimmed);

    let mut out = Vec::with_capacity(2 + value.len());
    out.push(0x02);
    out.push(value.len() as u8);
    out.extend_from_slice(&value);
    out
}

/// Splits a DER `SEQUENCE { INTEGER, INTEGER }` into unsigned magnitudes.
fn parse_der_pair(der: &[u8]) -> OspreyResult<(&[u8], &[u8])> {
    let bad = || malformed("DSA signature encoding");

    if der.len() < 2 || der[0] != 0x30 || der[1] & 0x80 != 0 {
        return Err(bad());
    }
    if der[1] as usize != der.len() - 2 {
        return Err(bad());
    }

    let mut rest = &der[2..];
    let mut take_integer = || -> OspreyResult<&[u8]> {
        if rest.len() < 2 || rest[0] != 0x02 || rest[1] & 0x80 != 0 {
            return Err(bad());
        }
        let len = rest[1] as usize;
        if len == 0 || rest.len() < 2 + len {
            return Err(bad());
        }
        let value = &rest[2..2 + len];
        if value[0] & 0x80 != 0 {
            return Err(malformed("DSA signature (negative integer)"));
        }
        rest = &rest[2 + len..];
        Ok(trim_leading_zeros(value))
    };

    let r = take_integer()?;
    let s = take_integer()?;
    if !rest.is_empty() {
        return Err(bad());
    }
    Ok((r, s))
}

fn left_pad_into(dest: &mut [u8], magnitude: &[u8]) -> OspreyResult<()> {
    if magnitude.len() > dest.len() {
        return Err(OspreyError::KeyExchange(format!(
            "DSA signature integer of {} bytes exceeds {}",
            magnitude.len(),
            dest.len()
        )));
    }
    let offset = dest.len() - magnitude.len();
    dest[..offset].fill(0);
    dest[offset..].copy_from_slice(magnitude);
    Ok(())
}

// ---------------------------------------------------------------------------
// ssh-dss
// ---------------------------------------------------------------------------

/// `ssh-dss` signer/verifier.
pub struct DssSignature {
    verifying_key: dsa::VerifyingKey,
    signing_key: Option<dsa::SigningKey>,
    message: Vec<u8>,
}

impl std::fmt::Debug for DssSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DssSignature")
            .field("has_private_key", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

impl DssSignature {
    /// Parses an `ssh-dss` public key blob and optional private `x`.
    pub fn new(public_key: &[u8], private_key: Option<&[u8]>) -> OspreyResult<Self> {
        let mut reader = WireReader::new(public_key);
        if reader.read_utf8().map_err(|_| malformed("ssh-dss key"))? != "ssh-dss" {
            return Err(malformed("ssh-dss key (wrong type)"));
        }
        let mut next = || -> OspreyResult<dsa::BigUint> {
            reader
                .read_mpint()
                .map(|m| dsa::BigUint::from_bytes_be(&m))
                .map_err(|_| malformed("ssh-dss key"))
        };
        let (p, q, g, y) = (next()?, next()?, next()?, next()?);

        let components = dsa::Components::from_components(p, q, g)
            .map_err(|_| malformed("ssh-dss domain parameters"))?;
        let verifying_key = dsa::VerifyingKey::from_components(components, y)
            .map_err(|_| malformed("ssh-dss public key"))?;

        let signing_key = match private_key {
            Some(x) => Some(
                dsa::SigningKey::from_components(
                    verifying_key.clone(),
                    dsa::BigUint::from_bytes_be(x),
                )
                .map_err(|_| OspreyError::Configuration("Invalid ssh-dss private key".into()))?,
            ),
            None => None,
        };

        Ok(Self {
            verifying_key,
            signing_key,
            message: Vec::new(),
        })
    }
}

impl Signature for DssSignature {
    fn name(&self) -> &'static str {
        SSH_DSS.name
    }

    fn update(&mut self, data: &[u8]) {
        self.message.extend_from_slice(data);
    }

    fn sign(&mut self) -> OspreyResult<Vec<u8>> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| missing_private_key(SSH_DSS.name))?;
        let digest = Sha1::new_with_prefix(std::mem::take(&mut self.message));
        let sig: dsa::Signature = key
            .try_sign_digest(digest)
            .map_err(|e| OspreyError::KeyExchange(format!("ssh-dss signing failed: {}", e)))?;

        let mut der = Vec::new();
        let r = der_integer(&sig.r().to_bytes_be());
        let s = der_integer(&sig.s().to_bytes_be());
        der.push(0x30);
        der.push((r.len() + s.len()) as u8);
        der.extend_from_slice(&r);
        der.extend_from_slice(&s);

        let wire = dss_signature_from_der(&der)?;
        Ok(signature_blob(SSH_DSS.name, &wire))
    }

    fn verify(&mut self, signature_blob: &[u8]) -> OspreyResult<bool> {
        let message = std::mem::take(&mut self.message);
        let wire = open_signature_blob(signature_blob, SSH_DSS.name)?;
        let der = dss_signature_to_der(wire)?;
        let (r, s) = parse_der_pair(&der)?;

        let sig = match dsa::Signature::from_components(
            dsa::BigUint::from_bytes_be(r),
            dsa::BigUint::from_bytes_be(s),
        ) {
            Ok(sig) => sig,
            // r or s of zero can never verify
            Err(_) => return Ok(false),
        };
        Ok(self
            .verifying_key
            .verify_digest(Sha1::new_with_prefix(message), &sig)
            .is_ok())
    }
}

fn make_dss(public_key: &[u8], private_key: Option<&[u8]>) -> OspreyResult<Box<dyn Signature>> {
    Ok(Box::new(DssSignature::new(public_key, private_key)?))
}

/// Builds an `ssh-dss` public key blob.
pub fn dss_public_key_blob(key: &dsa::VerifyingKey) -> Vec<u8> {
    let components = key.components();
    let mut buf = BytesMut::new();
    put_string(&mut buf, SSH_DSS.name.as_bytes());
    put_mpint(&mut buf, &components.p().to_bytes_be());
    put_mpint(&mut buf, &components.q().to_bytes_be());
    put_mpint(&mut buf, &components.g().to_bytes_be());
    put_mpint(&mut buf, &key.y().to_bytes_be());
    buf.to_vec()
}

// ---------------------------------------------------------------------------
// ssh-ed25519
// ---------------------------------------------------------------------------

/// `ssh-ed25519` signer/verifier.
pub struct Ed25519Signature {
    verifying_key: ed25519_dalek::VerifyingKey,
    signing_key: Option<ed25519_dalek::SigningKey>,
    message: Vec<u8>,
}

impl std::fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signature")
            .field("public_key", &hex::encode(self.verifying_key.as_bytes()))
            .field("has_private_key", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

impl Ed25519Signature {
    /// Parses an `ssh-ed25519` public key blob and optional 32-byte seed.
    pub fn new(public_key: &[u8], private_key: Option<&[u8]>) -> OspreyResult<Self> {
        let mut reader = WireReader::new(public_key);
        if reader.read_utf8().map_err(|_| malformed("ssh-ed25519 key"))? != "ssh-ed25519" {
            return Err(malformed("ssh-ed25519 key (wrong type)"));
        }
        let key_bytes: [u8; 32] = reader
            .read_string()
            .ok()
            .and_then(|k| k.try_into().ok())
            .ok_or_else(|| malformed("ssh-ed25519 key (expected 32 bytes)"))?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| OspreyError::KeyExchange(format!("Invalid Ed25519 public key: {}", e)))?;

        let signing_key = match private_key {
            Some(seed) => {
                let seed: [u8; 32] = seed.try_into().map_err(|_| {
                    OspreyError::Configuration("Ed25519 private key must be 32 bytes".into())
                })?;
                let key = ed25519_dalek::SigningKey::from_bytes(&seed);
                if key.verifying_key() != verifying_key {
                    return Err(OspreyError::Configuration(
                        "Ed25519 private key does not match public key".into(),
                    ));
                }
                Some(key)
            }
            None => None,
        };

        Ok(Self {
            verifying_key,
            signing_key,
            message: Vec::new(),
        })
    }
}

impl Signature for Ed25519Signature {
    fn name(&self) -> &'static str {
        SSH_ED25519.name
    }

    fn update(&mut self, data: &[u8]) {
        self.message.extend_from_slice(data);
    }

    fn sign(&mut self) -> OspreyResult<Vec<u8>> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| missing_private_key(SSH_ED25519.name))?;
        let message = std::mem::take(&mut self.message);
        let sig: ed25519_dalek::Signature = key.sign(&message);
        Ok(signature_blob(SSH_ED25519.name, &sig.to_bytes()))
    }

    fn verify(&mut self, signature_blob: &[u8]) -> OspreyResult<bool> {
        let message = std::mem::take(&mut self.message);
        let raw = open_signature_blob(signature_blob, SSH_ED25519.name)?;
        let raw: [u8; 64] = raw
            .try_into()
            .map_err(|_| malformed("ssh-ed25519 signature (expected 64 bytes)"))?;
        let sig = ed25519_dalek::Signature::from_bytes(&raw);
        Ok(self.verifying_key.verify(&message, &sig).is_ok())
    }
}

fn make_ed25519(
    public_key: &[u8],
    private_key: Option<&[u8]>,
) -> OspreyResult<Box<dyn Signature>> {
    Ok(Box::new(Ed25519Signature::new(public_key, private_key)?))
}

/// Builds an `ssh-ed25519` public key blob.
pub fn ed25519_public_key_blob(key: &ed25519_dalek::VerifyingKey) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_string(&mut buf, SSH_ED25519.name.as_bytes());
    put_string(&mut buf, key.as_bytes());
    buf.to_vec()
}

// ---------------------------------------------------------------------------
// ecdsa-sha2-nistp256
// ---------------------------------------------------------------------------

const NISTP256: &str = "nistp256";

/// `ecdsa-sha2-nistp256` signer/verifier.
pub struct EcdsaP256Signature {
    verifying_key: p256::ecdsa::VerifyingKey,
    signing_key: Option<p256::ecdsa::SigningKey>,
    message: Vec<u8>,
}

impl std::fmt::Debug for EcdsaP256Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaP256Signature")
            .field("has_private_key", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

impl EcdsaP256Signature {
    /// Parses an `ecdsa-sha2-nistp256` public key blob and optional scalar.
    pub fn new(public_key: &[u8], private_key: Option<&[u8]>) -> OspreyResult<Self> {
        let mut reader = WireReader::new(public_key);
        let kind = reader.read_utf8().map_err(|_| malformed("ECDSA key"))?;
        let curve = reader.read_utf8().map_err(|_| malformed("ECDSA key"))?;
        if kind != ECDSA_SHA2_NISTP256.name || curve != NISTP256 {
            return Err(malformed("ECDSA key (wrong type or curve)"));
        }
        let point = reader.read_string().map_err(|_| malformed("ECDSA key"))?;
        let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
            .map_err(|e| OspreyError::KeyExchange(format!("Invalid P-256 public key: {}", e)))?;

        let signing_key = match private_key {
            Some(scalar) => {
                let key = p256::ecdsa::SigningKey::from_slice(scalar).map_err(|_| {
                    OspreyError::Configuration("Invalid P-256 private key".into())
                })?;
                if *key.verifying_key() != verifying_key {
                    return Err(OspreyError::Configuration(
                        "P-256 private key does not match public key".into(),
                    ));
                }
                Some(key)
            }
            None => None,
        };

        Ok(Self {
            verifying_key,
            signing_key,
            message: Vec::new(),
        })
    }
}

impl Signature for EcdsaP256Signature {
    fn name(&self) -> &'static str {
        ECDSA_SHA2_NISTP256.name
    }

    fn update(&mut self, data: &[u8]) {
        self.message.extend_from_slice(data);
    }

    fn sign(&mut self) -> OspreyResult<Vec<u8>> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| missing_private_key(ECDSA_SHA2_NISTP256.name))?;
        let message = std::mem::take(&mut self.message);
        let sig: p256::ecdsa::Signature = key
            .try_sign(&message)
            .map_err(|e| OspreyError::KeyExchange(format!("ECDSA signing failed: {}", e)))?;
        let (r, s) = sig.split_bytes();

        let mut inner = BytesMut::new();
        put_mpint(&mut inner, &r);
        put_mpint(&mut inner, &s);
        Ok(signature_blob(ECDSA_SHA2_NISTP256.name, &inner))
    }

    fn verify(&mut self, signature_blob: &[u8]) -> OspreyResult<bool> {
        let message = std::mem::take(&mut self.message);
        let raw = open_signature_blob(signature_blob, ECDSA_SHA2_NISTP256.name)?;
        let mut reader = WireReader::new(raw);
        let r = reader.read_mpint().map_err(|_| malformed("ECDSA signature"))?;
        let s = reader.read_mpint().map_err(|_| malformed("ECDSA signature"))?;

        let mut r_bytes = [0u8; 32];
        let mut s_bytes = [0u8; 32];
        left_pad_into(&mut r_bytes, &r)?;
        left_pad_into(&mut s_bytes, &s)?;

        let sig = match p256::ecdsa::Signature::from_scalars(r_bytes, s_bytes) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };
        Ok(self.verifying_key.verify(&message, &sig).is_ok())
    }
}

fn make_ecdsa_p256(
    public_key: &[u8],
    private_key: Option<&[u8]>,
) -> OspreyResult<Box<dyn Signature>> {
    Ok(Box::new(EcdsaP256Signature::new(public_key, private_key)?))
}

/// Builds an `ecdsa-sha2-nistp256` public key blob.
pub fn ecdsa_p256_public_key_blob(key: &p256::ecdsa::VerifyingKey) -> Vec<u8> {
    let point = key.to_encoded_point(false);
    let mut buf = BytesMut::new();
    put_string(&mut buf, ECDSA_SHA2_NISTP256.name.as_bytes());
    put_string(&mut buf, NISTP256.as_bytes());
    put_string(&mut buf, point.as_bytes());
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(r_first: u8, s_first: u8) -> [u8; 40] {
        let mut w = [0x11u8; 40];
        w[0] = r_first;
        w[20] = s_first;
        w
    }

    #[test]
    fn test_dss_round_trip_no_high_bits() {
        let w = wire(0x12, 0x34);
        let der = dss_signature_to_der(&w).unwrap();
        assert_eq!(der.len(), 2 + 22 + 22);
        assert_eq!(dss_signature_from_der(&der).unwrap(), w);
    }

    #[test]
    fn test_dss_round_trip_r_high_bit() {
        let w = wire(0x80, 0x34);
        let der = dss_signature_to_der(&w).unwrap();
        // r gains a sign byte
        assert_eq!(&der[2..5], &[0x02, 21, 0x00]);
        assert_eq!(dss_signature_from_der(&der).unwrap(), w);
    }

    #[test]
    fn test_dss_round_trip_s_high_bit() {
        let w = wire(0x7f, 0xff);
        let der = dss_signature_to_der(&w).unwrap();
        assert_eq!(der[1] as usize, 22 + 23);
        assert_eq!(dss_signature_from_der(&der).unwrap(), w);
    }

    #[test]
    fn test_dss_round_trip_both_high_bits() {
        let w = wire(0xff, 0x80);
        let der = dss_signature_to_der(&w).unwrap();
        assert_eq!(der.len(), 2 + 23 + 23);
        assert_eq!(dss_signature_from_der(&der).unwrap(), w);
    }

    #[test]
    fn test_dss_short_integers_left_padded() {
        let mut w = [0u8; 40];
        w[19] = 0x05; // r = 5
        w[39] = 0x80; // s = 128
        let der = dss_signature_to_der(&w).unwrap();
        assert_eq!(der, vec![0x30, 7, 0x02, 1, 0x05, 0x02, 2, 0x00, 0x80]);
        assert_eq!(dss_signature_from_der(&der).unwrap(), w);
    }

    #[test]
    fn test_dss_zero_integers() {
        let w = [0u8; 40];
        let der = dss_signature_to_der(&w).unwrap();
        assert_eq!(der, vec![0x30, 6, 0x02, 1, 0x00, 0x02, 1, 0x00]);
        assert_eq!(dss_signature_from_der(&der).unwrap(), w);
    }

    #[test]
    fn test_dss_wrong_wire_length() {
        assert!(matches!(
            dss_signature_to_der(&[0u8; 39]),
            Err(OspreyError::KeyExchange(_))
        ));
    }

    #[test]
    fn test_dss_der_integer_too_long() {
        let mut der = vec![0x30, 25, 0x02, 21];
        der.extend_from_slice(&[0x01; 21]);
        der.extend_from_slice(&[0x02, 0x00]);
        der[1] = (der.len() - 2) as u8;
        assert!(dss_signature_from_der(&der).is_err());
    }

    #[test]
    fn test_dss_der_trailing_garbage() {
        let mut der = dss_signature_to_der(&wire(1, 2)).unwrap();
        der.push(0);
        assert!(dss_signature_from_der(&der).is_err());
    }

    #[test]
    fn test_public_key_type() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, b"ssh-ed25519");
        put_string(&mut buf, &[0u8; 32]);
        assert_eq!(public_key_type(&buf).unwrap(), "ssh-ed25519");
        assert!(public_key_type(&[0, 0]).is_err());
    }

    #[test]
    fn test_signature_type_mismatch() {
        let blob = signature_blob("ssh-rsa", &[0u8; 64]);
        assert!(matches!(
            open_signature_blob(&blob, "ssh-ed25519"),
            Err(OspreyError::KeyExchange(_))
        ));
    }

    #[test]
    fn test_ed25519_sign_verify() {
        let seed = [0x42u8; 32];
        let public = ed25519_public_key_blob(
            &ed25519_dalek::SigningKey::from_bytes(&seed).verifying_key(),
        );

        let mut signer = (SSH_ED25519.make)(&public, Some(&seed)).unwrap();
        signer.update(b"exchange ");
        signer.update(b"hash");
        let blob = signer.sign().unwrap();

        let mut verifier = (SSH_ED25519.make)(&public, None).unwrap();
        verifier.update(b"exchange hash");
        assert!(verifier.verify(&blob).unwrap());

        verifier.update(b"exchange hasH");
        assert!(!verifier.verify(&blob).unwrap());
    }

    #[test]
    fn test_ed25519_sign_without_private_key() {
        let seed = [0x01u8; 32];
        let public = ed25519_public_key_blob(
            &ed25519_dalek::SigningKey::from_bytes(&seed).verifying_key(),
        );
        let mut verifier = (SSH_ED25519.make)(&public, None).unwrap();
        verifier.update(b"data");
        assert!(matches!(
            verifier.sign(),
            Err(OspreyError::Configuration(_))
        ));
    }

    #[test]
    fn test_ecdsa_sign_verify() {
        let scalar = [0x07u8; 32];
        let signing = p256::ecdsa::SigningKey::from_slice(&scalar).unwrap();
        let public = ecdsa_p256_public_key_blob(signing.verifying_key());

        let mut signer = (ECDSA_SHA2_NISTP256.make)(&public, Some(&scalar)).unwrap();
        signer.update(b"H");
        let blob = signer.sign().unwrap();

        let mut verifier = (ECDSA_SHA2_NISTP256.make)(&public, None).unwrap();
        verifier.update(b"H");
        assert!(verifier.verify(&blob).unwrap());

        let mut tampered = blob.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        verifier.update(b"H");
        assert!(!verifier.verify(&tampered).unwrap_or(false));
    }
}
