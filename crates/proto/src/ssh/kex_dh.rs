//! Diffie-Hellman key exchange (RFC 4253 Section 8, RFC 8268, RFC 8731).
//!
//! This module implements:
//! - diffie-hellman-group1-sha1 (RFC 2409 Oakley group 2, 1024-bit)
//! - diffie-hellman-group14-sha1 / -sha256 (RFC 3526 group 14, 2048-bit)
//! - curve25519-sha256 and curve25519-sha256@libssh.org (RFC 8731)
//!
//! All methods share one state machine; a [`KexGroup`] supplies the
//! ephemeral key generation, public value encoding and agreement.
//!
//! ```text
//!   Init --start()--> AwaitingReply --process_reply()--> VerifyingHostKey
//!                          |                                  |      |
//!                          +------------> Failed <------------+      v
//!                                                                Complete
//! ```
//!
//! The exchange hash is
//!
//! ```text
//! H = HASH(string V_C || string V_S || string I_C || string I_S ||
//!          string K_S || e || f || mpint K)
//! ```
//!
//! where `e` and `f` are mpints for the MODP groups and strings for X25519.
//!
//! # Security
//!
//! - Peer public values are checked: `1 < v < p - 1` for MODP groups and a
//!   non-zero shared secret for X25519
//! - Ephemeral private values are zeroized on drop
//! - The exchange never completes without a verified host key signature

use crate::ssh::crypto::registry::{DigestAlgorithm, KexAlgorithm};
use crate::ssh::crypto::{public_key_type, AlgorithmRegistry, Random, RandomRng};
use crate::ssh::hostkey::HostKey;
use crate::ssh::message::MessageType;
use crate::ssh::wire::{put_mpint, put_string, WireReader};
use bytes::{BufMut, BytesMut};
use num_bigint::{BigUint, RandBigInt};
use osprey_platform::{OspreyError, OspreyResult};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Group parameters behind a key exchange method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexGroup {
    /// 1024-bit MODP group (Oakley group 2)
    Group1,
    /// 2048-bit MODP group 14
    Group14,
    /// X25519
    Curve25519,
}

/// `diffie-hellman-group1-sha1`
pub const DH_GROUP1_SHA1: KexAlgorithm = KexAlgorithm {
    name: "diffie-hellman-group1-sha1",
    digest: "sha1",
    group: KexGroup::Group1,
};

/// `diffie-hellman-group14-sha1`
pub const DH_GROUP14_SHA1: KexAlgorithm = KexAlgorithm {
    name: "diffie-hellman-group14-sha1",
    digest: "sha1",
    group: KexGroup::Group14,
};

/// `diffie-hellman-group14-sha256`
pub const DH_GROUP14_SHA256: KexAlgorithm = KexAlgorithm {
    name: "diffie-hellman-group14-sha256",
    digest: "sha256",
    group: KexGroup::Group14,
};

/// `curve25519-sha256`
pub const CURVE25519_SHA256: KexAlgorithm = KexAlgorithm {
    name: "curve25519-sha256",
    digest: "sha256",
    group: KexGroup::Curve25519,
};

/// `curve25519-sha256@libssh.org`
pub const CURVE25519_SHA256_LIBSSH: KexAlgorithm = KexAlgorithm {
    name: "curve25519-sha256@libssh.org",
    digest: "sha256",
    group: KexGroup::Curve25519,
};

/// Every key exchange method registered by default, most preferred first.
pub const DEFAULT_KEX: &[KexAlgorithm] = &[
    CURVE25519_SHA256,
    CURVE25519_SHA256_LIBSSH,
    DH_GROUP14_SHA256,
    DH_GROUP14_SHA1,
    DH_GROUP1_SHA1,
];

/// MODP group parameters (RFC 2409, RFC 3526). The generator is 2 for both.
mod modp {
    use num_bigint::BigUint;
    use once_cell::sync::Lazy;

    fn prime(hex_digits: &str) -> BigUint {
        BigUint::parse_bytes(hex_digits.as_bytes(), 16).expect("Invalid MODP prime")
    }

    /// Oakley group 2 prime (1024-bit)
    pub static GROUP1_P: Lazy<BigUint> = Lazy::new(|| {
        prime(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
             29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
             EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
             E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381\
             FFFFFFFFFFFFFFFF",
        )
    });

    /// Group 14 prime (2048-bit)
    pub static GROUP14_P: Lazy<BigUint> = Lazy::new(|| {
        prime(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
             29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
             EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
             E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
             C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
             83655D23DCA3AD961C62F356208552BB9ED529077096966D\
             670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
             E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9\
             DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
             15728E5A8AACAA68FFFFFFFFFFFFFFFF",
        )
    });

    /// Generator
    pub static G: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u32));
}

impl KexGroup {
    fn modulus(self) -> Option<&'static BigUint> {
        match self {
            KexGroup::Group1 => Some(&*modp::GROUP1_P),
            KexGroup::Group14 => Some(&*modp::GROUP14_P),
            KexGroup::Curve25519 => None,
        }
    }

    /// Generates an ephemeral key pair, returning it with its public value.
    pub fn generate(self, random: &dyn Random) -> (EphemeralKey, Vec<u8>) {
        match self.modulus() {
            Some(p) => {
                let mut rng = RandomRng(random);
                let x = rng.gen_biguint_range(&BigUint::from(2u32), &(p.clone() - 1u32));
                let e = modp::G.modpow(&x, p);
                (
                    EphemeralKey::Modp {
                        p,
                        x: Zeroizing::new(x.to_bytes_be()),
                    },
                    e.to_bytes_be(),
                )
            }
            None => {
                let secret = x25519_dalek::StaticSecret::random_from_rng(RandomRng(random));
                let public = x25519_dalek::PublicKey::from(&secret);
                (EphemeralKey::X25519(secret), public.as_bytes().to_vec())
            }
        }
    }

    /// Appends a public value in this group's wire encoding.
    pub fn put_public(self, buf: &mut BytesMut, value: &[u8]) {
        match self {
            KexGroup::Curve25519 => put_string(buf, value),
            _ => put_mpint(buf, value),
        }
    }

    /// Reads a public value in this group's wire encoding.
    pub fn read_public(self, reader: &mut WireReader<'_>) -> OspreyResult<Vec<u8>> {
        match self {
            KexGroup::Curve25519 => Ok(reader.read_string()?.to_vec()),
            _ => reader.read_mpint(),
        }
    }
}

/// Ephemeral private key for one exchange.
pub enum EphemeralKey {
    /// MODP exponent `x`
    Modp {
        /// Group modulus
        p: &'static BigUint,
        /// Private exponent, big-endian
        x: Zeroizing<Vec<u8>>,
    },
    /// X25519 scalar
    X25519(x25519_dalek::StaticSecret),
}

impl std::fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            EphemeralKey::Modp { .. } => "modp",
            EphemeralKey::X25519(_) => "x25519",
        };
        f.debug_struct("EphemeralKey")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

impl EphemeralKey {
    /// Computes the shared secret K as an unsigned big-endian magnitude.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::KeyExchange`] if the peer value is out of
    /// range (MODP) or yields an all-zero secret (X25519).
    pub fn agree(&self, peer_public: &[u8]) -> OspreyResult<Zeroizing<Vec<u8>>> {
        match self {
            EphemeralKey::Modp { p, x } => {
                let y = BigUint::from_bytes_be(peer_public);
                let one = BigUint::from(1u32);
                let p_minus_one = (*p).clone() - 1u32;
                if y <= one || y >= p_minus_one {
                    return Err(OspreyError::KeyExchange(
                        "Invalid peer public value: out of range".to_string(),
                    ));
                }
                let k = y.modpow(&BigUint::from_bytes_be(x), p);
                Ok(Zeroizing::new(k.to_bytes_be()))
            }
            EphemeralKey::X25519(secret) => {
                let peer: [u8; 32] = peer_public.try_into().map_err(|_| {
                    OspreyError::KeyExchange(format!(
                        "Invalid X25519 public value length: {}",
                        peer_public.len()
                    ))
                })?;
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err(OspreyError::KeyExchange(
                        "X25519 shared secret is all zero".to_string(),
                    ));
                }
                Ok(Zeroizing::new(shared.as_bytes().to_vec()))
            }
        }
    }
}

/// Transcript fixed before the Diffie-Hellman messages are exchanged.
#[derive(Debug, Clone)]
pub struct KexContext {
    /// V_C, client identification without CR LF
    pub client_version: Vec<u8>,
    /// V_S, server identification without CR LF
    pub server_version: Vec<u8>,
    /// I_C, payload of the client's KEXINIT
    pub client_kexinit: Vec<u8>,
    /// I_S, payload of the server's KEXINIT
    pub server_kexinit: Vec<u8>,
}

/// Computes the exchange hash H.
pub fn exchange_hash(
    digest: &DigestAlgorithm,
    group: KexGroup,
    context: &KexContext,
    host_key: &[u8],
    e: &[u8],
    f: &[u8],
    k: &[u8],
) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_string(&mut buf, &context.client_version);
    put_string(&mut buf, &context.server_version);
    put_string(&mut buf, &context.client_kexinit);
    put_string(&mut buf, &context.server_kexinit);
    put_string(&mut buf, host_key);
    group.put_public(&mut buf, e);
    group.put_public(&mut buf, f);
    put_mpint(&mut buf, k);

    let mut hasher = (digest.make)();
    hasher.update(&buf);
    let h = hasher.digest();
    buf.iter_mut().for_each(|b| *b = 0);
    h
}

/// Results of a completed exchange.
pub struct KexOutput {
    /// Shared secret K (unsigned magnitude)
    pub shared_secret: Zeroizing<Vec<u8>>,
    /// Exchange hash H
    pub exchange_hash: Vec<u8>,
    /// Verified (client) or presented (server) host key blob
    pub host_key: Vec<u8>,
    /// Host key type
    pub host_key_type: String,
    /// Digest bound to the key exchange method
    pub digest: DigestAlgorithm,
}

impl std::fmt::Debug for KexOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KexOutput")
            .field("exchange_hash", &hex::encode(&self.exchange_hash))
            .field("host_key_type", &self.host_key_type)
            .field("digest", &self.digest.name)
            .finish_non_exhaustive()
    }
}

/// SSH_MSG_KEXDH_INIT (also SSH_MSG_KEX_ECDH_INIT).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexdhInit {
    /// Client public value e
    pub e: Vec<u8>,
}

impl KexdhInit {
    /// Serializes the message including its type byte.
    pub fn to_bytes(&self, group: KexGroup) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::KexdhInit as u8);
        group.put_public(&mut buf, &self.e);
        buf.to_vec()
    }

    /// Parses the message including its type byte.
    pub fn from_bytes(data: &[u8], group: KexGroup) -> OspreyResult<Self> {
        let mut reader = WireReader::new(data);
        expect_type(&mut reader, MessageType::KexdhInit)?;
        let e = group.read_public(&mut reader).map_err(malformed)?;
        Ok(Self { e })
    }
}

/// SSH_MSG_KEXDH_REPLY (also SSH_MSG_KEX_ECDH_REPLY).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexdhReply {
    /// Host key blob K_S
    pub host_key: Vec<u8>,
    /// Server public value f
    pub f: Vec<u8>,
    /// Signature blob over H
    pub signature: Vec<u8>,
}

impl KexdhReply {
    /// Serializes the message including its type byte.
    pub fn to_bytes(&self, group: KexGroup) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::KexdhReply as u8);
        put_string(&mut buf, &self.host_key);
        group.put_public(&mut buf, &self.f);
        put_string(&mut buf, &self.signature);
        buf.to_vec()
    }

    /// Parses the message including its type byte.
    pub fn from_bytes(data: &[u8], group: KexGroup) -> OspreyResult<Self> {
        let mut reader = WireReader::new(data);
        expect_type(&mut reader, MessageType::KexdhReply)?;
        let host_key = reader.read_string().map_err(malformed)?.to_vec();
        let f = group.read_public(&mut reader).map_err(malformed)?;
        let signature = reader.read_string().map_err(malformed)?.to_vec();
        Ok(Self {
            host_key,
            f,
            signature,
        })
    }
}

fn expect_type(reader: &mut WireReader<'_>, expected: MessageType) -> OspreyResult<()> {
    let msg_type = reader.read_u8().map_err(malformed)?;
    if msg_type != expected as u8 {
        return Err(OspreyError::KeyExchange(format!(
            "Unexpected message type {} (expected {})",
            msg_type, expected
        )));
    }
    Ok(())
}

fn malformed(err: OspreyError) -> OspreyError {
    OspreyError::KeyExchange(format!("Malformed key exchange message: {}", err))
}

/// Key exchange state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexState {
    /// Nothing sent yet
    Init,
    /// KEXDH_INIT sent
    AwaitingReply,
    /// Reply parsed, K and H computed, signature being checked
    VerifyingHostKey,
    /// Host key verified, output available
    Complete,
    /// Aborted; the connection must be closed
    Failed,
}

/// Client side of one key exchange.
#[derive(Debug)]
pub struct KexDhClient {
    algorithm: KexAlgorithm,
    digest: DigestAlgorithm,
    host_key_algorithm: String,
    context: KexContext,
    state: KexState,
    ephemeral: Option<EphemeralKey>,
    e: Vec<u8>,
}

impl KexDhClient {
    /// Prepares an exchange for the negotiated method and host key algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Configuration`] if the method's digest is not
    /// registered.
    pub fn new(
        registry: &AlgorithmRegistry,
        algorithm: &KexAlgorithm,
        host_key_algorithm: &str,
        context: KexContext,
    ) -> OspreyResult<Self> {
        Ok(Self {
            algorithm: *algorithm,
            digest: *registry.digest(algorithm.digest)?,
            host_key_algorithm: host_key_algorithm.to_string(),
            context,
            state: KexState::Init,
            ephemeral: None,
            e: Vec::new(),
        })
    }

    /// Current state.
    pub fn state(&self) -> KexState {
        self.state
    }

    /// Generates the ephemeral key and returns the KEXDH_INIT payload.
    pub fn start(&mut self, random: &dyn Random) -> OspreyResult<Vec<u8>> {
        if self.state != KexState::Init {
            return Err(self.fail(format!("start() called in state {:?}", self.state)));
        }
        let (ephemeral, e) = self.algorithm.group.generate(random);
        self.ephemeral = Some(ephemeral);
        self.e = e;
        self.state = KexState::AwaitingReply;
        debug!(kex = self.algorithm.name, "Sent KEXDH_INIT");
        Ok(KexdhInit { e: self.e.clone() }.to_bytes(self.algorithm.group))
    }

    /// Consumes the server's reply, verifying the host key signature over H.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::KeyExchange`] and moves to
    /// [`KexState::Failed`] on an unexpected message, malformed fields, a
    /// bad public value, a host key of the wrong type, or a signature that
    /// does not verify.
    pub fn process_reply(
        &mut self,
        payload: &[u8],
        registry: &AlgorithmRegistry,
    ) -> OspreyResult<KexOutput> {
        if self.state != KexState::AwaitingReply {
            return Err(self.fail(format!(
                "KEXDH_REPLY received in state {:?}",
                self.state
            )));
        }
        match self.verify_reply(payload, registry) {
            Ok(output) => {
                self.state = KexState::Complete;
                self.ephemeral = None;
                Ok(output)
            }
            Err(err) => {
                self.state = KexState::Failed;
                self.ephemeral = None;
                Err(err)
            }
        }
    }

    fn verify_reply(
        &mut self,
        payload: &[u8],
        registry: &AlgorithmRegistry,
    ) -> OspreyResult<KexOutput> {
        let reply = KexdhReply::from_bytes(payload, self.algorithm.group)?;
        let ephemeral = self
            .ephemeral
            .as_ref()
            .ok_or_else(|| OspreyError::KeyExchange("Missing ephemeral key".to_string()))?;
        let k = ephemeral.agree(&reply.f)?;
        let h = exchange_hash(
            &self.digest,
            self.algorithm.group,
            &self.context,
            &reply.host_key,
            &self.e,
            &reply.f,
            &k,
        );

        self.state = KexState::VerifyingHostKey;
        let key_type = public_key_type(&reply.host_key)?;
        if key_type != self.host_key_algorithm {
            return Err(OspreyError::KeyExchange(format!(
                "Host key type '{}' does not match negotiated '{}'",
                key_type, self.host_key_algorithm
            )));
        }
        let signature_alg = registry.signature(&key_type).map_err(|_| {
            OspreyError::KeyExchange(format!("Unsupported host key type '{}'", key_type))
        })?;
        let mut verifier = (signature_alg.make)(&reply.host_key, None)?;
        verifier.update(&h);
        if !verifier.verify(&reply.signature)? {
            warn!(
                kex = self.algorithm.name,
                key_type = %key_type,
                "Host key signature verification failed"
            );
            return Err(OspreyError::KeyExchange(
                "Host key signature verification failed".to_string(),
            ));
        }

        Ok(KexOutput {
            shared_secret: k,
            exchange_hash: h,
            host_key: reply.host_key,
            host_key_type: key_type,
            digest: self.digest,
        })
    }

    fn fail(&mut self, message: String) -> OspreyError {
        self.state = KexState::Failed;
        self.ephemeral = None;
        OspreyError::KeyExchange(message)
    }
}

/// Server side: answers a KEXDH_INIT, returning the reply payload.
///
/// `host_key` signs H through the registry's signature constructor.
pub fn server_reply(
    registry: &AlgorithmRegistry,
    algorithm: &KexAlgorithm,
    context: &KexContext,
    init_payload: &[u8],
    host_key: &dyn HostKey,
) -> OspreyResult<(Vec<u8>, KexOutput)> {
    let digest = *registry.digest(algorithm.digest)?;
    let init = KexdhInit::from_bytes(init_payload, algorithm.group)?;

    let (ephemeral, f) = algorithm.group.generate(registry.random().as_ref());
    let k = ephemeral.agree(&init.e)?;
    drop(ephemeral);

    let blob = host_key.public_key_blob();
    let h = exchange_hash(&digest, algorithm.group, context, &blob, &init.e, &f, &k);

    let mut signer = host_key.signer(registry)?;
    signer.update(&h);
    let signature = signer.sign()?;

    let reply = KexdhReply {
        host_key: blob.clone(),
        f,
        signature,
    };
    debug!(kex = algorithm.name, "Sent KEXDH_REPLY");
    Ok((
        reply.to_bytes(algorithm.group),
        KexOutput {
            shared_secret: k,
            exchange_hash: h,
            host_key: blob,
            host_key_type: host_key.key_type().to_string(),
            digest,
        },
    ))
}
