//! Key exchange negotiation messages (RFC 4253 Section 7).
//!
//! This module holds the messages that bracket every key exchange:
//! - SSH_MSG_KEXINIT, built from local [`AlgorithmPreferences`]
//! - SSH_MSG_NEWKEYS
//!
//! # Key Exchange Flow
//!
//! 1. Both sides send SSH_MSG_KEXINIT
//! 2. Algorithm negotiation, see [`negotiate`](crate::ssh::negotiate)
//! 3. Diffie-Hellman exchange, see [`kex_dh`](crate::ssh::kex_dh)
//! 4. Both sides send SSH_MSG_NEWKEYS
//! 5. Each direction switches to the new keys at its NEWKEYS
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::crypto::LockedRandom;
//! use osprey_proto::ssh::kex::{AlgorithmPreferences, KexInit, NewKeys};
//!
//! let kexinit = KexInit::new(&AlgorithmPreferences::default(), &LockedRandom::from_seed(9));
//! assert!(kexinit.kex_algorithms().contains(&"curve25519-sha256".to_string()));
//!
//! assert_eq!(NewKeys::new().to_bytes(), vec![21]);
//! ```

use crate::ssh::crypto::Random;
use crate::ssh::message::MessageType;
use crate::ssh::wire::{put_bool, put_name_list, WireReader};
use bytes::{BufMut, BytesMut};
use osprey_platform::{OspreyError, OspreyResult};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Ordered local algorithm preferences, most preferred first.
///
/// Setters that do not name a direction apply to both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmPreferences {
    /// Key exchange methods
    pub kex: Vec<String>,
    /// Host key (signature) algorithms
    pub host_key: Vec<String>,
    /// Ciphers client to server
    pub ciphers_client_to_server: Vec<String>,
    /// Ciphers server to client
    pub ciphers_server_to_client: Vec<String>,
    /// MACs client to server
    pub macs_client_to_server: Vec<String>,
    /// MACs server to client
    pub macs_server_to_client: Vec<String>,
    /// Compression client to server
    pub compression_client_to_server: Vec<String>,
    /// Compression server to client
    pub compression_server_to_client: Vec<String>,
}

impl Default for AlgorithmPreferences {
    fn default() -> Self {
        let ciphers = names(&[
            "aes128-ctr",
            "aes192-ctr",
            "aes256-ctr",
            "aes128-cbc",
            "aes192-cbc",
            "aes256-cbc",
        ]);
        let macs = names(&["hmac-sha2-256", "hmac-sha2-512", "hmac-sha1", "hmac-sha1-96"]);
        let compression = names(&["none", "zlib@openssh.com", "zlib"]);
        Self {
            kex: names(&[
                "curve25519-sha256",
                "curve25519-sha256@libssh.org",
                "diffie-hellman-group14-sha256",
                "diffie-hellman-group14-sha1",
                "diffie-hellman-group1-sha1",
            ]),
            host_key: names(&["ssh-ed25519", "ecdsa-sha2-nistp256", "ssh-dss"]),
            ciphers_client_to_server: ciphers.clone(),
            ciphers_server_to_client: ciphers,
            macs_client_to_server: macs.clone(),
            macs_server_to_client: macs,
            compression_client_to_server: compression.clone(),
            compression_server_to_client: compression,
        }
    }
}

impl AlgorithmPreferences {
    /// Sets the key exchange methods.
    pub fn with_kex(mut self, list: &[&str]) -> Self {
        self.kex = names(list);
        self
    }

    /// Sets the host key algorithms.
    pub fn with_host_keys(mut self, list: &[&str]) -> Self {
        self.host_key = names(list);
        self
    }

    /// Sets the ciphers for both directions.
    pub fn with_ciphers(mut self, list: &[&str]) -> Self {
        self.ciphers_client_to_server = names(list);
        self.ciphers_server_to_client = names(list);
        self
    }

    /// Sets the MACs for both directions.
    pub fn with_macs(mut self, list: &[&str]) -> Self {
        self.macs_client_to_server = names(list);
        self.macs_server_to_client = names(list);
        self
    }

    /// Sets the compression methods for both directions.
    pub fn with_compression(mut self, list: &[&str]) -> Self {
        self.compression_client_to_server = names(list);
        self.compression_server_to_client = names(list);
        self
    }

    /// Every `(category, list)` pair, in KEXINIT order.
    pub fn categories(&self) -> [(&'static str, &[String]); 8] {
        [
            ("kex", &self.kex),
            ("host key", &self.host_key),
            ("cipher client to server", &self.ciphers_client_to_server),
            ("cipher server to client", &self.ciphers_server_to_client),
            ("MAC client to server", &self.macs_client_to_server),
            ("MAC server to client", &self.macs_server_to_client),
            ("compression client to server", &self.compression_client_to_server),
            ("compression server to client", &self.compression_server_to_client),
        ]
    }
}

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
///
/// Each list is ordered by preference, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    cookie: [u8; 16],
    kex_algorithms: Vec<String>,
    server_host_key_algorithms: Vec<String>,
    encryption_algorithms_client_to_server: Vec<String>,
    encryption_algorithms_server_to_client: Vec<String>,
    mac_algorithms_client_to_server: Vec<String>,
    mac_algorithms_server_to_client: Vec<String>,
    compression_algorithms_client_to_server: Vec<String>,
    compression_algorithms_server_to_client: Vec<String>,
    languages_client_to_server: Vec<String>,
    languages_server_to_client: Vec<String>,
    first_kex_packet_follows: bool,
}

impl KexInit {
    /// Builds a KEXINIT from local preferences with a random cookie.
    pub fn new(prefs: &AlgorithmPreferences, random: &dyn Random) -> Self {
        let mut cookie = [0u8; 16];
        random.fill(&mut cookie);

        Self {
            cookie,
            kex_algorithms: prefs.kex.clone(),
            server_host_key_algorithms: prefs.host_key.clone(),
            encryption_algorithms_client_to_server: prefs.ciphers_client_to_server.clone(),
            encryption_algorithms_server_to_client: prefs.ciphers_server_to_client.clone(),
            mac_algorithms_client_to_server: prefs.macs_client_to_server.clone(),
            mac_algorithms_server_to_client: prefs.macs_server_to_client.clone(),
            compression_algorithms_client_to_server: prefs.compression_client_to_server.clone(),
            compression_algorithms_server_to_client: prefs.compression_server_to_client.clone(),
            languages_client_to_server: vec![],
            languages_server_to_client: vec![],
            first_kex_packet_follows: false,
        }
    }

    /// Marks that a guessed key exchange packet follows this one.
    pub fn set_first_kex_packet_follows(&mut self, follows: bool) {
        self.first_kex_packet_follows = follows;
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the key exchange algorithms.
    pub fn kex_algorithms(&self) -> &[String] {
        &self.kex_algorithms
    }

    /// Returns the server host key algorithms.
    pub fn server_host_key_algorithms(&self) -> &[String] {
        &self.server_host_key_algorithms
    }

    /// Returns the encryption algorithms (client to server).
    pub fn encryption_algorithms_client_to_server(&self) -> &[String] {
        &self.encryption_algorithms_client_to_server
    }

    /// Returns the encryption algorithms (server to client).
    pub fn encryption_algorithms_server_to_client(&self) -> &[String] {
        &self.encryption_algorithms_server_to_client
    }

    /// Returns the MAC algorithms (client to server).
    pub fn mac_algorithms_client_to_server(&self) -> &[String] {
        &self.mac_algorithms_client_to_server
    }

    /// Returns the MAC algorithms (server to client).
    pub fn mac_algorithms_server_to_client(&self) -> &[String] {
        &self.mac_algorithms_server_to_client
    }

    /// Returns the compression algorithms (client to server).
    pub fn compression_algorithms_client_to_server(&self) -> &[String] {
        &self.compression_algorithms_client_to_server
    }

    /// Returns the compression algorithms (server to client).
    pub fn compression_algorithms_server_to_client(&self) -> &[String] {
        &self.compression_algorithms_server_to_client
    }

    /// Returns whether a guessed key exchange packet follows.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Serializes the message including its type byte.
    ///
    /// ```text
    /// byte         SSH_MSG_KEXINIT (20)
    /// byte[16]     cookie
    /// name-list    kex_algorithms
    /// name-list    server_host_key_algorithms
    /// name-list    encryption_algorithms_client_to_server
    /// name-list    encryption_algorithms_server_to_client
    /// name-list    mac_algorithms_client_to_server
    /// name-list    mac_algorithms_server_to_client
    /// name-list    compression_algorithms_client_to_server
    /// name-list    compression_algorithms_server_to_client
    /// name-list    languages_client_to_server
    /// name-list    languages_server_to_client
    /// boolean      first_kex_packet_follows
    /// uint32       0 (reserved)
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::KexInit as u8);
        buf.put_slice(&self.cookie);
        put_name_list(&mut buf, &self.kex_algorithms);
        put_name_list(&mut buf, &self.server_host_key_algorithms);
        put_name_list(&mut buf, &self.encryption_algorithms_client_to_server);
        put_name_list(&mut buf, &self.encryption_algorithms_server_to_client);
        put_name_list(&mut buf, &self.mac_algorithms_client_to_server);
        put_name_list(&mut buf, &self.mac_algorithms_server_to_client);
        put_name_list(&mut buf, &self.compression_algorithms_client_to_server);
        put_name_list(&mut buf, &self.compression_algorithms_server_to_client);
        put_name_list(&mut buf, &self.languages_client_to_server);
        put_name_list(&mut buf, &self.languages_server_to_client);
        put_bool(&mut buf, self.first_kex_packet_follows);
        buf.put_u32(0);
        buf.to_vec()
    }

    /// Parses a KEXINIT payload including its type byte.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Protocol`] if the type byte is wrong or any
    /// field is truncated.
    pub fn from_bytes(data: &[u8]) -> OspreyResult<Self> {
        let mut reader = WireReader::new(data);
        let msg_type = reader.read_u8()?;
        if msg_type != MessageType::KexInit as u8 {
            return Err(OspreyError::Protocol(format!(
                "Invalid message type: expected 20 (SSH_MSG_KEXINIT), got {}",
                msg_type
            )));
        }

        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(reader.read_bytes(16)?);

        let kex_algorithms = reader.read_name_list()?;
        let server_host_key_algorithms = reader.read_name_list()?;
        let encryption_algorithms_client_to_server = reader.read_name_list()?;
        let encryption_algorithms_server_to_client = reader.read_name_list()?;
        let mac_algorithms_client_to_server = reader.read_name_list()?;
        let mac_algorithms_server_to_client = reader.read_name_list()?;
        let compression_algorithms_client_to_server = reader.read_name_list()?;
        let compression_algorithms_server_to_client = reader.read_name_list()?;
        let languages_client_to_server = reader.read_name_list()?;
        let languages_server_to_client = reader.read_name_list()?;
        let first_kex_packet_follows = reader.read_bool()?;
        // reserved
        reader.read_u32()?;

        Ok(Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms,
            encryption_algorithms_client_to_server,
            encryption_algorithms_server_to_client,
            mac_algorithms_client_to_server,
            mac_algorithms_server_to_client,
            compression_algorithms_client_to_server,
            compression_algorithms_server_to_client,
            languages_client_to_server,
            languages_server_to_client,
            first_kex_packet_follows,
        })
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// A sender switches its outgoing direction to the new keys right after
/// sending it; a receiver switches its incoming direction right after
/// receiving it. Sequence numbers carry on unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NewKeys;

impl NewKeys {
    /// Creates a new SSH_MSG_NEWKEYS message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes the message (a single byte, 21).
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::NewKeys as u8]
    }

    /// Parses a NEWKEYS payload.
    pub fn from_bytes(data: &[u8]) -> OspreyResult<Self> {
        match data {
            [] => Err(OspreyError::Protocol("NEWKEYS message is empty".to_string())),
            [21] => Ok(Self),
            [21, ..] => Err(OspreyError::Protocol(
                "NEWKEYS message has trailing data".to_string(),
            )),
            [other, ..] => Err(OspreyError::Protocol(format!(
                "Invalid message type: expected 21 (SSH_MSG_NEWKEYS), got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::crypto::LockedRandom;

    fn kexinit() -> KexInit {
        KexInit::new(&AlgorithmPreferences::default(), &LockedRandom::from_seed(5))
    }

    #[test]
    fn test_kexinit_from_preferences() {
        let prefs = AlgorithmPreferences::default().with_ciphers(&["aes256-ctr"]);
        let msg = KexInit::new(&prefs, &LockedRandom::from_seed(1));
        assert_eq!(msg.encryption_algorithms_client_to_server(), ["aes256-ctr"]);
        assert_eq!(msg.encryption_algorithms_server_to_client(), ["aes256-ctr"]);
        assert!(!msg.first_kex_packet_follows());
    }

    #[test]
    fn test_kexinit_cookie_is_random() {
        let random = LockedRandom::from_seed(1);
        let a = KexInit::new(&AlgorithmPreferences::default(), &random);
        let b = KexInit::new(&AlgorithmPreferences::default(), &random);
        assert_ne!(a.cookie(), b.cookie());
    }

    #[test]
    fn test_kexinit_round_trip() {
        let mut original = kexinit();
        original.set_first_kex_packet_follows(true);
        let bytes = original.to_bytes();
        assert_eq!(bytes[0], 20);
        assert_eq!(KexInit::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn test_kexinit_parse_invalid_type() {
        let mut data = vec![99];
        data.extend_from_slice(&[0u8; 60]);
        match KexInit::from_bytes(&data) {
            Err(OspreyError::Protocol(msg)) => assert!(msg.contains("Invalid message type")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_kexinit_parse_truncated() {
        let bytes = kexinit().to_bytes();
        for cut in [4, 17, 40, bytes.len() - 1] {
            assert!(KexInit::from_bytes(&bytes[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_preferences_categories() {
        let prefs = AlgorithmPreferences::default().with_macs(&["hmac-sha1"]);
        let cats = prefs.categories();
        assert_eq!(cats[0].0, "kex");
        assert_eq!(cats[4].1, ["hmac-sha1"]);
        assert_eq!(cats[5].1, ["hmac-sha1"]);
    }

    #[test]
    fn test_newkeys() {
        assert_eq!(NewKeys::new().to_bytes(), vec![21]);
        assert_eq!(NewKeys::from_bytes(&[21]).unwrap(), NewKeys);
        assert!(NewKeys::from_bytes(&[]).is_err());
        assert!(NewKeys::from_bytes(&[20]).is_err());
        assert!(NewKeys::from_bytes(&[21, 0]).is_err());
    }
}
