//! Algorithm negotiation (RFC 4253 Section 7.1).
//!
//! For each of the eight categories the chosen algorithm is the first one
//! in the client's list that also appears in the server's list. Negotiation
//! is a pure function of the two KEXINIT messages.
//!
//! A peer may guess the outcome and send its first key exchange packet
//! right after KEXINIT. The guess is right only when both sides list the
//! same key exchange method first and the same host key algorithm first;
//! otherwise the guessed packet must be ignored.
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::negotiate::negotiate_algorithm;
//!
//! let client = vec!["aes128-ctr".to_string(), "aes256-ctr".to_string()];
//! let server = vec!["aes256-ctr".to_string(), "aes128-ctr".to_string()];
//! assert_eq!(negotiate_algorithm("cipher", &client, &server).unwrap(), "aes128-ctr");
//! ```

use crate::ssh::kex::KexInit;
use osprey_platform::{OspreyError, OspreyResult};

/// One algorithm per category, chosen for one key exchange round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedAlgorithms {
    /// Key exchange method
    pub kex: String,
    /// Host key algorithm
    pub host_key: String,
    /// Cipher client to server
    pub cipher_client_to_server: String,
    /// Cipher server to client
    pub cipher_server_to_client: String,
    /// MAC client to server
    pub mac_client_to_server: String,
    /// MAC server to client
    pub mac_server_to_client: String,
    /// Compression client to server
    pub compression_client_to_server: String,
    /// Compression server to client
    pub compression_server_to_client: String,
}

/// Picks the first client algorithm the server also supports.
///
/// # Errors
///
/// Returns [`OspreyError::Negotiation`] naming `category` and both lists if
/// there is no common algorithm.
pub fn negotiate_algorithm(
    category: &'static str,
    client: &[String],
    server: &[String],
) -> OspreyResult<String> {
    client
        .iter()
        .find(|alg| server.contains(alg))
        .cloned()
        .ok_or_else(|| OspreyError::Negotiation {
            category,
            client: client.to_vec(),
            server: server.to_vec(),
        })
}

/// Negotiates every category from the client's and server's KEXINIT.
pub fn negotiate(client: &KexInit, server: &KexInit) -> OspreyResult<NegotiatedAlgorithms> {
    Ok(NegotiatedAlgorithms {
        kex: negotiate_algorithm("kex", client.kex_algorithms(), server.kex_algorithms())?,
        host_key: negotiate_algorithm(
            "host key",
            client.server_host_key_algorithms(),
            server.server_host_key_algorithms(),
        )?,
        cipher_client_to_server: negotiate_algorithm(
            "cipher client to server",
            client.encryption_algorithms_client_to_server(),
            server.encryption_algorithms_client_to_server(),
        )?,
        cipher_server_to_client: negotiate_algorithm(
            "cipher server to client",
            client.encryption_algorithms_server_to_client(),
            server.encryption_algorithms_server_to_client(),
        )?,
        mac_client_to_server: negotiate_algorithm(
            "MAC client to server",
            client.mac_algorithms_client_to_server(),
            server.mac_algorithms_client_to_server(),
        )?,
        mac_server_to_client: negotiate_algorithm(
            "MAC server to client",
            client.mac_algorithms_server_to_client(),
            server.mac_algorithms_server_to_client(),
        )?,
        compression_client_to_server: negotiate_algorithm(
            "compression client to server",
            client.compression_algorithms_client_to_server(),
            server.compression_algorithms_client_to_server(),
        )?,
        compression_server_to_client: negotiate_algorithm(
            "compression server to client",
            client.compression_algorithms_server_to_client(),
            server.compression_algorithms_server_to_client(),
        )?,
    })
}

/// Whether an optimistic first key exchange packet matches the negotiation.
pub fn guess_is_correct(client: &KexInit, server: &KexInit) -> bool {
    client.kex_algorithms().first() == server.kex_algorithms().first()
        && client.server_host_key_algorithms().first()
            == server.server_host_key_algorithms().first()
}
