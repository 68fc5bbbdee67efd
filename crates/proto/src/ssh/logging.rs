//! Structured logging helpers for the SSH transport.
//!
//! Events are emitted through `tracing` with structured fields so they can
//! be filtered and collected by any subscriber.
//!
//! # Log Levels
//!
//! - **ERROR**: not used; fatal errors are returned to the caller
//! - **WARN**: integrity failures, rejected host keys, peer disconnects
//! - **INFO**: completed key exchanges, rekey triggers
//! - **DEBUG**: negotiated algorithms, key activation
//! - **TRACE**: individual packets
//!
//! Key material is never logged. Exchange hashes are logged as hex, host
//! keys as SHA-256 fingerprints.
//!
//! # Example
//!
//! ```rust,no_run
//! use tracing_subscriber;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter("osprey_proto=debug")
//!     .init();
//! ```

use crate::ssh::hostkey::fingerprint;
use crate::ssh::negotiate::NegotiatedAlgorithms;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Log a completed key exchange
///
/// # Arguments
///
/// * `role` - "client" or "server"
/// * `kex` - Negotiated key exchange method
/// * `kex_count` - Number of completed exchanges on this connection
/// * `exchange_hash` - Exchange hash H of this exchange
pub fn log_kex_complete(role: &str, kex: &str, kex_count: u32, exchange_hash: &[u8]) {
    info!(
        role = role,
        kex = kex,
        kex_count = kex_count,
        exchange_hash = %hex::encode(exchange_hash),
        "Key exchange completed"
    );
}

/// Log the algorithms chosen for one key exchange round
pub fn log_negotiated(negotiated: &NegotiatedAlgorithms) {
    debug!(
        kex = %negotiated.kex,
        host_key = %negotiated.host_key,
        cipher_c2s = %negotiated.cipher_client_to_server,
        cipher_s2c = %negotiated.cipher_server_to_client,
        mac_c2s = %negotiated.mac_client_to_server,
        mac_s2c = %negotiated.mac_server_to_client,
        compression_c2s = %negotiated.compression_client_to_server,
        compression_s2c = %negotiated.compression_server_to_client,
        "Algorithms negotiated"
    );
}

/// Log a rekey trigger
///
/// # Arguments
///
/// * `reason` - What triggered the rekey (e.g., "bytes", "time", "local", "peer")
/// * `bytes` - Bytes transferred under the current keys
/// * `elapsed` - Time since the current keys were installed
pub fn log_rekey_triggered(reason: &str, bytes: u64, elapsed: Duration) {
    info!(
        reason = reason,
        bytes = bytes,
        elapsed_secs = elapsed.as_secs(),
        "Rekey triggered"
    );
}

/// Log a MAC or length check failure on an inbound packet
///
/// # Arguments
///
/// * `sequence` - Sequence number of the rejected packet
/// * `detail` - Failure description
pub fn log_integrity_failure(sequence: u32, detail: &str) {
    warn!(
        sequence = sequence,
        detail = detail,
        "Inbound packet failed integrity check"
    );
}

/// Log the host key presented by the server
///
/// # Arguments
///
/// * `key_type` - Host key algorithm
/// * `blob` - Public host key blob
/// * `accepted` - Whether the verifier trusted the key
pub fn log_host_key(key_type: &str, blob: &[u8], accepted: bool) {
    if accepted {
        debug!(
            key_type = key_type,
            fingerprint = %fingerprint(blob),
            "Host key accepted"
        );
    } else {
        warn!(
            key_type = key_type,
            fingerprint = %fingerprint(blob),
            "Host key rejected"
        );
    }
}

/// Log a new key generation taking effect in one direction
///
/// # Arguments
///
/// * `direction` - "inbound" or "outbound"
/// * `cipher` - Cipher now in use
/// * `mac` - MAC now in use
pub fn log_keys_activated(direction: &str, cipher: &str, mac: &str) {
    debug!(
        direction = direction,
        cipher = cipher,
        mac = mac,
        "New keys activated"
    );
}

/// Log a disconnect, sent or received
///
/// # Arguments
///
/// * `direction` - "sent" or "received"
/// * `reason` - Reason code
/// * `description` - Human-readable description
pub fn log_disconnect(direction: &str, reason: u32, description: &str) {
    warn!(
        direction = direction,
        reason = reason,
        description = description,
        "Disconnect"
    );
}

/// Log a transport packet
///
/// # Arguments
///
/// * `direction` - "send" or "recv"
/// * `msg_type` - First payload byte
/// * `sequence` - Packet sequence number
/// * `size_bytes` - Payload size in bytes
pub fn log_packet(direction: &str, msg_type: u8, sequence: u32, size_bytes: usize) {
    trace!(
        direction = direction,
        msg_type = msg_type,
        sequence = sequence,
        size_bytes = size_bytes,
        "SSH packet"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_functions() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();

        log_kex_complete("client", "curve25519-sha256", 1, &[0xab; 32]);
        log_negotiated(&NegotiatedAlgorithms {
            kex: "curve25519-sha256".into(),
            host_key: "ssh-ed25519".into(),
            cipher_client_to_server: "aes128-ctr".into(),
            cipher_server_to_client: "aes128-ctr".into(),
            mac_client_to_server: "hmac-sha2-256".into(),
            mac_server_to_client: "hmac-sha2-256".into(),
            compression_client_to_server: "none".into(),
            compression_server_to_client: "none".into(),
        });
        log_rekey_triggered("bytes", 1 << 30, Duration::from_secs(12));
        log_integrity_failure(7, "MAC mismatch");
        log_host_key("ssh-ed25519", b"blob", true);
        log_host_key("ssh-ed25519", b"blob", false);
        log_keys_activated("outbound", "aes256-ctr", "hmac-sha2-512");
        log_disconnect("sent", 2, "protocol error");
        log_packet("send", 94, 3, 512);
    }
}
