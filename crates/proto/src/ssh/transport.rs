//! SSH transport session (RFC 4253).
//!
//! A [`TransportSession`] drives one connection over a caller-supplied
//! byte stream: identification exchange, the initial key exchange, the
//! encrypted packet stream and every later rekey. It never opens or closes
//! sockets.
//!
//! # Session Lifecycle
//!
//! 1. **Identification** - exchange `SSH-2.0-...` lines
//! 2. **KEXINIT** - send ours, read the peer's, negotiate
//! 3. **Key exchange** - Diffie-Hellman plus host key signature
//! 4. **NEWKEYS** - each direction switches keys at its NEWKEYS
//! 5. **Established** - [`send`](TransportSession::send) and
//!    [`recv`](TransportSession::recv) carry payloads for the layers above
//!
//! Steps 2-4 repeat on every rekey, started by either side. Data the peer
//! sent before it saw our KEXINIT is queued and handed out by `recv` in
//! order.
//!
//! # Rekeying
//!
//! A rekey starts when:
//! - the bytes moved under the current keys reach the configured limit
//!   (1 GiB by default)
//! - the current keys have been in use for the configured time (1 hour by
//!   default)
//! - [`rekey`](TransportSession::rekey) is called
//! - the peer sends KEXINIT
//!
//! The session identifier stays the first exchange hash for the lifetime
//! of the connection.
//!
//! # Failure
//!
//! Every error is fatal. The session sends a best-effort
//! SSH_MSG_DISCONNECT carrying [`OspreyError::disconnect_reason`], marks
//! itself closed, and answers all later calls with [`OspreyError::Closed`].
//!
//! # Example
//!
//! ```rust,no_run
//! use osprey_proto::ssh::crypto::AlgorithmRegistry;
//! use osprey_proto::ssh::hostkey::AcceptAnyHostKey;
//! use osprey_proto::ssh::transport::{TransportConfig, TransportSession};
//! use std::sync::Arc;
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:22").await?;
//! let mut session = TransportSession::client(
//!     stream,
//!     TransportConfig::default(),
//!     AlgorithmRegistry::default(),
//!     Arc::new(AcceptAnyHostKey),
//! )
//! .await?;
//!
//! // SSH_MSG_SERVICE_REQUEST "ssh-userauth"
//! session.send(b"\x05\x00\x00\x00\x0cssh-userauth").await?;
//! let reply = session.recv().await?;
//! # Ok(())
//! # }
//! ```

use crate::ssh::codec::{CryptoPipeline, PacketDecoder, PacketEncoder};
use crate::ssh::crypto::{AlgorithmRegistry, CipherMode};
use crate::ssh::hostkey::{HostKey, HostKeyVerifier};
use crate::ssh::kex::{AlgorithmPreferences, KexInit, NewKeys};
use crate::ssh::kex_dh::{server_reply, KexContext, KexDhClient};
use crate::ssh::keys::{DirectionKeys, SessionKeys};
use crate::ssh::logging::{
    log_disconnect, log_host_key, log_kex_complete, log_keys_activated, log_negotiated,
    log_packet, log_rekey_triggered,
};
use crate::ssh::message::{ignore_message, Disconnect, MessageType};
use crate::ssh::negotiate::{guess_is_correct, negotiate, NegotiatedAlgorithms};
use crate::ssh::packet::MAX_PACKET_SIZE;
use crate::ssh::rekey::{RekeyController, RekeyThresholds};
use crate::ssh::version::{read_identification, write_identification, Version};
use bytes::BytesMut;
use osprey_platform::{OspreyError, OspreyResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Smallest accepted `max_packet_len`.
pub const MIN_MAX_PACKET_LEN: usize = 1024;

/// Default zlib compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// How long a best-effort DISCONNECT may take before it is abandoned.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

const NONE_CIPHER: &str = "none";

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Our identification line.
    pub version: Version,

    /// Our algorithm preferences.
    pub preferences: AlgorithmPreferences,

    /// When to rekey (default: 1 GiB or 1 hour).
    pub rekey: RekeyThresholds,

    /// zlib level 0-9 (default: 6).
    pub compression_level: u32,

    /// Largest accepted `packet_length` (default: 35000).
    pub max_packet_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            version: Version::default_osprey(),
            preferences: AlgorithmPreferences::default(),
            rekey: RekeyThresholds::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_packet_len: MAX_PACKET_SIZE,
        }
    }
}

impl TransportConfig {
    /// Sets the identification line.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Sets the algorithm preferences.
    pub fn with_preferences(mut self, preferences: AlgorithmPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Sets the rekey thresholds.
    pub fn with_rekey_thresholds(mut self, rekey: RekeyThresholds) -> Self {
        self.rekey = rekey;
        self
    }

    /// Sets the zlib compression level.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets the largest accepted packet length.
    pub fn with_max_packet_len(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    /// Checks that every preferred algorithm is registered and the limits
    /// are usable.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Configuration`] naming the first problem.
    pub fn validate(&self, registry: &AlgorithmRegistry) -> OspreyResult<()> {
        let prefs = &self.preferences;
        for (category, list) in prefs.categories() {
            if list.is_empty() {
                return Err(OspreyError::Configuration(format!(
                    "No {} algorithms configured",
                    category
                )));
            }
        }
        for name in &prefs.kex {
            registry.kex(name)?;
        }
        for name in &prefs.host_key {
            registry.signature(name)?;
        }
        for name in prefs
            .ciphers_client_to_server
            .iter()
            .chain(&prefs.ciphers_server_to_client)
        {
            registry.cipher(name)?;
        }
        for name in prefs
            .macs_client_to_server
            .iter()
            .chain(&prefs.macs_server_to_client)
        {
            registry.mac(name)?;
        }
        for name in prefs
            .compression_client_to_server
            .iter()
            .chain(&prefs.compression_server_to_client)
        {
            registry.compression(name)?;
        }

        if self.compression_level > 9 {
            return Err(OspreyError::Configuration(format!(
                "Invalid compression level {} (expected 0-9)",
                self.compression_level
            )));
        }
        if !(MIN_MAX_PACKET_LEN..=MAX_PACKET_SIZE).contains(&self.max_packet_len) {
            return Err(OspreyError::Configuration(format!(
                "Invalid max_packet_len {} (expected {}-{})",
                self.max_packet_len, MIN_MAX_PACKET_LEN, MAX_PACKET_SIZE
            )));
        }
        if self.rekey.bytes == 0 || self.rekey.time.is_zero() {
            return Err(OspreyError::Configuration(
                "Rekey thresholds must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which end of the connection a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting side
    Client,
    /// Accepting side, holds the host key
    Server,
}

impl Role {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

#[derive(Clone)]
enum Identity {
    Client(Arc<dyn HostKeyVerifier>),
    Server(Arc<dyn HostKey>),
}

/// Preferences actually offered in a KEXINIT.
///
/// Before authentication the "none" cipher is withdrawn. A server only
/// offers the type of the host key it holds.
fn offered_preferences(
    prefs: &AlgorithmPreferences,
    authenticated: bool,
    server_key_type: Option<&str>,
) -> OspreyResult<AlgorithmPreferences> {
    let mut offered = prefs.clone();
    if !authenticated {
        for list in [
            &mut offered.ciphers_client_to_server,
            &mut offered.ciphers_server_to_client,
        ] {
            list.retain(|c| c != NONE_CIPHER);
            if list.is_empty() {
                return Err(OspreyError::Configuration(
                    "Cipher 'none' is not allowed before authentication \
                     and no other cipher is configured"
                        .to_string(),
                ));
            }
        }
    }
    if let Some(key_type) = server_key_type {
        offered.host_key.retain(|k| k == key_type);
        if offered.host_key.is_empty() {
            return Err(OspreyError::Configuration(format!(
                "Host key type '{}' is not in the configured host key algorithms",
                key_type
            )));
        }
    }
    Ok(offered)
}

fn message_type(payload: &[u8]) -> OspreyResult<u8> {
    payload
        .first()
        .copied()
        .ok_or_else(|| OspreyError::Protocol("Empty packet payload".to_string()))
}

fn peer_disconnect(payload: &[u8]) -> OspreyError {
    match Disconnect::from_bytes(payload) {
        Ok(msg) => {
            log_disconnect("received", msg.reason, &msg.description);
            msg.into()
        }
        Err(err) => err,
    }
}

/// One SSH transport connection.
pub struct TransportSession<S> {
    stream: S,
    identity: Identity,
    config: TransportConfig,
    registry: AlgorithmRegistry,
    peer_version: Version,
    encoder: PacketEncoder,
    decoder: PacketDecoder,
    read_buf: BytesMut,
    session_id: Vec<u8>,
    exchange_hash: Vec<u8>,
    negotiated: Option<NegotiatedAlgorithms>,
    peer_host_key: Option<Vec<u8>>,
    kex_count: u32,
    authenticated: bool,
    rekey: RekeyController,
    pending: VecDeque<Vec<u8>>,
    closed: bool,
    #[cfg(test)]
    derived_keys: Vec<SessionKeys>,
}

impl<S> std::fmt::Debug for TransportSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("role", &self.role())
            .field("peer_version", &self.peer_version.to_string())
            .field("session_id", &hex::encode(&self.session_id))
            .field("negotiated", &self.negotiated)
            .field("kex_count", &self.kex_count)
            .field("authenticated", &self.authenticated)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S> TransportSession<S> {
    /// First exchange hash of the connection.
    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Exchange hash of the most recent key exchange.
    pub fn exchange_hash(&self) -> &[u8] {
        &self.exchange_hash
    }

    /// Algorithms of the most recent key exchange.
    pub fn negotiated(&self) -> Option<&NegotiatedAlgorithms> {
        self.negotiated.as_ref()
    }

    /// Number of completed key exchanges.
    pub fn kex_count(&self) -> u32 {
        self.kex_count
    }

    /// The peer's identification.
    pub fn peer_version(&self) -> &Version {
        &self.peer_version
    }

    /// Host key the server presented (client sessions only).
    pub fn peer_host_key(&self) -> Option<&[u8]> {
        self.peer_host_key.as_deref()
    }

    /// Our end of the connection.
    pub fn role(&self) -> Role {
        match self.identity {
            Identity::Client(_) => Role::Client,
            Identity::Server(_) => Role::Server,
        }
    }

    /// Whether [`set_authenticated`](Self::set_authenticated) was called.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether the session has failed or been disconnected.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether outgoing payloads are compressed right now.
    pub fn outbound_compression_active(&self) -> bool {
        self.encoder.pipeline().compression_active()
    }
}

impl<S> TransportSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Connects as a client: identification exchange and first key exchange.
    ///
    /// `verifier` decides whether the server's host key is trusted.
    ///
    /// # Errors
    ///
    /// Any [`OspreyError`]; a rejected host key is
    /// [`OspreyError::KeyExchange`].
    pub async fn client(
        stream: S,
        config: TransportConfig,
        registry: AlgorithmRegistry,
        verifier: Arc<dyn HostKeyVerifier>,
    ) -> OspreyResult<Self> {
        Self::establish(stream, config, registry, Identity::Client(verifier)).await
    }

    /// Accepts as a server: identification exchange and first key exchange.
    ///
    /// `host_key` signs every exchange hash.
    pub async fn server(
        stream: S,
        config: TransportConfig,
        registry: AlgorithmRegistry,
        host_key: Arc<dyn HostKey>,
    ) -> OspreyResult<Self> {
        Self::establish(stream, config, registry, Identity::Server(host_key)).await
    }

    async fn establish(
        mut stream: S,
        config: TransportConfig,
        registry: AlgorithmRegistry,
        identity: Identity,
    ) -> OspreyResult<Self> {
        config.validate(&registry)?;
        let server_key_type = match &identity {
            Identity::Client(_) => None,
            Identity::Server(key) => Some(key.key_type()),
        };
        offered_preferences(&config.preferences, false, server_key_type)?;

        write_identification(&mut stream, &config.version).await?;
        let peer_version = read_identification(&mut stream).await?;

        let mut session = Self {
            stream,
            identity,
            encoder: PacketEncoder::new(registry.random().clone()),
            decoder: PacketDecoder::new().with_max_packet_len(config.max_packet_len),
            rekey: RekeyController::new(config.rekey, Instant::now()),
            config,
            registry,
            peer_version,
            read_buf: BytesMut::with_capacity(MAX_PACKET_SIZE),
            session_id: Vec::new(),
            exchange_hash: Vec::new(),
            negotiated: None,
            peer_host_key: None,
            kex_count: 0,
            authenticated: false,
            pending: VecDeque::new(),
            closed: false,
            #[cfg(test)]
            derived_keys: Vec::new(),
        };

        let result = session.run_kex(None).await;
        session.guard(result).await?;
        Ok(session)
    }

    /// Sends one payload, running a due rekey first.
    ///
    /// # Errors
    ///
    /// Payloads that are empty or carry a key exchange message number
    /// (20-49) are rejected with [`OspreyError::Protocol`].
    pub async fn send(&mut self, payload: &[u8]) -> OspreyResult<()> {
        self.ensure_open()?;
        let result = self.send_inner(payload).await;
        self.guard(result).await
    }

    async fn send_inner(&mut self, payload: &[u8]) -> OspreyResult<()> {
        let msg = message_type(payload)?;
        if MessageType::is_kex(msg) {
            return Err(OspreyError::Protocol(format!(
                "Message {} is reserved for key exchange",
                msg
            )));
        }
        self.rekey_if_due().await?;
        self.write_packet(payload).await
    }

    /// Sends an SSH_MSG_IGNORE carrying `data`.
    pub async fn send_ignore(&mut self, data: &[u8]) -> OspreyResult<()> {
        self.ensure_open()?;
        let result = self.write_packet(&ignore_message(data)).await;
        self.guard(result).await
    }

    /// Receives the next payload for the layers above.
    ///
    /// Queued data is returned first. A peer KEXINIT is answered with a
    /// full key exchange; IGNORE, DEBUG and UNIMPLEMENTED are skipped; a
    /// DISCONNECT becomes [`OspreyError::Disconnected`].
    pub async fn recv(&mut self) -> OspreyResult<Vec<u8>> {
        self.ensure_open()?;
        if let Some(payload) = self.pending.pop_front() {
            return Ok(payload);
        }
        let result = self.recv_inner().await;
        self.guard(result).await
    }

    async fn recv_inner(&mut self) -> OspreyResult<Vec<u8>> {
        loop {
            self.rekey_if_due().await?;
            if let Some(payload) = self.pending.pop_front() {
                return Ok(payload);
            }

            let payload = self.read_packet().await?;
            let msg = message_type(&payload)?;
            match MessageType::from_u8(msg) {
                Some(MessageType::KexInit) => {
                    log_rekey_triggered(
                        "peer",
                        self.rekey.bytes(),
                        self.rekey.elapsed(Instant::now()),
                    );
                    self.run_kex(Some(payload)).await?;
                }
                Some(MessageType::Disconnect) => return Err(peer_disconnect(&payload)),
                Some(MessageType::Ignore | MessageType::Debug | MessageType::Unimplemented) => {
                    debug!(msg_type = msg, "Skipping transport message");
                }
                _ if MessageType::is_kex(msg) => {
                    return Err(OspreyError::KeyExchange(format!(
                        "Unexpected key exchange message {} outside a key exchange",
                        msg
                    )));
                }
                _ => return Ok(payload),
            }
        }
    }

    /// Starts a key exchange now.
    pub async fn rekey(&mut self) -> OspreyResult<()> {
        self.ensure_open()?;
        log_rekey_triggered(
            "local",
            self.rekey.bytes(),
            self.rekey.elapsed(Instant::now()),
        );
        let result = self.run_kex(None).await;
        self.guard(result).await
    }

    /// Records that user authentication succeeded.
    ///
    /// Switches on delayed compression in both directions and allows the
    /// "none" cipher in later key exchanges.
    pub fn set_authenticated(&mut self) {
        self.authenticated = true;
        self.encoder.activate_compression();
        self.decoder.activate_compression();
    }

    /// Sends SSH_MSG_DISCONNECT and closes the session.
    pub async fn disconnect(&mut self, reason: u32, description: &str) -> OspreyResult<()> {
        self.ensure_open()?;
        self.closed = true;
        log_disconnect("sent", reason, description);
        let wire = self
            .encoder
            .encode(&Disconnect::new(reason, description).to_bytes())?;
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn ensure_open(&self) -> OspreyResult<()> {
        if self.closed {
            Err(OspreyError::Closed)
        } else {
            Ok(())
        }
    }

    async fn guard<T>(&mut self, result: OspreyResult<T>) -> OspreyResult<T> {
        if let Err(err) = &result {
            self.abort(err).await;
        }
        result
    }

    async fn abort(&mut self, err: &OspreyError) {
        if self.closed {
            return;
        }
        self.closed = true;
        if matches!(
            err,
            OspreyError::Disconnected { .. } | OspreyError::Transport(_) | OspreyError::Closed
        ) {
            return;
        }

        let reason = err.disconnect_reason();
        let description = err.to_string();
        log_disconnect("sent", reason, &description);
        if let Ok(wire) = self
            .encoder
            .encode(&Disconnect::new(reason, description).to_bytes())
        {
            let stream = &mut self.stream;
            let _ = tokio::time::timeout(DISCONNECT_TIMEOUT, async move {
                stream.write_all(&wire).await?;
                stream.flush().await
            })
            .await;
        }
    }

    async fn rekey_if_due(&mut self) -> OspreyResult<()> {
        if let Some(reason) = self.rekey.needs_rekey(Instant::now()) {
            log_rekey_triggered(
                reason.as_str(),
                self.rekey.bytes(),
                self.rekey.elapsed(Instant::now()),
            );
            self.run_kex(None).await?;
        }
        Ok(())
    }

    async fn write_packet(&mut self, payload: &[u8]) -> OspreyResult<()> {
        let sequence = self.encoder.sequence();
        let wire = self.encoder.encode(payload)?;
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;
        self.rekey.record(wire.len());
        log_packet("send", payload[0], sequence, payload.len());
        Ok(())
    }

    async fn read_packet(&mut self) -> OspreyResult<Vec<u8>> {
        loop {
            let sequence = self.decoder.sequence();
            let before = self.read_buf.len();
            let decoded = self.decoder.decode(&mut self.read_buf)?;
            self.rekey.record(before - self.read_buf.len());
            if let Some(payload) = decoded {
                log_packet("recv", payload.first().copied().unwrap_or(0), sequence, payload.len());
                return Ok(payload);
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(OspreyError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Connection closed by peer",
                )));
            }
        }
    }

    /// Reads until the peer's KEXINIT, queueing data sent before it.
    async fn read_peer_kexinit(&mut self) -> OspreyResult<Vec<u8>> {
        loop {
            let payload = self.read_packet().await?;
            let msg = message_type(&payload)?;
            match MessageType::from_u8(msg) {
                Some(MessageType::KexInit) => return Ok(payload),
                Some(MessageType::Disconnect) => return Err(peer_disconnect(&payload)),
                Some(MessageType::Ignore | MessageType::Debug | MessageType::Unimplemented) => {}
                _ if MessageType::is_kex(msg) => {
                    return Err(OspreyError::KeyExchange(format!(
                        "Unexpected message {} before KEXINIT",
                        msg
                    )));
                }
                _ => {
                    debug!(msg_type = msg, "Queueing data received during key exchange");
                    self.pending.push_back(payload);
                }
            }
        }
    }

    /// Reads the next key exchange message, dropping a wrong guess.
    async fn read_kex_message(&mut self, discard_guess: &mut bool) -> OspreyResult<Vec<u8>> {
        loop {
            let payload = self.read_packet().await?;
            let msg = message_type(&payload)?;
            match MessageType::from_u8(msg) {
                Some(MessageType::Disconnect) => return Err(peer_disconnect(&payload)),
                Some(MessageType::Ignore | MessageType::Debug | MessageType::Unimplemented) => {}
                _ if (30..=49).contains(&msg) && *discard_guess => {
                    debug!(msg_type = msg, "Discarding wrongly guessed key exchange packet");
                    *discard_guess = false;
                }
                _ if MessageType::is_kex(msg) => return Ok(payload),
                _ => {
                    return Err(OspreyError::KeyExchange(format!(
                        "Unexpected message {} during key exchange",
                        msg
                    )));
                }
            }
        }
    }

    async fn run_kex(&mut self, peer_kexinit: Option<Vec<u8>>) -> OspreyResult<()> {
        let role = self.role();
        let identity = self.identity.clone();
        let server_key_type = match &identity {
            Identity::Client(_) => None,
            Identity::Server(key) => Some(key.key_type()),
        };
        let random = self.registry.random().clone();

        let prefs =
            offered_preferences(&self.config.preferences, self.authenticated, server_key_type)?;
        let local = KexInit::new(&prefs, random.as_ref());
        let local_payload = local.to_bytes();
        self.write_packet(&local_payload).await?;

        let peer_payload = match peer_kexinit {
            Some(payload) => payload,
            None => self.read_peer_kexinit().await?,
        };
        let peer = KexInit::from_bytes(&peer_payload)?;

        let local_version = self.config.version.as_bytes().to_vec();
        let peer_version = self.peer_version.as_bytes().to_vec();
        let (client, server, context) = match role {
            Role::Client => (
                &local,
                &peer,
                KexContext {
                    client_version: local_version,
                    server_version: peer_version,
                    client_kexinit: local_payload,
                    server_kexinit: peer_payload,
                },
            ),
            Role::Server => (
                &peer,
                &local,
                KexContext {
                    client_version: peer_version,
                    server_version: local_version,
                    client_kexinit: peer_payload,
                    server_kexinit: local_payload,
                },
            ),
        };

        let negotiated = negotiate(client, server)?;
        if !self.authenticated {
            if negotiated.cipher_client_to_server == NONE_CIPHER {
                return Err(OspreyError::Negotiation {
                    category: "cipher client to server",
                    client: client.encryption_algorithms_client_to_server().to_vec(),
                    server: server.encryption_algorithms_client_to_server().to_vec(),
                });
            }
            if negotiated.cipher_server_to_client == NONE_CIPHER {
                return Err(OspreyError::Negotiation {
                    category: "cipher server to client",
                    client: client.encryption_algorithms_server_to_client().to_vec(),
                    server: server.encryption_algorithms_server_to_client().to_vec(),
                });
            }
        }
        log_negotiated(&negotiated);

        let mut discard_guess =
            peer.first_kex_packet_follows() && !guess_is_correct(client, server);
        let algorithm = *self.registry.kex(&negotiated.kex)?;

        let output = match identity {
            Identity::Client(verifier) => {
                let mut engine =
                    KexDhClient::new(&self.registry, &algorithm, &negotiated.host_key, context)?;
                let init = engine.start(random.as_ref())?;
                self.write_packet(&init).await?;

                let reply = self.read_kex_message(&mut discard_guess).await?;
                let output = engine.process_reply(&reply, &self.registry)?;

                let accepted = verifier.verify(&output.host_key_type, &output.host_key);
                log_host_key(&output.host_key_type, &output.host_key, accepted);
                if !accepted {
                    return Err(OspreyError::KeyExchange(format!(
                        "Host key {} rejected",
                        output.host_key_type
                    )));
                }
                self.peer_host_key = Some(output.host_key.clone());
                output
            }
            Identity::Server(host_key) => {
                let init = self.read_kex_message(&mut discard_guess).await?;
                let (reply, output) =
                    server_reply(&self.registry, &algorithm, &context, &init, host_key.as_ref())?;
                self.write_packet(&reply).await?;
                output
            }
        };

        if self.session_id.is_empty() {
            self.session_id = output.exchange_hash.clone();
        }

        let keys = SessionKeys::derive(
            &output.digest,
            &output.shared_secret,
            &output.exchange_hash,
            &self.session_id,
            self.registry.cipher(&negotiated.cipher_client_to_server)?,
            self.registry.cipher(&negotiated.cipher_server_to_client)?,
            self.registry.mac(&negotiated.mac_client_to_server)?,
            self.registry.mac(&negotiated.mac_server_to_client)?,
        );
        let c2s = (
            negotiated.cipher_client_to_server.as_str(),
            negotiated.mac_client_to_server.as_str(),
            negotiated.compression_client_to_server.as_str(),
            &keys.client_to_server,
        );
        let s2c = (
            negotiated.cipher_server_to_client.as_str(),
            negotiated.mac_server_to_client.as_str(),
            negotiated.compression_server_to_client.as_str(),
            &keys.server_to_client,
        );
        let (outbound, inbound) = match role {
            Role::Client => (c2s, s2c),
            Role::Server => (s2c, c2s),
        };
        let outbound = self.pipeline(outbound, CipherMode::Encrypt)?;
        let inbound = self.pipeline(inbound, CipherMode::Decrypt)?;
        #[cfg(test)]
        self.derived_keys.push(keys);

        self.write_packet(&NewKeys::new().to_bytes()).await?;
        log_keys_activated("outbound", outbound.cipher_name(), outbound.mac_name());
        self.encoder.install(outbound);

        let msg = self.read_kex_message(&mut discard_guess).await?;
        if msg[0] != MessageType::NewKeys as u8 {
            return Err(OspreyError::KeyExchange(format!(
                "Expected SSH_MSG_NEWKEYS, got message {}",
                msg[0]
            )));
        }
        NewKeys::from_bytes(&msg)
            .map_err(|e| OspreyError::KeyExchange(format!("Malformed NEWKEYS: {}", e)))?;
        log_keys_activated("inbound", inbound.cipher_name(), inbound.mac_name());
        self.decoder.install(inbound);

        self.kex_count += 1;
        self.rekey.reset(Instant::now());
        log_kex_complete(
            role.as_str(),
            &negotiated.kex,
            self.kex_count,
            &output.exchange_hash,
        );
        self.exchange_hash = output.exchange_hash;
        self.negotiated = Some(negotiated);
        Ok(())
    }

    fn pipeline(
        &self,
        (cipher, mac, compression, keys): (&str, &str, &str, &DirectionKeys),
        mode: CipherMode,
    ) -> OspreyResult<CryptoPipeline> {
        let mut pipeline = CryptoPipeline::from_keys(
            &self.registry,
            cipher,
            mac,
            compression,
            keys,
            mode,
            self.config.compression_level,
        )?;
        if self.authenticated {
            pipeline.activate_compression();
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::crypto::LockedRandom;
    use crate::ssh::hostkey::{AcceptAnyHostKey, Ed25519HostKey};
    use tokio::io::{duplex, DuplexStream};

    fn registry(seed: u64) -> AlgorithmRegistry {
        AlgorithmRegistry::with_random(Arc::new(LockedRandom::from_seed(seed)))
    }

    async fn connected() -> (TransportSession<DuplexStream>, TransportSession<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        let host_key = Arc::new(Ed25519HostKey::generate(&LockedRandom::from_seed(5)));
        let (client, server) = tokio::join!(
            TransportSession::client(
                a,
                TransportConfig::default(),
                registry(6),
                Arc::new(AcceptAnyHostKey)
            ),
            TransportSession::server(b, TransportConfig::default(), registry(7), host_key),
        );
        (client.unwrap(), server.unwrap())
    }

    /// IV, encryption and integrity keys, client to server first (A C E B D F).
    fn key_material(keys: &SessionKeys) -> Vec<Vec<u8>> {
        [&keys.client_to_server, &keys.server_to_client]
            .iter()
            .flat_map(|d| [d.iv.to_vec(), d.encryption.to_vec(), d.integrity.to_vec()])
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = TransportConfig::default();
        assert_eq!(config.rekey, RekeyThresholds::default());
        assert_eq!(config.max_packet_len, 35000);
        config.validate(&registry(1)).unwrap();
    }

    #[test]
    fn test_validate_unknown_algorithm() {
        let config = TransportConfig::default().with_preferences(
            AlgorithmPreferences::default()
                .with_ciphers(&["aes128-ctr", "chacha20-poly1305@openssh.com"]),
        );
        match config.validate(&registry(1)) {
            Err(OspreyError::Configuration(msg)) => assert!(msg.contains("chacha20")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_limits() {
        let registry = registry(1);
        assert!(TransportConfig::default()
            .with_compression_level(10)
            .validate(&registry)
            .is_err());
        assert!(TransportConfig::default()
            .with_max_packet_len(100)
            .validate(&registry)
            .is_err());
        assert!(TransportConfig::default()
            .with_max_packet_len(MAX_PACKET_SIZE + 1)
            .validate(&registry)
            .is_err());
        assert!(TransportConfig::default()
            .with_rekey_thresholds(RekeyThresholds {
                bytes: 0,
                time: Duration::from_secs(1),
            })
            .validate(&registry)
            .is_err());
        assert!(TransportConfig::default()
            .with_preferences(AlgorithmPreferences::default().with_macs(&[]))
            .validate(&registry)
            .is_err());
    }

    #[test]
    fn test_offered_preferences_drop_none_before_auth() {
        let prefs = AlgorithmPreferences::default().with_ciphers(&["none", "aes128-ctr"]);
        let offered = offered_preferences(&prefs, false, None).unwrap();
        assert_eq!(offered.ciphers_client_to_server, vec!["aes128-ctr".to_string()]);

        let offered = offered_preferences(&prefs, true, None).unwrap();
        assert_eq!(offered.ciphers_server_to_client.len(), 2);

        let only_none = AlgorithmPreferences::default().with_ciphers(&["none"]);
        assert!(matches!(
            offered_preferences(&only_none, false, None),
            Err(OspreyError::Configuration(_))
        ));
    }

    #[test]
    fn test_offered_preferences_server_key_type() {
        let prefs = AlgorithmPreferences::default();
        let offered = offered_preferences(&prefs, false, Some("ssh-ed25519")).unwrap();
        assert_eq!(offered.host_key, vec!["ssh-ed25519".to_string()]);

        let prefs = prefs.with_host_keys(&["ssh-dss"]);
        assert!(offered_preferences(&prefs, false, Some("ssh-ed25519")).is_err());
    }

    #[tokio::test]
    async fn test_handshake_and_closed_after_disconnect() {
        let (a, b) = duplex(64 * 1024);
        let host_key = Arc::new(Ed25519HostKey::generate(&LockedRandom::from_seed(2)));
        let (client, server) = tokio::join!(
            TransportSession::client(
                a,
                TransportConfig::default(),
                registry(3),
                Arc::new(AcceptAnyHostKey)
            ),
            TransportSession::server(b, TransportConfig::default(), registry(4), host_key),
        );
        let mut client = client.unwrap();
        let mut server = server.unwrap();

        assert_eq!(client.role(), Role::Client);
        assert_eq!(server.role(), Role::Server);
        assert_eq!(client.session_id(), server.session_id());
        assert_eq!(client.kex_count(), 1);
        assert!(client.peer_version().software().starts_with("Osprey_"));

        client
            .disconnect(crate::ssh::message::DisconnectReason::BY_APPLICATION, "bye")
            .await
            .unwrap();
        assert!(client.is_closed());
        assert!(matches!(client.send(b"\x5edata").await, Err(OspreyError::Closed)));

        match server.recv().await {
            Err(OspreyError::Disconnected { reason, description }) => {
                assert_eq!(reason, 11);
                assert_eq!(description, "bye");
            }
            other => panic!("Expected Disconnected, got {:?}", other),
        }
        assert!(matches!(server.recv().await, Err(OspreyError::Closed)));
    }

    #[tokio::test]
    async fn test_rekey_replaces_every_key() {
        let (mut client, mut server) = connected().await;

        let (c, s) = tokio::join!(
            async {
                client.rekey().await?;
                client.send(b"\x5eafter").await
            },
            server.recv(),
        );
        c.unwrap();
        assert_eq!(s.unwrap(), b"\x5eafter");

        assert_eq!(client.derived_keys.len(), 2);
        assert_eq!(server.derived_keys.len(), 2);
        let before = key_material(&client.derived_keys[0]);
        let after = key_material(&client.derived_keys[1]);
        assert_eq!(before, key_material(&server.derived_keys[0]));
        assert_eq!(after, key_material(&server.derived_keys[1]));

        assert_eq!(before.len(), 6);
        for (slot, (old, new)) in before.iter().zip(&after).enumerate() {
            assert!(!old.is_empty());
            assert_ne!(old, new, "key {} unchanged by rekey", b"ACEBDF"[slot] as char);
        }

        server.send(b"\x5ereply").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), b"\x5ereply");
    }
}
