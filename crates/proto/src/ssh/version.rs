//! Identification string exchange (RFC 4253 Section 4.2).
//!
//! Both sides open the connection by sending one line:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! Example: `SSH-2.0-Osprey_0.1.0 transport core`
//!
//! A server may send other lines before its identification; those are
//! skipped by [`read_identification`] (at most [`MAX_PREAMBLE_LINES`]).
//!
//! The identification line, without CR LF, is an input to the exchange
//! hash, so a parsed [`Version`] keeps the exact text it was built from.
//!
//! # Example
//!
//! ```rust
//! use osprey_proto::ssh::version::Version;
//!
//! let version = Version::new("Osprey_0.1.0", Some("transport core"));
//! assert_eq!(version.to_string(), "SSH-2.0-Osprey_0.1.0 transport core");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_8.9").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_8.9");
//! ```

use osprey_platform::{OspreyError, OspreyResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Maximum length of an identification line, CR LF included.
pub const MAX_VERSION_LENGTH: usize = 255;

/// Maximum number of non-identification lines accepted before the banner.
pub const MAX_PREAMBLE_LINES: usize = 1024;

/// SSH identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    proto_version: String,
    software_version: String,
    comments: Option<String>,
    line: String,
}

impl Version {
    /// Creates an SSH-2.0 identification.
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        let line = match comments {
            Some(c) => format!("SSH-2.0-{} {}", software, c),
            None => format!("SSH-2.0-{}", software),
        };
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
            line,
        }
    }

    /// The identification this crate sends by default.
    ///
    /// ```rust
    /// use osprey_proto::ssh::version::Version;
    ///
    /// assert!(Version::default_osprey().to_string().starts_with("SSH-2.0-Osprey_"));
    /// ```
    pub fn default_osprey() -> Self {
        Self::new(&format!("Osprey_{}", env!("CARGO_PKG_VERSION")), None)
    }

    /// Parses an identification line, with or without CR LF.
    ///
    /// # Errors
    ///
    /// Returns [`OspreyError::Protocol`] if the line is longer than 255
    /// bytes, contains NUL, does not start with `SSH-`, or names a protocol
    /// version other than `2.0` or `1.99`.
    pub fn parse(line: &str) -> OspreyResult<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        if line.len() + 2 > MAX_VERSION_LENGTH {
            return Err(OspreyError::Protocol(format!(
                "Version string too long: {} bytes (max {})",
                line.len() + 2,
                MAX_VERSION_LENGTH
            )));
        }
        if line.contains('\0') {
            return Err(OspreyError::Protocol(
                "Version string contains null byte".to_string(),
            ));
        }
        let rest = line.strip_prefix("SSH-").ok_or_else(|| {
            OspreyError::Protocol(format!(
                "Invalid version string: must start with 'SSH-', got '{}'",
                line
            ))
        })?;

        let (proto_version, rest) = rest.split_once('-').ok_or_else(|| {
            OspreyError::Protocol(format!("Invalid version string format: '{}'", line))
        })?;
        if proto_version != "2.0" && proto_version != "1.99" {
            return Err(OspreyError::Protocol(format!(
                "Unsupported protocol version: '{}' (expected '2.0' or '1.99')",
                proto_version
            )));
        }

        let (software_version, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software, Some(comments.trim().to_string())),
            None => (rest, None),
        };
        if software_version.is_empty() {
            return Err(OspreyError::Protocol(format!(
                "Missing software version in '{}'",
                line
            )));
        }

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version: software_version.to_string(),
            comments,
            line: line.to_string(),
        })
    }

    /// Protocol version (`2.0` or `1.99`).
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Software version.
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Exact identification text without CR LF, as hashed into H.
    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }

    /// Wire form with CR LF.
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self.line).into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line)
    }
}

/// Writes our identification line.
pub async fn write_identification<W>(writer: &mut W, version: &Version) -> OspreyResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&version.to_wire_format()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the peer's identification, skipping any preamble lines.
///
/// Reads byte by byte so nothing past the identification's LF is consumed.
pub async fn read_identification<R>(reader: &mut R) -> OspreyResult<Version>
where
    R: AsyncRead + Unpin,
{
    for _ in 0..=MAX_PREAMBLE_LINES {
        let line = read_line(reader).await?;
        if line.starts_with(b"SSH-") {
            let text = std::str::from_utf8(&line).map_err(|_| {
                OspreyError::Protocol("Identification string is not valid UTF-8".to_string())
            })?;
            let version = Version::parse(text)?;
            debug!(peer = %version, "Received identification");
            return Ok(version);
        }
        debug!(len = line.len(), "Skipping pre-identification line");
    }
    Err(OspreyError::Protocol(format!(
        "No identification string within {} lines",
        MAX_PREAMBLE_LINES
    )))
}

async fn read_line<R>(reader: &mut R) -> OspreyResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(64);
    loop {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(line);
        }
        line.push(byte);
        if line.len() > MAX_VERSION_LENGTH {
            return Err(OspreyError::Protocol(format!(
                "Identification line exceeds {} bytes",
                MAX_VERSION_LENGTH
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_new() {
        let version = Version::new("Osprey_0.1.0", None);
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "Osprey_0.1.0");
        assert_eq!(version.comments(), None);
        assert_eq!(version.as_bytes(), b"SSH-2.0-Osprey_0.1.0");
    }

    #[test]
    fn test_version_parse_with_comments() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9 Ubuntu-3ubuntu0.1").unwrap();
        assert_eq!(version.software(), "OpenSSH_8.9");
        assert_eq!(version.comments(), Some("Ubuntu-3ubuntu0.1"));
    }

    #[test]
    fn test_version_parse_keeps_exact_text() {
        let version = Version::parse("SSH-1.99-Legacy  two  spaces\r\n").unwrap();
        assert_eq!(version.proto_version(), "1.99");
        assert_eq!(version.as_bytes(), b"SSH-1.99-Legacy  two  spaces");
    }

    #[test]
    fn test_version_parse_invalid_prefix() {
        let result = Version::parse("INVALID-2.0-Test");
        assert!(matches!(result, Err(OspreyError::Protocol(_))));
    }

    #[test]
    fn test_version_parse_unsupported_protocol() {
        match Version::parse("SSH-1.5-OldClient") {
            Err(OspreyError::Protocol(msg)) => {
                assert!(msg.contains("Unsupported protocol version"));
            }
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_version_parse_too_long() {
        let long_string = format!("SSH-2.0-{}", "A".repeat(300));
        assert!(Version::parse(&long_string).is_err());
    }

    #[test]
    fn test_version_parse_null_byte() {
        assert!(Version::parse("SSH-2.0-Test\0Bad").is_err());
    }

    #[test]
    fn test_version_wire_format() {
        let version = Version::new("Osprey_0.1.0", None);
        assert_eq!(version.to_wire_format(), b"SSH-2.0-Osprey_0.1.0\r\n");
    }

    #[tokio::test]
    async fn test_read_identification_skips_preamble() {
        let input = b"Welcome to the host\r\nsecond line\nSSH-2.0-Peer_1.0\r\nXYZ".to_vec();
        let mut reader = std::io::Cursor::new(input);
        let version = read_identification(&mut reader).await.unwrap();
        assert_eq!(version.software(), "Peer_1.0");
        // Bytes after the identification are left unread.
        assert_eq!(reader.position(), 51);
    }

    #[tokio::test]
    async fn test_read_identification_eof() {
        let mut reader = std::io::Cursor::new(b"SSH-2.0-Trunc".to_vec());
        assert!(matches!(
            read_identification(&mut reader).await,
            Err(OspreyError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_read_identification_line_too_long() {
        let mut reader = std::io::Cursor::new(vec![b'a'; 400]);
        assert!(matches!(
            read_identification(&mut reader).await,
            Err(OspreyError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut a, mut b) = tokio::io::duplex(256);
        let ours = Version::default_osprey();
        write_identification(&mut a, &ours).await.unwrap();
        let theirs = read_identification(&mut b).await.unwrap();
        assert_eq!(theirs, ours);
    }
}
