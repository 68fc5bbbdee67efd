//! SSH data type encoding (RFC 4251 Section 5).
//!
//! Every structure that crosses the wire or enters a hash (KEXINIT payloads,
//! host key blobs, signature blobs, the exchange hash input) is built from a
//! handful of primitive types:
//!
//! ```text
//! byte        single octet
//! boolean     single octet, 0 = false
//! uint32      4 octets, big-endian
//! string      uint32 length || bytes
//! mpint       uint32 length || two's complement big-endian, minimal,
//!             0x00 prefix when the high bit of a positive value is set
//! name-list   string of comma separated ASCII names
//! ```
//!
//! Writers append to a [`BytesMut`]; [`WireReader`] parses with bounds
//! checks and reports truncation as [`OspreyError::Protocol`].
//!
//! # Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use osprey_proto::ssh::wire::{put_mpint, put_string, WireReader};
//!
//! let mut buf = BytesMut::new();
//! put_string(&mut buf, b"ssh-ed25519");
//! put_mpint(&mut buf, &[0x80, 0x01]);
//!
//! let mut reader = WireReader::new(&buf);
//! assert_eq!(reader.read_string().unwrap(), b"ssh-ed25519");
//! assert_eq!(reader.read_mpint().unwrap(), vec![0x80, 0x01]);
//! assert!(reader.is_empty());
//! ```

use bytes::{BufMut, BytesMut};
use osprey_platform::{OspreyError, OspreyResult};

/// Appends an SSH `string`.
pub fn put_string(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

/// Appends an SSH `boolean`.
pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Appends an SSH `name-list`.
pub fn put_name_list(buf: &mut BytesMut, names: &[String]) {
    put_string(buf, names.join(",").as_bytes());
}

/// Appends a non-negative `mpint` given its unsigned big-endian magnitude.
pub fn put_mpint(buf: &mut BytesMut, magnitude: &[u8]) {
    buf.put_slice(&encode_mpint(magnitude));
}

/// Encodes an unsigned big-endian magnitude as a length-prefixed `mpint`.
///
/// Leading zero bytes are trimmed, and a single `0x00` is inserted when the
/// most significant remaining byte has its high bit set. Zero encodes as an
/// empty value.
pub fn encode_mpint(magnitude: &[u8]) -> Vec<u8> {
    let trimmed = trim_leading_zeros(magnitude);

    if trimmed.is_empty() {
        return vec![0, 0, 0, 0];
    }

    let needs_padding = trimmed[0] & 0x80 != 0;
    let length = trimmed.len() + usize::from(needs_padding);

    let mut result = Vec::with_capacity(4 + length);
    result.extend_from_slice(&(length as u32).to_be_bytes());
    if needs_padding {
        result.push(0);
    }
    result.extend_from_slice(trimmed);
    result
}

/// Returns `data` without its leading zero bytes.
pub fn trim_leading_zeros(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|&b| b != 0).unwrap_or(data.len());
    &data[start..]
}

/// Bounds-checked cursor over an SSH encoded buffer.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Returns `true` when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Current read position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Takes the next `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> OspreyResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(OspreyError::Protocol(format!(
                "Truncated field at offset {}: need {} bytes, {} available",
                self.offset,
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Reads a `byte`.
    pub fn read_u8(&mut self) -> OspreyResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a `boolean`.
    pub fn read_bool(&mut self) -> OspreyResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a `uint32`.
    pub fn read_u32(&mut self) -> OspreyResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a `string` and returns its contents.
    pub fn read_string(&mut self) -> OspreyResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Reads a `string` that must be valid UTF-8.
    pub fn read_utf8(&mut self) -> OspreyResult<&'a str> {
        let bytes = self.read_string()?;
        std::str::from_utf8(bytes)
            .map_err(|_| OspreyError::Protocol("String field is not valid UTF-8".to_string()))
    }

    /// Reads a `name-list`.
    pub fn read_name_list(&mut self) -> OspreyResult<Vec<String>> {
        let list = std::str::from_utf8(self.read_string()?)
            .map_err(|_| OspreyError::Protocol("Name-list contains invalid UTF-8".to_string()))?;

        if list.is_empty() {
            Ok(vec![])
        } else {
            Ok(list.split(',').map(String::from).collect())
        }
    }

    /// Reads a non-negative `mpint` and returns its unsigned magnitude
    /// without leading zeros.
    pub fn read_mpint(&mut self) -> OspreyResult<Vec<u8>> {
        let raw = self.read_string()?;
        if raw.first().map_or(false, |b| b & 0x80 != 0) {
            return Err(OspreyError::Protocol(
                "Negative mpint where a non-negative value is required".to_string(),
            ));
        }
        Ok(trim_leading_zeros(raw).to_vec())
    }

    /// Returns the unread tail without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_mpint() {
        assert_eq!(encode_mpint(&[]), vec![0, 0, 0, 0]);
        assert_eq!(encode_mpint(&[0, 0]), vec![0, 0, 0, 0]);
        assert_eq!(encode_mpint(&[0x12, 0x34]), vec![0, 0, 0, 2, 0x12, 0x34]);
        assert_eq!(encode_mpint(&[0x80, 0x00]), vec![0, 0, 0, 3, 0, 0x80, 0x00]);
        assert_eq!(
            encode_mpint(&[0x00, 0x00, 0x12, 0x34]),
            vec![0, 0, 0, 2, 0x12, 0x34]
        );
    }

    #[test]
    fn test_rfc4251_mpint_examples() {
        // RFC 4251 Section 5 test vectors
        assert_eq!(
            encode_mpint(&hex::decode("09a378f9b2e332a7").unwrap()),
            hex::decode("0000000809a378f9b2e332a7").unwrap()
        );
        assert_eq!(encode_mpint(&[0x80]), hex::decode("000000020080").unwrap());
    }

    #[test]
    fn test_mpint_read_back() {
        let mut buf = BytesMut::new();
        put_mpint(&mut buf, &[0x00, 0xff, 0x01]);
        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_mpint().unwrap(), vec![0xff, 0x01]);
    }

    #[test]
    fn test_negative_mpint_rejected() {
        let data = [0, 0, 0, 1, 0x80];
        let mut reader = WireReader::new(&data);
        assert!(matches!(reader.read_mpint(), Err(OspreyError::Protocol(_))));
    }

    #[test]
    fn test_name_list_write_read() {
        let names = vec![
            "first".to_string(),
            "second".to_string(),
            "third".to_string(),
        ];
        let mut buf = BytesMut::new();
        put_name_list(&mut buf, &names);

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_name_list().unwrap(), names);
    }

    #[test]
    fn test_name_list_empty() {
        let mut buf = BytesMut::new();
        put_name_list(&mut buf, &[]);
        assert_eq!(&buf[..], &[0, 0, 0, 0]);

        let mut reader = WireReader::new(&buf);
        assert!(reader.read_name_list().unwrap().is_empty());
    }

    #[test]
    fn test_truncated_string() {
        let data = [0, 0, 0, 10, b'a', b'b'];
        let mut reader = WireReader::new(&data);
        match reader.read_string() {
            Err(OspreyError::Protocol(msg)) => assert!(msg.contains("Truncated")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_reader_tracks_offset() {
        let mut buf = BytesMut::new();
        buf.put_u8(7);
        put_bool(&mut buf, true);
        buf.put_u32(0xdead_beef);

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.offset(), 2);
        assert_eq!(reader.read_u32().unwrap(), 0xdead_beef);
        assert!(reader.is_empty());
    }
}
