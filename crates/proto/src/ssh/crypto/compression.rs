//! Payload compression (RFC 4253 Section 6.2).
//!
//! `zlib` and `zlib@openssh.com` share one zlib stream per direction for the
//! lifetime of the keys; every packet is terminated with a sync flush so
//! the peer can inflate it without waiting for more data. The OpenSSH
//! variant is *delayed*: the transport only switches it on once user
//! authentication has succeeded.
//!
//! # End of input
//!
//! A sync flush always ends with the empty stored block `00 00 ff ff`.
//! Decompression therefore distinguishes two situations that zlib reports
//! identically as "no progress possible":
//!
//! - all compressed bytes consumed and the packet ends on a flush marker:
//!   clean end of the packet, the output is complete;
//! - anything else: the compressed stream is truncated or corrupt, which is
//!   a fatal protocol error rather than a silently short payload.

use super::registry::CompressionAlgorithm;
use super::{Compression, CompressionMode};
use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};
use osprey_platform::{OspreyError, OspreyResult};

/// Trailer emitted by a zlib sync flush.
const SYNC_FLUSH_MARKER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Upper bound on a single inflated payload.
const MAX_INFLATED_LEN: usize = 256 * 1024;

/// `none`
pub const NONE: CompressionAlgorithm = CompressionAlgorithm {
    name: "none",
    delayed: false,
    make: make_none,
};

/// `zlib`
pub const ZLIB: CompressionAlgorithm = CompressionAlgorithm {
    name: "zlib",
    delayed: false,
    make: make_zlib,
};

/// `zlib@openssh.com`
pub const ZLIB_OPENSSH: CompressionAlgorithm = CompressionAlgorithm {
    name: "zlib@openssh.com",
    delayed: true,
    make: make_zlib_openssh,
};

/// Every compression method registered by default, most preferred first.
pub const DEFAULT_COMPRESSIONS: &[CompressionAlgorithm] = &[NONE, ZLIB_OPENSSH, ZLIB];

/// Pass-through compression.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneCompression;

impl Compression for NoneCompression {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>> {
        Ok(payload.to_vec())
    }

    fn decompress(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>> {
        Ok(payload.to_vec())
    }
}

fn make_none(_mode: CompressionMode, _level: u32) -> OspreyResult<Box<dyn Compression>> {
    Ok(Box::new(NoneCompression))
}

fn make_zlib(mode: CompressionMode, level: u32) -> OspreyResult<Box<dyn Compression>> {
    Ok(Box::new(ZlibCompression::new("zlib", mode, level)?))
}

fn make_zlib_openssh(mode: CompressionMode, level: u32) -> OspreyResult<Box<dyn Compression>> {
    Ok(Box::new(ZlibCompression::new("zlib@openssh.com", mode, level)?))
}

enum ZlibStream {
    Deflate(Compress),
    Inflate(Decompress),
}

/// Streaming zlib with one sync flush per packet.
pub struct ZlibCompression {
    name: &'static str,
    stream: ZlibStream,
}

impl std::fmt::Debug for ZlibCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.stream {
            ZlibStream::Deflate(_) => "deflate",
            ZlibStream::Inflate(_) => "inflate",
        };
        f.debug_struct("ZlibCompression")
            .field("name", &self.name)
            .field("mode", &mode)
            .finish()
    }
}

impl ZlibCompression {
    /// Creates a zlib stream for one direction; `level` is 0-9.
    pub fn new(name: &'static str, mode: CompressionMode, level: u32) -> OspreyResult<Self> {
        if level > 9 {
            return Err(OspreyError::Configuration(format!(
                "Invalid zlib compression level {} (expected 0-9)",
                level
            )));
        }
        let stream = match mode {
            CompressionMode::Compress => {
                ZlibStream::Deflate(Compress::new(flate2::Compression::new(level), true))
            }
            CompressionMode::Decompress => ZlibStream::Inflate(Decompress::new(true)),
        };
        Ok(Self { name, stream })
    }
}

impl Compression for ZlibCompression {
    fn name(&self) -> &'static str {
        self.name
    }

    fn compress(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>> {
        let deflate = match &mut self.stream {
            ZlibStream::Deflate(d) => d,
            ZlibStream::Inflate(_) => {
                return Err(OspreyError::Configuration(
                    "compress() called on an inflating stream".to_string(),
                ))
            }
        };

        if payload.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(payload.len() + 64);
        let mut consumed = 0usize;
        loop {
            let before = deflate.total_in();
            deflate
                .compress_vec(&payload[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| OspreyError::Protocol(format!("zlib deflate failed: {}", e)))?;
            consumed += (deflate.total_in() - before) as usize;

            // Spare capacity left means the flush completed.
            if consumed == payload.len() && out.len() < out.capacity() {
                break;
            }
            out.reserve(out.capacity().max(64));
        }
        Ok(out)
    }

    fn decompress(&mut self, payload: &[u8]) -> OspreyResult<Vec<u8>> {
        let inflate = match &mut self.stream {
            ZlibStream::Inflate(i) => i,
            ZlibStream::Deflate(_) => {
                return Err(OspreyError::Configuration(
                    "decompress() called on a deflating stream".to_string(),
                ))
            }
        };

        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if !payload.ends_with(&SYNC_FLUSH_MARKER) {
            return Err(OspreyError::Protocol(
                "Truncated compressed payload: missing sync flush boundary".to_string(),
            ));
        }

        let mut out = Vec::with_capacity(payload.len() * 4 + 64);
        let mut consumed = 0usize;
        loop {
            let before_in = inflate.total_in();
            let before_out = inflate.total_out();
            let status = inflate
                .decompress_vec(&payload[consumed..], &mut out, FlushDecompress::Sync)
                .map_err(|e| OspreyError::Protocol(format!("zlib inflate failed: {}", e)))?;
            consumed += (inflate.total_in() - before_in) as usize;
            let progressed = inflate.total_out() > before_out || inflate.total_in() > before_in;

            if out.len() > MAX_INFLATED_LEN {
                return Err(OspreyError::Protocol(format!(
                    "Decompressed payload exceeds {} bytes",
                    MAX_INFLATED_LEN
                )));
            }

            match status {
                Status::StreamEnd => {
                    return Err(OspreyError::Protocol(
                        "Peer terminated the zlib stream".to_string(),
                    ))
                }
                // Clean end: every byte consumed, up to and including the
                // flush marker checked above.
                _ if consumed == payload.len() && out.len() < out.capacity() => break,
                Status::BufError if !progressed && out.len() < out.capacity() => {
                    return Err(OspreyError::Protocol(format!(
                        "Truncated compressed payload: {} of {} bytes undecodable",
                        payload.len() - consumed,
                        payload.len()
                    )))
                }
                _ => {}
            }

            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(256));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(alg: &CompressionAlgorithm) -> (Box<dyn Compression>, Box<dyn Compression>) {
        (
            (alg.make)(CompressionMode::Compress, 6).unwrap(),
            (alg.make)(CompressionMode::Decompress, 6).unwrap(),
        )
    }

    #[test]
    fn test_zlib_stream_spans_packets() {
        let (mut c, mut d) = pair(&ZLIB);
        let packets: Vec<Vec<u8>> = vec![
            b"first payload, first payload, first payload".to_vec(),
            vec![],
            vec![0x42; 5000],
            b"first payload again".to_vec(),
        ];
        for p in &packets {
            let compressed = c.compress(p).unwrap();
            if !p.is_empty() {
                assert!(compressed.ends_with(&SYNC_FLUSH_MARKER));
            }
            assert_eq!(&d.decompress(&compressed).unwrap(), p);
        }
    }

    #[test]
    fn test_repetitive_data_shrinks() {
        let (mut c, _) = pair(&ZLIB_OPENSSH);
        let compressed = c.compress(&[0x61; 4096]).unwrap();
        assert!(compressed.len() < 100);
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let (mut c, mut d) = pair(&ZLIB);
        let compressed = c.compress(&vec![7u8; 2000]).unwrap();
        let truncated = &compressed[..compressed.len() / 2];
        assert!(matches!(
            d.decompress(truncated),
            Err(OspreyError::Protocol(_))
        ));
    }

    #[test]
    fn test_garbage_is_error() {
        let (_, mut d) = pair(&ZLIB);
        let mut garbage = vec![0xde, 0xad, 0xbe, 0xef, 0x01, 0x02];
        garbage.extend_from_slice(&SYNC_FLUSH_MARKER);
        assert!(d.decompress(&garbage).is_err());
    }

    #[test]
    fn test_wrong_direction_rejected() {
        let (mut c, mut d) = pair(&ZLIB);
        assert!(c.decompress(b"x").is_err());
        assert!(d.compress(b"x").is_err());
    }

    #[test]
    fn test_none_passes_through() {
        let (mut c, mut d) = pair(&NONE);
        assert_eq!(c.compress(b"abc").unwrap(), b"abc");
        assert_eq!(d.decompress(b"abc").unwrap(), b"abc");
    }

    #[test]
    fn test_openssh_variant_is_delayed() {
        assert!(ZLIB_OPENSSH.delayed);
        assert!(!ZLIB.delayed);
    }

    #[test]
    fn test_invalid_level() {
        assert!(matches!(
            (ZLIB.make)(CompressionMode::Compress, 12),
            Err(OspreyError::Configuration(_))
        ));
    }
}
