//! File manifest.
//!
//! A 22-byte record describing the whole file, written as `Header`-kind
//! oligos for chunk 0 and replicated more heavily than data.
//!
//! # Wire Format
//!
//! ```text
//! ┌───────────┬────────────┬──────┬──────────┬──────────────────┬────────┐
//! │ file_size │ chunk_size │ nsym │ reserved │ sha256[..8]      │ crc16  │
//! │ (8B LE)   │ (2B LE)    │ (1B) │ (1B)     │ (8B)             │ (2B LE)│
//! └───────────┴────────────┴──────┴──────────┴──────────────────┴────────┘
//! ```
//!
//! The CRC-16/CCITT covers the first 20 bytes.

use crate::checksum::crc16_ccitt;
use crate::chunk::SourceBuffer;
use crate::config::CodecConfig;
use crate::header::MAX_CHUNKS;
use crate::Error;

/// Serialized manifest size.
pub const MANIFEST_BYTES: usize = 22;

const CRC_OFFSET: usize = MANIFEST_BYTES - 2;

/// Whole-file metadata used to finish and verify a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileManifest {
    pub file_size: u64,
    pub chunk_size: u16,
    pub nsym: u8,
    /// First 8 bytes of SHA-256 over the file.
    pub fingerprint: [u8; 8],
}

impl FileManifest {
    /// Describe `source` as it will be encoded with `config`.
    pub fn describe(source: &SourceBuffer<'_>, config: &CodecConfig) -> Self {
        Self {
            file_size: source.len() as u64,
            chunk_size: config.chunk_size as u16,
            nsym: config.error_correction_symbols as u8,
            fingerprint: source.short_fingerprint(),
        }
    }

    pub fn to_bytes(&self) -> [u8; MANIFEST_BYTES] {
        let mut buf = [0u8; MANIFEST_BYTES];
        buf[0..8].copy_from_slice(&self.file_size.to_le_bytes());
        buf[8..10].copy_from_slice(&self.chunk_size.to_le_bytes());
        buf[10] = self.nsym;
        // buf[11] reserved
        buf[12..20].copy_from_slice(&self.fingerprint);
        let crc = crc16_ccitt(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse a serialized manifest. Trailing bytes are ignored.
    ///
    /// # Errors
    /// `Error::ChecksumMismatch` if the buffer is short or its CRC-16 is
    /// wrong, `Error::ConfigurationInvalid` if `chunk_size` is zero,
    /// `Error::CapacityExceeded` if the file needs more chunks than a
    /// header can address.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < MANIFEST_BYTES {
            return Err(Error::ChecksumMismatch {
                expected: 0,
                actual: 0,
            });
        }
        let expected = u16::from_le_bytes([buf[CRC_OFFSET], buf[CRC_OFFSET + 1]]);
        let actual = crc16_ccitt(&buf[..CRC_OFFSET]);
        if expected != actual {
            return Err(Error::ChecksumMismatch {
                expected: expected as u32,
                actual: actual as u32,
            });
        }

        let mut size = [0u8; 8];
        size.copy_from_slice(&buf[0..8]);
        let mut fingerprint = [0u8; 8];
        fingerprint.copy_from_slice(&buf[12..20]);

        let manifest = Self {
            file_size: u64::from_le_bytes(size),
            chunk_size: u16::from_le_bytes([buf[8], buf[9]]),
            nsym: buf[10],
            fingerprint,
        };
        if manifest.chunk_size == 0 {
            return Err(Error::ConfigurationInvalid("manifest chunk_size is zero".into()));
        }
        let chunks = manifest.file_size.div_ceil(u64::from(manifest.chunk_size));
        if chunks > u64::from(MAX_CHUNKS) {
            return Err(Error::CapacityExceeded {
                what: "total_chunks",
                value: chunks,
                limit: u64::from(MAX_CHUNKS),
            });
        }
        Ok(manifest)
    }

    /// Number of chunks the file was split into.
    pub fn num_chunks(&self) -> usize {
        let size = u64::from(self.chunk_size.max(1));
        self.file_size.div_ceil(size).max(1) as usize
    }

    /// Payload length of chunk `idx`.
    pub fn chunk_len(&self, idx: usize) -> usize {
        let size = self.chunk_size as usize;
        let start = idx.saturating_mul(size) as u64;
        self.file_size.saturating_sub(start).min(size as u64) as usize
    }

    /// Whether the manifest was written with the same chunking and parity
    /// as `config`.
    pub fn matches(&self, config: &CodecConfig) -> bool {
        self.chunk_size as usize == config.chunk_size
            && self.nsym as usize == config.error_correction_symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileManifest {
        FileManifest {
            file_size: 250,
            chunk_size: 100,
            nsym: 10,
            fingerprint: [1, 2, 3, 4, 5, 6, 7, 8],
        }
    }

    #[test]
    fn test_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..8], &250u64.to_le_bytes());
        assert_eq!(&bytes[8..10], &[100, 0]);
        assert_eq!(bytes[10], 10);
        assert_eq!(bytes[11], 0);
        assert_eq!(&bytes[12..20], &[1, 2, 3, 4, 5, 6, 7, 8]);
        let crc = crc16_ccitt(&bytes[..20]);
        assert_eq!(&bytes[20..], &crc.to_le_bytes());
        assert_eq!(FileManifest::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = sample().to_bytes();
        bytes[3] ^= 0x10;
        assert!(matches!(
            FileManifest::from_bytes(&bytes),
            Err(Error::ChecksumMismatch { .. })
        ));
        assert!(FileManifest::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_chunk_lengths() {
        let manifest = sample();
        assert_eq!(manifest.num_chunks(), 3);
        assert_eq!(manifest.chunk_len(0), 100);
        assert_eq!(manifest.chunk_len(2), 50);
        assert_eq!(manifest.chunk_len(3), 0);

        let empty = FileManifest {
            file_size: 0,
            ..sample()
        };
        assert_eq!(empty.num_chunks(), 1);
        assert_eq!(empty.chunk_len(0), 0);
    }

    #[test]
    fn test_rejects_unaddressable_chunk_count() {
        let at_limit = FileManifest {
            file_size: u64::from(MAX_CHUNKS) * 100,
            ..sample()
        };
        let parsed = FileManifest::from_bytes(&at_limit.to_bytes()).unwrap();
        assert_eq!(parsed.num_chunks(), MAX_CHUNKS as usize);

        for file_size in [u64::from(MAX_CHUNKS) * 100 + 1, u64::MAX] {
            let forged = FileManifest {
                file_size,
                ..sample()
            };
            assert!(matches!(
                FileManifest::from_bytes(&forged.to_bytes()),
                Err(Error::CapacityExceeded { what: "total_chunks", .. })
            ));
        }
    }

    #[test]
    fn test_describe() {
        let source = SourceBuffer::new(b"manifest");
        let config = CodecConfig::default();
        let manifest = FileManifest::describe(&source, &config);
        assert_eq!(manifest.file_size, 8);
        assert_eq!(manifest.fingerprint, source.short_fingerprint());
        assert!(manifest.matches(&config));
        assert!(!manifest.matches(&CodecConfig::compact()));
    }
}
