//! Chunking of the source buffer.
//!
//! ```text
//! file:   [ chunk 0 ][ chunk 1 ] ... [ chunk n-1 (may be short) ]
//!
//! chunk -> message  = payload ‖ crc32(payload)
//!       -> codeword = message ‖ RS parity(message)
//! ```
//!
//! The last chunk is never padded; its length is recovered from the mapped
//! stream length on decode.

use sha2::{Digest, Sha256};

use crate::checksum::{append_crc32, CHUNK_CRC_BYTES};
use crate::fec::ReedSolomon;
use crate::Error;

/// Borrowed view of the file being encoded, with its SHA-256 fingerprint.
#[derive(Debug, Clone)]
pub struct SourceBuffer<'a> {
    data: &'a [u8],
    fingerprint: [u8; 32],
}

impl<'a> SourceBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let fingerprint: [u8; 32] = Sha256::digest(data).into();
        Self { data, fingerprint }
    }

    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Full SHA-256 digest.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// First 8 bytes of the digest, as stored in the manifest.
    pub fn short_fingerprint(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.fingerprint[..8]);
        out
    }

    /// Split into chunks of `chunk_size` bytes.
    pub fn split(&self, chunk_size: usize) -> Vec<Chunk<'a>> {
        split(self.data, chunk_size)
    }
}

/// First 8 bytes of SHA-256 over `data`.
pub fn short_fingerprint(data: &[u8]) -> [u8; 8] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Number of chunks for `len` bytes; an empty input still has one chunk.
#[inline]
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 1;
    }
    len.div_ceil(chunk_size).max(1)
}

/// One contiguous slice of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub chunk_idx: u32,
    pub total_chunks: u32,
    pub payload: &'a [u8],
}

/// Split `data` into chunks. All chunks but the last hold exactly
/// `chunk_size` bytes; empty input yields a single empty chunk.
pub fn split(data: &[u8], chunk_size: usize) -> Vec<Chunk<'_>> {
    let total = chunk_count(data.len(), chunk_size) as u32;
    if data.is_empty() || chunk_size == 0 {
        return vec![Chunk {
            chunk_idx: 0,
            total_chunks: total,
            payload: data,
        }];
    }
    data.chunks(chunk_size)
        .enumerate()
        .map(|(i, payload)| Chunk {
            chunk_idx: i as u32,
            total_chunks: total,
            payload,
        })
        .collect()
}

impl Chunk<'_> {
    /// Frame the payload with its CRC-32 and append Reed-Solomon parity.
    ///
    /// # Errors
    /// Returns `Error::ConfigurationInvalid` if the framed payload and
    /// parity exceed one 255-symbol codeword.
    pub fn protect(&self, rs: &ReedSolomon) -> Result<ProtectedChunk, Error> {
        let message = append_crc32(self.payload);
        let message_len = message.len();
        let codeword = rs.encode(&message)?;
        Ok(ProtectedChunk {
            chunk_idx: self.chunk_idx,
            total_chunks: self.total_chunks,
            codeword,
            message_len,
        })
    }
}

/// A chunk after CRC framing and Reed-Solomon encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedChunk {
    pub chunk_idx: u32,
    pub total_chunks: u32,
    /// `payload ‖ crc32 ‖ parity`
    pub codeword: Vec<u8>,
    /// Length of `payload ‖ crc32`.
    pub message_len: usize,
}

impl ProtectedChunk {
    /// Payload plus CRC-32; mapped into the Data stream.
    pub fn message(&self) -> &[u8] {
        &self.codeword[..self.message_len]
    }

    /// Reed-Solomon parity; mapped into the Parity stream.
    pub fn parity(&self) -> &[u8] {
        &self.codeword[self.message_len..]
    }

    /// Payload length without the CRC-32.
    pub fn payload_len(&self) -> usize {
        self.message_len - CHUNK_CRC_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::verify_crc32;

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 100), 1);
        assert_eq!(chunk_count(1, 100), 1);
        assert_eq!(chunk_count(100, 100), 1);
        assert_eq!(chunk_count(101, 100), 2);
        assert_eq!(chunk_count(1000, 100), 10);
    }

    #[test]
    fn test_split_sizes() {
        let data: Vec<u8> = (0..250).map(|i| i as u8).collect();
        let chunks = split(&data, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].payload.len(), 100);
        assert_eq!(chunks[2].payload.len(), 50);
        assert!(chunks.iter().all(|c| c.total_chunks == 3));
        assert_eq!(chunks[2].chunk_idx, 2);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.iter().copied()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_split_empty() {
        let chunks = split(&[], 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
        assert!(chunks[0].payload.is_empty());
    }

    #[test]
    fn test_protect_layout() {
        let rs = ReedSolomon::new(4).unwrap();
        let chunk = Chunk {
            chunk_idx: 2,
            total_chunks: 5,
            payload: &[1, 2, 3],
        };
        let protected = chunk.protect(&rs).unwrap();
        assert_eq!(protected.message_len, 7);
        assert_eq!(protected.codeword.len(), 11);
        assert_eq!(protected.parity().len(), 4);
        assert_eq!(protected.payload_len(), 3);
        assert_eq!(verify_crc32(protected.message()).unwrap(), &[1, 2, 3]);
        assert_eq!(rs.decode(&protected.codeword, &[]).unwrap().message, protected.message());
    }

    #[test]
    fn test_protect_rejects_oversized_chunk() {
        let rs = ReedSolomon::new(10).unwrap();
        let payload = [0u8; 242];
        let chunk = Chunk {
            chunk_idx: 0,
            total_chunks: 1,
            payload: &payload,
        };
        assert!(matches!(chunk.protect(&rs), Err(Error::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_fingerprint() {
        let source = SourceBuffer::new(b"abc");
        // SHA-256("abc") = ba7816bf 8f01cfea ...
        assert_eq!(
            source.short_fingerprint(),
            [0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea]
        );
        assert_eq!(&source.fingerprint()[..8], &source.short_fingerprint());
        assert_eq!(source.len(), 3);
        assert!(SourceBuffer::new(&[]).is_empty());
    }
}
