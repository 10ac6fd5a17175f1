//! Oligo header codec.
//!
//! Every oligo starts with a fixed 80-nt prefix that locates it inside the
//! file. The field block is written one bit per nucleotide (`T` = 0,
//! `C` = 1) so the header never depends on the mapper state.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────┬──────┬───────────┬──────────────┬─────────┬────────────┬───────┐
//! │ sync │ type │ chunk_idx │ total_chunks │ seq_idx │ total_seqs │ crc8  │
//! │ "AG" │ 2 nt │ 24 bit    │ 24 bit       │ 10 bit  │ 10 bit     │ 8 bit │
//! └──────┴──────┴───────────┴──────────────┴─────────┴────────────┴───────┘
//!   2 nt + 2 nt + 68 field bits + 8 CRC bits = 80 nt
//! ```
//!
//! `type` is `AA` (manifest), `CC` (data) or `GG` (parity). The CRC-8 covers
//! the 68 field bits left-aligned in 9 bytes (big-endian, 4 zero pad bits).

use std::fmt;

use thiserror::Error as ThisError;

use crate::checksum::crc8;
use crate::Error;

/// Nucleotides in the header prefix.
pub const HEADER_NT: usize = 80;

/// Synchronisation marker.
pub const SYNC: &str = "AG";

/// Largest `total_chunks` representable in 24 bits.
pub const MAX_CHUNKS: u32 = (1 << 24) - 1;

/// Largest `total_seqs` representable in 10 bits.
pub const MAX_SEQS: u16 = (1 << 10) - 1;

const FIELD_BITS: usize = 68;
const CRC_BITS: usize = 8;
const BIT_OFFSET: usize = SYNC.len() + 2;

/// Role of an oligo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OligoKind {
    /// File manifest segment.
    Header,
    /// Mapped data stream segment (chunk bytes and CRC-32).
    Data,
    /// Mapped Reed-Solomon parity segment.
    Parity,
}

impl OligoKind {
    /// Two-nucleotide type marker.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Header => "AA",
            Self::Data => "CC",
            Self::Parity => "GG",
        }
    }

    /// Parse a type marker.
    pub fn from_marker(marker: &[u8]) -> Option<Self> {
        match marker {
            b"AA" => Some(Self::Header),
            b"CC" => Some(Self::Data),
            b"GG" => Some(Self::Parity),
            _ => None,
        }
    }
}

impl fmt::Display for OligoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Data => write!(f, "data"),
            Self::Parity => write!(f, "parity"),
        }
    }
}

/// Why a header prefix was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum HeaderFault {
    #[error("read shorter than the 80-nt header")]
    TooShort,
    #[error("sync marker is not \"AG\"")]
    SyncMismatch,
    #[error("unknown oligo type marker")]
    UnknownType,
    #[error("field symbol other than T/C")]
    InvalidSymbol,
    #[error("header CRC-8 mismatch")]
    ChecksumMismatch,
    #[error("index outside its declared total")]
    OutOfRange,
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OligoHeader {
    pub kind: OligoKind,
    pub chunk_idx: u32,
    pub total_chunks: u32,
    /// Segment index within the chunk, continuing from Data into Parity.
    pub seq_idx: u16,
    pub total_seqs: u16,
}

impl OligoHeader {
    /// Build a header, checking every field against its width.
    ///
    /// # Errors
    /// `Error::CapacityExceeded` if a total does not fit its field,
    /// `Error::ConfigurationInvalid` if an index is not below its total.
    pub fn new(
        kind: OligoKind,
        chunk_idx: u32,
        total_chunks: u32,
        seq_idx: u16,
        total_seqs: u16,
    ) -> Result<Self, Error> {
        if total_chunks > MAX_CHUNKS {
            return Err(Error::CapacityExceeded {
                what: "total_chunks",
                value: total_chunks as u64,
                limit: MAX_CHUNKS as u64,
            });
        }
        if total_seqs > MAX_SEQS {
            return Err(Error::CapacityExceeded {
                what: "total_seqs",
                value: total_seqs as u64,
                limit: MAX_SEQS as u64,
            });
        }
        if chunk_idx >= total_chunks || seq_idx >= total_seqs {
            return Err(Error::ConfigurationInvalid(format!(
                "header indices out of range: chunk {chunk_idx}/{total_chunks}, seq {seq_idx}/{total_seqs}"
            )));
        }
        Ok(Self {
            kind,
            chunk_idx,
            total_chunks,
            seq_idx,
            total_seqs,
        })
    }

    /// The 68-bit field block.
    pub fn field_bits(&self) -> u128 {
        (self.chunk_idx as u128) << 44
            | (self.total_chunks as u128) << 20
            | (self.seq_idx as u128) << 10
            | self.total_seqs as u128
    }

    fn from_field_bits(kind: OligoKind, bits: u128) -> Self {
        Self {
            kind,
            chunk_idx: ((bits >> 44) & 0xff_ffff) as u32,
            total_chunks: ((bits >> 20) & 0xff_ffff) as u32,
            seq_idx: ((bits >> 10) & 0x3ff) as u16,
            total_seqs: (bits & 0x3ff) as u16,
        }
    }

    /// CRC-8 over the field block.
    pub fn crc8(&self) -> u8 {
        field_crc(self.field_bits())
    }

    /// Render the 80-nt prefix.
    pub fn to_nucleotides(&self) -> String {
        let mut out = String::with_capacity(HEADER_NT);
        out.push_str(SYNC);
        out.push_str(self.kind.marker());
        let block = (self.field_bits() << CRC_BITS) | self.crc8() as u128;
        for i in (0..FIELD_BITS + CRC_BITS).rev() {
            out.push(if (block >> i) & 1 == 1 { 'C' } else { 'T' });
        }
        out
    }

    /// Parse the prefix of `read`, returning the header and the payload
    /// that follows it.
    ///
    /// # Errors
    /// Returns the first [`HeaderFault`] found, checked in wire order:
    /// length, sync, type, symbols, CRC, then index ranges.
    pub fn parse(read: &str) -> Result<(Self, &str), HeaderFault> {
        let bytes = read.as_bytes();
        if bytes.len() < HEADER_NT {
            return Err(HeaderFault::TooShort);
        }
        if &bytes[..SYNC.len()] != SYNC.as_bytes() {
            return Err(HeaderFault::SyncMismatch);
        }
        let kind =
            OligoKind::from_marker(&bytes[SYNC.len()..BIT_OFFSET]).ok_or(HeaderFault::UnknownType)?;

        let mut block = 0u128;
        for &symbol in &bytes[BIT_OFFSET..HEADER_NT] {
            let bit = match symbol {
                b'T' => 0,
                b'C' => 1,
                _ => return Err(HeaderFault::InvalidSymbol),
            };
            block = (block << 1) | bit;
        }

        let fields = block >> CRC_BITS;
        if field_crc(fields) != (block & 0xff) as u8 {
            return Err(HeaderFault::ChecksumMismatch);
        }

        let header = Self::from_field_bits(kind, fields);
        if header.chunk_idx >= header.total_chunks || header.seq_idx >= header.total_seqs {
            return Err(HeaderFault::OutOfRange);
        }

        // all 80 prefix bytes are ASCII, so this is a char boundary
        let rest = read.get(HEADER_NT..).ok_or(HeaderFault::InvalidSymbol)?;
        Ok((header, rest))
    }
}

fn field_crc(fields: u128) -> u8 {
    let aligned = (fields << 4).to_be_bytes();
    // 72 significant bits live in the low 9 bytes
    crc8(&aligned[16 - 9..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_VECTOR: &str =
        "AGCCTTTTTTTTTTTTTTTTTTTTTCTCTTTTTTTTTTTTTTTTTTTTCTTCTTTTTTTTTCTTTTTTTTCCCCTTTCCC";
    const MANIFEST_VECTOR: &str =
        "AGAATTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTTCTTTTTTTTTTTTTTTTTTCTCCCCTCCT";

    #[test]
    fn test_reference_vectors() {
        let data = OligoHeader::new(OligoKind::Data, 5, 9, 1, 3).unwrap();
        assert_eq!(data.crc8(), 0xc7);
        assert_eq!(data.to_nucleotides(), DATA_VECTOR);

        let manifest = OligoHeader::new(OligoKind::Header, 0, 1, 0, 2).unwrap();
        assert_eq!(manifest.crc8(), 0xf6);
        assert_eq!(manifest.to_nucleotides(), MANIFEST_VECTOR);
    }

    #[test]
    fn test_manifest_vector_field_layout() {
        let bits = &MANIFEST_VECTOR.as_bytes()[4..];
        let field = |from: usize, width: usize| -> u32 {
            bits[from..from + width]
                .iter()
                .fold(0, |acc, &b| (acc << 1) | u32::from(b == b'C'))
        };
        assert_eq!(bits.len(), 76);
        assert_eq!(field(0, 24), 0);
        assert_eq!(field(24, 24), 1);
        assert_eq!(field(48, 10), 0);
        assert_eq!(field(58, 10), 2);
        assert_eq!(field(68, 8), 0xf6);
    }

    #[test]
    fn test_parse_returns_payload() {
        let read = format!("{DATA_VECTOR}ACGTACGT");
        let (header, rest) = OligoHeader::parse(&read).unwrap();
        assert_eq!(header, OligoHeader::new(OligoKind::Data, 5, 9, 1, 3).unwrap());
        assert_eq!(rest, "ACGTACGT");

        let (header, rest) = OligoHeader::parse(MANIFEST_VECTOR).unwrap();
        assert_eq!(header.kind, OligoKind::Header);
        assert_eq!(rest, "");
    }

    #[test]
    fn test_field_boundaries() {
        let cases = [
            (OligoKind::Data, 0, 1, 0, 1),
            (OligoKind::Parity, MAX_CHUNKS - 1, MAX_CHUNKS, MAX_SEQS - 1, MAX_SEQS),
            (OligoKind::Header, 12345, 70000, 511, 512),
        ];
        for (kind, chunk_idx, total_chunks, seq_idx, total_seqs) in cases {
            let header = OligoHeader::new(kind, chunk_idx, total_chunks, seq_idx, total_seqs).unwrap();
            let nt = header.to_nucleotides();
            assert_eq!(nt.len(), HEADER_NT);
            assert_eq!(OligoHeader::parse(&nt).unwrap().0, header);
        }
    }

    #[test]
    fn test_new_rejects_bad_fields() {
        assert!(matches!(
            OligoHeader::new(OligoKind::Data, 0, MAX_CHUNKS + 1, 0, 1),
            Err(Error::CapacityExceeded { what: "total_chunks", .. })
        ));
        assert!(matches!(
            OligoHeader::new(OligoKind::Data, 0, 1, 0, MAX_SEQS + 1),
            Err(Error::CapacityExceeded { what: "total_seqs", .. })
        ));
        assert!(OligoHeader::new(OligoKind::Data, 3, 3, 0, 1).is_err());
        assert!(OligoHeader::new(OligoKind::Data, 0, 1, 2, 2).is_err());
    }

    #[test]
    fn test_every_single_bit_flip_detected() {
        for pos in BIT_OFFSET..HEADER_NT {
            let mut read = DATA_VECTOR.as_bytes().to_vec();
            read[pos] = if read[pos] == b'T' { b'C' } else { b'T' };
            let read = String::from_utf8(read).unwrap();
            assert_eq!(
                OligoHeader::parse(&read).unwrap_err(),
                HeaderFault::ChecksumMismatch,
                "flip at {pos}"
            );
        }
    }

    #[test]
    fn test_fault_kinds() {
        assert_eq!(OligoHeader::parse("AGCC").unwrap_err(), HeaderFault::TooShort);

        let mut read = DATA_VECTOR.to_string();
        read.replace_range(0..2, "GA");
        assert_eq!(OligoHeader::parse(&read).unwrap_err(), HeaderFault::SyncMismatch);

        let mut read = DATA_VECTOR.to_string();
        read.replace_range(2..4, "CT");
        assert_eq!(OligoHeader::parse(&read).unwrap_err(), HeaderFault::UnknownType);

        let mut read = DATA_VECTOR.to_string();
        read.replace_range(10..11, "G");
        assert_eq!(OligoHeader::parse(&read).unwrap_err(), HeaderFault::InvalidSymbol);

        // CRC-consistent but chunk_idx >= total_chunks
        let bogus = OligoHeader {
            kind: OligoKind::Data,
            chunk_idx: 4,
            total_chunks: 2,
            seq_idx: 0,
            total_seqs: 1,
        };
        assert_eq!(
            OligoHeader::parse(&bogus.to_nucleotides()).unwrap_err(),
            HeaderFault::OutOfRange
        );
    }

    #[test]
    fn test_kind_markers() {
        for kind in [OligoKind::Header, OligoKind::Data, OligoKind::Parity] {
            assert_eq!(OligoKind::from_marker(kind.marker().as_bytes()), Some(kind));
        }
        assert_eq!(OligoKind::from_marker(b"AC"), None);
        assert_eq!(OligoKind::Parity.to_string(), "parity");
    }
}
