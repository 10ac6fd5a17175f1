//! oligocodec - DNA oligo codec for binary files
//!
//! Converts an arbitrary byte buffer into short nucleotide sequences
//! ("oligos") that respect synthesis constraints, and reconstructs the
//! original bytes from an imperfect read-back of those oligos.
//!
//! Per chunk the pipeline is:
//!
//! ```text
//! bytes ─► chunk ─► ‖crc32 ─► Reed-Solomon ─► Goldman mapper ─► segments
//!                                                                  │
//!            80-nt header (sync, type, 68 field bits, crc8) ◄──────┘
//!                                   │
//!                                   └─► replicated N times
//! ```
//!
//! Decoding groups reads by their header, collapses replicates by
//! per-position plurality vote, inverts the mapper, corrects with
//! Reed-Solomon (errors and erasures) and validates with CRC-32.
//!
//! # Example
//!
//! ```rust
//! use oligocodec::{decode, encode, CodecConfig};
//!
//! let config = CodecConfig::default();
//! let encoding = encode(b"hello, oligos", &config).unwrap();
//!
//! // Reads come back unordered, headers embedded.
//! let mut reads = encoding.sequences();
//! reads.reverse();
//!
//! let decoded = decode(&reads, &config).unwrap();
//! assert_eq!(decoded.data, b"hello, oligos");
//! ```

use gf256::gf::gf;
use thiserror::Error;

pub mod checksum;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod fasta;
pub mod fec;
pub mod header;
pub mod manifest;
pub mod mapper;
pub mod noise;
pub mod replication;

pub use chunk::{Chunk, ProtectedChunk, SourceBuffer};
pub use codec::{ChunkFailure, DecodeFailure, DecodeStats, Decoded, Decoder, Encoder, Encoding};
pub use config::{CodecConfig, ConstraintProfile};
pub use header::{HeaderFault, OligoHeader, OligoKind};
pub use manifest::FileManifest;
pub use mapper::Nucleotide;
pub use replication::{OligoRecord, ReplicateGroup};

// Same field as the `reedsolo` family of codecs: x^8 + x^4 + x^3 + x^2 + 1,
// generator 0x02.
#[gf(polynomial = 0x11d, generator = 0x2)]
pub type Gf256;

/// Error type for codec operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Configuration rejected before any encoding work (FEC budget, ranges)
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
    /// Input does not fit the addressing fields of the header
    #[error("capacity exceeded: {what} = {value} (limit {limit})")]
    CapacityExceeded {
        what: &'static str,
        value: u64,
        limit: u64,
    },
    /// No mapper variant satisfied the GC/run constraints
    #[error("no mapping within {attempts} reseed attempts satisfied the constraints (closest GC {best_gc:.3})")]
    ConstraintExhausted { attempts: usize, best_gc: f64 },
    /// Oligo header could not be parsed or failed its CRC-8
    #[error("corrupt oligo header: {0}")]
    HeaderCorrupt(#[from] HeaderFault),
    /// Too few length-agreeing replicates to vote on
    #[error("insufficient replicates: {usable} usable, {required} required")]
    InsufficientReplicates { usable: usize, required: usize },
    /// More symbol errors than the Reed-Solomon budget allows
    #[error("uncorrectable error burst ({erasures} known erasures, {nsym} parity symbols)")]
    UncorrectableErrorBurst { erasures: usize, nsym: usize },
    /// Integrity code disagrees with the payload it covers
    #[error("checksum mismatch: stored {expected:#x}, computed {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Nothing in the read set parsed as an oligo
    #[error("no read carried a valid oligo header")]
    NoValidOligos,
    /// At least one chunk could not be recovered
    #[error("{0}")]
    Incomplete(DecodeFailure),
    /// Reassembled bytes disagree with the file manifest
    #[error("reassembled file does not match its manifest (size or fingerprint)")]
    FingerprintMismatch,
}

/// Encode `data` into replicated oligos.
///
/// Shorthand for `Encoder::new(config.clone())?.encode(data)`.
pub fn encode(data: &[u8], config: &CodecConfig) -> Result<Encoding, Error> {
    Encoder::new(config.clone())?.encode(data)
}

/// Decode an unordered collection of reads back into the original bytes.
///
/// Shorthand for `Decoder::new(config.clone())?.decode(reads)`.
pub fn decode<I, S>(reads: I, config: &CodecConfig) -> Result<Decoded, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Decoder::new(config.clone())?.decode(reads)
}
