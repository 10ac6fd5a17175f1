//! # Encoder and Decoder
//!
//! ## Encoding
//!
//! ```text
//! manifest ─► mapper ─► segments ─► Header oligos × (redundancy · factor)
//!
//! chunk i ─► ‖crc32 ─► RS ─┬─ message ─► mapper ─► segments ─► Data oligos
//!                          └─ parity  ─► mapper ─► segments ─► Parity oligos
//!                                              (seq_idx continues from Data)
//! ```
//!
//! ## Decoding
//!
//! 1. Parse every read's header; unparseable reads are dropped.
//! 2. Group reads by `(kind, chunk_idx, seq_idx)`; vote `total_chunks` and
//!    each chunk's `total_seqs` by majority.
//! 3. Recover the manifest if possible (sizes the last chunk, verifies the
//!    file).
//! 4. Per chunk: consensus per segment, fill lost segments with `N`, demap,
//!    correct errors and erasures with Reed-Solomon, check CRC-32.
//! 5. Concatenate in chunk order.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error as ThisError;
use tracing::{debug, info, trace, warn};

use crate::checksum::{verify_crc32, CHUNK_CRC_BYTES};
use crate::chunk::{short_fingerprint, Chunk, SourceBuffer};
use crate::config::CodecConfig;
use crate::fec::ReedSolomon;
use crate::header::{OligoHeader, OligoKind};
use crate::manifest::{FileManifest, MANIFEST_BYTES};
use crate::mapper::{self, Demapped};
use crate::replication::{replicate, OligoRecord, ReplicateGroup};
use crate::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// =============================================================================
// Encoder
// =============================================================================

/// Converts byte buffers into replicated oligos.
#[derive(Debug, Clone)]
pub struct Encoder {
    config: CodecConfig,
    rs: ReedSolomon,
}

impl Encoder {
    /// Create an encoder.
    ///
    /// # Errors
    /// Returns `Error::ConfigurationInvalid` or `Error::CapacityExceeded` if
    /// `config` fails validation.
    pub fn new(config: CodecConfig) -> Result<Self, Error> {
        config.validate()?;
        let rs = ReedSolomon::new(config.error_correction_symbols)?;
        Ok(Self { config, rs })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode `data`: manifest oligos first, then every chunk's Data and
    /// Parity oligos in chunk order.
    pub fn encode(&self, data: &[u8]) -> Result<Encoding, Error> {
        self.config.validate_capacity(data.len())?;

        let source = SourceBuffer::new(data);
        let manifest = FileManifest::describe(&source, &self.config);
        let chunks = source.split(self.config.chunk_size);
        let total_chunks = chunks.len() as u32;

        let mut oligos = self.encode_manifest(&manifest, total_chunks)?;

        #[cfg(feature = "parallel")]
        let per_chunk: Vec<Vec<OligoRecord>> = chunks
            .par_iter()
            .map(|chunk| self.encode_chunk(chunk))
            .collect::<Result<_, _>>()?;

        #[cfg(not(feature = "parallel"))]
        let per_chunk: Vec<Vec<OligoRecord>> = chunks
            .iter()
            .map(|chunk| self.encode_chunk(chunk))
            .collect::<Result<_, _>>()?;

        oligos.extend(per_chunk.into_iter().flatten());

        info!(
            bytes = data.len(),
            chunks = total_chunks,
            oligos = oligos.len(),
            "encoded"
        );

        Ok(Encoding {
            oligos,
            total_chunks,
            manifest,
        })
    }

    fn encode_manifest(&self, manifest: &FileManifest, total_chunks: u32) -> Result<Vec<OligoRecord>, Error> {
        let stream = mapper::encode_stream(&manifest.to_bytes(), &self.config.constraints)?;
        let segments = segment(&stream.sequence, self.config.segment_nt);
        let total_seqs = segments.len() as u16;

        let mut oligos = Vec::with_capacity(segments.len() * self.config.header_copies());
        for (seq_idx, payload) in segments.into_iter().enumerate() {
            let header = OligoHeader::new(OligoKind::Header, 0, total_chunks, seq_idx as u16, total_seqs)?;
            oligos.extend(replicate(
                &OligoRecord::new(header, payload),
                self.config.header_copies(),
            ));
        }
        Ok(oligos)
    }

    /// Encode a single chunk into its replicated Data and Parity oligos.
    pub fn encode_chunk(&self, chunk: &Chunk<'_>) -> Result<Vec<OligoRecord>, Error> {
        let protected = chunk.protect(&self.rs)?;
        let constraints = &self.config.constraints;

        let data = mapper::encode_stream(protected.message(), constraints)?;
        let mut tagged: Vec<(OligoKind, String)> = segment(&data.sequence, self.config.segment_nt)
            .into_iter()
            .map(|s| (OligoKind::Data, s))
            .collect();

        if self.rs.nsym() > 0 {
            let parity = mapper::encode_stream(protected.parity(), constraints)?;
            tagged.extend(
                segment(&parity.sequence, self.config.segment_nt)
                    .into_iter()
                    .map(|s| (OligoKind::Parity, s)),
            );
        }

        let total_seqs = tagged.len() as u16;
        debug!(
            chunk = chunk.chunk_idx,
            bytes = chunk.payload.len(),
            segments = total_seqs,
            attempt = data.attempt,
            "chunk mapped"
        );

        let mut oligos = Vec::with_capacity(tagged.len() * self.config.redundancy);
        for (seq_idx, (kind, payload)) in tagged.into_iter().enumerate() {
            let header = OligoHeader::new(
                kind,
                chunk.chunk_idx,
                chunk.total_chunks,
                seq_idx as u16,
                total_seqs,
            )?;
            oligos.extend(replicate(&OligoRecord::new(header, payload), self.config.redundancy));
        }
        Ok(oligos)
    }
}

/// Cut a mapped stream into consecutive pieces of at most `segment_nt`.
fn segment(stream: &str, segment_nt: usize) -> Vec<String> {
    stream
        .as_bytes()
        .chunks(segment_nt.max(1))
        .map(|piece| String::from_utf8_lossy(piece).into_owned())
        .collect()
}

/// Output of [`Encoder::encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    /// Every oligo, replicates included, in emission order.
    pub oligos: Vec<OligoRecord>,
    pub total_chunks: u32,
    pub manifest: FileManifest,
}

impl Encoding {
    /// Full nucleotide sequences (header + payload) in emission order.
    pub fn sequences(&self) -> Vec<String> {
        self.oligos.iter().map(OligoRecord::sequence).collect()
    }

    /// Number of oligos of `kind`, replicates included.
    pub fn count(&self, kind: OligoKind) -> usize {
        self.oligos.iter().filter(|o| o.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.oligos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oligos.is_empty()
    }
}

// =============================================================================
// Decode results
// =============================================================================

/// Why a single chunk could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ChunkFailure {
    #[error("no reads")]
    Missing,
    #[error("{kind} segment {seq_idx} missing and its length is unknown")]
    MissingSegment { kind: OligoKind, seq_idx: u16 },
    #[error("uncorrectable ({erasures} erasures, {nsym} parity symbols)")]
    Uncorrectable { erasures: usize, nsym: usize },
    #[error("CRC-32 mismatch (stored {expected:#010x}, computed {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("malformed: {0}")]
    Malformed(String),
}

/// Every chunk that failed, keyed by chunk index.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub total_chunks: u32,
    pub failures: BTreeMap<u32, ChunkFailure>,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 8;
        write!(
            f,
            "{} of {} chunks unrecoverable",
            self.failures.len(),
            self.total_chunks
        )?;
        for (idx, failure) in self.failures.iter().take(SHOWN) {
            write!(f, "; chunk {idx}: {failure}")?;
        }
        if self.failures.len() > SHOWN {
            write!(f, "; ...")?;
        }
        Ok(())
    }
}

/// Counters collected while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Reads offered to the decoder.
    pub reads: usize,
    /// Reads whose header did not parse.
    pub dropped_reads: usize,
    /// Distinct `(kind, chunk, seq)` groups seen.
    pub groups: usize,
    pub total_chunks: u32,
    /// Symbols repaired by Reed-Solomon across all chunks.
    pub corrected_symbols: usize,
    /// Segments that were absent or unusable and filled as erasures.
    pub erased_segments: usize,
    /// Manifest recovered and size and fingerprint matched.
    pub manifest_verified: bool,
}

/// Output of [`Decoder::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub data: Vec<u8>,
    pub manifest: Option<FileManifest>,
    pub stats: DecodeStats,
}

// =============================================================================
// Read index
// =============================================================================

/// Vote counter; ties go to the larger value.
#[derive(Debug, Clone)]
struct Tally<T: Ord>(BTreeMap<T, usize>);

impl<T: Ord + Copy> Tally<T> {
    fn new() -> Self {
        Self(BTreeMap::new())
    }

    fn add(&mut self, value: T) {
        *self.0.entry(value).or_default() += 1;
    }

    fn winner(&self) -> Option<T> {
        let mut best: Option<(T, usize)> = None;
        for (&value, &count) in &self.0 {
            if best.map_or(true, |(_, c)| count >= c) {
                best = Some((value, count));
            }
        }
        best.map(|(value, _)| value)
    }
}

/// Data and Parity share one `total_seqs`; manifest oligos have their own.
fn family(kind: OligoKind) -> OligoKind {
    match kind {
        OligoKind::Header => OligoKind::Header,
        OligoKind::Data | OligoKind::Parity => OligoKind::Data,
    }
}

#[derive(Debug)]
struct ReadIndex {
    groups: BTreeMap<(OligoKind, u32, u16), ReplicateGroup>,
    total_chunks: Tally<u32>,
    total_seqs: BTreeMap<(OligoKind, u32), Tally<u16>>,
    reads: usize,
    dropped: usize,
}

impl ReadIndex {
    fn build<I, S>(reads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self {
            groups: BTreeMap::new(),
            total_chunks: Tally::new(),
            total_seqs: BTreeMap::new(),
            reads: 0,
            dropped: 0,
        };
        for read in reads {
            index.reads += 1;
            let read = read.as_ref().trim();
            match OligoHeader::parse(read) {
                Ok((header, payload)) => index.insert(header, payload),
                Err(fault) => {
                    index.dropped += 1;
                    trace!(read = index.reads - 1, %fault, "dropped read");
                }
            }
        }
        index
    }

    fn insert(&mut self, header: OligoHeader, payload: &str) {
        self.total_chunks.add(header.total_chunks);
        self.total_seqs
            .entry((family(header.kind), header.chunk_idx))
            .or_insert_with(Tally::new)
            .add(header.total_seqs);
        self.groups
            .entry((header.kind, header.chunk_idx, header.seq_idx))
            .or_insert_with(|| ReplicateGroup::new(header.kind, header.chunk_idx, header.seq_idx))
            .push(payload);
    }

    fn total_seqs(&self, kind: OligoKind, chunk_idx: u32) -> Option<u16> {
        self.total_seqs.get(&(kind, chunk_idx)).and_then(Tally::winner)
    }

    fn group(&self, kind: OligoKind, chunk_idx: u32, seq_idx: u16) -> Option<&ReplicateGroup> {
        self.groups.get(&(kind, chunk_idx, seq_idx))
    }
}

/// A mapped stream reassembled from consensus segments.
struct Gathered {
    stream: String,
    erased_segments: usize,
}

struct RecoveredChunk {
    payload: Vec<u8>,
    corrected: usize,
    erased_segments: usize,
}

/// Keys worth trying for a stream: the preamble's if readable, else all.
fn key_candidates(stream: &str) -> Vec<u8> {
    match mapper::preamble_key(stream.as_bytes()) {
        Some(key) => vec![key],
        None => vec![0, 1, 2],
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Reconstructs bytes from an unordered, noisy collection of reads.
///
/// Must be configured with the same `chunk_size`, `error_correction_symbols`
/// and `segment_nt` as the encoder.
#[derive(Debug, Clone)]
pub struct Decoder {
    config: CodecConfig,
    rs: ReedSolomon,
}

impl Decoder {
    /// Create a decoder.
    ///
    /// # Errors
    /// Returns the validation error if `config` is invalid.
    pub fn new(config: CodecConfig) -> Result<Self, Error> {
        config.validate()?;
        let rs = ReedSolomon::new(config.error_correction_symbols)?;
        Ok(Self { config, rs })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Decode `reads` (full sequences, headers included, any order).
    ///
    /// # Errors
    /// - `Error::NoValidOligos` if no read has a valid header
    /// - `Error::ConfigurationInvalid` if the recovered manifest was written
    ///   with a different `chunk_size` or parity count
    /// - `Error::Incomplete` listing every chunk that could not be recovered
    /// - `Error::FingerprintMismatch` if the reassembled file disagrees with
    ///   the manifest
    pub fn decode<I, S>(&self, reads: I) -> Result<Decoded, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = ReadIndex::build(reads);
        let Some(voted_chunks) = index.total_chunks.winner() else {
            return Err(Error::NoValidOligos);
        };

        let manifest = self.recover_manifest(&index);
        if let Some(manifest) = &manifest {
            if !manifest.matches(&self.config) {
                return Err(Error::ConfigurationInvalid(format!(
                    "oligos were written with chunk_size {} and {} parity symbols, decoder expects {} and {}",
                    manifest.chunk_size,
                    manifest.nsym,
                    self.config.chunk_size,
                    self.config.error_correction_symbols
                )));
            }
        }

        let total_chunks = match &manifest {
            Some(m) if m.num_chunks() as u32 != voted_chunks => {
                warn!(
                    voted = voted_chunks,
                    manifest = m.num_chunks(),
                    "total_chunks vote disagrees with manifest, using manifest"
                );
                m.num_chunks() as u32
            }
            _ => voted_chunks,
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<Result<RecoveredChunk, ChunkFailure>> = (0..total_chunks)
            .into_par_iter()
            .map(|idx| self.decode_chunk(&index, idx, total_chunks, manifest.as_ref()))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<Result<RecoveredChunk, ChunkFailure>> = (0..total_chunks)
            .map(|idx| self.decode_chunk(&index, idx, total_chunks, manifest.as_ref()))
            .collect();

        let mut stats = DecodeStats {
            reads: index.reads,
            dropped_reads: index.dropped,
            groups: index.groups.len(),
            total_chunks,
            ..DecodeStats::default()
        };
        let mut data = Vec::new();
        let mut failures = BTreeMap::new();
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(chunk) => {
                    stats.corrected_symbols += chunk.corrected;
                    stats.erased_segments += chunk.erased_segments;
                    data.extend_from_slice(&chunk.payload);
                }
                Err(failure) => {
                    warn!(chunk = idx, %failure, "chunk failed");
                    failures.insert(idx as u32, failure);
                }
            }
        }

        if !failures.is_empty() {
            warn!(failed = failures.len(), total = total_chunks, "decode incomplete");
            return Err(Error::Incomplete(DecodeFailure {
                total_chunks,
                failures,
            }));
        }

        if let Some(manifest) = &manifest {
            if data.len() as u64 != manifest.file_size
                || short_fingerprint(&data) != manifest.fingerprint
            {
                return Err(Error::FingerprintMismatch);
            }
            stats.manifest_verified = true;
        }

        info!(
            reads = stats.reads,
            dropped = stats.dropped_reads,
            chunks = total_chunks,
            corrected = stats.corrected_symbols,
            bytes = data.len(),
            "decoded"
        );

        Ok(Decoded {
            data,
            manifest,
            stats,
        })
    }

    fn recover_manifest(&self, index: &ReadIndex) -> Option<FileManifest> {
        let stream_nt = mapper::stream_len(MANIFEST_BYTES);
        let expected = self.config.segments_for(stream_nt);

        let Some(total_seqs) = index.total_seqs(OligoKind::Header, 0) else {
            warn!("no manifest oligos, last chunk length inferred from its stream");
            return None;
        };
        if total_seqs as usize != expected {
            warn!(total_seqs, expected, "manifest segment count mismatch");
            return None;
        }

        let gathered = match self.gather(index, OligoKind::Header, 0, 0, expected, Some(stream_nt)) {
            Ok(g) => g,
            Err(failure) => {
                warn!(%failure, "manifest unreadable");
                return None;
            }
        };

        for key in key_candidates(&gathered.stream) {
            let Demapped { bytes, erasures } =
                mapper::decode_stream_with_key(gathered.stream.as_bytes(), key);
            if !erasures.is_empty() {
                continue;
            }
            match FileManifest::from_bytes(&bytes) {
                Ok(manifest) => {
                    debug!(file_size = manifest.file_size, "manifest recovered");
                    return Some(manifest);
                }
                Err(e @ Error::CapacityExceeded { .. }) => {
                    warn!(%e, "manifest ignored");
                    return None;
                }
                Err(_) => {}
            }
        }
        warn!("manifest failed its checksum");
        None
    }

    /// Concatenate `count` consensus segments starting at `first_seq`.
    ///
    /// With a known `total_nt` every segment length is known and any missing
    /// or mis-sized segment becomes a run of `N`. Otherwise the last segment
    /// must be present, as it fixes the stream length.
    fn gather(
        &self,
        index: &ReadIndex,
        kind: OligoKind,
        chunk_idx: u32,
        first_seq: u16,
        count: usize,
        total_nt: Option<usize>,
    ) -> Result<Gathered, ChunkFailure> {
        let seg = self.config.segment_nt;
        let mut stream = String::with_capacity(total_nt.unwrap_or(count * seg));
        let mut erased_segments = 0;

        for i in 0..count {
            let seq_idx = first_seq + i as u16;
            let last = i + 1 == count;
            let expected = match total_nt {
                Some(nt) if last => Some(nt - i * seg),
                None if last => None,
                _ => Some(seg),
            };
            let voted = index
                .group(kind, chunk_idx, seq_idx)
                .and_then(|g| g.consensus(self.config.min_replicates).ok());

            match (voted, expected) {
                (Some(s), Some(len)) if s.len() == len => stream.push_str(&s),
                (Some(s), None) if !s.is_empty() && s.len() <= seg => stream.push_str(&s),
                (_, Some(len)) => {
                    trace!(chunk = chunk_idx, %kind, seq_idx, "segment erased");
                    stream.push_str(&"N".repeat(len));
                    erased_segments += 1;
                }
                (_, None) => return Err(ChunkFailure::MissingSegment { kind, seq_idx }),
            }
        }
        Ok(Gathered {
            stream,
            erased_segments,
        })
    }

    fn decode_chunk(
        &self,
        index: &ReadIndex,
        chunk_idx: u32,
        total_chunks: u32,
        manifest: Option<&FileManifest>,
    ) -> Result<RecoveredChunk, ChunkFailure> {
        let total_seqs = index
            .total_seqs(OligoKind::Data, chunk_idx)
            .ok_or(ChunkFailure::Missing)? as usize;

        let parity_nt = self.config.parity_stream_nt();
        let parity_segments = self.config.segments_for(parity_nt);
        if total_seqs <= parity_segments {
            return Err(ChunkFailure::Malformed(format!(
                "{total_seqs} segments cannot hold {parity_segments} parity segments and data"
            )));
        }
        let data_segments = total_seqs - parity_segments;

        // every chunk but the last is full; the manifest sizes the last one
        let payload_len = match manifest {
            Some(m) => Some(m.chunk_len(chunk_idx as usize)),
            None if chunk_idx + 1 < total_chunks => Some(self.config.chunk_size),
            None => None,
        };
        let data_nt = payload_len.map(|len| self.config.data_stream_nt(len));
        if let Some(nt) = data_nt {
            if self.config.segments_for(nt) != data_segments {
                return Err(ChunkFailure::Malformed(format!(
                    "{data_segments} data segments for a {nt}-nt stream"
                )));
            }
        }

        let data = self.gather(index, OligoKind::Data, chunk_idx, 0, data_segments, data_nt)?;
        let parity = self.gather(
            index,
            OligoKind::Parity,
            chunk_idx,
            data_segments as u16,
            parity_segments,
            Some(parity_nt),
        )?;

        let mut last_failure = ChunkFailure::Malformed("no key candidates".into());
        for data_key in key_candidates(&data.stream) {
            for parity_key in key_candidates(&parity.stream) {
                match self.correct(&data.stream, data_key, &parity.stream, parity_key) {
                    Ok((payload, corrected)) => {
                        if corrected > 0 {
                            debug!(chunk = chunk_idx, corrected, "chunk repaired");
                        }
                        return Ok(RecoveredChunk {
                            payload,
                            corrected,
                            erased_segments: data.erased_segments + parity.erased_segments,
                        });
                    }
                    Err(failure) => last_failure = failure,
                }
            }
        }
        Err(last_failure)
    }

    /// Demap both streams with the given keys, run Reed-Solomon with the
    /// demapper's erasures and check the CRC-32.
    fn correct(
        &self,
        data_stream: &str,
        data_key: u8,
        parity_stream: &str,
        parity_key: u8,
    ) -> Result<(Vec<u8>, usize), ChunkFailure> {
        let nsym = self.rs.nsym();
        let Demapped {
            bytes: mut codeword,
            mut erasures,
        } = mapper::decode_stream_with_key(data_stream.as_bytes(), data_key);

        let message_len = codeword.len();
        if message_len < CHUNK_CRC_BYTES {
            return Err(ChunkFailure::Malformed(format!(
                "data stream holds {message_len} bytes, less than its CRC-32"
            )));
        }

        if nsym > 0 {
            let parity = mapper::decode_stream_with_key(parity_stream.as_bytes(), parity_key);
            if parity.bytes.len() != nsym {
                return Err(ChunkFailure::Malformed(format!(
                    "parity stream holds {} bytes, expected {nsym}",
                    parity.bytes.len()
                )));
            }
            erasures.extend(parity.erasures.iter().map(|&e| e + message_len));
            codeword.extend_from_slice(&parity.bytes);
        }

        let correction = self.rs.decode(&codeword, &erasures).map_err(|e| match e {
            Error::UncorrectableErrorBurst { erasures, nsym } => {
                ChunkFailure::Uncorrectable { erasures, nsym }
            }
            other => ChunkFailure::Malformed(other.to_string()),
        })?;

        let payload = verify_crc32(&correction.message).map_err(|e| match e {
            Error::ChecksumMismatch { expected, actual } => {
                ChunkFailure::ChecksumMismatch { expected, actual }
            }
            other => ChunkFailure::Malformed(other.to_string()),
        })?;
        Ok((payload.to_vec(), correction.corrected))
    }
}
