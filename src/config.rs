//! Codec configuration.
//!
//! A [`CodecConfig`] is passed by value into every [`Encoder`](crate::Encoder)
//! and [`Decoder`](crate::Decoder); nothing is read from globals, so
//! concurrent codecs with different settings never interfere.

use serde::{Deserialize, Serialize};

use crate::checksum::CHUNK_CRC_BYTES;
use crate::fec::MAX_CODEWORD;
use crate::header::{MAX_CHUNKS, MAX_SEQS};
use crate::manifest::MANIFEST_BYTES;
use crate::mapper::{self, MAX_VARIANTS};
use crate::Error;

/// Physical synthesis constraints checked by the Goldman mapper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintProfile {
    /// Lowest admissible G+C fraction of a mapped stream.
    pub gc_min: f64,
    /// Highest admissible G+C fraction of a mapped stream.
    pub gc_max: f64,
    /// Longest admissible homopolymer run.
    pub max_run_length: usize,
    /// Mapper variants tried before giving up (1..=12).
    pub reseed_attempts: usize,
}

impl Default for ConstraintProfile {
    fn default() -> Self {
        Self {
            gc_min: 0.40,
            gc_max: 0.60,
            max_run_length: 3,
            reseed_attempts: 4,
        }
    }
}

impl ConstraintProfile {
    /// Check ranges.
    ///
    /// # Errors
    /// Returns `Error::ConfigurationInvalid` for an empty or out-of-range GC
    /// band, a zero run length, or an attempt count outside `1..=12`.
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.gc_min)
            || !(0.0..=1.0).contains(&self.gc_max)
            || self.gc_min > self.gc_max
        {
            return Err(Error::ConfigurationInvalid(format!(
                "GC band [{}, {}] must be a non-empty sub-range of [0, 1]",
                self.gc_min, self.gc_max
            )));
        }
        if self.max_run_length == 0 {
            return Err(Error::ConfigurationInvalid(
                "max_run_length must be at least 1".into(),
            ));
        }
        if self.reseed_attempts == 0 || self.reseed_attempts > MAX_VARIANTS {
            return Err(Error::ConfigurationInvalid(format!(
                "reseed_attempts must be in 1..={MAX_VARIANTS}, got {}",
                self.reseed_attempts
            )));
        }
        Ok(())
    }
}

/// Configuration for encode and decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Raw file bytes per chunk (before CRC-32 and parity).
    pub chunk_size: usize,

    /// Copies written of every data and parity oligo.
    pub redundancy: usize,

    /// Reed-Solomon parity symbols per chunk (`nsym`).
    pub error_correction_symbols: usize,

    /// Payload nucleotides carried by one oligo after its 80-nt header.
    pub segment_nt: usize,

    /// Length-agreeing replicates required before a segment is voted on.
    pub min_replicates: usize,

    /// Manifest oligos are written `redundancy * header_redundancy_factor` times.
    pub header_redundancy_factor: usize,

    /// GC / homopolymer constraints for the mapper.
    pub constraints: ConstraintProfile,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            redundancy: 3,
            error_correction_symbols: 10,
            segment_nt: 120,
            min_replicates: 1,
            header_redundancy_factor: 2,
            constraints: ConstraintProfile::default(),
        }
    }
}

impl CodecConfig {
    /// Fewer, longer codewords: larger chunks and lighter parity.
    pub fn compact() -> Self {
        Self {
            chunk_size: 200,
            redundancy: 2,
            error_correction_symbols: 20,
            ..Self::default()
        }
    }

    /// Read-back with heavy damage: more copies and 30 parity symbols.
    pub fn high_redundancy() -> Self {
        Self {
            chunk_size: 80,
            redundancy: 5,
            error_correction_symbols: 30,
            min_replicates: 1,
            header_redundancy_factor: 3,
            ..Self::default()
        }
    }

    /// Length of the mapped Data stream for a chunk of `payload_len` bytes.
    #[inline]
    pub fn data_stream_nt(&self, payload_len: usize) -> usize {
        mapper::stream_len(payload_len + CHUNK_CRC_BYTES)
    }

    /// Length of the mapped Parity stream (0 when FEC is disabled).
    #[inline]
    pub fn parity_stream_nt(&self) -> usize {
        if self.error_correction_symbols == 0 {
            0
        } else {
            mapper::stream_len(self.error_correction_symbols)
        }
    }

    /// Number of `segment_nt` segments needed for a stream of `nt` symbols.
    #[inline]
    pub fn segments_for(&self, nt: usize) -> usize {
        nt.div_ceil(self.segment_nt)
    }

    /// Total segments (Data + Parity) of a chunk with `payload_len` bytes.
    pub fn seqs_per_chunk(&self, payload_len: usize) -> usize {
        self.segments_for(self.data_stream_nt(payload_len)) + self.segments_for(self.parity_stream_nt())
    }

    /// Replicates written for each manifest oligo.
    #[inline]
    pub fn header_copies(&self) -> usize {
        self.redundancy * self.header_redundancy_factor
    }

    /// Check all configuration invariants.
    ///
    /// # Errors
    /// Returns `Error::ConfigurationInvalid` when the Reed-Solomon budget
    /// `chunk_size + 4 + nsym ≤ 255` is violated or any count is zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_size == 0 {
            return Err(Error::ConfigurationInvalid("chunk_size must be at least 1".into()));
        }
        if self.chunk_size + CHUNK_CRC_BYTES + self.error_correction_symbols > MAX_CODEWORD {
            return Err(Error::ConfigurationInvalid(format!(
                "chunk_size({}) + {CHUNK_CRC_BYTES} (CRC-32) + nsym({}) must be <= {MAX_CODEWORD}",
                self.chunk_size, self.error_correction_symbols
            )));
        }
        if self.redundancy == 0 {
            return Err(Error::ConfigurationInvalid("redundancy must be at least 1".into()));
        }
        if self.segment_nt == 0 {
            return Err(Error::ConfigurationInvalid("segment_nt must be at least 1".into()));
        }
        if self.min_replicates == 0 || self.min_replicates > self.redundancy {
            return Err(Error::ConfigurationInvalid(format!(
                "min_replicates must be in 1..={}, got {}",
                self.redundancy, self.min_replicates
            )));
        }
        if self.header_redundancy_factor == 0 {
            return Err(Error::ConfigurationInvalid(
                "header_redundancy_factor must be at least 1".into(),
            ));
        }
        self.constraints.validate()?;

        let seqs = self.seqs_per_chunk(self.chunk_size);
        if seqs > MAX_SEQS as usize {
            return Err(Error::CapacityExceeded {
                what: "segments per chunk",
                value: seqs as u64,
                limit: MAX_SEQS as u64,
            });
        }
        let manifest_seqs = self.segments_for(mapper::stream_len(MANIFEST_BYTES));
        if manifest_seqs > MAX_SEQS as usize {
            return Err(Error::CapacityExceeded {
                what: "manifest segments",
                value: manifest_seqs as u64,
                limit: MAX_SEQS as u64,
            });
        }
        Ok(())
    }

    /// Check that an input of `len` bytes fits the header address space.
    ///
    /// # Errors
    /// Returns `Error::CapacityExceeded` if the chunk count does not fit in
    /// 24 bits.
    pub fn validate_capacity(&self, len: usize) -> Result<(), Error> {
        let chunks = crate::chunk::chunk_count(len, self.chunk_size);
        if chunks > MAX_CHUNKS as usize {
            return Err(Error::CapacityExceeded {
                what: "total_chunks",
                value: chunks as u64,
                limit: MAX_CHUNKS as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CodecConfig::default();
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.redundancy, 3);
        assert_eq!(config.error_correction_symbols, 10);
        assert_eq!(config.segment_nt, 120);
        assert_eq!(config.constraints.reseed_attempts, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_presets() {
        assert!(CodecConfig::compact().validate().is_ok());
        assert!(CodecConfig::high_redundancy().validate().is_ok());
        assert!(
            CodecConfig::high_redundancy().error_correction_symbols
                > CodecConfig::default().error_correction_symbols
        );
        assert!(CodecConfig::compact().chunk_size > CodecConfig::default().chunk_size);
    }

    #[test]
    fn test_reed_solomon_budget() {
        let config = CodecConfig {
            chunk_size: 241,
            error_correction_symbols: 10,
            ..CodecConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = CodecConfig {
            chunk_size: 242,
            ..config
        };
        assert!(matches!(config.validate(), Err(Error::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_invalid_ranges() {
        let base = CodecConfig::default();
        let cases = [
            CodecConfig { chunk_size: 0, ..base.clone() },
            CodecConfig { redundancy: 0, ..base.clone() },
            CodecConfig { segment_nt: 0, ..base.clone() },
            CodecConfig { min_replicates: 4, ..base.clone() },
            CodecConfig { header_redundancy_factor: 0, ..base.clone() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?} accepted");
        }

        let bad_profiles = [
            ConstraintProfile { gc_min: 0.7, gc_max: 0.6, ..ConstraintProfile::default() },
            ConstraintProfile { gc_max: 1.5, ..ConstraintProfile::default() },
            ConstraintProfile { max_run_length: 0, ..ConstraintProfile::default() },
            ConstraintProfile { reseed_attempts: 0, ..ConstraintProfile::default() },
            ConstraintProfile { reseed_attempts: 13, ..ConstraintProfile::default() },
        ];
        for profile in bad_profiles {
            assert!(profile.validate().is_err(), "{profile:?} accepted");
        }
    }

    #[test]
    fn test_segment_capacity() {
        // 204 bytes -> 1230 nt of data stream -> 1230 one-nt segments
        let config = CodecConfig {
            chunk_size: 200,
            segment_nt: 1,
            ..CodecConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::CapacityExceeded { what: "segments per chunk", .. })
        ));
    }

    #[test]
    fn test_chunk_capacity() {
        let config = CodecConfig {
            chunk_size: 1,
            ..CodecConfig::default()
        };
        assert!(config.validate_capacity(MAX_CHUNKS as usize).is_ok());
        assert!(matches!(
            config.validate_capacity(MAX_CHUNKS as usize + 1),
            Err(Error::CapacityExceeded { what: "total_chunks", .. })
        ));
    }

    #[test]
    fn test_stream_accounting() {
        let config = CodecConfig::default();
        // (100 + 4) bytes * 6 nt + 6 nt preamble
        assert_eq!(config.data_stream_nt(100), 630);
        assert_eq!(config.parity_stream_nt(), 66);
        assert_eq!(config.seqs_per_chunk(100), 6 + 1);

        let no_fec = CodecConfig {
            error_correction_symbols: 0,
            ..config
        };
        assert_eq!(no_fec.parity_stream_nt(), 0);
        assert_eq!(no_fec.seqs_per_chunk(100), 6);
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let config: CodecConfig = serde_json::from_str(r#"{"chunk_size": 50}"#).unwrap();
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.redundancy, 3);
        assert_eq!(config.constraints, ConstraintProfile::default());
    }
}
