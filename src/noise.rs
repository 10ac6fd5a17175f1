//! Read-back channel simulation.
//!
//! Models what synthesis and sequencing do to a pool of oligos: some never
//! come back, some come back with substituted bases, and the order is lost.
//! All randomness comes from a seeded [`StdRng`], so a given model and input
//! always produce the same reads.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::mapper::Nucleotide;

/// Damage applied to a pool of reads.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseModel {
    /// Probability that a single base is replaced by a different one.
    pub substitution_rate: f64,
    /// Probability that a read is lost entirely.
    pub dropout_rate: f64,
    /// Drop every Nth read in addition to random dropout (0 = never).
    pub drop_every_n: usize,
    /// Shuffle the surviving reads.
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self {
            substitution_rate: 0.0,
            dropout_rate: 0.0,
            drop_every_n: 0,
            shuffle: true,
            seed: 0,
        }
    }
}

/// Reads after the channel, with what was done to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corrupted {
    pub reads: Vec<String>,
    pub dropped: usize,
    pub substitutions: usize,
}

impl NoiseModel {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Set the per-base substitution probability (clamped to 0..=1).
    pub fn with_substitution_rate(mut self, rate: f64) -> Self {
        self.substitution_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the per-read dropout probability (clamped to 0..=1).
    pub fn with_dropout_rate(mut self, rate: f64) -> Self {
        self.dropout_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Deterministically drop every Nth read.
    pub fn with_drop_every(mut self, n: usize) -> Self {
        self.drop_every_n = n;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Pass `reads` through the channel.
    pub fn corrupt<S: AsRef<str>>(&self, reads: &[S]) -> Corrupted {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let substitution_rate = self.substitution_rate.clamp(0.0, 1.0);
        let mut out = Corrupted::default();

        for (i, read) in reads.iter().enumerate() {
            let pattern_drop = self.drop_every_n > 0 && (i + 1) % self.drop_every_n == 0;
            if pattern_drop || rng.gen_bool(self.dropout_rate.clamp(0.0, 1.0)) {
                out.dropped += 1;
                continue;
            }

            let mut bytes = read.as_ref().as_bytes().to_vec();
            if substitution_rate > 0.0 {
                for b in bytes.iter_mut() {
                    let Some(base) = Nucleotide::from_ascii(*b) else {
                        continue;
                    };
                    if rng.gen_bool(substitution_rate) {
                        let shift = rng.gen_range(1..4);
                        *b = Nucleotide::from_rank(base.rank() + shift).as_ascii();
                        out.substitutions += 1;
                    }
                }
            }
            out.reads.push(String::from_utf8_lossy(&bytes).into_owned());
        }

        if self.shuffle {
            out.reads.shuffle(&mut rng);
        }
        debug!(
            kept = out.reads.len(),
            dropped = out.dropped,
            substitutions = out.substitutions,
            "channel applied"
        );
        out
    }
}

/// Replace the base at each of `positions` with the next base in rank order
/// (A→C→G→T→A). Positions past the end or on non-ACGT symbols are skipped.
pub fn substitute(seq: &str, positions: &[usize]) -> String {
    let mut bytes = seq.as_bytes().to_vec();
    for &pos in positions {
        if let Some(base) = bytes.get(pos).and_then(|&b| Nucleotide::from_ascii(b)) {
            bytes[pos] = Nucleotide::from_rank(base.rank() + 1).as_ascii();
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<String> {
        (0..200).map(|i| ["ACGT", "GATC", "TTAG"][i % 3].repeat(i % 5 + 1)).collect()
    }

    #[test]
    fn test_clean_channel_keeps_everything() {
        let reads = pool();
        let out = NoiseModel::new(1).with_shuffle(false).corrupt(&reads);
        assert_eq!(out.reads, reads);
        assert_eq!(out.dropped, 0);
        assert_eq!(out.substitutions, 0);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let reads = pool();
        let model = NoiseModel::new(42)
            .with_substitution_rate(0.05)
            .with_dropout_rate(0.1);
        assert_eq!(model.corrupt(&reads), model.corrupt(&reads));
    }

    #[test]
    fn test_drop_pattern() {
        let reads = pool();
        let out = NoiseModel::new(0)
            .with_drop_every(4)
            .with_shuffle(false)
            .corrupt(&reads);
        assert_eq!(out.dropped, 50);
        assert_eq!(out.reads.len(), 150);
    }

    #[test]
    fn test_full_dropout() {
        let out = NoiseModel::new(3).with_dropout_rate(2.0).corrupt(&pool());
        assert!(out.reads.is_empty());
        assert_eq!(out.dropped, 200);
    }

    #[test]
    fn test_substitutions_change_bases() {
        let reads = vec!["ACGT".repeat(50)];
        let out = NoiseModel::new(9)
            .with_substitution_rate(1.0)
            .corrupt(&reads);
        assert_eq!(out.substitutions, 200);
        let changed = &out.reads[0];
        assert!(changed.bytes().zip(reads[0].bytes()).all(|(a, b)| a != b));
    }

    #[test]
    fn test_substitute_positions() {
        assert_eq!(substitute("ACGT", &[0, 3]), "CCGA");
        assert_eq!(substitute("ACNT", &[2, 10]), "ACNT");
    }
}
