//! # Goldman Symbol Mapper
//!
//! Maps bytes to nucleotides through base 3 so that no symbol is ever
//! followed by itself:
//!
//! ```text
//! byte ──► 6 trits (LSB first) ──► nucleotide chosen by (previous, trit)
//!
//!            trit 0  trit 1  trit 2
//!   after A:   C       G       T
//!   after C:   G       T       A
//!   after G:   T       A       C
//!   after T:   A       C       G
//! ```
//!
//! ## Stream layout
//!
//! ```text
//! ┌────────┬──────────────────────┬──────────────────────────────────┐
//! │ anchor │ preamble: k k k k k  │ payload trits, each + k (mod 3)  │
//! │ (1 nt) │ (5 nt)               │ (6 nt per byte)                  │
//! └────────┴──────────────────────┴──────────────────────────────────┘
//! ```
//!
//! The anchor is the starting rotation state and `k` is a trit shift. Reseed
//! attempt `a` uses anchor `a mod 4` and key `a mod 3`, which walks all 12
//! variants in 12 attempts. The decoder reads both back from the stream, so
//! it never needs to know which attempt was emitted. Because each trit only
//! depends on two neighbouring symbols, a substituted nucleotide damages at
//! most two trits.

use tracing::{debug, trace};

use crate::config::ConstraintProfile;
use crate::Error;

/// Trits per byte (3^6 = 729 ≥ 256).
pub const TRITS_PER_BYTE: usize = 6;

/// Repetitions of the key trit after the anchor.
pub const PREAMBLE_TRITS: usize = 5;

/// Anchor plus preamble.
pub const PREAMBLE_NT: usize = 1 + PREAMBLE_TRITS;

/// Distinct (anchor, key) combinations.
pub const MAX_VARIANTS: usize = 12;

/// A DNA base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Nucleotide {
    A = 0,
    C = 1,
    G = 2,
    T = 3,
}

impl Nucleotide {
    /// All bases in rank order.
    pub const ALL: [Nucleotide; 4] = [Nucleotide::A, Nucleotide::C, Nucleotide::G, Nucleotide::T];

    /// Parse an upper-case ASCII base.
    #[inline]
    pub fn from_ascii(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Self::A),
            b'C' => Some(Self::C),
            b'G' => Some(Self::G),
            b'T' => Some(Self::T),
            _ => None,
        }
    }

    #[inline]
    pub fn from_rank(rank: usize) -> Self {
        Self::ALL[rank % 4]
    }

    #[inline]
    pub fn rank(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn as_ascii(self) -> u8 {
        b"ACGT"[self as usize]
    }

    #[inline]
    pub fn as_char(self) -> char {
        self.as_ascii() as char
    }

    #[inline]
    pub fn is_gc(self) -> bool {
        matches!(self, Self::C | Self::G)
    }
}

use Nucleotide::{A, C, G, T};

/// ROTATION[previous][trit] = next symbol.
pub const ROTATION: [[Nucleotide; 3]; 4] = [
    [C, G, T], // after A
    [G, T, A], // after C
    [T, A, C], // after G
    [A, C, G], // after T
];

/// INVERSE[previous][next] = trit, `None` for a repeat.
const INVERSE: [[Option<u8>; 4]; 4] = {
    let mut table = [[None; 4]; 4];
    let mut prev = 0;
    while prev < 4 {
        let mut trit = 0;
        while trit < 3 {
            table[prev][ROTATION[prev][trit] as usize] = Some(trit as u8);
            trit += 1;
        }
        prev += 1;
    }
    table
};

/// Next symbol after `prev` for `trit` (0..=2).
#[inline]
pub fn next_symbol(prev: Nucleotide, trit: u8) -> Nucleotide {
    ROTATION[prev.rank()][trit as usize % 3]
}

/// Trit carried by the transition `prev -> next`, `None` if `prev == next`.
#[inline]
pub fn trit_between(prev: Nucleotide, next: Nucleotide) -> Option<u8> {
    INVERSE[prev.rank()][next.rank()]
}

/// Expand a byte into 6 trits, least significant first.
pub fn byte_to_trits(byte: u8) -> [u8; TRITS_PER_BYTE] {
    let mut trits = [0u8; TRITS_PER_BYTE];
    let mut v = byte;
    for t in trits.iter_mut() {
        *t = v % 3;
        v /= 3;
    }
    trits
}

/// Fold 6 trits back into a byte; `None` if the value exceeds 255.
pub fn trits_to_byte(trits: &[u8; TRITS_PER_BYTE]) -> Option<u8> {
    let value = trits
        .iter()
        .rev()
        .fold(0u16, |acc, &t| acc * 3 + t as u16);
    u8::try_from(value).ok()
}

/// Nucleotides of the mapped stream for `bytes` payload bytes.
#[inline]
pub fn stream_len(bytes: usize) -> usize {
    PREAMBLE_NT + bytes * TRITS_PER_BYTE
}

/// Whole payload bytes carried by a stream of `nt` nucleotides.
#[inline]
pub fn bytes_in_stream(nt: usize) -> usize {
    nt.saturating_sub(PREAMBLE_NT) / TRITS_PER_BYTE
}

// =============================================================================
// Constraints
// =============================================================================

/// Fraction of G and C symbols.
pub fn gc_content(seq: &[u8]) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let gc = seq.iter().filter(|&&b| b == b'G' || b == b'C').count();
    gc as f64 / seq.len() as f64
}

/// Longest run of one repeated symbol.
pub fn max_run_length(seq: &[u8]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut prev = None;
    for &b in seq {
        if Some(b) == prev {
            current += 1;
        } else {
            current = 1;
            prev = Some(b);
        }
        longest = longest.max(current);
    }
    longest
}

/// Whether `seq` is inside the GC band and under the run limit.
pub fn passes_constraints(seq: &[u8], profile: &ConstraintProfile) -> bool {
    if seq.is_empty() {
        return false;
    }
    let gc = gc_content(seq);
    max_run_length(seq) <= profile.max_run_length && gc >= profile.gc_min && gc <= profile.gc_max
}

// =============================================================================
// Encoding
// =============================================================================

/// Map `payload` with the variant selected by `attempt_index`, without any
/// constraint check.
pub fn map_bytes(payload: &[u8], attempt_index: usize) -> String {
    let anchor = Nucleotide::from_rank(attempt_index % 4);
    let key = (attempt_index % 3) as u8;

    let mut out = String::with_capacity(stream_len(payload.len()));
    out.push(anchor.as_char());

    let mut prev = anchor;
    let mut emit = |trit: u8| {
        prev = next_symbol(prev, trit);
        out.push(prev.as_char());
    };

    for _ in 0..PREAMBLE_TRITS {
        emit(key);
    }
    for &byte in payload {
        for trit in byte_to_trits(byte) {
            emit((trit + key) % 3);
        }
    }
    out
}

/// One reseed attempt: the mapped stream if it satisfies `profile`.
///
/// Pure in `(payload, attempt_index, profile)`.
pub fn attempt(payload: &[u8], attempt_index: usize, profile: &ConstraintProfile) -> Option<String> {
    let seq = map_bytes(payload, attempt_index);
    if passes_constraints(seq.as_bytes(), profile) {
        Some(seq)
    } else {
        None
    }
}

/// A constraint-satisfying mapped stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedStream {
    pub sequence: String,
    /// Reseed attempt that produced it.
    pub attempt: usize,
    pub gc: f64,
}

/// Try up to `profile.reseed_attempts` variants and return the first one
/// that satisfies the constraints.
///
/// # Errors
/// Returns `Error::ConstraintExhausted` if every attempt fails.
pub fn encode_stream(payload: &[u8], profile: &ConstraintProfile) -> Result<MappedStream, Error> {
    let mut best_gc = f64::NAN;
    let target = (profile.gc_min + profile.gc_max) / 2.0;

    for attempt_index in 0..profile.reseed_attempts {
        let sequence = map_bytes(payload, attempt_index);
        let gc = gc_content(sequence.as_bytes());
        if passes_constraints(sequence.as_bytes(), profile) {
            if attempt_index > 0 {
                debug!(attempt = attempt_index, gc, "reseeded stream passed constraints");
            }
            return Ok(MappedStream {
                sequence,
                attempt: attempt_index,
                gc,
            });
        }
        trace!(attempt = attempt_index, gc, "mapped stream rejected");
        if best_gc.is_nan() || (gc - target).abs() < (best_gc - target).abs() {
            best_gc = gc;
        }
    }

    Err(Error::ConstraintExhausted {
        attempts: profile.reseed_attempts,
        best_gc,
    })
}

// =============================================================================
// Decoding
// =============================================================================

/// Bytes recovered from a stream, plus the indices of bytes that cannot be
/// trusted (invalid transitions, unknown symbols, or values above 255).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Demapped {
    pub bytes: Vec<u8>,
    pub erasures: Vec<usize>,
}

/// Read the trit key from the preamble by majority vote; ties go to the
/// lowest key. `None` when no preamble transition is readable.
pub fn preamble_key(seq: &[u8]) -> Option<u8> {
    if seq.len() < PREAMBLE_NT {
        return None;
    }
    let mut votes = [0usize; 3];
    for i in 1..PREAMBLE_NT {
        if let Some(t) = transition(seq, i) {
            votes[t as usize] += 1;
        }
    }
    let mut key = 0u8;
    for k in 1..3u8 {
        if votes[k as usize] > votes[key as usize] {
            key = k;
        }
    }
    if votes[key as usize] == 0 {
        None
    } else {
        Some(key)
    }
}

#[inline]
fn transition(seq: &[u8], i: usize) -> Option<u8> {
    let prev = Nucleotide::from_ascii(seq[i - 1])?;
    let next = Nucleotide::from_ascii(seq[i])?;
    trit_between(prev, next)
}

/// Invert [`map_bytes`] for any attempt index, reading the key from the
/// preamble (key 0 if the preamble is unreadable).
///
/// Unknown symbols (e.g. `N`) and repeated symbols never abort decoding; the
/// affected bytes are reported as erasures so Reed-Solomon can spend half
/// the budget on them. A trailing partial byte group is ignored.
pub fn decode_stream(seq: &[u8]) -> Demapped {
    decode_stream_with_key(seq, preamble_key(seq).unwrap_or(0))
}

/// Invert [`map_bytes`] with an explicit trit key, ignoring the preamble.
///
/// A substituted nucleotide changes the two transitions it takes part in,
/// so a hit on the last nucleotide of a byte group damages two bytes. Two
/// signs of such a hit widen the erasure:
///
/// - a repeated symbol marks both transitions around the repeated pair;
/// - a group that folds above 255 also erases the byte after it.
///
/// Each substitution then costs at most two erasures, or two silent byte
/// errors when it leaves both bytes valid.
pub fn decode_stream_with_key(seq: &[u8], key: u8) -> Demapped {
    if seq.len() < PREAMBLE_NT {
        return Demapped::default();
    }
    let key = key % 3;
    let count = bytes_in_stream(seq.len());
    let end = stream_len(count);

    let mut suspect = vec![false; end];
    for n in PREAMBLE_NT..end {
        match (Nucleotide::from_ascii(seq[n - 1]), Nucleotide::from_ascii(seq[n])) {
            (Some(prev), Some(next)) if prev == next => {
                for m in n - 1..=n + 1 {
                    if (PREAMBLE_NT..end).contains(&m) {
                        suspect[m] = true;
                    }
                }
            }
            (Some(_), Some(_)) => {}
            _ => suspect[n] = true,
        }
    }

    let mut out = Demapped {
        bytes: Vec::with_capacity(count),
        erasures: Vec::new(),
    };
    let mut carried = false;
    for b in 0..count {
        let start = PREAMBLE_NT + b * TRITS_PER_BYTE;
        let valid = !suspect[start..start + TRITS_PER_BYTE].contains(&true);
        let mut trits = [0u8; TRITS_PER_BYTE];
        for (j, slot) in trits.iter_mut().enumerate() {
            if let Some(t) = transition(seq, start + j) {
                *slot = (t + 3 - key) % 3;
            }
        }

        let byte = if valid { trits_to_byte(&trits) } else { None };
        let erase = carried;
        carried = valid && byte.is_none();
        match byte {
            Some(byte) if !erase => out.bytes.push(byte),
            _ => {
                out.bytes.push(0);
                out.erasures.push(b);
            }
        }
    }
    out
}
