//! Replication and consensus.
//!
//! Every oligo is written several times. On read-back, copies that share a
//! header are grouped and collapsed into a single sequence by a
//! per-position plurality vote.

use std::collections::BTreeMap;
use std::fmt;

use crate::header::{OligoHeader, OligoKind};
use crate::mapper::Nucleotide;
use crate::Error;

/// One physical oligo: header, mapped payload segment and copy number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OligoRecord {
    pub header: OligoHeader,
    /// Mapped nucleotides after the 80-nt header.
    pub payload: String,
    /// Which copy this is, `0..redundancy`.
    pub replicate_id: u32,
}

impl OligoRecord {
    pub fn new(header: OligoHeader, payload: String) -> Self {
        Self {
            header,
            payload,
            replicate_id: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> OligoKind {
        self.header.kind
    }

    /// Full sequence as synthesized: header prefix followed by payload.
    pub fn sequence(&self) -> String {
        let mut seq = self.header.to_nucleotides();
        seq.push_str(&self.payload);
        seq
    }
}

impl fmt::Display for OligoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.header.to_nucleotides(), self.payload)
    }
}

/// `copies` identical records with `replicate_id` 0, 1, ...
pub fn replicate(record: &OligoRecord, copies: usize) -> Vec<OligoRecord> {
    (0..copies as u32)
        .map(|replicate_id| OligoRecord {
            replicate_id,
            ..record.clone()
        })
        .collect()
}

/// Reads sharing the same `(kind, chunk_idx, seq_idx)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicateGroup {
    pub kind: OligoKind,
    pub chunk_idx: u32,
    pub seq_idx: u16,
    /// Payloads (header stripped) of every copy seen.
    pub members: Vec<String>,
}

impl ReplicateGroup {
    pub fn new(kind: OligoKind, chunk_idx: u32, seq_idx: u16) -> Self {
        Self {
            kind,
            chunk_idx,
            seq_idx,
            members: Vec::new(),
        }
    }

    pub fn push(&mut self, payload: impl Into<String>) {
        self.members.push(payload.into());
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Collapse the members into one payload.
    pub fn consensus(&self, min_replicates: usize) -> Result<String, Error> {
        consensus(&self.members, min_replicates)
    }
}

/// Per-position plurality vote over `reads`.
///
/// Only reads of the modal length take part (ties go to the longer length).
/// At each position ties resolve to the lowest-ranked base (A < C < G < T);
/// symbols outside ACGT do not vote, and a column without any vote yields
/// `N`.
///
/// # Errors
/// Returns `Error::InsufficientReplicates` if fewer than `min_replicates`
/// reads have the modal length (or `reads` is empty).
pub fn consensus<S: AsRef<str>>(reads: &[S], min_replicates: usize) -> Result<String, Error> {
    let required = min_replicates.max(1);

    let mut lengths: BTreeMap<usize, usize> = BTreeMap::new();
    for read in reads {
        *lengths.entry(read.as_ref().len()).or_default() += 1;
    }
    // ascending order, so `>=` keeps the longer length on ties
    let mut modal = None;
    let mut best = 0;
    for (&len, &count) in &lengths {
        if count >= best {
            best = count;
            modal = Some(len);
        }
    }

    let Some(len) = modal else {
        return Err(Error::InsufficientReplicates { usable: 0, required });
    };
    let usable: Vec<&[u8]> = reads
        .iter()
        .map(|r| r.as_ref().as_bytes())
        .filter(|r| r.len() == len)
        .collect();
    if usable.len() < required {
        return Err(Error::InsufficientReplicates {
            usable: usable.len(),
            required,
        });
    }
    if usable.len() == 1 {
        return Ok(String::from_utf8_lossy(usable[0]).into_owned());
    }

    let mut out = String::with_capacity(len);
    for pos in 0..len {
        let mut votes = [0usize; 4];
        for read in &usable {
            if let Some(n) = Nucleotide::from_ascii(read[pos]) {
                votes[n.rank()] += 1;
            }
        }
        let (rank, &count) = votes
            .iter()
            .enumerate()
            .fold((0, &0), |best, cur| if cur.1 > best.1 { cur } else { best });
        out.push(if count == 0 {
            'N'
        } else {
            Nucleotide::from_rank(rank).as_char()
        });
    }
    Ok(out)
}
