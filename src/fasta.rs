//! FASTA import and export.
//!
//! Written files label records `>oligo_0`, `>oligo_1`, ... in emission
//! order. Reading accepts FASTA (multi-line records allowed) or plain text
//! with one sequence per line; labels are discarded since the decoder only
//! trusts the embedded header.

use std::io::{self, BufRead, Write};

/// Write `sequences` as FASTA, one line per sequence.
pub fn write_fasta<W, I, S>(mut writer: W, sequences: I) -> io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut count = 0;
    for (idx, seq) in sequences.into_iter().enumerate() {
        writeln!(writer, ">oligo_{idx}")?;
        writeln!(writer, "{}", seq.as_ref())?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Read sequences from FASTA or one-per-line text.
///
/// Bases are upper-cased; any symbol other than `ACGT` becomes `N`. Blank
/// lines and `;` comments are skipped.
pub fn read_sequences<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    let mut current: Option<String> = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if line.starts_with('>') {
            if let Some(seq) = current.take().filter(|s| !s.is_empty()) {
                out.push(seq);
            }
            current = Some(String::new());
            continue;
        }
        match current.as_mut() {
            Some(seq) => seq.push_str(&normalize(line)),
            None => out.push(normalize(line)),
        }
    }
    if let Some(seq) = current.filter(|s| !s.is_empty()) {
        out.push(seq);
    }
    Ok(out)
}

/// Parse sequences from an in-memory string.
pub fn parse_sequences(text: &str) -> Vec<String> {
    // reading from a byte slice cannot fail except on invalid UTF-8, which
    // `&str` rules out
    read_sequences(text.as_bytes()).unwrap_or_default()
}

fn normalize(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c.to_ascii_uppercase() {
            b @ ('A' | 'C' | 'G' | 'T') => b,
            _ => 'N',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_labels() {
        let mut buf = Vec::new();
        let n = write_fasta(&mut buf, ["ACGT", "GGCC"]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            ">oligo_0\nACGT\n>oligo_1\nGGCC\n"
        );
    }

    #[test]
    fn test_read_back_written_file() {
        let seqs = vec!["ACGTAC".to_string(), "TTGACA".to_string()];
        let mut buf = Vec::new();
        write_fasta(&mut buf, &seqs).unwrap();
        assert_eq!(read_sequences(buf.as_slice()).unwrap(), seqs);
    }

    #[test]
    fn test_multiline_records_and_case() {
        let text = ">a\nacgt\nAC\n\n>b\nggcc\n;comment\n>empty\n";
        assert_eq!(parse_sequences(text), vec!["ACGTAC", "GGCC"]);
    }

    #[test]
    fn test_plain_lines() {
        let text = "ACGT\n  tgca \nAXGT\n";
        assert_eq!(parse_sequences(text), vec!["ACGT", "TGCA", "ANGT"]);
    }
}
