//! Sweep read-back damage and report where decoding starts to fail.

use oligocodec::noise::NoiseModel;
use oligocodec::{decode, encode, CodecConfig, Error};

fn run_trial(config: &CodecConfig, data: &[u8], substitution: f64, dropout: f64, seed: u64) {
    let encoding = encode(data, config).unwrap();
    let damaged = NoiseModel::new(seed)
        .with_substitution_rate(substitution)
        .with_dropout_rate(dropout)
        .corrupt(&encoding.sequences());

    let outcome = match decode(&damaged.reads, config) {
        Ok(decoded) if decoded.data == data => format!(
            "✓ recovered ({} symbols corrected, {} segments erased)",
            decoded.stats.corrected_symbols, decoded.stats.erased_segments
        ),
        Ok(_) => "✗ wrong bytes".to_string(),
        Err(Error::Incomplete(failure)) => format!(
            "✗ {} of {} chunks lost",
            failure.failures.len(),
            failure.total_chunks
        ),
        Err(e) => format!("✗ {e}"),
    };

    println!(
        "  sub {:>6.3}  drop {:>4.2}  | {:>5} reads kept, {:>4} dropped, {:>5} substitutions | {}",
        substitution,
        dropout,
        damaged.reads.len(),
        damaged.dropped,
        damaged.substitutions,
        outcome
    );
}

fn main() {
    let message = "The quick brown fox jumps over the lazy dog. ";
    let data: Vec<u8> = message.as_bytes().iter().copied().cycle().take(4000).collect();

    for (name, config) in [
        ("default", CodecConfig::default()),
        ("compact", CodecConfig::compact()),
        ("high-redundancy", CodecConfig::high_redundancy()),
    ] {
        println!(
            "\n--- {} (chunk {}, ×{}, nsym {}) ---",
            name, config.chunk_size, config.redundancy, config.error_correction_symbols
        );

        for &(substitution, dropout) in &[
            (0.0, 0.0),
            (0.001, 0.05),
            (0.005, 0.10),
            (0.01, 0.20),
            (0.02, 0.30),
        ] {
            run_trial(&config, &data, substitution, dropout, 42);
        }
    }
}
