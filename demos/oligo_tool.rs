//! Encode files to FASTA oligo pools and decode them back.
//!
//! ```text
//! cargo run --example oligo_tool -- encode -i photo.jpg -o pool.fasta
//! cargo run --example oligo_tool -- decode -i pool.fasta -o photo.jpg
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use oligocodec::fasta::{read_sequences, write_fasta};
use oligocodec::{CodecConfig, Decoder, Encoder, OligoKind};
use tracing::{info, Level};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "oligo-tool")]
#[command(about = "Store files as DNA oligos and read them back")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a file into a FASTA pool
    Encode {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        codec: CodecArgs,
    },
    /// Decode a FASTA (or one-per-line) pool back into a file
    Decode {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Settings must match the encoder
        #[command(flatten)]
        codec: CodecArgs,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Preset {
    Default,
    Compact,
    HighRedundancy,
}

#[derive(ClapArgs, Debug)]
struct CodecArgs {
    /// JSON file with a full or partial codec configuration
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "default")]
    preset: Preset,

    /// Bytes per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Copies of every oligo
    #[arg(long)]
    redundancy: Option<usize>,

    /// Reed-Solomon parity symbols per chunk
    #[arg(long)]
    nsym: Option<usize>,

    /// Payload nucleotides per oligo
    #[arg(long)]
    segment_nt: Option<usize>,
}

impl CodecArgs {
    /// Preset or JSON file, then individual flags on top.
    fn resolve(&self) -> Result<CodecConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => match self.preset {
                Preset::Default => CodecConfig::default(),
                Preset::Compact => CodecConfig::compact(),
                Preset::HighRedundancy => CodecConfig::high_redundancy(),
            },
        };
        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
        if let Some(v) = self.redundancy {
            config.redundancy = v;
        }
        if let Some(v) = self.nsym {
            config.error_correction_symbols = v;
        }
        if let Some(v) = self.segment_nt {
            config.segment_nt = v;
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<CodecConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

// ============================================================================
// Commands
// ============================================================================

fn run_encode(input: &Path, output: &Path, config: CodecConfig) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let encoder = Encoder::new(config).context("Invalid codec configuration")?;
    let encoding = encoder.encode(&data).context("Encoding failed")?;

    let file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let written = write_fasta(BufWriter::new(file), encoding.sequences())?;

    info!(
        bytes = data.len(),
        chunks = encoding.total_chunks,
        manifest = encoding.count(OligoKind::Header),
        data = encoding.count(OligoKind::Data),
        parity = encoding.count(OligoKind::Parity),
        "wrote {} oligos to {}",
        written,
        output.display()
    );
    Ok(())
}

fn run_decode(input: &Path, output: &Path, config: CodecConfig) -> Result<()> {
    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let reads = read_sequences(BufReader::new(file))?;
    info!(reads = reads.len(), "loaded pool");

    let decoder = Decoder::new(config).context("Invalid codec configuration")?;
    let decoded = decoder.decode(&reads).context("Decoding failed")?;

    fs::write(output, &decoded.data).with_context(|| format!("Failed to write {}", output.display()))?;

    let stats = &decoded.stats;
    info!(
        bytes = decoded.data.len(),
        dropped = stats.dropped_reads,
        corrected = stats.corrected_symbols,
        erased_segments = stats.erased_segments,
        verified = stats.manifest_verified,
        "wrote {}",
        output.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Encode {
            input,
            output,
            codec,
        } => run_encode(&input, &output, codec.resolve()?)?,
        Command::Decode {
            input,
            output,
            codec,
        } => run_decode(&input, &output, codec.resolve()?)?,
    }

    Ok(())
}
