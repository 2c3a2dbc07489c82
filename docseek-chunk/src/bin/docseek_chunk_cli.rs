use clap::Parser;
use docseek_chunk::{Chunker, ChunkerConfig, DEFAULT_SEPARATORS};
use std::fs;
use std::io::{self, Read};

/// A CLI tool to chunk text files into JSON output using docseek-chunk.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Target chunk size in bytes.
    #[arg(short, long, default_value_t = 750)]
    target_size: usize,

    /// Overlap between consecutive chunks in bytes.
    #[arg(short, long, default_value_t = 150)]
    overlap: usize,

    /// Minimum retained chunk length in characters.
    #[arg(short, long, default_value_t = 50)]
    min_chunk_len: usize,

    /// Comma-separated list of regex patterns for separators.
    /// Defaults to the built-in separator hierarchy if not provided.
    #[arg(short, long, value_delimiter = ',')]
    separators: Option<Vec<String>>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let config = ChunkerConfig::default()
        .with_target_size(args.target_size)
        .with_overlap(args.overlap)
        .with_min_chunk_len(args.min_chunk_len);

    let chunker = if let Some(patterns) = args.separators {
        let pattern_refs: Vec<&str> = patterns.iter().map(|s| s.as_str()).collect();
        Chunker::new(config, &pattern_refs)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?
    } else {
        Chunker::new(config, DEFAULT_SEPARATORS)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?
    };

    let chunks = chunker.split(&file_content);

    let json_output = serde_json::to_string_pretty(&chunks)?;
    println!("{json_output}");

    Ok(())
}
