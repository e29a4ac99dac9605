//! General Loader Binary
//!
//! Reads an event stream from a file or stdin and loads it into a database.

use std::fs::File;
use std::io::{self, BufReader, Read};

use clap::Parser;
use genloader::{Config, DirBackend, GeneralLoader, LoadSummary, MemoryBackend};
use tracing_subscriber::{fmt, EnvFilter};

/// General Loader
#[derive(Parser, Debug)]
#[command(name = "general-loader")]
#[command(about = "Load a general-writer event stream into a columnar database")]
#[command(version)]
struct Args {
    /// Input stream file ("-" or omitted for stdin)
    input: Option<String>,

    /// Schema include paths (colon-separated, repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<String>,

    /// External schema files (colon-separated, repeatable)
    #[arg(short, long)]
    schema: Vec<String>,

    /// Root directory for relative database paths
    #[arg(short, long, default_value = ".")]
    output_dir: String,

    /// Event alignment boundary in bytes
    #[arg(long, default_value = "4")]
    alignment: u8,

    /// Keep a partially built database when the load fails
    #[arg(long)]
    keep_on_failure: bool,

    /// Load into memory only and print a summary
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,genloader=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("general-loader v{}", genloader::VERSION);

    let mut builder = Config::builder()
        .output_root(&args.output_dir)
        .alignment(args.alignment)
        .remove_on_failure(!args.keep_on_failure);
    for list in &args.include {
        builder = builder.schema_include_path(list);
    }
    for list in &args.schema {
        builder = builder.schema_file(list);
    }
    let config = builder.build();

    let input: Box<dyn Read> = match args.input.as_deref() {
        None | Some("-") => Box::new(io::stdin().lock()),
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(file),
            Err(e) => {
                tracing::error!("Failed to open input '{}': {}", path, e);
                std::process::exit(1);
            }
        },
    };
    let input = BufReader::new(input);

    let result = if args.dry_run {
        run(input, MemoryBackend::new(), config)
    } else {
        let backend = DirBackend::new(&config);
        run(input, backend, config)
    };

    match result {
        Ok(summary) => {
            println!(
                "loaded {} tables, {} columns, {} rows, {} cells ({} events, {} bytes)",
                summary.tables,
                summary.columns,
                summary.rows,
                summary.cells,
                summary.events,
                summary.bytes_read
            );
        }
        Err(e) => {
            tracing::error!("Load failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run<R: Read, B: genloader::Backend>(
    input: R,
    backend: B,
    config: Config,
) -> genloader::Result<LoadSummary> {
    let mut loader = GeneralLoader::new(input, backend, config)?;
    loader.run()
}
