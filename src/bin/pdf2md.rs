//! CLI tool for offline PDF to Markdown conversion
//!
//! Runs the same pipeline as the HTTP service against a local file and
//! prints the result to stdout.

use clap::Parser;
use pdf2md_server::config::load_dotenv;
use pdf2md_server::server::ConvertResponse;
use pdf2md_server::{ConvertOptions, Converter, PdfError};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Convert a local PDF to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md",
    version,
    about = "Convert a local PDF to Markdown",
    arg_required_else_help = true
)]
struct Cli {
    /// PDF file to convert.
    input: PathBuf,

    /// Print the service's JSON response instead of raw Markdown.
    #[arg(long)]
    json: bool,

    /// Reject documents with more pages than this.
    #[arg(long, env = "MAX_PAGES", default_value_t = 300)]
    max_pages: usize,

    /// Worker threads for page rendering (default: available cores).
    #[arg(long, env = "MAX_WORKERS")]
    workers: Option<usize>,

    /// Log conversion details to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    // `.env` values feed the `env` fallbacks below
    let dotenv = load_dotenv();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
    dotenv.log();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), PdfError> {
    let start = Instant::now();
    let buffer = std::fs::read(&cli.input)?;

    let mut options = ConvertOptions {
        max_pages: cli.max_pages,
        ..ConvertOptions::default()
    };
    if let Some(workers) = cli.workers {
        options.workers = workers;
    }

    let document = Converter::new(options)?.convert(&buffer)?;

    if cli.json {
        let response = ConvertResponse {
            pages_processed: document.pages_processed,
            processing_time_sec: (start.elapsed().as_secs_f64() * 100.0).round() / 100.0,
            content: document.content,
        };
        let json = serde_json::to_string_pretty(&response).map_err(|e| PdfError::Io(e.into()))?;
        println!("{}", json);
    } else {
        println!("{}", document.content);
        log::info!(
            "{} pages in {:.2}s",
            document.pages_processed,
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
