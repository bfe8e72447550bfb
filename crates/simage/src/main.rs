//! simage CLI - find similar images by perceptual hash.
//!
//! Images are loaded by a background pipeline, resized, and handed to hash
//! workers over a message broker. Recorded hashes are kept in a JSON-Lines
//! file so later runs only hash what is new.
//!
//! # Usage
//!
//! ```bash
//! # Hash every image under a directory
//! simage scan ./photos/
//!
//! # Use a specific record file and eight hash workers
//! simage scan ./photos/ --records hashes.jsonl --workers 8
//!
//! # View configuration
//! simage config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// simage - distributed perceptual image hashing.
#[derive(Parser, Debug)]
#[command(name = "simage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Hash images and record the results
    Scan(cli::scan::ScanArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match simage_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `simage config path`."
            );
            simage_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("simage v{}", simage_core::VERSION);

    match cli.command {
        Commands::Scan(args) => cli::scan::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
