//! Command line entry point
//!
//! One command: run the pipeline for a config file. The process exit code
//! reflects any uncaught pipeline error.

use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tabpipe::artifacts::RunDir;
use tabpipe::config::RunConfig;
use tabpipe::pipeline;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "tabpipe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Config-driven tabular modelling pipeline", long_about = None)]
struct Cli {
    /// Path to the run configuration (YAML or JSON)
    #[arg(short = 'p', long = "config")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = RunConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let run_dir = RunDir::create(&config)?;

    init_logging(&run_dir, cli.verbose);

    info!(run = %config.run_name, "running in training mode");
    pipeline::run(&config)?;

    Ok(())
}

/// Log to stderr, mirrored into `_log.txt` inside the run directory when the
/// directory is writable.
fn init_logging(run_dir: &RunDir, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match File::create(run_dir.file("_log.txt")) {
        Ok(file) => {
            let file_layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        Err(err) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            warn!(error = %err, "cannot create log file in run directory, continuing without it");
        }
    }
}
