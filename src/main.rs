mod cli;
mod engine;
mod error;
mod model;
mod orchestrator;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// Tracing target constants
pub const TRACING_TARGET_ENGINE: &str = "redshift_classifier::engine";
pub const TRACING_TARGET_EXTRACT: &str = "redshift_classifier::engine::extract";
pub const TRACING_TARGET_INVOKE: &str = "redshift_classifier::engine::invoke";
pub const TRACING_TARGET_CONTROLLER: &str = "redshift_classifier::controller";
pub const TRACING_TARGET_STARTUP: &str = "redshift_classifier::startup";

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    let is_non_tui = !args.is_interactive();

    init_tracing(&args)?;
    tracing::debug!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        interpreter = %args.rscript.display(),
        workdir = %args.workdir.display(),
        "starting"
    );

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}

/// Initializes tracing with environment-based filtering.
///
/// The TUI owns the terminal, so it only logs when `--log-file` is given.
fn init_tracing(args: &cli::Cli) -> Result<()> {
    let default_level = if args.silent { "error" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Some(path) = args.log_file.as_deref() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else if !args.is_interactive() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}
