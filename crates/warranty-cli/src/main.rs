//! Warranty Manager CLI - sign in, register, and make authenticated calls.
//!
//! The session is restored from storage at startup and an expiry watchdog is
//! mounted for the lifetime of the process, so an expired token is dropped
//! before any command runs.

mod cli;
mod commands;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use warranty_core::api::Gateway;
use warranty_core::auth::{ExpiryWatchdog, MemorySessionStore, SessionManager, SessionStore};
use warranty_core::config::Config;

use cli::Cli;

// ============================================================================
// Constants
// ============================================================================

/// Log file prefix inside the logs directory
const LOG_FILE_PREFIX: &str = "warranty.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g., RUST_LOG=debug). The returned
/// guard flushes the log file and must be held until exit.
fn init_tracing(log_file: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    if !log_file {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(filter)
            .init();
        return Ok(None);
    }

    let log_dir = Config::data_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    let _log_guard = init_tracing(cli.log_file)?;
    info!("Warranty Manager CLI starting");

    let store: Arc<dyn SessionStore> = if cli.ephemeral {
        Arc::new(MemorySessionStore::new())
    } else {
        config.open_store()?
    };
    let session = Arc::new(
        SessionManager::restore(store).context("Failed to restore stored session")?,
    );
    let _watchdog = ExpiryWatchdog::mount(&session);

    let api_url = cli.api_url.clone().unwrap_or_else(|| config.api_base_url());
    let gateway = Gateway::new(api_url, session)?;

    commands::run(cli.command, &mut config, gateway).await
}
