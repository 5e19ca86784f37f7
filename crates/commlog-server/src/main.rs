//! commlog server: serves the call and message cache over HTTP.

use anyhow::Result;
use clap::Parser;
use commlog_server::{app, config, logging, state};
use commlog_types::SyncOutcome;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use logging::{LogConfig, LogFormat};
use state::AppState;

/// Call and message timeline cache.
#[derive(Parser, Debug)]
#[command(name = "commlog-server")]
#[command(about = "Sync call, message and contact exports into a local cache and serve it")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the export directory from config
    #[arg(long, value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// Enable verbose logging (INFO for every target)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging, including every observer signal
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g. "sync=debug").
    /// Can be repeated. Targets are prefixed with "commlog::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(source_dir) = cli.source_dir {
        config.source_dir = source_dir;
    }

    tracing::info!(
        target: "commlog::startup",
        "Loaded configuration (port: {}, cache: {}, source: {})",
        config.port,
        config.db_path.display(),
        config.source_dir.display()
    );

    let state = Arc::new(AppState::new(config.clone())?);

    // A failed first sync leaves the cache as it was; the server still starts.
    match state.engine.sync_on_start().await {
        Ok(SyncOutcome::Completed(report)) => tracing::info!(
            target: "commlog::startup",
            "Initial {:?} sync wrote {} records",
            report.scope,
            report.total_written()
        ),
        Ok(SyncOutcome::AlreadyRunning { .. }) => {}
        Err(e) => tracing::warn!(target: "commlog::startup", "Initial sync failed: {}", e),
    }

    if config.observe_on_start {
        match state.start_observing().await {
            Ok(_) => tracing::info!(target: "commlog::startup", "Observing source changes"),
            Err(e) => tracing::warn!(target: "commlog::startup", "Could not observe source: {}", e),
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "commlog::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
