//! CLI entry point for the RTMP restreamer
//!
//! Streams one local video to an RTMP ingest, serves the status endpoint, and
//! stays up until the session ends or Ctrl-C is pressed.

use clap::Parser;
use restreamer::{
    compose_destination, run_startup_checks, run_status_server, BinaryLocator, Config,
    ConnectionHealth, StreamStatus, StreamSupervisor,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "config.toml";
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Restreamer - push a local video to an RTMP server with automatic reconnects
#[derive(Parser, Debug)]
#[command(name = "restreamer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file to stream
    video: PathBuf,

    /// RTMP ingest URL (rtmp:// or rtmps://)
    url: String,

    /// Stream key appended to the ingest URL; omit if the URL already has it
    #[arg(short = 'k', long, default_value = "")]
    stream_key: String,

    /// Quality preset: low, medium, high or ultra
    #[arg(short, long)]
    quality: Option<String>,

    /// Path to the configuration file [default: config.toml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the encoder preflight check
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Do not serve the HTTP status endpoint
    #[arg(long, default_value = "false")]
    no_status_server: bool,

    /// Verbose logging, including every encoder output line
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "restreamer=trace,restreamer_cli=debug".to_string()
        } else {
            "restreamer=info,restreamer_cli=info".to_string()
        }
    });
    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let destination = match compose_destination(&args.url, &args.stream_key) {
        Ok(destination) => destination,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.skip_checks {
        tracing::warn!("Skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_startup_checks(&BinaryLocator::new(&config.binaries)) {
        tracing::error!("Startup check failed: {}", e);
        return ExitCode::FAILURE;
    }

    let supervisor = StreamSupervisor::from_config(&config);
    if let Some(quality) = &args.quality {
        if let Err(e) = supervisor.set_quality(quality).await {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    if config.status_server.enabled && !args.no_status_server {
        let server = supervisor.clone();
        let bind = config.status_server.bind.clone();
        tokio::spawn(async move {
            if let Err(e) = run_status_server(server, &bind).await {
                tracing::error!("Status server error: {}", e);
            }
        });
    }

    if let Err(e) = supervisor.start(args.video.clone(), destination).await {
        tracing::error!("Failed to start stream: {}", e);
        return ExitCode::FAILURE;
    }

    watch(&supervisor).await
}

/// An explicit `--config` must exist; the default path is optional
fn load_config(path: Option<&Path>) -> Result<Config, restreamer::config::ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(DEFAULT_CONFIG),
    }
}

/// Poll the session until it ends or the user interrupts
async fn watch(supervisor: &StreamSupervisor) -> ExitCode {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut listen_for_signal = true;

    let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
    let mut last_health: Option<ConnectionHealth> = None;
    let mut last_retry = 0;

    loop {
        tokio::select! {
            result = &mut ctrl_c, if listen_for_signal => {
                match result {
                    Ok(()) => {
                        tracing::info!("Interrupted, stopping stream");
                        if let Err(e) = supervisor.stop().await {
                            tracing::debug!("{}", e);
                        }
                        return ExitCode::SUCCESS;
                    }
                    Err(e) => {
                        tracing::warn!("Unable to listen for Ctrl-C: {}", e);
                        listen_for_signal = false;
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        let live = supervisor.is_live().await;
        let status = supervisor.status().await;

        if last_health != Some(status.connection_health) || last_retry != status.retry_count {
            log_transition(&status);
            last_health = Some(status.connection_health);
            last_retry = status.retry_count;
        }

        if !live {
            if status.error.is_empty() {
                tracing::info!(elapsed = status.elapsed_seconds, "Stream finished");
                return ExitCode::SUCCESS;
            }
            tracing::error!("{}", status.error);
            return ExitCode::FAILURE;
        }
    }
}

fn log_transition(status: &StreamStatus) {
    match status.connection_health {
        ConnectionHealth::Reconnecting => tracing::warn!(
            retry = status.retry_count,
            max_retries = status.max_retries,
            "Reconnecting"
        ),
        health => tracing::info!(
            health = %health,
            elapsed_secs = status.elapsed_seconds.round(),
            remaining_secs = status.remaining_seconds.round(),
            quality = %status.quality,
            "Stream status"
        ),
    }
}
