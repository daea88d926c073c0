use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use turnstile::admission::{spawn_blocking_reader, AdmissionService, LineServer};
use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{RateLimiter, Sweeper, SystemClock};

/// Admission control for inbound requests.
///
/// Reads one client key per line on stdin and writes one JSON decision per
/// line on stdout.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Maximum requests admitted per window
    #[arg(long)]
    limit: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Idle period in seconds before a client's record is evicted
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Seconds between eviction sweeps
    #[arg(long)]
    sweep_interval_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(&self, config: &mut TurnstileConfig) {
        if let Some(limit) = self.limit {
            config.limiter.limit = limit;
        }
        if let Some(window_secs) = self.window_secs {
            config.limiter.window_secs = window_secs;
        }
        if let Some(idle_timeout_secs) = self.idle_timeout_secs {
            config.limiter.idle_timeout_secs = idle_timeout_secs;
        }
        if let Some(interval_secs) = self.sweep_interval_secs {
            config.sweeper.interval_secs = interval_secs;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout carries decisions, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    info!("Starting Turnstile admission control");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    info!(
        limit = config.limiter.limit,
        window_secs = config.limiter.window_secs,
        idle_timeout_secs = config.limiter.idle_timeout_secs,
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new(config.limiter.policy())?);
    info!("Rate limiter initialized");

    let sweeper = config
        .sweeper
        .enabled
        .then(|| Sweeper::spawn(rate_limiter.clone(), config.sweeper.interval(), SystemClock));

    let server = LineServer::new(AdmissionService::new(rate_limiter, SystemClock));
    // stdin is read on its own thread so a pending read never blocks shutdown
    let lines = spawn_blocking_reader(std::io::stdin())?;
    let served = server
        .serve_lines_with_shutdown(lines, tokio::io::stdout(), shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    info!(served = served, "Turnstile admission control stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
