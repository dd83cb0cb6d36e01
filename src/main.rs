use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, LogFormat};
use gatekeeper::http::HttpServer;
use gatekeeper::ratelimit::{RateLimiter, Sweeper};

/// Command-line arguments. Anything set here overrides file and environment values.
#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version)]
#[command(about = "Per-user fixed-window request admission service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve HTTP on
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Requests admitted per user per window
    #[arg(long)]
    max_requests: Option<u32>,

    /// Window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Seconds between sweeps of expired records
    #[arg(long)]
    cleanup_interval_secs: Option<u64>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(&self, config: &mut GatekeeperConfig) {
        if let Some(addr) = self.addr {
            config.server.http_addr = addr;
        }
        if let Some(max_requests) = self.max_requests {
            config.rate_limiting.max_requests = max_requests;
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limiting.window_secs = window_secs;
        }
        if let Some(interval) = self.cleanup_interval_secs {
            config.rate_limiting.cleanup_interval_secs = interval;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = GatekeeperConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging.level, config.logging.format);

    info!("Starting Gatekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        max_requests = config.rate_limiting.max_requests,
        window_secs = config.rate_limiting.window_secs,
        "Configuration loaded"
    );

    // Initialize the admission store and its eviction job
    let rate_limiter = Arc::new(RateLimiter::with_config(
        config.rate_limiting.limiter_config(),
    )?);
    let sweeper = Sweeper::spawn(
        rate_limiter.clone(),
        config.rate_limiting.cleanup_interval(),
    );
    info!("Rate limiter initialized");

    let server = HttpServer::new(config.server.http_addr, rate_limiter)
        .with_max_body_bytes(config.server.max_body_bytes);

    // Run the server with graceful shutdown on Ctrl+C
    let served = server.serve_with_shutdown(shutdown_signal()).await;
    sweeper.shutdown().await;
    served?;

    info!("Gatekeeper stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
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
