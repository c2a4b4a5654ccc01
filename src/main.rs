//! PotatoKV storage node
//!
//! Entry point: parses flags, sets up logging, binds the listener and runs
//! the node until the accept limit is reached or Ctrl+C is pressed.

use clap::Parser;
use potatokv::config::{
    DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT, DEFAULT_PORT, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL,
    DEFAULT_WORKERS,
};
use potatokv::{NodeConfig, Server};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "potatokv", version, about = "PotatoKV storage node")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Lifetime of entries written without a TTL, in seconds
    #[arg(long, default_value_t = DEFAULT_TTL.as_secs())]
    default_ttl_secs: u64,

    /// Seconds a session may stay idle before it is closed
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout_secs: u64,

    /// Milliseconds between two TTL sweeps
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL.as_millis() as u64)]
    sweep_interval_ms: u64,

    /// Stop after accepting this many connections
    #[arg(long)]
    accept_limit: Option<usize>,
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        NodeConfig {
            host: args.host,
            port: args.port,
            workers: args.workers,
            default_ttl: Duration::from_secs(args.default_ttl_secs),
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            sweep_interval: Duration::from_millis(args.sweep_interval_ms),
            accept_limit: args.accept_limit,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "potatokv=info".into()),
        )
        .with_target(false)
        .init();

    let config = NodeConfig::from(Args::parse());
    config.validate()?;

    info!(
        version = potatokv::VERSION,
        workers = config.workers,
        default_ttl_secs = config.default_ttl.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Starting PotatoKV node"
    );

    let server = Server::new(config);
    let listener = server.bind().await?;

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping node...");
    };

    server.run_until(listener, shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_config() {
        let config = NodeConfig::from(Args::parse_from(["potatokv"]));
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from(["potatokv", "-p", "9000", "--default-ttl-secs", "5"]);
        let config = NodeConfig::from(args);
        assert_eq!(config.port, 9000);
        assert_eq!(config.default_ttl, Duration::from_secs(5));
    }
}
