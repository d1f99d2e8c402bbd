//! Vigil Daemon - Predictive maintenance monitor
//!
//! The Vigil daemon provides:
//! - Continuous polling of one asset's telemetry
//! - Fused failure-risk analysis against the predictive service
//! - Threshold alerts with cooldowns and an anomaly countdown

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_daemon::{DaemonConfig, DaemonResult, RunOptions};

/// Vigil Daemon CLI
#[derive(Parser)]
#[command(name = "vigild")]
#[command(about = "Vigil - predictive maintenance monitor", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<String>,

    /// Predictive service base URL
    #[arg(short, long, env = "VIGIL_ENDPOINT")]
    endpoint: Option<String>,

    /// Asset to monitor (defaults to the first listed asset)
    #[arg(short, long, env = "VIGIL_ASSET")]
    asset: Option<String>,

    /// List known assets and exit
    #[arg(long)]
    list_assets: bool,

    /// Run against the offline simulated fleet
    #[arg(long, env = "VIGIL_SIMULATE")]
    simulate: bool,

    /// Log level
    #[arg(long, env = "VIGIL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "VIGIL_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(endpoint) = cli.endpoint {
        config.service.endpoint = endpoint;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.service.endpoint,
        simulate = cli.simulate,
        "Starting Vigil daemon"
    );

    vigil_daemon::run(
        config,
        RunOptions {
            asset: cli.asset,
            list_assets: cli.list_assets,
            simulate: cli.simulate,
        },
    )
    .await
}
