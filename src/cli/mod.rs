//! CLI interface for tradespike
//!
//! Provides subcommands for:
//! - `produce`: Exchange feed to stream and object store
//! - `consume`: Stream to per-second metrics and alerts
//! - `serve`: Read API over the state directory
//! - `burst`: Inject a burst of synthetic trades
//! - `config`: Show effective configuration

mod burst;
mod consume;
mod produce;
mod serve;

pub use burst::BurstArgs;
pub use consume::ConsumeArgs;
pub use produce::ProduceArgs;
pub use serve::ServeArgs;

use crate::config::Config;
use crate::consumer::ConsumerError;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "tradespike")]
#[command(about = "Crypto trade stream pipeline with per-second spike detection")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (optional)
    #[arg(short, long, default_value = "tradespike.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream exchange trades to the bus and object store
    Produce(ProduceArgs),
    /// Detect spikes from the bus into the state directory
    Consume(ConsumeArgs),
    /// Serve metrics and alerts over HTTP
    Serve(ServeArgs),
    /// Write a burst of synthetic trades to the stream
    Burst(BurstArgs),
    /// Show effective configuration
    Config,
}

impl Commands {
    pub async fn execute(
        &self,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        match self {
            Commands::Produce(args) => args.execute(config, shutdown).await,
            Commands::Consume(args) => args.execute(config, shutdown).await,
            Commands::Serve(args) => args.execute(config, shutdown).await,
            Commands::Burst(args) => args.execute(config).await,
            Commands::Config => {
                print_config(config);
                Ok(())
            }
        }
    }
}

/// Shared AWS configuration for the configured region
pub(crate) async fn aws_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Process exit code for a failed command
///
/// `2` when the stream has no shards; `1` for configuration errors and any
/// other fatal failure.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ConsumerError>() {
        Some(ConsumerError::NoShards(_)) => 2,
        _ => 1,
    }
}

fn print_config(config: &Config) {
    let unset = "<unset>";
    println!("Current configuration:");
    println!("  Region: {}", config.aws.region);
    println!(
        "  Stream: {} (read from {}, poll {} ms, limit {})",
        config.stream.name.as_deref().unwrap_or(unset),
        config.stream.read_from,
        config.stream.poll_interval_ms,
        config.stream.read_limit
    );
    println!(
        "  Store: {} (batch {}, every {} s)",
        config.store.bucket.as_deref().unwrap_or(unset),
        config.store.batch_size,
        config.store.flush_interval_secs
    );
    println!("  Feed: {} {}", config.feed.provider, config.feed.symbol);
    println!("  State dir: {}", config.state.dir.display());
    println!(
        "  Detection: window={}, threshold={}, heartbeat={}s",
        config.detection.window, config.detection.threshold, config.detection.heartbeat_secs
    );
    println!(
        "  API: {} (origins: {})",
        config.api.bind_addr,
        config.api.allow_origins.join(",")
    );
}
