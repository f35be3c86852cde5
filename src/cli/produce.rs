//! Produce command implementation

use crate::bus::KinesisBus;
use crate::config::Config;
use crate::feed::ProviderKind;
use crate::producer::{Producer, ProducerConfig};
use crate::store::S3Store;
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct ProduceArgs {
    /// Upstream exchange (overrides PROVIDER)
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    /// Upstream pair, e.g. XBT/USD (overrides SYMBOL)
    #[arg(long)]
    pub symbol: Option<String>,
}

impl ProduceArgs {
    pub async fn execute(
        &self,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let stream = config.require_stream()?;
        let bucket = config.require_bucket()?;
        let provider_kind = self.provider.unwrap_or(config.feed.provider);
        let symbol = self
            .symbol
            .clone()
            .unwrap_or_else(|| config.feed.symbol.clone());

        tracing::info!(
            region = %config.aws.region,
            stream,
            bucket,
            provider = %provider_kind,
            symbol = %symbol,
            batch_size = config.store.batch_size,
            flush_interval_secs = config.store.flush_interval_secs,
            "Starting producer"
        );

        let sdk_config = super::aws_sdk_config(&config.aws.region).await;
        let bus = KinesisBus::from_sdk_config(&sdk_config, stream);
        let store = S3Store::from_sdk_config(&sdk_config, bucket);

        let producer_config = ProducerConfig {
            symbol: symbol.clone(),
            batch_size: config.store.batch_size,
            flush_interval: Duration::from_secs(config.store.flush_interval_secs),
            reconnect_delay: Duration::from_secs(config.feed.reconnect_delay_secs),
        };

        let mut producer = Producer::new(provider_kind.build(&symbol), bus, store, producer_config);
        producer.run(shutdown).await
    }
}
