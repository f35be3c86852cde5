//! Consume command implementation

use crate::bus::{Horizon, KinesisBus};
use crate::config::Config;
use crate::consumer::{Consumer, ConsumerConfig};
use clap::Args;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// LATEST or TRIM_HORIZON (overrides KINESIS_READ_FROM)
    #[arg(long)]
    pub read_from: Option<Horizon>,
}

impl ConsumeArgs {
    pub async fn execute(
        &self,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let stream = config.require_stream()?;

        let mut consumer_config = ConsumerConfig::from_config(stream, config);
        if let Some(horizon) = self.read_from {
            consumer_config.horizon = horizon;
        }

        tracing::info!(
            region = %config.aws.region,
            stream,
            read_from = %consumer_config.horizon,
            state_dir = %config.state.dir.display(),
            "Starting consumer"
        );

        let sdk_config = super::aws_sdk_config(&config.aws.region).await;
        let reader = KinesisBus::from_sdk_config(&sdk_config, stream);

        let mut consumer = Consumer::open(reader, config.state.dir.clone(), consumer_config).await?;
        consumer.run(shutdown).await?;
        Ok(())
    }
}
