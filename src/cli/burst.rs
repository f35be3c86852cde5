//! Burst command implementation

use crate::bus::KinesisBus;
use crate::config::Config;
use crate::feed::{Side, TradeRecord};
use chrono::Utc;
use clap::Args;
use rand::Rng;
use std::time::Instant;

/// Partition key used for injected records
const BURST_PARTITION_KEY: &str = "burst";

#[derive(Args, Debug)]
pub struct BurstArgs {
    /// Number of records to send
    #[arg(long, default_value_t = 250)]
    pub count: usize,

    /// Symbol written into the records
    #[arg(long, default_value = "XBT/USD")]
    pub symbol: String,
}

/// Synthetic trade stamped with the current time
pub fn synthetic_trade(symbol: &str, rng: &mut impl Rng) -> TradeRecord {
    let mut rec = TradeRecord::new(
        "test",
        symbol,
        50_000.0 + rng.gen::<f64>(),
        rng.gen::<f64>() / 10.0,
        Utc::now().timestamp_millis(),
    );
    rec.side = Some(Side::Buy);
    rec.order_type = Some("m".to_string());
    rec
}

impl BurstArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let stream = config.require_stream()?;
        let sdk_config = super::aws_sdk_config(&config.aws.region).await;
        let bus = KinesisBus::from_sdk_config(&sdk_config, stream);

        tracing::info!(stream, count = self.count, "Sending burst");

        let mut rng = rand::thread_rng();
        let started = Instant::now();
        for _ in 0..self.count {
            let rec = synthetic_trade(&self.symbol, &mut rng);
            bus.put_raw(BURST_PARTITION_KEY, serde_json::to_vec(&rec)?)
                .await?;
        }

        tracing::info!(
            count = self.count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Burst sent"
        );
        Ok(())
    }
}
