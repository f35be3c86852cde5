//! Upstream trade feeds
//!
//! Each exchange is a [`Provider`]: it knows its WebSocket URL, the frames to
//! send once connected, and how to turn a text frame into trade records.

mod bitstamp;
mod kraken;
mod types;

pub use bitstamp::BitstampProvider;
pub use kraken::KrakenProvider;
pub use types::{normalize_symbol, DecodeError, Side, TradeRecord};

use crate::ws::SocketError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Trait for upstream exchange implementations
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier, used as record `source` and object key prefix
    fn name(&self) -> &'static str;

    /// WebSocket endpoint
    fn ws_url(&self) -> &str;

    /// Subscription frame sent after every (re)connect
    fn subscription(&self) -> Value;

    /// Called once the socket is open
    async fn on_open(&self, send: &mpsc::Sender<String>) -> Result<(), SocketError> {
        send.send(self.subscription().to_string())
            .await
            .map_err(|_| SocketError::ChannelClosed)?;
        tracing::info!(provider = self.name(), "Subscription sent");
        Ok(())
    }

    /// Decode a text frame; non-trade frames yield an empty vec
    fn decode(&self, message: &str) -> Result<Vec<TradeRecord>, DecodeError>;
}

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Kraken,
    Bitstamp,
}

impl ProviderKind {
    /// Build the provider for `symbol` (upstream pair form, e.g. "XBT/USD")
    pub fn build(self, symbol: &str) -> Box<dyn Provider> {
        match self {
            ProviderKind::Kraken => Box::new(KrakenProvider::new(symbol)),
            ProviderKind::Bitstamp => Box::new(BitstampProvider::new(symbol)),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kraken" => Ok(ProviderKind::Kraken),
            "bitstamp" => Ok(ProviderKind::Bitstamp),
            other => Err(format!(
                "unsupported provider '{other}', use kraken or bitstamp"
            )),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Kraken => write!(f, "kraken"),
            ProviderKind::Bitstamp => write!(f, "bitstamp"),
        }
    }
}

/// Read a number that exchanges send either as JSON number or string
pub(crate) fn number(value: &Value, field: &str) -> Result<f64, DecodeError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DecodeError::Malformed(format!("{field} out of range"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| DecodeError::Malformed(format!("{field} is not numeric: {s}"))),
        _ => Err(DecodeError::Malformed(format!("{field} missing or not numeric"))),
    }
}
