//! Trade feed types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalized taker side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// A single normalized trade, as published to the stream and the object store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Upstream identifier (e.g., "kraken")
    pub source: String,
    /// Instrument in lowercase underscore form (e.g., "xbt_usd")
    pub symbol: String,
    /// Last trade price
    pub price: f64,
    /// Trade size
    pub qty: f64,
    /// Event time, ms since epoch
    pub timestamp: i64,
    /// Producer receive time (RFC 3339, UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    /// Upstream-specific order type code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
}

impl TradeRecord {
    /// Create a record with only the required fields set
    pub fn new(
        source: impl Into<String>,
        symbol: &str,
        price: f64,
        qty: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            source: source.into(),
            symbol: normalize_symbol(symbol),
            price,
            qty,
            timestamp,
            ingest_ts: None,
            side: None,
            order_type: None,
        }
    }

    /// Check the record invariants
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.timestamp <= 0 {
            return Err(DecodeError::InvalidTrade(format!(
                "non-positive timestamp {}",
                self.timestamp
            )));
        }
        if self.price.is_nan() || self.price < 0.0 || self.qty.is_nan() || self.qty < 0.0 {
            return Err(DecodeError::InvalidTrade(format!(
                "price={} qty={}",
                self.price, self.qty
            )));
        }
        if self.symbol.contains('/') {
            return Err(DecodeError::InvalidTrade(format!(
                "symbol {} is not normalized",
                self.symbol
            )));
        }
        Ok(())
    }
}

/// Lowercase underscore form of an upstream pair ("XBT/USD" -> "xbt_usd")
pub fn normalize_symbol(pair: &str) -> String {
    pair.replace('/', "_").to_lowercase()
}

/// Frame decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not valid JSON
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// Frame is JSON but does not have the expected shape
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Decoded trade violates record invariants
    #[error("invalid trade: {0}")]
    InvalidTrade(String),
}
