//! Kraken WebSocket trade feed

use super::{normalize_symbol, number, DecodeError, Provider, Side, TradeRecord};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Kraken public WebSocket URL
const KRAKEN_WS_URL: &str = "wss://ws.kraken.com/";

/// Kraken `trade` channel for a single pair
///
/// Data frames are arrays:
/// `[channelID, [[price, volume, time, side, orderType, misc], ...], "trade", pair]`
pub struct KrakenProvider {
    pair: String,
    url: String,
}

impl KrakenProvider {
    /// Create a provider for a Kraken pair such as "XBT/USD"
    pub fn new(pair: impl Into<String>) -> Self {
        Self::with_url(pair, KRAKEN_WS_URL)
    }

    /// Same feed served from another endpoint
    pub fn with_url(pair: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            url: url.into(),
        }
    }

    fn parse_trade(entry: &Value, symbol: &str) -> Result<TradeRecord, DecodeError> {
        let fields = entry
            .as_array()
            .ok_or_else(|| DecodeError::Malformed("trade entry is not an array".into()))?;
        if fields.len() < 3 {
            return Err(DecodeError::Malformed(format!(
                "trade entry has {} fields",
                fields.len()
            )));
        }

        let price = number(&fields[0], "price")?;
        let qty = number(&fields[1], "volume")?;
        let time_secs = number(&fields[2], "time")?;

        let mut rec = TradeRecord::new("kraken", symbol, price, qty, (time_secs * 1000.0) as i64);
        rec.side = match fields.get(3).and_then(Value::as_str) {
            Some("b") => Some(Side::Buy),
            Some("s") => Some(Side::Sell),
            _ => None,
        };
        let order_type = fields.get(4).and_then(Value::as_str);
        rec.order_type = order_type.map(str::to_string);
        rec.validate()?;
        Ok(rec)
    }
}

#[async_trait]
impl Provider for KrakenProvider {
    fn name(&self) -> &'static str {
        "kraken"
    }

    fn ws_url(&self) -> &str {
        &self.url
    }

    fn subscription(&self) -> Value {
        json!({
            "event": "subscribe",
            "pair": [self.pair],
            "subscription": { "name": "trade" }
        })
    }

    fn decode(&self, message: &str) -> Result<Vec<TradeRecord>, DecodeError> {
        let msg: Value = serde_json::from_str(message)?;

        // Heartbeats, status and subscription acks are objects
        let Some(frame) = msg.as_array() else {
            return Ok(Vec::new());
        };
        if frame.len() < 4 || frame[2].as_str() != Some("trade") {
            return Ok(Vec::new());
        }

        let symbol = frame[3]
            .as_str()
            .map(normalize_symbol)
            .ok_or_else(|| DecodeError::Malformed("pair is not a string".into()))?;
        let trades = frame[1]
            .as_array()
            .ok_or_else(|| DecodeError::Malformed("trades is not an array".into()))?;

        trades
            .iter()
            .map(|t| Self::parse_trade(t, &symbol))
            .collect()
    }
}
