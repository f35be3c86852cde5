//! Bitstamp WebSocket trade feed

use super::{number, DecodeError, Provider, Side, TradeRecord};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

/// Bitstamp public WebSocket URL
const BITSTAMP_WS_URL: &str = "wss://ws.bitstamp.net";

#[derive(Debug, Deserialize)]
struct BitstampFrame {
    #[serde(default)]
    event: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Bitstamp `live_trades_<pair>` channel
pub struct BitstampProvider {
    symbol: String,
    channel: String,
    url: String,
}

impl BitstampProvider {
    /// Create a provider for a pair such as "BTC/USD"
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_url(symbol, BITSTAMP_WS_URL)
    }

    /// Same feed served from another endpoint
    pub fn with_url(symbol: impl Into<String>, url: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let channel = format!("live_trades_{}", symbol.replace('/', "").to_lowercase());
        Self {
            symbol,
            channel,
            url: url.into(),
        }
    }

    /// Channel name derived from the pair
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl Provider for BitstampProvider {
    fn name(&self) -> &'static str {
        "bitstamp"
    }

    fn ws_url(&self) -> &str {
        &self.url
    }

    fn subscription(&self) -> Value {
        json!({
            "event": "bts:subscribe",
            "data": { "channel": self.channel }
        })
    }

    fn decode(&self, message: &str) -> Result<Vec<TradeRecord>, DecodeError> {
        let frame: BitstampFrame = serde_json::from_str(message)?;
        if frame.event != "trade" {
            return Ok(Vec::new());
        }
        let Some(data) = frame.data else {
            return Ok(Vec::new());
        };

        let price = number(&data["price"], "price")?;
        let qty = number(&data["amount"], "amount")?;
        // Trades without a timestamp are stamped with receive time
        let ts_ms = match data.get("timestamp") {
            Some(ts) if !ts.is_null() => number(ts, "timestamp")? as i64 * 1000,
            _ => Utc::now().timestamp_millis(),
        };

        let mut rec = TradeRecord::new("bitstamp", &self.symbol, price, qty, ts_ms);
        rec.side = match data.get("type").and_then(Value::as_i64) {
            Some(0) => Some(Side::Buy),
            Some(1) => Some(Side::Sell),
            _ => None,
        };
        rec.validate()?;

        Ok(vec![rec])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_and_subscription() {
        let provider = BitstampProvider::new("BTC/USD");
        assert_eq!(provider.channel(), "live_trades_btcusd");

        let sub = provider.subscription();
        assert_eq!(sub["event"], "bts:subscribe");
        assert_eq!(sub["data"]["channel"], "live_trades_btcusd");
        assert_eq!(provider.ws_url(), "wss://ws.bitstamp.net");
    }

    #[test]
    fn test_decode_trade() {
        let provider = BitstampProvider::new("BTC/USD");
        let msg = concat!(
            r#"{"data":{"id":311243543,"timestamp":"1700000001","amount":0.0125,"#,
            r#""amount_str":"0.0125","price":37123,"price_str":"37123","type":1,"#,
            r#""microtimestamp":"1700000001402000"},"#,
            r#""channel":"live_trades_btcusd","event":"trade"}"#
        );

        let recs = provider.decode(msg).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].source, "bitstamp");
        assert_eq!(recs[0].symbol, "btc_usd");
        assert_eq!(recs[0].price, 37123.0);
        assert_eq!(recs[0].qty, 0.0125);
        assert_eq!(recs[0].timestamp, 1_700_000_001_000);
        assert_eq!(recs[0].side, Some(Side::Sell));
    }

    #[test]
    fn test_decode_ignores_control_events() {
        let provider = BitstampProvider::new("BTC/USD");
        let ack =
            r#"{"event":"bts:subscription_succeeded","channel":"live_trades_btcusd","data":{}}"#;
        assert!(provider.decode(ack).unwrap().is_empty());
        let heartbeat = provider.decode(r#"{"event":"bts:heartbeat"}"#).unwrap();
        assert!(heartbeat.is_empty());
    }

    #[test]
    fn test_decode_missing_price() {
        let provider = BitstampProvider::new("BTC/USD");
        let msg = r#"{"event":"trade","data":{"amount":1.0,"timestamp":"1700000001"}}"#;
        assert!(matches!(
            provider.decode(msg),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_missing_timestamp_uses_receive_time() {
        let provider = BitstampProvider::new("BTC/USD");
        let msg = r#"{"event":"trade","data":{"amount":0.5,"price":37000,"type":0}}"#;

        let before = Utc::now().timestamp_millis();
        let recs = provider.decode(msg).unwrap();
        let after = Utc::now().timestamp_millis();

        assert_eq!(recs.len(), 1);
        assert!((before..=after).contains(&recs[0].timestamp));
        assert_eq!(recs[0].side, Some(Side::Buy));

        let bad = r#"{"event":"trade","data":{"amount":0.5,"price":1,"timestamp":"soon"}}"#;
        assert!(provider.decode(bad).is_err());
    }

    #[test]
    fn test_decode_not_an_object() {
        let provider = BitstampProvider::new("BTC/USD");
        assert!(provider.decode("[1,2,3]").is_err());
        assert!(provider.decode("{").is_err());
    }
}
