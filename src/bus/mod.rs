//! Streaming bus
//!
//! Producer side publishes trade records keyed by symbol; consumer side reads a
//! single shard through opaque shard iterators.

mod kinesis;

pub use kinesis::KinesisBus;

use crate::feed::TradeRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum entries per batch publish call
pub const MAX_RECORDS_PER_CALL: usize = 50;

/// Where a fresh shard iterator starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum Horizon {
    /// Only records written after the iterator is created
    #[default]
    #[serde(rename = "LATEST")]
    Latest,
    /// Oldest record still retained
    #[serde(rename = "TRIM_HORIZON")]
    TrimHorizon,
}

impl FromStr for Horizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LATEST" => Ok(Horizon::Latest),
            "TRIM_HORIZON" => Ok(Horizon::TrimHorizon),
            other => Err(format!(
                "unknown horizon '{other}', use LATEST or TRIM_HORIZON"
            )),
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::Latest => write!(f, "LATEST"),
            Horizon::TrimHorizon => write!(f, "TRIM_HORIZON"),
        }
    }
}

/// Result of a single shard read
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    /// Raw record payloads in shard order
    pub records: Vec<Vec<u8>>,
    /// Cursor for the next read; `None` once the shard is closed
    pub next_iterator: Option<String>,
}

/// Streaming bus errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Record could not be serialized
    #[error("serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Service call failed
    #[error("{op} failed: {message}")]
    Call { op: &'static str, message: String },
    /// Batch call succeeded but some entries were rejected
    #[error("{failed} of {total} records rejected")]
    PartialFailure { failed: usize, total: usize },
    /// Response lacked a required field
    #[error("{0} missing from response")]
    MissingField(&'static str),
    /// Shard iterator is past its lifetime and must be reopened
    #[error("shard iterator expired")]
    ExpiredIterator,
}

impl BusError {
    pub(crate) fn call(op: &'static str, err: impl fmt::Display) -> Self {
        BusError::Call {
            op,
            message: err.to_string(),
        }
    }
}

/// Publishing side of the bus
#[async_trait]
pub trait TradeBus: Send + Sync {
    /// Publish at most [`MAX_RECORDS_PER_CALL`] records in one call
    async fn put_records(&self, records: &[TradeRecord]) -> Result<(), BusError>;
}

/// Reading side of the bus
#[async_trait]
pub trait ShardReader: Send + Sync {
    /// Shard ids of the stream, in service order
    async fn list_shards(&self) -> Result<Vec<String>, BusError>;

    /// Open an iterator on `shard_id` at `horizon`
    async fn shard_iterator(&self, shard_id: &str, horizon: Horizon) -> Result<String, BusError>;

    /// Read up to `limit` records at `iterator`
    async fn get_records(&self, iterator: &str, limit: i32) -> Result<RecordBatch, BusError>;
}
