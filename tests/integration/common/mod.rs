//! In-memory stream and object store shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tradespike::bus::{BusError, Horizon, RecordBatch, ShardReader, TradeBus};
use tradespike::feed::TradeRecord;
use tradespike::store::{ObjectStore, StoreError};

/// Single-shard stream; iterators are offsets into the record log
#[derive(Clone, Default)]
pub struct MemoryStream {
    records: Arc<Mutex<Vec<Vec<u8>>>>,
    keys: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the shard; readers stop once they reach the end
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn partition_keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    pub fn push_raw(&self, key: &str, data: Vec<u8>) {
        self.records.lock().unwrap().push(data);
        self.keys.lock().unwrap().push(key.to_string());
    }
}

#[async_trait]
impl TradeBus for MemoryStream {
    async fn put_records(&self, records: &[TradeRecord]) -> Result<(), BusError> {
        assert!(records.len() <= tradespike::bus::MAX_RECORDS_PER_CALL);
        for rec in records {
            self.push_raw(&rec.symbol, serde_json::to_vec(rec)?);
        }
        Ok(())
    }
}

#[async_trait]
impl ShardReader for MemoryStream {
    async fn list_shards(&self) -> Result<Vec<String>, BusError> {
        Ok(vec!["shardId-000000000000".to_string()])
    }

    async fn shard_iterator(&self, _shard_id: &str, horizon: Horizon) -> Result<String, BusError> {
        let start = match horizon {
            Horizon::TrimHorizon => 0,
            Horizon::Latest => self.len(),
        };
        Ok(start.to_string())
    }

    async fn get_records(&self, iterator: &str, limit: i32) -> Result<RecordBatch, BusError> {
        let start: usize = iterator.parse().map_err(|_| BusError::Call {
            op: "GetRecords",
            message: format!("bad iterator {iterator}"),
        })?;

        let log = self.records.lock().unwrap();
        let end = (start + limit.max(0) as usize).min(log.len());
        let records = log[start..end].to_vec();

        let next_iterator = if end == log.len() && self.closed.load(Ordering::SeqCst) {
            None
        } else {
            Some(end.to_string())
        };
        Ok(RecordBatch {
            records,
            next_iterator,
        })
    }
}

/// Object store keeping uploads in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> Vec<(String, String)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let body = String::from_utf8(body).map_err(|e| StoreError::Upload {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.objects.lock().unwrap().push((key.to_string(), body));
        Ok(())
    }
}

/// Kraken trade frame with `n` trades at `ts_secs` (epoch seconds)
pub fn kraken_frame(n: usize, ts_secs: f64) -> String {
    let trades: Vec<String> = (0..n)
        .map(|i| {
            format!(
                r#"["50000.{i}","0.01000000","{:.6}","{}","l",""]"#,
                ts_secs + i as f64 * 0.0001,
                if i % 2 == 0 { "b" } else { "s" }
            )
        })
        .collect();
    format!(r#"[340,[{}],"trade","XBT/USD"]"#, trades.join(","))
}
