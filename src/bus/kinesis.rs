//! Kinesis Data Streams adapter

use super::{BusError, Horizon, RecordBatch, ShardReader, TradeBus, MAX_RECORDS_PER_CALL};
use crate::feed::TradeRecord;
use async_trait::async_trait;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::{PutRecordsRequestEntry, ShardIteratorType};
use aws_sdk_kinesis::Client;

/// A single Kinesis stream, used for both publishing and reading
#[derive(Clone)]
pub struct KinesisBus {
    client: Client,
    stream_name: String,
}

impl KinesisBus {
    /// Wrap an SDK client for `stream_name`
    pub fn new(client: Client, stream_name: impl Into<String>) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
        }
    }

    /// Build a client from shared AWS configuration
    pub fn from_sdk_config(
        sdk_config: &aws_config::SdkConfig,
        stream_name: impl Into<String>,
    ) -> Self {
        Self::new(Client::new(sdk_config), stream_name)
    }

    /// Stream this bus writes to and reads from
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Publish a single raw payload under an explicit partition key
    pub async fn put_raw(&self, partition_key: &str, data: Vec<u8>) -> Result<(), BusError> {
        self.client
            .put_record()
            .stream_name(&self.stream_name)
            .partition_key(partition_key)
            .data(Blob::new(data))
            .send()
            .await
            .map_err(|e| BusError::call("PutRecord", e.into_service_error()))?;
        Ok(())
    }
}

fn entry(rec: &TradeRecord) -> Result<PutRecordsRequestEntry, BusError> {
    let data = serde_json::to_vec(rec)?;
    PutRecordsRequestEntry::builder()
        .partition_key(rec.symbol.as_str())
        .data(Blob::new(data))
        .build()
        .map_err(|e| BusError::call("PutRecords", e))
}

#[async_trait]
impl TradeBus for KinesisBus {
    async fn put_records(&self, records: &[TradeRecord]) -> Result<(), BusError> {
        if records.is_empty() {
            return Ok(());
        }
        debug_assert!(records.len() <= MAX_RECORDS_PER_CALL);

        let entries = records.iter().map(entry).collect::<Result<Vec<_>, _>>()?;
        let total = entries.len();

        let output = self
            .client
            .put_records()
            .stream_name(&self.stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| BusError::call("PutRecords", e.into_service_error()))?;

        let failed = output.failed_record_count().unwrap_or(0).max(0) as usize;
        if failed > 0 {
            return Err(BusError::PartialFailure { failed, total });
        }
        Ok(())
    }
}

#[async_trait]
impl ShardReader for KinesisBus {
    async fn list_shards(&self) -> Result<Vec<String>, BusError> {
        let output = self
            .client
            .list_shards()
            .stream_name(&self.stream_name)
            .send()
            .await
            .map_err(|e| BusError::call("ListShards", e.into_service_error()))?;

        Ok(output
            .shards()
            .iter()
            .map(|s| s.shard_id().to_string())
            .collect())
    }

    async fn shard_iterator(&self, shard_id: &str, horizon: Horizon) -> Result<String, BusError> {
        let iterator_type = match horizon {
            Horizon::Latest => ShardIteratorType::Latest,
            Horizon::TrimHorizon => ShardIteratorType::TrimHorizon,
        };

        let output = self
            .client
            .get_shard_iterator()
            .stream_name(&self.stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(iterator_type)
            .send()
            .await
            .map_err(|e| BusError::call("GetShardIterator", e.into_service_error()))?;

        output
            .shard_iterator()
            .map(str::to_string)
            .ok_or(BusError::MissingField("ShardIterator"))
    }

    async fn get_records(&self, iterator: &str, limit: i32) -> Result<RecordBatch, BusError> {
        let output = self
            .client
            .get_records()
            .shard_iterator(iterator)
            .limit(limit)
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_expired_iterator_exception() {
                    BusError::ExpiredIterator
                } else {
                    BusError::call("GetRecords", err)
                }
            })?;

        Ok(RecordBatch {
            records: output
                .records()
                .iter()
                .map(|r| r.data().as_ref().to_vec())
                .collect(),
            next_iterator: output.next_shard_iterator().map(str::to_string),
        })
    }
}
