//! Cold object store for NDJSON trade batches

mod s3;

pub use s3::S3Store;

use async_trait::async_trait;
use thiserror::Error;

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Upload was rejected or did not complete
    #[error("upload of {key} failed: {message}")]
    Upload { key: String, message: String },
}

/// Blob store addressed by key
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;
}
