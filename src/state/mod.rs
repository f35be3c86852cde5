//! State store
//!
//! A directory holding `metrics.json` (latest snapshot, replaced atomically)
//! and `alerts.ndjson` (append-only alert log). The consumer is the only
//! writer; the read API only reads.

mod atomic;
mod types;

pub use atomic::{write_atomic, RenamePolicy};
pub use types::{Alert, MetricsSnapshot};

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Metrics document file name
pub const METRICS_FILE: &str = "metrics.json";
/// Alert log file name
pub const ALERTS_FILE: &str = "alerts.ndjson";

/// State store errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state dir {path}: {source}")]
    Dir { path: PathBuf, source: io::Error },
    #[error("write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Handle on the state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    metrics_path: PathBuf,
    alerts_path: PathBuf,
    rename_policy: RenamePolicy,
}

impl StateStore {
    /// Open the store, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StateError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StateError::Dir {
                path: dir.clone(),
                source,
            })?;

        Ok(Self {
            metrics_path: dir.join(METRICS_FILE),
            alerts_path: dir.join(ALERTS_FILE),
            dir,
            rename_policy: RenamePolicy::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }

    pub fn alerts_path(&self) -> &Path {
        &self.alerts_path
    }

    /// Atomically replace the metrics document
    pub async fn write_metrics(&self, snapshot: &MetricsSnapshot) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(snapshot)?;
        write_atomic(&self.metrics_path, &bytes, self.rename_policy)
            .await
            .map_err(|source| StateError::Write {
                path: self.metrics_path.clone(),
                source,
            })
    }

    /// Append one alert line
    pub async fn append_alert(&self, alert: &Alert) -> Result<(), StateError> {
        let mut line = serde_json::to_vec(alert)?;
        line.push(b'\n');

        let write = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.alerts_path)
                .await?;
            file.write_all(&line).await?;
            file.flush().await
        };

        write.await.map_err(|source| StateError::Write {
            path: self.alerts_path.clone(),
            source,
        })
    }

    /// Current snapshot; `None` while missing or unreadable
    pub async fn read_metrics(&self) -> Option<MetricsSnapshot> {
        let bytes = fs::read(&self.metrics_path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::debug!(error = %e, "Metrics document not ready");
                None
            }
        }
    }

    /// Up to `limit` most recent alerts, newest first
    pub async fn read_alerts(&self, limit: usize) -> Vec<Alert> {
        if limit == 0 {
            return Vec::new();
        }
        let Ok(content) = fs::read_to_string(&self.alerts_path).await else {
            return Vec::new();
        };

        content
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .take(limit)
            .collect()
    }
}
