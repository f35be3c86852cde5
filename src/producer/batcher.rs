//! In-memory buffer for cold-store uploads

use crate::feed::{normalize_symbol, TradeRecord};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Why a flush is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Buffer reached the batch size
    Size,
    /// Flush interval elapsed since the last upload
    Interval,
}

/// Buffers records until either the size or the time trigger fires
#[derive(Debug)]
pub struct ObjectBatcher {
    buffer: Vec<TradeRecord>,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
    /// Set after a failed upload; neither trigger fires before it
    retry_after: Option<Instant>,
}

impl ObjectBatcher {
    /// Create an empty batcher; the interval is measured from `now`
    pub fn new(batch_size: usize, flush_interval: Duration, now: Instant) -> Self {
        Self {
            buffer: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            flush_interval,
            last_flush: now,
            retry_after: None,
        }
    }

    pub fn push(&mut self, record: TradeRecord) {
        self.buffer.push(record);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.buffer
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    /// Check both triggers; an empty buffer is never due
    pub fn due(&self, now: Instant) -> Option<FlushReason> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.retry_after.is_some_and(|at| now < at) {
            return None;
        }
        if self.buffer.len() >= self.batch_size {
            return Some(FlushReason::Size);
        }
        if now.saturating_duration_since(self.last_flush) >= self.flush_interval {
            return Some(FlushReason::Interval);
        }
        None
    }

    /// NDJSON body of the buffered records, no trailing newline
    pub fn body(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut body = Vec::with_capacity(self.buffer.len() * 160);
        for (i, rec) in self.buffer.iter().enumerate() {
            if i > 0 {
                body.push(b'\n');
            }
            serde_json::to_writer(&mut body, rec)?;
        }
        Ok(body)
    }

    /// Drop the buffered records after a successful upload
    pub fn mark_flushed(&mut self, now: Instant) {
        self.buffer.clear();
        self.last_flush = now;
        self.retry_after = None;
    }

    /// Hold the buffer after a failed upload; triggers pause for one interval
    pub fn mark_failed(&mut self, now: Instant) {
        self.retry_after = Some(now + self.flush_interval);
    }
}

/// Object key: `<provider>/<symbol>/YYYY/MM/DD/HH/MM/<unix-seconds>.ndjson`
pub fn object_key(provider: &str, symbol: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}/{}.ndjson",
        provider,
        normalize_symbol(symbol),
        at.format("%Y/%m/%d/%H/%M"),
        at.timestamp()
    )
}
