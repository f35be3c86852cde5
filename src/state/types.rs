//! Documents persisted in the state directory

use serde::{Deserialize, Serialize};

/// Latest detector output, overwritten on every finalized second or heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Wall-clock write time, ms since epoch
    pub last_updated_ms: i64,
    /// Trade count of the last finalized second (0 on heartbeat)
    pub trades_per_sec: u64,
    pub window_size: usize,
    /// Z-score rounded to four decimals
    pub z: f64,
    pub is_spike: bool,
}

impl MetricsSnapshot {
    /// Idle snapshot written when no records arrive
    pub fn heartbeat(last_updated_ms: i64, window_size: usize) -> Self {
        Self {
            last_updated_ms,
            trades_per_sec: 0,
            window_size,
            z: 0.0,
            is_spike: false,
        }
    }
}

/// One detected spike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub ts_ms: i64,
    pub count: u64,
    pub z: f64,
}
