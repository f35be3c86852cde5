//! Spike detection
//!
//! Z-score detector over the per-second trade count series

mod spike;

pub use spike::{round_z, zscore_spike, SpikeConfig};
