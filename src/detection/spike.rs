//! Windowed z-score spike detector

use serde::Deserialize;

/// Detector parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SpikeConfig {
    /// Number of trailing per-second counts considered
    pub window: usize,
    /// One-sided z-score threshold
    pub threshold: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            window: 30,
            threshold: 3.0,
        }
    }
}

impl SpikeConfig {
    /// Evaluate the tail of `series` with this configuration
    pub fn evaluate(&self, series: &[u64]) -> (bool, f64) {
        zscore_spike(series, self.window, self.threshold)
    }
}

/// Z-score of the last element of `series` against its trailing window.
///
/// Returns `(false, 0.0)` until the series holds at least `window` values.
/// A zero standard deviation is replaced with `1.0`, so a flat series never
/// divides by zero and never signals. Only the upper tail can trigger.
pub fn zscore_spike(series: &[u64], window: usize, threshold: f64) -> (bool, f64) {
    if window == 0 || series.len() < window {
        return (false, 0.0);
    }

    let tail = &series[series.len() - window..];
    let n = window as f64;

    let mean = tail.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = tail
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / (window.saturating_sub(1).max(1)) as f64;

    let mut sd = var.sqrt();
    if sd == 0.0 {
        sd = 1.0;
    }

    let last = tail[window - 1] as f64;
    let z = (last - mean) / sd;

    (z >= threshold, z)
}

/// Round a z-score to four decimals for publication
pub fn round_z(z: f64) -> f64 {
    (z * 10_000.0).round() / 10_000.0
}
