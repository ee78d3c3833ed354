use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes in one MB as used by every rate field (binary megabyte).
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
/// Bytes in one GB as used by every capacity field (binary gigabyte).
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One tick worth of host metrics. Built by the sampler, consumed once, dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub ram_total_gb: f64,
    pub disk_percent: f64,
    pub disk_used_gb: f64,
    pub disk_free_gb: f64,
    pub disk_total_gb: f64,
    /// MB/s averaged over the interval since the previous sample.
    pub disk_read_rate: f64,
    pub disk_write_rate: f64,
    pub net_recv_rate: f64,
    pub net_sent_rate: f64,
    pub timestamp_ms: u128,
}

/// Percentages carry one decimal.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rates and GB figures carry two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

/// Wall-clock stamp for a snapshot. A clock set before 1970 yields 0.
pub fn now_timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_millis())
        .unwrap_or_else(|err| {
            tracing::warn!("System clock is behind the Unix epoch by {:?}", err.duration());
            0
        })
}
