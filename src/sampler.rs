use crate::error::CollectError;
use crate::metrics::{bytes_to_gb, now_timestamp_ms, round1, round2, MetricsSnapshot, BYTES_PER_MB};
use crate::provider::{IoCounters, MetricsProvider};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Last cumulative counters seen, and when. Only replaced after a fully
/// successful collect.
#[derive(Clone, Copy, Debug)]
struct CounterBaseline {
    disk: Option<IoCounters>,
    disk_at: Instant,
    net: Option<IoCounters>,
    net_at: Instant,
}

/// Turns cumulative OS counters into per-tick rates.
pub struct RateSampler<P> {
    provider: P,
    mount_point: PathBuf,
    baseline: CounterBaseline,
}

impl<P: MetricsProvider> RateSampler<P> {
    pub fn new(provider: P, mount_point: impl Into<PathBuf>) -> Self {
        Self::new_at(provider, mount_point, Instant::now())
    }

    /// Primes CPU usage and records the initial counter baseline at `now`.
    ///
    /// Priming failures are logged, not returned: a family that could not be
    /// read starts without a baseline and reports zero rates on the first tick.
    pub fn new_at(mut provider: P, mount_point: impl Into<PathBuf>, now: Instant) -> Self {
        if let Err(e) = provider.cpu_percent() {
            warn!("CPU priming read failed: {}", e);
        }
        let disk = provider.disk_io().unwrap_or_else(|e| {
            warn!("Initial disk I/O read failed: {}", e);
            None
        });
        let net = provider.net_io().unwrap_or_else(|e| {
            warn!("Initial network I/O read failed: {}", e);
            None
        });

        Self {
            provider,
            mount_point: mount_point.into(),
            baseline: CounterBaseline {
                disk,
                disk_at: now,
                net,
                net_at: now,
            },
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn collect(&mut self) -> Result<MetricsSnapshot, CollectError> {
        self.collect_at(Instant::now())
    }

    /// Reads everything first and touches the baseline last, so any error
    /// leaves the previous baseline in place.
    pub fn collect_at(&mut self, now: Instant) -> Result<MetricsSnapshot, CollectError> {
        let cpu = self.provider.cpu_percent()?;
        let mem = self.provider.memory()?;
        let fs = self.provider.filesystem(&self.mount_point)?;
        let disk = self.provider.disk_io()?;
        let net = self.provider.net_io()?;

        let disk_secs = now
            .saturating_duration_since(self.baseline.disk_at)
            .as_secs_f64();
        let net_secs = now
            .saturating_duration_since(self.baseline.net_at)
            .as_secs_f64();
        let (disk_read_rate, disk_write_rate) =
            pair_rates(self.baseline.disk, disk, disk_secs, "Disk");
        let (net_recv_rate, net_sent_rate) = pair_rates(self.baseline.net, net, net_secs, "Network");

        self.baseline = CounterBaseline {
            disk,
            disk_at: now,
            net,
            net_at: now,
        };

        let ram_used = mem.total_bytes.saturating_sub(mem.available_bytes);
        let fs_denominator = fs.used_bytes.saturating_add(fs.free_bytes);

        let snapshot = MetricsSnapshot {
            cpu_percent: round1(cpu),
            ram_percent: round1(percent(ram_used, mem.total_bytes)),
            ram_used_gb: bytes_to_gb(ram_used),
            ram_total_gb: bytes_to_gb(mem.total_bytes),
            disk_percent: round1(percent(fs.used_bytes, fs_denominator)),
            disk_used_gb: bytes_to_gb(fs.used_bytes),
            disk_free_gb: bytes_to_gb(fs.free_bytes),
            disk_total_gb: bytes_to_gb(fs.total_bytes),
            disk_read_rate,
            disk_write_rate,
            net_recv_rate,
            net_sent_rate,
            timestamp_ms: now_timestamp_ms(),
        };
        debug!(?snapshot, "Collected metrics");
        Ok(snapshot)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn pair_rates(
    previous: Option<IoCounters>,
    current: Option<IoCounters>,
    elapsed_secs: f64,
    label: &str,
) -> (f64, f64) {
    match (previous, current) {
        (Some(prev), Some(cur)) => (
            rate_mb_per_sec(prev.rx_bytes, cur.rx_bytes, elapsed_secs, label),
            rate_mb_per_sec(prev.tx_bytes, cur.tx_bytes, elapsed_secs, label),
        ),
        _ => (0.0, 0.0),
    }
}

/// Average MB/s between two cumulative readings, rounded to two decimals.
/// Zero when no time passed or the counter went backwards.
pub fn rate_mb_per_sec(previous: u64, current: u64, elapsed_secs: f64, label: &str) -> f64 {
    if elapsed_secs.is_nan() || elapsed_secs <= 0.0 {
        return 0.0;
    }
    match current.checked_sub(previous) {
        Some(delta) => round2(delta as f64 / (elapsed_secs * BYTES_PER_MB)),
        None => {
            warn!("{} counter decreased; possible counter reset", label);
            0.0
        }
    }
}
