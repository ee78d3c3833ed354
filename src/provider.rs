use crate::error::ProviderError;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use sysinfo::{DiskRefreshKind, Disks, Networks, System};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FilesystemUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// Cumulative byte counters. For disks `rx` is bytes read and `tx` bytes written;
/// for networks `rx` is bytes received and `tx` bytes sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct IoCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Source of raw host readings. Every call may fail.
pub trait MetricsProvider {
    /// Global CPU busy percentage over the window since the previous call.
    fn cpu_percent(&mut self) -> Result<f64, ProviderError>;
    fn memory(&mut self) -> Result<MemoryUsage, ProviderError>;
    fn filesystem(&mut self, mount_point: &Path) -> Result<FilesystemUsage, ProviderError>;
    /// `None` when the platform exposes no disk counters.
    fn disk_io(&mut self) -> Result<Option<IoCounters>, ProviderError>;
    /// `None` when there are no network interfaces.
    fn net_io(&mut self) -> Result<Option<IoCounters>, ProviderError>;
}

pub struct SysinfoProvider {
    sys: System,
    disks: Disks,
    networks: Networks,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            disks: Disks::new_with_refreshed_list_specifics(DiskRefreshKind::everything()),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn ensure_supported() -> Result<(), ProviderError> {
        if sysinfo::IS_SUPPORTED_SYSTEM {
            Ok(())
        } else {
            Err(ProviderError::Unsupported)
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SysinfoProvider {
    fn cpu_percent(&mut self) -> Result<f64, ProviderError> {
        Self::ensure_supported()?;
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(ProviderError::Unavailable("cpu"));
        }
        Ok(busy_percent(self.sys.global_cpu_usage()))
    }

    fn memory(&mut self) -> Result<MemoryUsage, ProviderError> {
        Self::ensure_supported()?;
        self.sys.refresh_memory();
        let total_bytes = self.sys.total_memory();
        if total_bytes == 0 {
            return Err(ProviderError::Unavailable("memory"));
        }
        Ok(MemoryUsage {
            total_bytes,
            available_bytes: self.sys.available_memory().min(total_bytes),
        })
    }

    fn filesystem(&mut self, mount_point: &Path) -> Result<FilesystemUsage, ProviderError> {
        Self::ensure_supported()?;
        self.disks.refresh_specifics(true, DiskRefreshKind::everything());
        let disk = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == mount_point)
            .ok_or_else(|| ProviderError::MountNotFound(mount_point.display().to_string()))?;
        // sysinfo only reports space available to unprivileged users, so
        // root-reserved blocks land in `used` rather than `free`.
        let total_bytes = disk.total_space();
        let free_bytes = disk.available_space().min(total_bytes);
        Ok(FilesystemUsage {
            total_bytes,
            used_bytes: total_bytes - free_bytes,
            free_bytes,
        })
    }

    fn disk_io(&mut self) -> Result<Option<IoCounters>, ProviderError> {
        Self::ensure_supported()?;
        self.disks.refresh_specifics(true, DiskRefreshKind::everything());
        let list = self.disks.list();
        if list.is_empty() {
            return Ok(None);
        }
        Ok(Some(sum_per_device(list.iter().map(|d| {
            let usage = d.usage();
            (
                d.name(),
                IoCounters {
                    rx_bytes: usage.total_read_bytes,
                    tx_bytes: usage.total_written_bytes,
                },
            )
        }))))
    }

    fn net_io(&mut self) -> Result<Option<IoCounters>, ProviderError> {
        Self::ensure_supported()?;
        self.networks.refresh(true);
        let list = self.networks.list();
        if list.is_empty() {
            return Ok(None);
        }
        let counters = list.values().fold(IoCounters::default(), |acc, n| IoCounters {
            rx_bytes: acc.rx_bytes.saturating_add(n.total_received()),
            tx_bytes: acc.tx_bytes.saturating_add(n.total_transmitted()),
        });
        Ok(Some(counters))
    }
}

/// Non-finite readings count as idle.
fn busy_percent(raw: f32) -> f64 {
    let value = f64::from(raw);
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// `Disks` has one entry per mount point, so a device mounted twice appears
/// twice with the same counters. Only the first entry per device counts.
fn sum_per_device<'a>(entries: impl IntoIterator<Item = (&'a OsStr, IoCounters)>) -> IoCounters {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|(device, _)| seen.insert(*device))
        .fold(IoCounters::default(), |acc, (_, c)| IoCounters {
            rx_bytes: acc.rx_bytes.saturating_add(c.rx_bytes),
            tx_bytes: acc.tx_bytes.saturating_add(c.tx_bytes),
        })
}

/// One-line description of the host for the startup banner.
pub fn platform_summary() -> String {
    format!(
        "{} {} ({})",
        System::name().unwrap_or_else(|| "unknown".to_string()),
        System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
        std::env::consts::ARCH
    )
}
