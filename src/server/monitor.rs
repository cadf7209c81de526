use crate::registry::ServerEntry;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::{Disks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resource usage of a managed process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStats {
    /// Process id
    pub pid: u32,
    /// Executable name as reported by the OS
    pub name: String,
    /// CPU usage in percent since the previous sample
    pub cpu_percent: f32,
    /// Resident memory in bytes
    pub memory_bytes: u64,
    /// Time since the process started
    pub run_time: Duration,
}

/// Process usage, or why it is not available.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessUsage {
    /// The process is running and was sampled
    Available(ProcessStats),
    /// Nothing is running for this entry
    Unavailable,
}

/// Space on one mounted disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskStats {
    /// Mount point
    pub mount_point: PathBuf,
    /// Total size in bytes
    pub total_bytes: u64,
    /// Available bytes
    pub available_bytes: u64,
}

/// Host wide resource figures.
#[derive(Debug, Clone, PartialEq)]
pub struct HostStats {
    /// Host name, when the OS reports one
    pub host_name: Option<String>,
    /// Total memory in bytes
    pub total_memory: u64,
    /// Used memory in bytes
    pub used_memory: u64,
    /// Mounted disks
    pub disks: Vec<DiskStats>,
    /// Time since boot
    pub uptime: Duration,
    /// 1, 5 and 15 minute load averages
    pub load_average: [f64; 3],
}

/// Result of administering one entry.
#[derive(Debug, Clone)]
pub struct AdminReport {
    /// Reconciled entry
    pub entry: ServerEntry,
    /// Live usage of its process
    pub process: ProcessUsage,
    /// Whether its port accepts connections; `None` without a port
    pub port_in_use: Option<bool>,
    /// Host figures
    pub host: HostStats,
}

/// Samples process and host resources on demand.
///
/// Keeps one `sysinfo::System` so repeated samples of the same process
/// yield CPU figures relative to the previous one.
pub struct ResourceMonitor {
    system: System,
}

impl ResourceMonitor {
    /// Create a new monitor
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Sample a process. `Unavailable` when it does not exist.
    pub fn process_usage(&mut self, pid: Option<u32>) -> ProcessUsage {
        let Some(pid) = pid else {
            return ProcessUsage::Unavailable;
        };

        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );

        match self.system.process(sys_pid) {
            Some(process) => ProcessUsage::Available(ProcessStats {
                pid,
                name: process.name().to_string_lossy().into_owned(),
                cpu_percent: process.cpu_usage(),
                memory_bytes: process.memory(),
                run_time: Duration::from_secs(process.run_time()),
            }),
            None => {
                tracing::debug!(pid, "Process not found while sampling");
                ProcessUsage::Unavailable
            }
        }
    }

    /// Sample host memory, disks, uptime and load.
    pub fn host_stats(&mut self) -> HostStats {
        self.system.refresh_memory();
        let disks = Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|disk| DiskStats {
                mount_point: disk.mount_point().to_path_buf(),
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            })
            .collect();
        let load = System::load_average();

        HostStats {
            host_name: System::host_name(),
            total_memory: self.system.total_memory(),
            used_memory: self.system.used_memory(),
            disks,
            uptime: Duration::from_secs(System::uptime()),
            load_average: [load.one, load.five, load.fifteen],
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a byte count with a binary unit.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn test_no_pid_is_unavailable() {
        let mut monitor = ResourceMonitor::new();
        assert_eq!(monitor.process_usage(None), ProcessUsage::Unavailable);
    }

    #[test]
    fn test_own_process_is_available() {
        let mut monitor = ResourceMonitor::new();
        match monitor.process_usage(Some(std::process::id())) {
            ProcessUsage::Available(stats) => assert_eq!(stats.pid, std::process::id()),
            ProcessUsage::Unavailable => panic!("own process should be visible"),
        }
    }

    #[test]
    fn test_host_stats_report_memory() {
        let stats = ResourceMonitor::new().host_stats();
        assert!(stats.total_memory > 0);
    }
}
