//! Host machine snapshot for the overview page.

use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub platform: &'static str,
    pub uptime_seconds: u64,
    pub loadavg: [f64; 3],
    pub cpu_count: usize,
    pub memory: MemoryInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_pct: f64,
}

impl MemoryInfo {
    pub fn new(total: u64, free: u64) -> Self {
        let free = free.min(total);
        let used = total - free;
        let used_pct = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        Self {
            total,
            used,
            free,
            used_pct,
        }
    }
}

/// Blocking: refreshes CPU and memory counters.
pub fn snapshot() -> HostInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu();
    let load = System::load_average();

    HostInfo {
        platform: std::env::consts::OS,
        uptime_seconds: System::uptime(),
        loadavg: [load.one, load.five, load.fifteen],
        cpu_count: sys.cpus().len(),
        memory: MemoryInfo::new(sys.total_memory(), sys.available_memory()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_percentage_two_decimals() {
        let mem = MemoryInfo::new(3_000, 1_000);
        assert_eq!(mem.used, 2_000);
        assert_eq!(mem.used_pct, 66.67);
        assert_eq!(MemoryInfo::new(0, 0).used_pct, 0.0);
        assert_eq!(MemoryInfo::new(10, 20).used, 0);
    }

    #[test]
    fn snapshot_is_sane() {
        let host = snapshot();
        assert!(!host.platform.is_empty());
        assert!(host.memory.used <= host.memory.total);
    }
}
