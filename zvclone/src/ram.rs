//! Host RAM admission gate for VM clones.
//!
//! The projection is advisory: an over-threshold result surfaces a
//! confirmation to the operator, it never aborts on its own. Container
//! clones skip the gate entirely.

use sysinfo::System;
use zvclone_core::command::{is_tool_installed, run_capture};
use zvclone_core::zv_warning;

pub const RAM_THRESHOLD_PERCENT: u64 = 90;

/// Fallback reservation assumed when an instance declares no memory field.
pub const FALLBACK_INSTANCE_MB: u64 = 512;

/// Outcome of the RAM projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamCheck {
    pub ok: bool,
    pub projected_mb: u64,
    pub threshold_mb: u64,
}

/// Project host memory usage if the cloned instance were started.
pub fn check(
    total_host_mb: u64,
    sum_running_mb: u64,
    instance_mb: u64,
    threshold_percent: u64,
) -> RamCheck {
    let projected_mb = sum_running_mb + instance_mb;
    let threshold_mb = total_host_mb * threshold_percent / 100;
    RamCheck {
        ok: projected_mb <= threshold_mb,
        projected_mb,
        threshold_mb,
    }
}

/// Total physical memory of this host in MB.
pub fn total_host_mb() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory() / (1024 * 1024);
    if total == 0 {
        None
    } else {
        Some(total)
    }
}

/// Sum of memory reserved by currently running VMs, in MB, from the
/// instance manager's listing. `None` when the listing is unavailable.
pub fn sum_running_mb() -> Option<u64> {
    if !is_tool_installed("qm") {
        return None;
    }
    let output = match run_capture("qm", &["list", "--full"]) {
        Ok(output) => output,
        Err(e) => {
            zv_warning!("could not list running VMs: {}", e);
            return None;
        }
    };
    parse_running_sum(&output)
}

/// Parse the tabular `list --full` output: sum the memory column (bytes)
/// over rows in state `running`.
pub fn parse_running_sum(output: &str) -> Option<u64> {
    let mut lines = output.lines();
    let header: Vec<String> = lines
        .next()?
        .split_whitespace()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    let mem_index = ["maxmem", "mem"]
        .iter()
        .find_map(|col| header.iter().position(|h| h == col))?;

    let mut sum_mb = 0u64;
    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() <= mem_index || !parts.contains(&"running") {
            continue;
        }
        match parts[mem_index].parse::<u64>() {
            Ok(bytes) => sum_mb += bytes / (1024 * 1024),
            Err(_) => zv_warning!("unparseable memory value in listing row: {}", line),
        }
    }
    Some(sum_mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_under_threshold() {
        let result = check(16000, 8000, 2000, 90);
        assert_eq!(result.projected_mb, 10000);
        assert_eq!(result.threshold_mb, 14400);
        assert!(result.ok);
    }

    #[test]
    fn test_projection_over_threshold() {
        let result = check(16000, 14000, 2000, 90);
        assert_eq!(result.projected_mb, 16000);
        assert_eq!(result.threshold_mb, 14400);
        assert!(!result.ok);
    }

    #[test]
    fn test_projection_at_threshold_is_ok() {
        let result = check(10000, 7000, 2000, 90);
        assert_eq!(result.threshold_mb, 9000);
        assert!(result.ok);
    }

    #[test]
    fn test_parse_running_sum() {
        let listing = "\
  VMID NAME       STATUS     MEM(MB)    MAXMEM     BOOTDISK(GB) PID
   100 web01      running    2048       2147483648 32.00        1234
   101 db01       stopped    4096       4294967296 64.00        0
   102 cache01    running    1024       1073741824 16.00        5678
";
        assert_eq!(parse_running_sum(listing), Some(2048 + 1024));
    }

    #[test]
    fn test_parse_running_sum_without_memory_column() {
        let listing = "VMID NAME STATUS\n100 web01 running\n";
        assert_eq!(parse_running_sum(listing), None);
    }
}
