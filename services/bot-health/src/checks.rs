//! Individual health checks.
//!
//! Every check produces a [`CheckResult`]; only `Fail` makes a probe
//! unhealthy. Memory pressure is reported as `Warn` at most.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::HealthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub check: &'static str,
    pub outcome: Outcome,
    pub detail: String,
}

impl CheckResult {
    fn pass(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            outcome: Outcome::Pass,
            detail: detail.into(),
        }
    }

    fn warn(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            outcome: Outcome::Warn,
            detail: detail.into(),
        }
    }

    fn fail(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            outcome: Outcome::Fail,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.outcome {
            Outcome::Pass => "ok",
            Outcome::Warn => "WARN",
            Outcome::Fail => "FAIL",
        };
        write!(f, "{tag} {}: {}", self.check, self.detail)
    }
}

/// Look for a live process whose command line contains `pattern`.
///
/// The calling process is skipped so a pattern that happens to match the
/// health-check invocation itself cannot pass on its own.
pub fn check_process(proc_root: &Path, pattern: &str) -> CheckResult {
    let own_pid = std::process::id().to_string();

    let entries = match fs::read_dir(proc_root) {
        Ok(entries) => entries,
        Err(e) => {
            return CheckResult::fail(
                "process",
                format!("cannot read {}: {e}", proc_root.display()),
            )
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str() else { continue };
        if pid == own_pid || !pid.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }

        // Processes can exit between readdir and read.
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
        if cmdline.contains(pattern) {
            debug!(pid, cmdline = %cmdline.trim(), "main loop process found");
            return CheckResult::pass("process", format!("'{pattern}' running (pid {pid})"));
        }
    }

    CheckResult::fail("process", format!("no process matching '{pattern}'"))
}

/// Every directory exists and accepts a new file.
pub fn check_dirs(dirs: &[PathBuf]) -> Vec<CheckResult> {
    dirs.iter().map(|dir| check_writable(dir)).collect()
}

fn check_writable(dir: &Path) -> CheckResult {
    if !dir.is_dir() {
        return CheckResult::fail("directory", format!("{} does not exist", dir.display()));
    }

    let probe = dir.join(format!(".healthcheck-{}", std::process::id()));
    let result = fs::write(&probe, b"ok").and_then(|()| fs::remove_file(&probe));
    match result {
        Ok(()) => CheckResult::pass("directory", format!("{} writable", dir.display())),
        Err(e) => {
            let _ = fs::remove_file(&probe);
            CheckResult::fail("directory", format!("{} not writable: {e}", dir.display()))
        }
    }
}

/// Used space as a percentage of the space usable by unprivileged writers.
///
/// Matches `df`: blocks reserved for root count as neither used nor
/// available. Rounded up.
pub fn usage_percent(total: u64, free: u64, available: u64) -> u8 {
    let used = total.saturating_sub(free);
    let usable = used.saturating_add(available);
    if usable == 0 {
        return 0;
    }
    let percent = (u128::from(used) * 100).div_ceil(u128::from(usable));
    percent.min(100) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub available_blocks: u64,
}

impl DiskUsage {
    pub fn percent(&self) -> u8 {
        usage_percent(self.total_blocks, self.free_blocks, self.available_blocks)
    }
}

#[allow(clippy::useless_conversion)] // block counts are u32 on some targets
pub fn disk_usage(path: &Path) -> Result<DiskUsage, HealthError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|source| HealthError::Statvfs {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(DiskUsage {
        total_blocks: u64::from(stat.blocks()),
        free_blocks: u64::from(stat.blocks_free()),
        available_blocks: u64::from(stat.blocks_available()),
    })
}

/// Disk usage of each volume stays below the ceiling.
pub fn check_disk(volumes: &[PathBuf], ceiling: u8) -> Vec<CheckResult> {
    volumes
        .iter()
        .map(|volume| match disk_usage(volume) {
            Ok(usage) => evaluate_disk(volume, usage.percent(), ceiling),
            Err(e) => CheckResult::fail("disk", e.to_string()),
        })
        .collect()
}

fn evaluate_disk(volume: &Path, percent: u8, ceiling: u8) -> CheckResult {
    let detail = format!("{} {percent}% used (ceiling {ceiling}%)", volume.display());
    if percent >= ceiling {
        CheckResult::fail("disk", detail)
    } else {
        CheckResult::pass("disk", detail)
    }
}

/// Memory in bytes: `(used, limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used: u64,
    pub limit: u64,
}

impl MemoryUsage {
    pub fn percent(&self) -> u8 {
        if self.limit == 0 {
            return 0;
        }
        let percent = (u128::from(self.used) * 100).div_ceil(u128::from(self.limit));
        percent.min(100) as u8
    }
}

/// Read the cgroup v2 limit; `None` when unlimited or not available.
pub fn cgroup_memory(cgroup_root: &Path) -> Option<MemoryUsage> {
    let max = fs::read_to_string(cgroup_root.join("memory.max")).ok()?;
    let limit: u64 = max.trim().parse().ok()?;
    let current = fs::read_to_string(cgroup_root.join("memory.current")).ok()?;
    let used: u64 = current.trim().parse().ok()?;
    Some(MemoryUsage { used, limit })
}

/// Parse `/proc/meminfo` into `(total, available)` bytes.
pub fn parse_meminfo(content: &str) -> (u64, u64) {
    let mut total = 0;
    let mut available = None;
    let mut free = 0;
    let mut buffers = 0;
    let mut cached = 0;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            const KB_TO_BYTES: u64 = 1024;
            let value: u64 = parts[1].parse::<u64>().unwrap_or(0) * KB_TO_BYTES;
            match parts[0] {
                "MemTotal:" => total = value,
                "MemAvailable:" => available = Some(value),
                "MemFree:" => free = value,
                "Buffers:" => buffers = value,
                "Cached:" => cached = value,
                _ => {}
            }
        }
    }

    (total, available.unwrap_or(free + buffers + cached))
}

pub fn memory_usage(cgroup_root: &Path, proc_root: &Path) -> Option<MemoryUsage> {
    if let Some(usage) = cgroup_memory(cgroup_root) {
        return Some(usage);
    }

    let content = fs::read_to_string(proc_root.join("meminfo")).ok()?;
    let (total, available) = parse_meminfo(&content);
    (total > 0).then(|| MemoryUsage {
        used: total.saturating_sub(available),
        limit: total,
    })
}

/// Memory usage against the soft ceiling. Never fails.
pub fn check_memory(cgroup_root: &Path, proc_root: &Path, soft_ceiling: u8) -> CheckResult {
    let Some(usage) = memory_usage(cgroup_root, proc_root) else {
        return CheckResult::warn("memory", "usage unavailable");
    };

    let percent = usage.percent();
    let detail = format!(
        "{percent}% of {} MiB used (soft ceiling {soft_ceiling}%)",
        usage.limit / (1024 * 1024)
    );
    if percent >= soft_ceiling {
        warn!(percent, soft_ceiling, "memory above soft ceiling");
        CheckResult::warn("memory", detail)
    } else {
        CheckResult::pass("memory", detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn usage_percent_matches_df() {
        // 100 blocks, 20 free of which 10 usable: 80 / 90.
        assert_eq!(usage_percent(100, 20, 10), 89);
        assert_eq!(usage_percent(100, 100, 100), 0);
        assert_eq!(usage_percent(100, 0, 0), 100);
        assert_eq!(usage_percent(0, 0, 0), 0);
    }

    #[test]
    fn disk_ceiling_is_inclusive() {
        let path = Path::new("/app/data");
        assert_eq!(evaluate_disk(path, 89, 90).outcome, Outcome::Pass);
        assert_eq!(evaluate_disk(path, 90, 90).outcome, Outcome::Fail);
    }

    #[test]
    fn disk_check_on_real_directory() {
        let dir = tempdir().unwrap();
        let results = check_disk(&[dir.path().to_path_buf()], 100);
        assert_eq!(results.len(), 1);
        assert_ne!(results[0].check, "");
        assert!(disk_usage(dir.path()).unwrap().total_blocks > 0);
    }

    #[test]
    fn missing_volume_fails() {
        let results = check_disk(&[PathBuf::from("/definitely/not/here")], 90);
        assert_eq!(results[0].outcome, Outcome::Fail);
    }

    #[test]
    fn process_found_in_proc_tree() {
        let proc_root = tempdir().unwrap();
        for (pid, cmdline) in [("1", "tini\0--\0"), ("42", "python\0scheduler.py\0")] {
            let dir = proc_root.path().join(pid);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("cmdline"), cmdline).unwrap();
        }
        fs::create_dir(proc_root.path().join("self")).unwrap();

        let found = check_process(proc_root.path(), "scheduler.py");
        assert_eq!(found.outcome, Outcome::Pass);
        assert!(found.detail.contains("pid 42"));

        let missing = check_process(proc_root.path(), "main.py");
        assert_eq!(missing.outcome, Outcome::Fail);
    }

    #[test]
    fn dirs_must_exist_and_be_writable() {
        let dir = tempdir().unwrap();
        let results = check_dirs(&[dir.path().to_path_buf(), dir.path().join("missing")]);

        assert_eq!(results[0].outcome, Outcome::Pass);
        assert_eq!(results[1].outcome, Outcome::Fail);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn cgroup_limit_preferred_over_meminfo() {
        let cgroup = tempdir().unwrap();
        let proc_root = tempdir().unwrap();
        fs::write(cgroup.path().join("memory.max"), "1073741824\n").unwrap();
        fs::write(cgroup.path().join("memory.current"), "536870912\n").unwrap();

        let usage = memory_usage(cgroup.path(), proc_root.path()).unwrap();
        assert_eq!(usage.percent(), 50);
    }

    #[test]
    fn unlimited_cgroup_falls_back_to_meminfo() {
        let cgroup = tempdir().unwrap();
        let proc_root = tempdir().unwrap();
        fs::write(cgroup.path().join("memory.max"), "max\n").unwrap();
        fs::write(cgroup.path().join("memory.current"), "1\n").unwrap();
        fs::write(
            proc_root.path().join("meminfo"),
            "MemTotal:       1000 kB\nMemAvailable:    250 kB\n",
        )
        .unwrap();

        let usage = memory_usage(cgroup.path(), proc_root.path()).unwrap();
        assert_eq!(usage.percent(), 75);
    }

    #[test]
    fn memory_over_ceiling_only_warns() {
        let cgroup = tempdir().unwrap();
        fs::write(cgroup.path().join("memory.max"), "100").unwrap();
        fs::write(cgroup.path().join("memory.current"), "99").unwrap();

        let result = check_memory(cgroup.path(), Path::new("/nonexistent"), 90);
        assert_eq!(result.outcome, Outcome::Warn);

        let unknown = check_memory(Path::new("/nonexistent"), Path::new("/nonexistent"), 90);
        assert_eq!(unknown.outcome, Outcome::Warn);
    }

    #[test]
    fn parse_meminfo_without_available() {
        let sample = "MemTotal: 2000 kB\nMemFree: 500 kB\nBuffers: 100 kB\nCached: 400 kB\n";
        assert_eq!(parse_meminfo(sample), (2000 * 1024, 1000 * 1024));
    }
}
