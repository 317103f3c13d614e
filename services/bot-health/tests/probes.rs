//! Probe behaviour against a fake instance filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use bot_health::{marker, run_probe, HealthConfig, Outcome, Probe};
use rstest::rstest;
use tempfile::TempDir;

struct Instance {
    root: TempDir,
}

impl Instance {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["proc", "cgroup", "app/data", "app/videos", "app/logs", "run/bot"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        fs::write(root.path().join("cgroup/memory.max"), "1000\n").unwrap();
        fs::write(root.path().join("cgroup/memory.current"), "100\n").unwrap();
        Self { root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    fn spawn(&self, pid: u32, cmdline: &str) {
        let dir = self.path(&format!("proc/{pid}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cmdline"), cmdline.replace(' ', "\0")).unwrap();
    }

    fn config(&self) -> HealthConfig {
        let root = self.root.path().to_str().unwrap().to_string();
        let vars = [
            ("HEALTH_PROC_ROOT", format!("{root}/proc")),
            ("HEALTH_CGROUP_ROOT", format!("{root}/cgroup")),
            (
                "HEALTH_REQUIRED_DIRS",
                format!("{root}/app/data:{root}/app/videos:{root}/app/logs"),
            ),
            ("HEALTH_VOLUMES", format!("{root}/app/data")),
            ("HEALTH_DISK_CEILING_PERCENT", "100".to_string()),
            ("HEALTH_MEMORY_SOFT_CEILING_PERCENT", "50".to_string()),
            ("READY_MARKER", format!("{root}/run/bot/ready")),
        ];
        HealthConfig::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }
}

fn outcomes(report: &bot_health::Report) -> Vec<(&'static str, Outcome)> {
    report.results.iter().map(|r| (r.check, r.outcome)).collect()
}

#[test]
fn startup_passes_with_running_main_loop() {
    let instance = Instance::new();
    instance.spawn(7, "python -u scheduler.py --config /app/config/config.json");

    let report = run_probe(Probe::Startup, &instance.config());

    assert!(report.healthy(), "{:?}", report.results);
    assert_eq!(
        outcomes(&report),
        vec![
            ("process", Outcome::Pass),
            ("directory", Outcome::Pass),
            ("directory", Outcome::Pass),
            ("directory", Outcome::Pass),
        ]
    );
}

#[test]
fn startup_fails_without_main_loop() {
    let instance = Instance::new();
    instance.spawn(7, "sleep infinity");

    let report = run_probe(Probe::Startup, &instance.config());

    assert!(!report.healthy());
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.failures().next().unwrap().check, "process");
}

#[test]
fn missing_working_directory_fails_startup() {
    let instance = Instance::new();
    instance.spawn(7, "python scheduler.py");
    fs::remove_dir(instance.path("app/logs")).unwrap();

    let report = run_probe(Probe::Startup, &instance.config());

    assert!(!report.healthy());
    let failed: Vec<_> = report.failures().map(|r| r.detail.clone()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].contains("app/logs"));
}

#[test]
fn liveness_adds_disk_and_memory() {
    let instance = Instance::new();
    instance.spawn(7, "python scheduler.py");

    let report = run_probe(Probe::Liveness, &instance.config());
    let checks: Vec<&str> = report.results.iter().map(|r| r.check).collect();

    assert!(checks.contains(&"disk"));
    assert_eq!(checks.last(), Some(&"memory"));
    assert_eq!(report.results.last().unwrap().outcome, Outcome::Pass);
}

#[test]
fn memory_pressure_never_fails_liveness() {
    let instance = Instance::new();
    instance.spawn(7, "python scheduler.py");
    fs::write(instance.path("cgroup/memory.current"), "990\n").unwrap();

    let report = run_probe(Probe::Liveness, &instance.config());

    let memory = report.results.iter().find(|r| r.check == "memory").unwrap();
    assert_eq!(memory.outcome, Outcome::Warn);
    assert!(report.failures().all(|r| r.check != "memory"));
}

#[rstest]
#[case::absent(false, false)]
#[case::present(true, true)]
fn readiness_follows_marker(#[case] marked: bool, #[case] healthy: bool) {
    let instance = Instance::new();
    let config = instance.config();
    if marked {
        marker::mark_ready(&config.ready_marker).unwrap();
    }

    let report = run_probe(Probe::Readiness, &config);

    assert_eq!(report.healthy(), healthy);
    assert_eq!(report.results.len(), 1);
}

#[test]
fn readiness_ignores_process_state() {
    let instance = Instance::new();
    let config = instance.config();
    marker::mark_ready(&config.ready_marker).unwrap();

    // No main loop at all; readiness only looks at the marker.
    assert!(run_probe(Probe::Readiness, &config).healthy());

    marker::clear_ready(&config.ready_marker).unwrap();
    assert!(!run_probe(Probe::Readiness, &config).healthy());
}

#[test]
fn report_writes_one_line_per_check() {
    let instance = Instance::new();
    instance.spawn(7, "python scheduler.py");

    let report = run_probe(Probe::Startup, &instance.config());
    let mut out = Vec::new();
    report.write_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(text.lines().count(), report.results.len());
    assert!(text.lines().all(|l| l.starts_with("ok ")));
    assert!(Path::new(&instance.config().ready_marker)
        .parent()
        .unwrap()
        .is_dir());
}
