//! Probe gating as observed by the orchestrator.
//!
//! [`ProbeTracker`] folds a stream of probe results for one instance into
//! the actions the orchestrator takes: restart on a failed startup budget
//! or repeated liveness failures, and toggling traffic eligibility on
//! readiness. Thresholds come from the probe definitions the workload
//! planner attaches to every instance.

use tracing::{debug, info, warn};

use fleet_render::probes::{self, ProbeSet};
use fleet_spec::HealthSpec;

use crate::Probe;

/// Consecutive-result thresholds for one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub failure: u32,
    pub success: u32,
}

impl From<&probes::Probe> for Thresholds {
    fn from(probe: &probes::Probe) -> Self {
        Self {
            failure: probe.failure_threshold,
            success: probe.success_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub startup: Thresholds,
    pub liveness: Thresholds,
    pub readiness: Thresholds,
}

impl GatePolicy {
    /// Thresholds of the probes planned for these health settings.
    pub fn for_health(health: &HealthSpec) -> Self {
        Self::from(&probes::probe_set(health))
    }
}

impl From<&ProbeSet> for GatePolicy {
    fn from(set: &ProbeSet) -> Self {
        Self {
            startup: Thresholds::from(&set.startup),
            liveness: Thresholds::from(&set.liveness),
            readiness: Thresholds::from(&set.readiness),
        }
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::for_health(&HealthSpec::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Startup succeeded; liveness and readiness now take effect.
    Started,
    Restart,
    MarkReady,
    MarkUnready,
}

#[derive(Debug, Default, Clone, Copy)]
struct Streak {
    successes: u32,
    failures: u32,
}

impl Streak {
    fn record(&mut self, passed: bool) {
        if passed {
            self.successes += 1;
            self.failures = 0;
        } else {
            self.failures += 1;
            self.successes = 0;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeTracker {
    policy: GatePolicy,
    phase: Phase,
    ready: bool,
    restarts: u32,
    startup: Streak,
    liveness: Streak,
    readiness: Streak,
}

impl ProbeTracker {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            phase: Phase::Starting,
            ready: false,
            restarts: 0,
            startup: Streak::default(),
            liveness: Streak::default(),
            readiness: Streak::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Record one probe result and return the action it triggers.
    pub fn observe(&mut self, probe: Probe, passed: bool) -> Action {
        match (self.phase, probe) {
            (Phase::Starting, Probe::Startup) => self.observe_startup(passed),
            (Phase::Starting, _) => {
                debug!(probe = probe.as_str(), "ignored until startup succeeds");
                Action::None
            }
            (Phase::Running, Probe::Startup) => Action::None,
            (Phase::Running, Probe::Liveness) => self.observe_liveness(passed),
            (Phase::Running, Probe::Readiness) => self.observe_readiness(passed),
        }
    }

    fn observe_startup(&mut self, passed: bool) -> Action {
        self.startup.record(passed);

        if self.startup.successes >= self.policy.startup.success {
            info!("startup probe succeeded");
            self.phase = Phase::Running;
            return Action::Started;
        }
        if self.startup.failures >= self.policy.startup.failure {
            warn!(
                failures = self.startup.failures,
                "startup budget exhausted"
            );
            return self.restart();
        }
        Action::None
    }

    fn observe_liveness(&mut self, passed: bool) -> Action {
        self.liveness.record(passed);

        if self.liveness.failures >= self.policy.liveness.failure {
            warn!(failures = self.liveness.failures, "liveness threshold reached");
            return self.restart();
        }
        Action::None
    }

    fn observe_readiness(&mut self, passed: bool) -> Action {
        self.readiness.record(passed);

        if !self.ready && self.readiness.successes >= self.policy.readiness.success {
            self.ready = true;
            return Action::MarkReady;
        }
        if self.ready && self.readiness.failures >= self.policy.readiness.failure {
            self.ready = false;
            return Action::MarkUnready;
        }
        Action::None
    }

    /// A restarted instance starts over: un-ready, back in startup.
    fn restart(&mut self) -> Action {
        let restarts = self.restarts + 1;
        *self = Self::new(self.policy);
        self.restarts = restarts;
        Action::Restart
    }
}

impl Default for ProbeTracker {
    fn default() -> Self {
        Self::new(GatePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> ProbeTracker {
        let mut tracker = ProbeTracker::default();
        assert_eq!(tracker.observe(Probe::Startup, true), Action::Started);
        tracker
    }

    #[test]
    fn policy_follows_planned_probes() {
        let policy = GatePolicy::default();
        let planned = probes::probe_set(&HealthSpec::default());
        assert_eq!(policy.startup.failure, planned.startup.failure_threshold);
        assert_eq!(policy.liveness.failure, planned.liveness.failure_threshold);
        assert_eq!(policy.readiness.success, planned.readiness.success_threshold);

        let health = HealthSpec {
            liveness_failure_threshold: 5,
            startup_failure_threshold: 12,
            ..HealthSpec::default()
        };
        let policy = GatePolicy::for_health(&health);
        assert_eq!(policy.liveness.failure, 5);
        assert_eq!(policy.startup.failure, 12);
    }

    #[test]
    fn custom_liveness_threshold_delays_restart() {
        let health = HealthSpec {
            liveness_failure_threshold: 5,
            ..HealthSpec::default()
        };
        let mut tracker = ProbeTracker::new(GatePolicy::for_health(&health));
        assert_eq!(tracker.observe(Probe::Startup, true), Action::Started);

        for _ in 0..4 {
            assert_eq!(tracker.observe(Probe::Liveness, false), Action::None);
        }
        assert_eq!(tracker.observe(Probe::Liveness, false), Action::Restart);
    }

    #[test]
    fn liveness_and_readiness_ignored_while_starting() {
        let mut tracker = ProbeTracker::default();
        for _ in 0..10 {
            assert_eq!(tracker.observe(Probe::Liveness, false), Action::None);
            assert_eq!(tracker.observe(Probe::Readiness, true), Action::None);
        }
        assert_eq!(tracker.phase(), Phase::Starting);
        assert!(!tracker.is_ready());
    }

    #[test]
    fn slow_start_within_budget_is_not_restarted() {
        let mut tracker = ProbeTracker::default();
        for _ in 0..29 {
            assert_eq!(tracker.observe(Probe::Startup, false), Action::None);
        }
        assert_eq!(tracker.observe(Probe::Startup, true), Action::Started);
        assert_eq!(tracker.restarts(), 0);
    }

    #[test]
    fn startup_budget_exhausted_restarts() {
        let mut tracker = ProbeTracker::default();
        let actions: Vec<Action> = (0..30)
            .map(|_| tracker.observe(Probe::Startup, false))
            .collect();

        assert_eq!(actions.last(), Some(&Action::Restart));
        assert!(actions[..29].iter().all(|a| *a == Action::None));
        assert_eq!(tracker.restarts(), 1);
        assert_eq!(tracker.phase(), Phase::Starting);
    }

    #[test]
    fn liveness_failures_at_threshold_restart() {
        let mut tracker = started();
        tracker.observe(Probe::Readiness, true);

        assert_eq!(tracker.observe(Probe::Liveness, false), Action::None);
        assert_eq!(tracker.observe(Probe::Liveness, false), Action::None);
        assert_eq!(tracker.observe(Probe::Liveness, false), Action::Restart);

        assert_eq!(tracker.phase(), Phase::Starting);
        assert!(!tracker.is_ready());
    }

    #[test]
    fn intermittent_liveness_failure_resets_streak() {
        let mut tracker = started();
        for _ in 0..5 {
            assert_eq!(tracker.observe(Probe::Liveness, false), Action::None);
            assert_eq!(tracker.observe(Probe::Liveness, false), Action::None);
            assert_eq!(tracker.observe(Probe::Liveness, true), Action::None);
        }
        assert_eq!(tracker.restarts(), 0);
    }

    #[test]
    fn readiness_toggles_without_restart() {
        let mut tracker = started();

        assert_eq!(tracker.observe(Probe::Readiness, false), Action::None);
        assert_eq!(tracker.observe(Probe::Readiness, true), Action::MarkReady);
        assert!(tracker.is_ready());

        let actions: Vec<Action> = (0..10)
            .map(|_| tracker.observe(Probe::Readiness, false))
            .collect();
        assert_eq!(actions[2], Action::MarkUnready);
        assert!(!actions.contains(&Action::Restart));
        assert_eq!(tracker.phase(), Phase::Running);
        assert_eq!(tracker.restarts(), 0);
    }
}
