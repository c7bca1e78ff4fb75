//! Deadlock heuristic for in-progress automation steps.
//!
//! Some steps block on the rest of the replica set (every member up, the
//! replica set initialized by a peer). A member stuck in one of those is
//! waiting on topology the orchestrator has to fix, so the probe reports it
//! ready instead of failing it forever. Any other step is never considered
//! stuck, however long it runs.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use probe_core::ProbeConfig;
use probe_core::config::{DEFAULT_DEADLOCK_GRACE_SECS, DEFAULT_RISKY_STEPS};

use crate::document::StepStatus;

/// The agent dumps the health file every 10 seconds; a step still running
/// after 15 has been seen waiting by at least one dump.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(DEFAULT_DEADLOCK_GRACE_SECS);

#[derive(Debug, Clone)]
pub struct DeadlockDetector {
    risky_steps: HashSet<String>,
    grace_period: Duration,
}

impl Default for DeadlockDetector {
    fn default() -> Self {
        Self::new(DEFAULT_RISKY_STEPS, DEFAULT_GRACE_PERIOD)
    }
}

impl DeadlockDetector {
    pub fn new<I, S>(risky_steps: I, grace_period: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            risky_steps: risky_steps.into_iter().map(Into::into).collect(),
            grace_period,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.risky_steps.iter().cloned(), config.deadlock_grace())
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn is_risky(&self, step: &str) -> bool {
        self.risky_steps.contains(step)
    }

    /// Whether `step` is a risky step that has been running longer than the
    /// grace period.
    pub fn is_deadlocked(&self, step: &StepStatus) -> bool {
        self.is_deadlocked_at(step, Utc::now())
    }

    pub fn is_deadlocked_at(&self, step: &StepStatus, now: DateTime<Utc>) -> bool {
        if !self.is_risky(&step.step) || step.completed.is_some() {
            return false;
        }
        let Some(started) = step.started else {
            return false;
        };

        // A start time in the future yields a negative delta; not stuck.
        let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
        if elapsed > self.grace_period {
            info!(
                step = %step.step,
                started = %started.to_rfc3339(),
                elapsed_secs = elapsed.as_secs(),
                "possible deadlock: step started but has not finished, marking the probe as ready"
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_ago(name: &str, secs: i64, now: DateTime<Utc>) -> StepStatus {
        StepStatus {
            step: name.to_string(),
            started: Some(now - chrono::Duration::seconds(secs)),
            completed: None,
            result: "wait".to_string(),
            is_wait_step: None,
        }
    }

    #[test]
    fn download_is_never_deadlocked() {
        let detector = DeadlockDetector::default();
        let now = Utc::now();
        assert!(!detector.is_deadlocked_at(&started_ago("Download", 30, now), now));
        assert!(!detector.is_deadlocked_at(&started_ago("Download", 86_400 * 365, now), now));
    }

    #[test]
    fn risky_step_within_grace_period() {
        let detector = DeadlockDetector::default();
        let now = Utc::now();
        assert!(!detector.is_deadlocked_at(&started_ago("WaitRsInit", 10, now), now));
    }

    #[test]
    fn risky_step_past_grace_period() {
        let detector = DeadlockDetector::default();
        let now = Utc::now();
        assert!(detector.is_deadlocked_at(&started_ago("WaitRsInit", 30, now), now));
        assert!(detector.is_deadlocked_at(&started_ago("WaitAllRsMembersUp", 30, now), now));
    }

    #[test]
    fn exactly_at_grace_period_is_not_deadlocked() {
        let detector = DeadlockDetector::default();
        let now = Utc::now();
        assert!(!detector.is_deadlocked_at(&started_ago("WaitRsInit", 15, now), now));
    }

    #[test]
    fn completed_step_is_not_deadlocked() {
        let detector = DeadlockDetector::default();
        let now = Utc::now();
        let mut step = started_ago("WaitRsInit", 60, now);
        step.completed = Some(now);
        assert!(!detector.is_deadlocked_at(&step, now));
    }

    #[test]
    fn unstarted_or_future_step_is_not_deadlocked() {
        let detector = DeadlockDetector::default();
        let now = Utc::now();
        let mut step = started_ago("WaitRsInit", 60, now);
        step.started = None;
        assert!(!detector.is_deadlocked_at(&step, now));

        assert!(!detector.is_deadlocked_at(&started_ago("WaitRsInit", -3600, now), now));
    }

    #[test]
    fn custom_risky_set_and_grace() {
        let detector = DeadlockDetector::new(["WaitPrimary"], Duration::from_secs(60));
        let now = Utc::now();
        assert!(!detector.is_risky("WaitRsInit"));
        assert!(!detector.is_deadlocked_at(&started_ago("WaitPrimary", 30, now), now));
        assert!(detector.is_deadlocked_at(&started_ago("WaitPrimary", 90, now), now));
    }

    #[test]
    fn from_config_uses_configured_steps() {
        let config = ProbeConfig {
            risky_steps: vec!["WaitPrimary".to_string()],
            deadlock_grace_secs: 5,
            ..ProbeConfig::default()
        };
        let detector = DeadlockDetector::from_config(&config);
        assert!(detector.is_risky("WaitPrimary"));
        assert!(!detector.is_risky("WaitRsInit"));
        assert_eq!(detector.grace_period(), Duration::from_secs(5));
    }

    #[test]
    fn default_uses_wall_clock() {
        let detector = DeadlockDetector::default();
        let step = started_ago("WaitAllRsMembersUp", 30, Utc::now());
        assert!(detector.is_deadlocked(&step));
    }
}
