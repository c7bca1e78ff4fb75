//! Container readiness from the agent health file.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use probe_core::ProbeConfig;

use crate::deadlock::DeadlockDetector;
use crate::document::{HealthDocument, ProcessHealth};

/// Outcome of one readiness evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No health file. Older agents do not write one.
    NoHealthFile,
    /// `statuses` is empty: no automation config for the agent yet.
    NoMembers,
    /// The member reports `IsInGoalState`.
    InGoalState,
    /// Not in goal state, but stuck on a risky step past the grace period.
    WaitingOnCluster { step: String },
    NotInGoalState,
    /// The file exists but could not be read, decoded, or lacks `statuses`.
    Unreadable(String),
}

impl Verdict {
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            Verdict::NoHealthFile
                | Verdict::NoMembers
                | Verdict::InGoalState
                | Verdict::WaitingOnCluster { .. }
        )
    }
}

/// Evaluates readiness for one member. Never returns an error: every
/// failure maps to a definite [`Verdict`].
#[derive(Debug, Clone, Default)]
pub struct ReadinessEvaluator {
    detector: DeadlockDetector,
    member: Option<String>,
}

impl ReadinessEvaluator {
    pub fn new(detector: DeadlockDetector) -> Self {
        Self {
            detector,
            member: None,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            detector: DeadlockDetector::from_config(config),
            member: config.hostname.clone(),
        }
    }

    /// Look up this member's entries by name instead of taking the sole one.
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn detector(&self) -> &DeadlockDetector {
        &self.detector
    }

    pub fn evaluate(&self, path: &Path) -> Verdict {
        self.evaluate_at(path, Utc::now())
    }

    pub fn evaluate_at(&self, path: &Path, now: DateTime<Utc>) -> Verdict {
        match HealthDocument::load(path) {
            Ok(Some(doc)) => self.evaluate_document_at(&doc, now),
            Ok(None) => {
                warn!(
                    path = %path.display(),
                    "no health status file exists, assuming the automation agent is old"
                );
                Verdict::NoHealthFile
            }
            Err(e) => {
                error!(error = %e, "failed to read agent health status file");
                Verdict::Unreadable(e.to_string())
            }
        }
    }

    pub fn evaluate_document(&self, doc: &HealthDocument) -> Verdict {
        self.evaluate_document_at(doc, Utc::now())
    }

    pub fn evaluate_document_at(&self, doc: &HealthDocument, now: DateTime<Utc>) -> Verdict {
        if let Some(member) = self.member.as_deref() {
            info!(member, summary = %doc.summary(member), "agent health");
        }

        let statuses = match doc.require_statuses() {
            Ok(statuses) => statuses,
            Err(e) => {
                error!(error = %e, "malformed agent health status");
                return Verdict::Unreadable(e.to_string());
            }
        };

        if statuses.is_empty() {
            info!("'statuses' is empty, assuming there is no automation config for the agent yet");
            return Verdict::NoMembers;
        }

        if self.in_goal_state(statuses) {
            return Verdict::InGoalState;
        }

        if let Some(step) = self.waiting_on_cluster(doc, now) {
            return Verdict::WaitingOnCluster { step };
        }

        Verdict::NotInGoalState
    }

    /// Name of the member's current step when it is deadlocked on the cluster.
    pub fn waiting_on_cluster(&self, doc: &HealthDocument, now: DateTime<Utc>) -> Option<String> {
        let member = self
            .member
            .as_deref()
            .filter(|m| doc.mms_status.contains_key(*m));
        self.deadlocked_step(doc, member, now)
    }

    /// Like [`Self::waiting_on_cluster`], but only `member`'s own `mmsStatus`
    /// entry is consulted. Entries of other members never count.
    pub fn member_waiting_on_cluster(
        &self,
        doc: &HealthDocument,
        member: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        self.deadlocked_step(doc, Some(member), now)
    }

    fn deadlocked_step(
        &self,
        doc: &HealthDocument,
        member: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let step = doc.current_step(member)?;
        debug!(step = %step.step, "current agent step");
        self.detector
            .is_deadlocked_at(step, now)
            .then(|| step.step.clone())
    }

    fn in_goal_state(&self, statuses: &HashMap<String, ProcessHealth>) -> bool {
        if let Some(health) = self.member.as_deref().and_then(|m| statuses.get(m)) {
            debug!(?health, "member process health");
            return health.is_in_goal_state;
        }
        statuses.values().any(|h| h.is_in_goal_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use crate::document::{DirectorStatus, MoveStatus, PlanStatus, StepStatus};

    fn doc(in_goal: bool, step: &str, started: DateTime<Utc>) -> HealthDocument {
        let mut statuses = HashMap::new();
        statuses.insert(
            "appdb-0".to_string(),
            ProcessHealth {
                is_in_goal_state: in_goal,
                ..ProcessHealth::default()
            },
        );
        let mut mms_status = HashMap::new();
        mms_status.insert(
            "appdb-0".to_string(),
            DirectorStatus {
                name: "appdb-0".to_string(),
                last_goal_version_achieved: 1,
                plans: vec![PlanStatus {
                    moves: vec![MoveStatus {
                        name: step.to_string(),
                        steps: vec![StepStatus {
                            step: step.to_string(),
                            started: Some(started),
                            completed: None,
                            result: "wait".to_string(),
                            is_wait_step: None,
                        }],
                    }],
                    started: Some(started),
                    completed: None,
                }],
            },
        );
        HealthDocument {
            statuses: Some(statuses),
            mms_status,
        }
    }

    #[test]
    fn verdict_readiness() {
        assert!(Verdict::NoHealthFile.is_ready());
        assert!(Verdict::NoMembers.is_ready());
        assert!(Verdict::InGoalState.is_ready());
        assert!(Verdict::WaitingOnCluster { step: "WaitRsInit".into() }.is_ready());
        assert!(!Verdict::NotInGoalState.is_ready());
        assert!(!Verdict::Unreadable("bad".into()).is_ready());
    }

    #[test]
    fn missing_file_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = ReadinessEvaluator::default().evaluate(&dir.path().join("absent.json"));
        assert_eq!(verdict, Verdict::NoHealthFile);
    }

    #[test]
    fn garbage_file_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.json");
        std::fs::write(&path, "{not json").unwrap();
        let verdict = ReadinessEvaluator::default().evaluate(&path);
        assert!(matches!(verdict, Verdict::Unreadable(_)));
    }

    #[test]
    fn absent_statuses_is_not_ready() {
        let doc = HealthDocument::from_slice(br#"{"mmsStatus": {}}"#).unwrap();
        let verdict = ReadinessEvaluator::default().evaluate_document(&doc);
        assert!(matches!(verdict, Verdict::Unreadable(ref msg) if msg.contains("statuses")));
    }

    #[test]
    fn empty_statuses_is_ready() {
        let doc = HealthDocument::from_slice(br#"{"statuses": {}, "mmsStatus": {}}"#).unwrap();
        let verdict = ReadinessEvaluator::default().evaluate_document(&doc);
        assert_eq!(verdict, Verdict::NoMembers);
    }

    #[test]
    fn in_goal_state_is_ready() {
        let now = Utc::now();
        let verdict = ReadinessEvaluator::default()
            .with_member("appdb-0")
            .evaluate_document_at(&doc(true, "Download", now), now);
        assert_eq!(verdict, Verdict::InGoalState);
    }

    #[test]
    fn member_entry_wins_over_others() {
        let now = Utc::now();
        let mut health = doc(false, "Download", now);
        health.statuses.as_mut().unwrap().insert(
            "appdb-1".to_string(),
            ProcessHealth {
                is_in_goal_state: true,
                ..ProcessHealth::default()
            },
        );

        let evaluator = ReadinessEvaluator::default().with_member("appdb-0");
        assert_eq!(
            evaluator.evaluate_document_at(&health, now),
            Verdict::NotInGoalState
        );

        // Without a member name any process in goal state counts.
        assert_eq!(
            ReadinessEvaluator::default().evaluate_document_at(&health, now),
            Verdict::InGoalState
        );
    }

    #[test]
    fn stuck_risky_step_is_ready() {
        let now = Utc::now();
        let started = now - chrono::Duration::seconds(30);
        let verdict = ReadinessEvaluator::default()
            .with_member("appdb-0")
            .evaluate_document_at(&doc(false, "WaitAllRsMembersUp", started), now);
        assert_eq!(
            verdict,
            Verdict::WaitingOnCluster {
                step: "WaitAllRsMembersUp".to_string()
            }
        );
    }

    #[test]
    fn fresh_risky_step_is_not_ready() {
        let now = Utc::now();
        let started = now - chrono::Duration::seconds(10);
        let verdict = ReadinessEvaluator::default()
            .evaluate_document_at(&doc(false, "WaitRsInit", started), now);
        assert_eq!(verdict, Verdict::NotInGoalState);
    }

    #[test]
    fn long_download_is_not_ready() {
        let now = Utc::now();
        let started = now - chrono::Duration::hours(2);
        let verdict = ReadinessEvaluator::default()
            .evaluate_document_at(&doc(false, "Download", started), now);
        assert_eq!(verdict, Verdict::NotInGoalState);
    }

    #[test]
    fn member_lookup_ignores_other_members() {
        let now = Utc::now();
        let started = now - chrono::Duration::seconds(120);
        let mut health = doc(false, "WaitRsInit", started);
        let other = health.mms_status.remove("appdb-0").unwrap();
        health.mms_status.insert("appdb-1".to_string(), other);

        let evaluator = ReadinessEvaluator::default();
        assert_eq!(
            evaluator.member_waiting_on_cluster(&health, "appdb-0", now),
            None
        );
        assert_eq!(
            evaluator.member_waiting_on_cluster(&health, "appdb-1", now),
            Some("WaitRsInit".to_string())
        );
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn deadlock_is_logged_to_scoped_subscriber() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let now = Utc::now();
        let started = now - chrono::Duration::seconds(60);
        tracing::subscriber::with_default(subscriber, || {
            ReadinessEvaluator::default()
                .evaluate_document_at(&doc(false, "WaitRsInit", started), now);
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("possible deadlock"), "{output}");
        assert!(output.contains("WaitRsInit"), "{output}");
    }
}
