//! Goal version reconciler — one headless-mode check per probe tick.
//!
//! Phases run strictly in order and any failure aborts the rest:
//!
//! ```text
//! FetchTarget → DetermineAchieved → PublishAnnotation → Compare
//! ```

use std::fmt;

use tracing::{debug, info, warn};

use probe_core::HeadlessIdentity;
use probe_health::HealthDocument;
use probe_kube::{AGENT_VERSION_ANNOTATION, AnnotationPatcher, PodPatcher, SecretReader};

use crate::error::HeadlessResult;
use crate::target::read_target_version;

/// Published when the member is known not to have reached any goal.
/// Never equal to a real automation config version.
pub const NOT_ACHIEVED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    FetchTarget,
    DetermineAchieved,
    PublishAnnotation,
    Compare,
}

impl fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckPhase::FetchTarget => "fetch_target",
            CheckPhase::DetermineAchieved => "determine_achieved",
            CheckPhase::PublishAnnotation => "publish_annotation",
            CheckPhase::Compare => "compare",
        };
        f.write_str(name)
    }
}

/// Result of a completed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalCheck {
    pub target: i64,
    /// Version written to the Pod annotation.
    pub achieved_version: i64,
    pub achieved: bool,
}

/// Compares the target version with the one the local agent reached.
#[derive(Debug, Clone)]
pub struct GoalStateReconciler {
    identity: HeadlessIdentity,
}

impl GoalStateReconciler {
    pub fn new(identity: HeadlessIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &HeadlessIdentity {
        &self.identity
    }

    /// Run all four phases against `doc`.
    ///
    /// Errors from the Secret read or the Pod patch are returned as-is; no
    /// verdict is guessed on the caller's behalf.
    pub async fn perform_check<S, P>(
        &self,
        doc: &HealthDocument,
        secrets: &S,
        pods: &P,
    ) -> HeadlessResult<GoalCheck>
    where
        S: SecretReader + ?Sized,
        P: PodPatcher + ?Sized,
    {
        let member = self.identity.pod_name.as_str();

        let mut phase = CheckPhase::FetchTarget;
        let target = match read_target_version(secrets, &self.identity).await {
            Ok(target) => target,
            Err(e) => {
                warn!(%phase, error = %e, "goal version check failed");
                return Err(e);
            }
        };

        phase = CheckPhase::DetermineAchieved;
        let achieved_version = achieved_version(doc, member, target);
        debug!(%phase, member, target_version = target, achieved_version, "determined achieved version");

        phase = CheckPhase::PublishAnnotation;
        let patcher = AnnotationPatcher::new(pods, &self.identity.namespace, member);
        if let Err(e) = patcher
            .set(AGENT_VERSION_ANNOTATION, &achieved_version.to_string())
            .await
        {
            warn!(%phase, error = %e, "goal version check failed");
            return Err(e.into());
        }

        phase = CheckPhase::Compare;
        let achieved = achieved_version == target;
        info!(
            %phase,
            member,
            target_version = target,
            achieved_version,
            achieved,
            "compared automation config version with agent last version"
        );
        Ok(GoalCheck {
            target,
            achieved_version,
            achieved,
        })
    }
}

/// Version `member` has reached according to `doc`.
///
/// Only the member's own `mmsStatus` entry is consulted. Without any
/// `mmsStatus` the agent has either been scaled out of the config or has not
/// written its file yet, and `statuses` decides between `target` and
/// [`NOT_ACHIEVED`].
pub fn achieved_version(doc: &HealthDocument, member: &str, target: i64) -> i64 {
    if let Some(status) = doc.mms_status.get(member) {
        return status.last_goal_version_achieved;
    }
    if !doc.mms_status.is_empty() {
        debug!(member, "mmsStatus has no entry for this member");
        return NOT_ACHIEVED;
    }

    let statuses = match doc.statuses.as_ref() {
        Some(statuses) if !statuses.is_empty() => statuses,
        _ => {
            info!("health status is empty, assuming the member reached the target version");
            return target;
        }
    };

    let in_goal = match statuses.get(member) {
        Some(health) => health.is_in_goal_state,
        None => statuses.values().any(|h| h.is_in_goal_state),
    };
    if in_goal {
        info!("no mmsStatus but the process is in goal state, assuming the target version");
        target
    } else {
        NOT_ACHIEVED
    }
}
