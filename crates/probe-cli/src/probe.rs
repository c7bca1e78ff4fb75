//! One probe tick, in standard or headless mode.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use probe_core::ProbeConfig;
use probe_headless::GoalStateReconciler;
use probe_health::{HealthDocument, ReadinessEvaluator};
use probe_kube::{KubeResult, PodPatcher, SecretReader};

/// Standard mode: readiness from the health file alone.
pub fn readiness_tick(config: &ProbeConfig) -> bool {
    let verdict = ReadinessEvaluator::from_config(config).evaluate(&config.health_status_path);
    let ready = verdict.is_ready();
    info!(?verdict, ready, "readiness check");
    ready
}

/// Headless mode: goal version check with the deadlock fallback.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    reconciler: GoalStateReconciler,
    evaluator: ReadinessEvaluator,
}

impl HeadlessProbe {
    pub fn from_config(config: &ProbeConfig) -> anyhow::Result<Self> {
        let identity = config
            .headless_identity()
            .context("headless mode is not configured")?;
        Ok(Self {
            reconciler: GoalStateReconciler::new(identity),
            evaluator: ReadinessEvaluator::from_config(config),
        })
    }

    /// Read the health file at `path` and check it against the cluster.
    ///
    /// `connect` is only called once there is a document to check.
    pub async fn tick<F, C>(&self, path: &Path, connect: F) -> anyhow::Result<bool>
    where
        F: FnOnce() -> KubeResult<C>,
        C: SecretReader + PodPatcher,
    {
        let doc = match HealthDocument::load(path) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                warn!(
                    path = %path.display(),
                    "no health status file exists, assuming the automation agent is old"
                );
                return Ok(true);
            }
            Err(e) => {
                error!(error = %e, "failed to read agent health status file");
                return Ok(false);
            }
        };

        let client = connect().context("failed to set up the kubernetes client")?;
        self.check(&doc, &client, &client, Utc::now()).await
    }

    pub async fn check<S, P>(
        &self,
        doc: &HealthDocument,
        secrets: &S,
        pods: &P,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>
    where
        S: SecretReader + ?Sized,
        P: PodPatcher + ?Sized,
    {
        let member = &self.reconciler.identity().pod_name;
        info!(member = %member, summary = %doc.summary(member), "agent health");

        let check = self
            .reconciler
            .perform_check(doc, secrets, pods)
            .await
            .context("goal version check failed")?;
        if check.achieved {
            return Ok(true);
        }

        if let Some(step) = self.evaluator.member_waiting_on_cluster(doc, member, now) {
            info!(%step, "agent is waiting on the rest of the cluster, reporting ready");
            return Ok(true);
        }
        debug!(
            target_version = check.target,
            achieved_version = check.achieved_version,
            "goal version not reached"
        );
        Ok(false)
    }
}
