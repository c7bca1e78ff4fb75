//! Typed model of the agent's health status file.
//!
//! The agent rewrites the file every ~10 seconds. It has two top-level maps
//! keyed by member name: `statuses` (process health) and `mmsStatus`
//! (automation plans and the last config version the agent reached).

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{HealthError, HealthResult};

/// Move the agent runs while it waits for the operator to delete its Pod.
pub const WAIT_DELETE_MY_POD_MOVE: &str = "WaitDeleteMyPodKube";

/// Root of the health status file. Built fresh on every probe tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthDocument {
    /// `None` when the key is absent (or `null`), which readiness treats as
    /// malformed; an empty map means no member is tracked yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<HashMap<String, ProcessHealth>>,

    #[serde(rename = "mmsStatus", default, deserialize_with = "null_as_default")]
    pub mms_status: HashMap<String, DirectorStatus>,
}

/// Health of a single mongod/mongos process.
///
/// The agent writes these keys in PascalCase.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessHealth {
    #[serde(rename = "IsInGoalState", alias = "isInGoalState", default)]
    pub is_in_goal_state: bool,
    /// Unix seconds.
    #[serde(rename = "LastMongoUpTime", alias = "lastMongoUpTime", default)]
    pub last_mongo_up_time: i64,
    #[serde(rename = "ExpectedToBeUp", alias = "expectedToBeUp", default)]
    pub expected_to_be_up: bool,
    /// Replica set member state (1 = primary, 2 = secondary, ...).
    #[serde(
        rename = "ReplicationStatus",
        alias = "replicationStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub replication_status: Option<i32>,
}

impl ProcessHealth {
    pub fn last_mongo_up(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_mongo_up_time, 0)
    }
}

/// Automation director state for one member.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectorStatus {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "lastGoalVersionAchieved", default)]
    pub last_goal_version_achieved: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plans: Vec<PlanStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub moves: Vec<MoveStatus>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveStatus {
    #[serde(rename = "move", default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<StepStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepStatus {
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: String,
    /// Set by newer agents on steps that wait for other members.
    #[serde(rename = "isWaitStep", default, skip_serializing_if = "Option::is_none")]
    pub is_wait_step: Option<bool>,
}

impl StepStatus {
    /// Started but not completed.
    pub fn is_in_progress(&self) -> bool {
        self.started.is_some() && self.completed.is_none()
    }
}

impl HealthDocument {
    pub fn from_slice(data: &[u8]) -> HealthResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Read the health file at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> HealthResult<Option<Self>> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(HealthError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        debug!(path = %path.display(), bytes = data.len(), "read health status file");
        Self::from_slice(&data).map(Some)
    }

    /// `statuses`, or [`HealthError::MissingKey`] when the key is absent.
    pub fn require_statuses(&self) -> HealthResult<&HashMap<String, ProcessHealth>> {
        self.statuses
            .as_ref()
            .ok_or(HealthError::MissingKey("statuses"))
    }

    /// True when neither map has any entry (or `statuses` is absent).
    pub fn is_empty(&self) -> bool {
        self.statuses.as_ref().is_none_or(HashMap::is_empty) && self.mms_status.is_empty()
    }

    pub fn process_health(&self, member: &str) -> Option<&ProcessHealth> {
        self.statuses.as_ref()?.get(member)
    }

    /// The `mmsStatus` entry of `member`.
    ///
    /// Without a member name the sole entry is used; with more than one
    /// entry there is no way to tell which belongs to this process.
    pub fn director_status(&self, member: Option<&str>) -> Option<&DirectorStatus> {
        match member {
            Some(name) => self.mms_status.get(name),
            None if self.mms_status.len() == 1 => self.mms_status.values().next(),
            None => None,
        }
    }

    /// The step the agent is executing right now, if any.
    ///
    /// Only the last plan counts. If it is completed the agent is idle.
    /// Otherwise the current step is the last one (across all moves, in
    /// order) that has been started. Agents do not always mark earlier steps
    /// completed, so "last started" is more reliable than "first incomplete".
    pub fn current_step(&self, member: Option<&str>) -> Option<&StepStatus> {
        let status = self.director_status(member)?;
        let plan = status.plans.last()?;
        if let Some(completed) = plan.completed {
            debug!(
                completed = %completed.to_rfc3339(),
                "agent has not reported a new plan; last plan is finished"
            );
            return None;
        }
        plan.moves
            .iter()
            .flat_map(|m| m.steps.iter())
            .rev()
            .find(|s| s.started.is_some())
    }

    /// Short label describing the member's state, for log lines.
    pub fn summary(&self, member: &str) -> String {
        let Some(health) = self.process_health(member) else {
            return "no_health_data".to_string();
        };
        let goal = if health.is_in_goal_state {
            "in_goal"
        } else {
            "not_in_goal"
        };

        let Some(plan) = self.mms_status.get(member).and_then(|s| s.plans.last()) else {
            return format!("{goal}_no_plans");
        };
        if plan.completed.is_some() {
            return format!("{goal}_plan_completed");
        }
        for mv in &plan.moves {
            if mv.name == WAIT_DELETE_MY_POD_MOVE {
                return "waiting_for_pod_deletion".to_string();
            }
            if mv.steps.iter().any(|s| s.completed.is_none()) {
                return format!("{goal}_executing_{}", mv.name);
            }
        }
        format!("{goal}_plan_running")
    }
}

/// Go-style agents write `null` for empty collections.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
