//! probe-headless — goal version check for per-ordinal (headless) members.
//!
//! A tick reads the target automation config version from a Secret, works
//! out which version the local agent has reached, publishes that on the Pod
//! as the `agent.mongodb.com/version` annotation, and reports whether the two
//! match. The rollout controller reads the annotation to gate its next step.

pub mod error;
pub mod reconciler;
pub mod target;

pub use error::{HeadlessError, HeadlessResult};
pub use reconciler::{CheckPhase, GoalCheck, GoalStateReconciler, achieved_version};
pub use target::{parse_target_version, read_target_version};
