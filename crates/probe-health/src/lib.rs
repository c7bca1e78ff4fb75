//! probe-health — reads the automation agent's health status file and
//! decides container readiness from it.
//!
//! # Architecture
//!
//! ```text
//! ReadinessEvaluator
//!   ├── HealthDocument::load()     → statuses + mmsStatus
//!   ├── ProcessHealth.isInGoalState → Ready
//!   └── DeadlockDetector
//!       └── current step of the last plan, risky + older than grace → Ready
//! ```
//!
//! The evaluator never fails: a missing file is `Ready`, an unreadable one
//! is `NotReady`, and the next probe tick starts from scratch.

pub mod deadlock;
pub mod document;
pub mod error;
pub mod readiness;

pub use deadlock::DeadlockDetector;
pub use document::{
    DirectorStatus, HealthDocument, MoveStatus, PlanStatus, ProcessHealth, StepStatus,
    WAIT_DELETE_MY_POD_MOVE,
};
pub use error::{HealthError, HealthResult};
pub use readiness::{ReadinessEvaluator, Verdict};
