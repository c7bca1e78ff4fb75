//! Errors from a headless goal version check.

use thiserror::Error;

use probe_kube::KubeError;

pub type HeadlessResult<T> = Result<T, HeadlessError>;

#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error(transparent)]
    Kube(#[from] KubeError),

    #[error("secret {secret} has no '{key}' data key")]
    MissingDataKey { secret: String, key: String },

    #[error("failed to decode automation config: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("automation config has no 'version' field")]
    MissingVersion,

    #[error("automation config version is not an integer: {0}")]
    InvalidVersion(String),
}
