//! Error types for reading the agent health file.

use std::path::PathBuf;

use thiserror::Error;

pub type HealthResult<T> = Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("failed to read health status file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode health status: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("health status has no '{0}' key")]
    MissingKey(&'static str),
}
