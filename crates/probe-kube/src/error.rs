//! Kubernetes API error types.

use std::path::PathBuf;

use thiserror::Error;

pub type KubeResult<T> = Result<T, KubeError>;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("the '{0}' environment variable must be set")]
    MissingEnv(&'static str),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tls error: {0}")]
    Tls(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("kubernetes API returned {status} ({reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid patch: {0}")]
    Patch(String),
}
