//! Logging bootstrap for the probe binary.
//!
//! The kubelet discards probe stdout, so in production log lines are
//! appended to a file next to the agent logs. Library crates never call
//! into this module.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// Keeps the non-blocking file writer alive. Dropping it flushes pending lines.
#[must_use]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Build the filter from `RUST_LOG`, falling back to `default_directives`.
pub fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// Install the global subscriber.
///
/// With `log_file` set, lines are appended to that file (never rotated;
/// the agent image handles rotation of its log directory). Otherwise they
/// go to stderr.
pub fn init(log_file: Option<&Path>, default_directives: &str) -> anyhow::Result<LogGuard> {
    let filter = env_filter(default_directives);

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))?;
        return Ok(LogGuard { _worker: None });
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("log file path has no file name: {}", path.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))?;

    Ok(LogGuard {
        _worker: Some(guard),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_without_file_name() {
        let err = init(Some(Path::new("/")), "info").err().unwrap();
        assert!(err.to_string().contains("no file name"));
    }
}
