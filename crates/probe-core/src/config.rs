//! Probe configuration parser.
//!
//! Values come from three layers, later layers winning: [`ProbeConfig::default`],
//! an optional TOML file, and the process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_HEALTH_STATUS_PATH: &str =
    "/var/log/mongodb-mms-automation/agent-health-status.json";
pub const DEFAULT_LOG_FILE_PATH: &str = "/var/log/mongodb-mms-automation/readiness.log";
pub const DEFAULT_AUTOMATION_CONFIG_KEY: &str = "cluster-config.json";
pub const DEFAULT_RISKY_STEPS: [&str; 2] = ["WaitAllRsMembersUp", "WaitRsInit"];
pub const DEFAULT_DEADLOCK_GRACE_SECS: u64 = 15;

pub const ENV_HEALTH_STATUS_PATH: &str = "AGENT_STATUS_FILEPATH";
pub const ENV_LOG_FILE_PATH: &str = "LOG_FILE_PATH";
pub const ENV_HEADLESS: &str = "HEADLESS_AGENT";
pub const ENV_NAMESPACE: &str = "POD_NAMESPACE";
pub const ENV_HOSTNAME: &str = "HOSTNAME";
pub const ENV_AUTOMATION_CONFIG_SECRET: &str = "AUTOMATION_CONFIG_MAP";
pub const ENV_AUTOMATION_CONFIG_KEY: &str = "AUTOMATION_CONFIG_KEY";
pub const ENV_RISKY_STEPS: &str = "READINESS_RISKY_STEPS";
pub const ENV_DEADLOCK_GRACE: &str = "READINESS_DEADLOCK_GRACE_SECONDS";

/// Errors raised while assembling a [`ProbeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("the '{0}' environment variable must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Health status file written by the automation agent.
    pub health_status_path: PathBuf,
    /// Log destination. `None` sends log lines to stderr.
    pub log_file_path: Option<PathBuf>,
    /// Per-ordinal mode where the probe also publishes the achieved version.
    pub headless: bool,
    pub namespace: Option<String>,
    /// Pod name of this member; also the key of its entries in the health file.
    pub hostname: Option<String>,
    /// Secret holding the automation config.
    pub automation_config_secret: Option<String>,
    /// Data key of the automation config inside the Secret.
    pub automation_config_key: String,
    /// Steps allowed to block on the rest of the cluster.
    pub risky_steps: Vec<String>,
    pub deadlock_grace_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            health_status_path: PathBuf::from(DEFAULT_HEALTH_STATUS_PATH),
            log_file_path: Some(PathBuf::from(DEFAULT_LOG_FILE_PATH)),
            headless: false,
            namespace: None,
            hostname: None,
            automation_config_secret: None,
            automation_config_key: DEFAULT_AUTOMATION_CONFIG_KEY.to_string(),
            risky_steps: DEFAULT_RISKY_STEPS.iter().map(|s| s.to_string()).collect(),
            deadlock_grace_secs: DEFAULT_DEADLOCK_GRACE_SECS,
        }
    }
}

/// Identity a headless-mode tick needs to reach the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessIdentity {
    pub namespace: String,
    pub pod_name: String,
    pub secret_name: String,
    pub secret_key: String,
}

impl ProbeConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields with environment values obtained through `lookup`.
    ///
    /// Empty and whitespace-only values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(path) = var(ENV_HEALTH_STATUS_PATH) {
            self.health_status_path = PathBuf::from(path);
        }
        if let Some(path) = var(ENV_LOG_FILE_PATH) {
            self.log_file_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = var(ENV_HEADLESS) {
            self.headless = flag == "true";
        }
        if let Some(namespace) = var(ENV_NAMESPACE) {
            self.namespace = Some(namespace);
        }
        if let Some(hostname) = var(ENV_HOSTNAME) {
            self.hostname = Some(hostname);
        }
        if let Some(secret) = var(ENV_AUTOMATION_CONFIG_SECRET) {
            self.automation_config_secret = Some(secret);
        }
        if let Some(key) = var(ENV_AUTOMATION_CONFIG_KEY) {
            self.automation_config_key = key;
        }
        if let Some(steps) = var(ENV_RISKY_STEPS) {
            self.risky_steps = steps
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secs) = var(ENV_DEADLOCK_GRACE) {
            self.deadlock_grace_secs =
                secs.parse().map_err(|_| ConfigError::InvalidValue {
                    var: ENV_DEADLOCK_GRACE,
                    value: secs.clone(),
                })?;
        }
        Ok(())
    }

    pub fn deadlock_grace(&self) -> Duration {
        Duration::from_secs(self.deadlock_grace_secs)
    }

    /// Validated identity for headless mode.
    pub fn headless_identity(&self) -> Result<HeadlessIdentity, ConfigError> {
        let namespace = self
            .namespace
            .clone()
            .ok_or(ConfigError::Missing(ENV_NAMESPACE))?;
        let pod_name = self
            .hostname
            .clone()
            .ok_or(ConfigError::Missing(ENV_HOSTNAME))?;
        let secret_name = self
            .automation_config_secret
            .clone()
            .ok_or(ConfigError::Missing(ENV_AUTOMATION_CONFIG_SECRET))?;
        Ok(HeadlessIdentity {
            namespace,
            pod_name,
            secret_name,
            secret_key: self.automation_config_key.clone(),
        })
    }
}
