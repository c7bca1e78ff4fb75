//! readinessprobe — readiness check for MongoDB automation agent containers.
//!
//! Invoked by the kubelet as an exec probe. Exits 0 when the container is
//! ready and 1 otherwise; fatal errors are logged and also exit 1.
//!
//! # Usage
//!
//! ```text
//! readinessprobe                      # standard mode, settings from env
//! readinessprobe --headless --log-stderr
//! readinessprobe --config /etc/readiness.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use probe_core::{ProbeConfig, logging};
use probe_kube::InClusterClient;

mod probe;

use probe::{HeadlessProbe, readiness_tick};

const DEFAULT_LOG_DIRECTIVES: &str = "info,readinessprobe=debug,probe=debug";

#[derive(Parser)]
#[command(
    name = "readinessprobe",
    about = "Container readiness probe for the MongoDB automation agent",
    version
)]
struct Cli {
    /// TOML file with probe settings. Environment variables override it.
    #[arg(long, env = "READINESS_CONFIG")]
    config: Option<PathBuf>,

    /// Agent health status file.
    #[arg(long)]
    health_file: Option<PathBuf>,

    /// Append log lines to this file.
    #[arg(long, conflicts_with = "log_stderr")]
    log_file: Option<PathBuf>,

    /// Log to stderr instead of a file.
    #[arg(long)]
    log_stderr: bool,

    /// Check the goal version and publish it on the Pod.
    #[arg(long)]
    headless: bool,
}

impl Cli {
    fn resolve(&self) -> anyhow::Result<ProbeConfig> {
        let mut config = ProbeConfig::load(self.config.as_deref())?;
        if let Some(path) = &self.health_file {
            config.health_status_path = path.clone();
        }
        if let Some(path) = &self.log_file {
            config.log_file_path = Some(path.clone());
        }
        if self.log_stderr {
            config.log_file_path = None;
        }
        if self.headless {
            config.headless = true;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    // The kubelet only distinguishes 0 from non-zero, but clap exits 2 on
    // usage errors. Keep every failure at 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("readinessprobe: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match logging::init(config.log_file_path.as_deref(), DEFAULT_LOG_DIRECTIVES) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("readinessprobe: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(true) => {
            info!("pod is ready");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            info!("pod is not ready");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %format_args!("{e:#}"), "readiness probe failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ProbeConfig) -> anyhow::Result<bool> {
    if !config.headless {
        return Ok(readiness_tick(config));
    }

    let probe = HeadlessProbe::from_config(config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(probe.tick(&config.health_status_path, InClusterClient::from_env))
}
