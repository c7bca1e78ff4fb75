//! probe-core — configuration and logging shared by the readiness probe crates.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then the environment variables the agent container is started with.
//! Logging is installed once by the binary; library crates only emit
//! `tracing` events.

pub mod config;
pub mod logging;

pub use config::{ConfigError, HeadlessIdentity, ProbeConfig};
pub use logging::LogGuard;
