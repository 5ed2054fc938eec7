//! Startup configuration.
//!
//! Settings are resolved once in `main` and passed by value into the
//! server constructor; request handlers never consult the environment.
//! Precedence: command-line flag or bound environment variable, then
//! the optional TOML config file, then the built-in default.
//!
//! The expected basic-auth credentials are deliberately not part of
//! this surface; they are read from dedicated environment variables by
//! [`crate::auth::Credentials::from_env`].

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default connection string for a locally running PgBouncer.
pub const DEFAULT_CONNECTION_STRING: &str =
    "postgres://postgres:@localhost:6543/pgbouncer?sslmode=disable";
/// Default listen port for the web interface and telemetry.
pub const DEFAULT_LISTEN_PORT: u16 = 9584;
/// Default path under which metrics are exposed.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Command-line interface.
#[derive(Debug, Default, Parser)]
#[command(
    name = "pgbouncer-exporter",
    version,
    about = "Prometheus exporter for PgBouncer connection pooler statistics"
)]
pub struct Cli {
    /// Connection string for accessing the PgBouncer admin console.
    #[arg(
        long = "pgbouncer.connection-string",
        env = "PGBOUNCER_URL",
        value_name = "URL"
    )]
    pub connection_string: Option<String>,

    /// Port to listen on for the web interface and telemetry.
    #[arg(long = "web.listen-port", env = "PORT", value_name = "PORT")]
    pub listen_port: Option<u16>,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub metrics_path: Option<String>,

    /// Path to the PgBouncer pid file.
    ///
    /// If provided, standard process metrics are exported for the
    /// PgBouncer process under the `pgbouncer_process_` prefix. The
    /// exporter needs read access to files owned by that process.
    /// Depends on the availability of /proc.
    #[arg(long = "pgbouncer.pid-file", value_name = "FILE")]
    pub pid_file: Option<PathBuf>,

    /// Optional TOML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Configuration errors. All are fatal at startup.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("telemetry path must start with '/': {0}")]
    InvalidMetricsPath(String),
    #[error("telemetry path must not shadow the index page")]
    ReservedMetricsPath,
    #[error("listen port must be non-zero")]
    InvalidListenPort,
}

/// Configuration file format. Every field is optional; absent fields
/// fall back to flags and defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub connection_string: Option<String>,
    pub listen_port: Option<u16>,
    pub metrics_path: Option<String>,
    pub pid_file: Option<PathBuf>,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Connection string for the PgBouncer admin console.
    pub connection_string: String,
    /// Listen port for the HTTP server.
    pub listen_port: u16,
    /// Path under which metrics are exposed.
    pub metrics_path: String,
    /// Optional pid file enabling the process resource collector.
    pub pid_file: Option<PathBuf>,
}

impl Settings {
    /// Resolves settings from the parsed command line and, if given,
    /// the config file it names.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        let settings = Self {
            connection_string: cli
                .connection_string
                .or(file.connection_string)
                .unwrap_or_else(|| DEFAULT_CONNECTION_STRING.to_string()),
            listen_port: cli
                .listen_port
                .or(file.listen_port)
                .unwrap_or(DEFAULT_LISTEN_PORT),
            metrics_path: cli
                .metrics_path
                .or(file.metrics_path)
                .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string()),
            pid_file: cli.pid_file.or(file.pid_file),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::InvalidListenPort);
        }
        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::InvalidMetricsPath(self.metrics_path.clone()));
        }
        if self.metrics_path == "/" {
            return Err(ConfigError::ReservedMetricsPath);
        }
        Ok(())
    }
}
