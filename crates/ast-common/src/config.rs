//! ---
//! ast_section: "01-core-functionality"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Shared primitives and utilities for the platform runtime."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_users_table() -> String {
    "ast-users".to_owned()
}

fn default_trucks_table() -> String {
    "ast-trucks".to_owned()
}

fn default_alerts_table() -> String {
    "ast-alerts".to_owned()
}

fn default_routes_table() -> String {
    "ast-routes".to_owned()
}

fn default_detections_table() -> String {
    "ast-detections".to_owned()
}

fn default_bucket() -> String {
    "ast-data-bucket".to_owned()
}

fn default_simulator_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_simulator_port() -> u16 {
    2000
}

fn default_simulator_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_telemetry_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_stage_duration() -> Duration {
    Duration::from_secs(1)
}

fn default_log_tail() -> usize {
    50
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:5000".parse().expect("valid default api address")
}

/// Primary configuration object for the AST platform runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "AST_CONFIG";

    /// Load configuration from disk, respecting the `AST_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            storage: StorageConfig::default(),
            simulator: SimulatorConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode for the platform.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Talk to a real simulator endpoint and managed storage.
    Production,
    /// Run entirely against in-memory backends and the stub simulator.
    #[default]
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Record table names used by the storage collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableNames {
    #[serde(default = "default_users_table")]
    pub users: String,
    #[serde(default = "default_trucks_table")]
    pub trucks: String,
    #[serde(default = "default_alerts_table")]
    pub alerts: String,
    #[serde(default = "default_routes_table")]
    pub routes: String,
    #[serde(default = "default_detections_table")]
    pub detections: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            users: default_users_table(),
            trucks: default_trucks_table(),
            alerts: default_alerts_table(),
            routes: default_routes_table(),
            detections: default_detections_table(),
        }
    }
}

impl TableNames {
    pub fn all(&self) -> [&str; 5] {
        [
            &self.users,
            &self.trucks,
            &self.alerts,
            &self.routes,
            &self.detections,
        ]
    }
}

/// Storage collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub tables: TableNames,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tables: TableNames::default(),
            bucket: default_bucket(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(anyhow!("storage bucket name must not be empty"));
        }
        for table in self.tables.all() {
            if table.trim().is_empty() {
                return Err(anyhow!("storage table names must not be empty"));
            }
        }
        Ok(())
    }
}

/// External driving simulator endpoint settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_simulator_host")]
    pub host: String,
    #[serde(default = "default_simulator_port")]
    pub port: u16,
    #[serde(default = "default_simulator_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: default_simulator_host(),
            port: default_simulator_port(),
            timeout: default_simulator_timeout(),
        }
    }
}

/// Pacing knobs for simulation session workers.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between telemetry samples while a session is running.
    #[serde(default = "default_telemetry_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub telemetry_interval: Duration,
    /// Simulated duration of each worker stage.
    #[serde(default = "default_stage_duration")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stage_duration: Duration,
    /// Number of trailing log lines returned by status snapshots.
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            telemetry_interval: default_telemetry_interval(),
            stage_duration: default_stage_duration(),
            log_tail: default_log_tail(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.telemetry_interval.is_zero() {
            return Err(anyhow!("session telemetry_interval must be positive"));
        }
        if self.log_tail == 0 {
            return Err(anyhow!("session log_tail must be at least one line"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            static_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_document() {
        let config: AppConfig = "".parse().expect("empty config uses defaults");
        assert_eq!(config.mode, Mode::Simulation);
        assert_eq!(config.storage.tables.trucks, "ast-trucks");
        assert_eq!(config.session.telemetry_interval, Duration::from_secs(1));
        assert!(config.api.enabled);
    }

    #[test]
    fn mode_and_tables_override() {
        let config: AppConfig = r#"
            mode = "production"

            [storage.tables]
            trucks = "fleet-trucks"

            [session]
            telemetry_interval = 2
            stage_duration = 3
        "#
        .parse()
        .expect("valid config");
        assert_eq!(config.mode, Mode::Production);
        assert_eq!(config.storage.tables.trucks, "fleet-trucks");
        assert_eq!(config.storage.tables.alerts, "ast-alerts");
        assert_eq!(config.session.telemetry_interval, Duration::from_secs(2));
        assert_eq!(config.session.stage_duration, Duration::from_secs(3));
    }

    #[test]
    fn empty_bucket_rejected() {
        let err = r#"
            [storage]
            bucket = ""
        "#
        .parse::<AppConfig>()
        .expect_err("empty bucket must fail validation");
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn zero_telemetry_interval_rejected() {
        let err = r#"
            [session]
            telemetry_interval = 0
        "#
        .parse::<AppConfig>()
        .expect_err("zero interval must fail validation");
        assert!(err.to_string().contains("telemetry_interval"));
    }
}
