use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Seconds between checks when a monitor has no usable interval
pub const DEFAULT_CHECK_INTERVAL: u64 = 60;

/// Request timeout in seconds when a monitor has no usable timeout
pub const DEFAULT_TIMEOUT: u64 = 10;

/// Consecutive failed checks before a monitor is declared down
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Minimum seconds between two down notifications for the same monitor
pub const DEFAULT_NOTIFICATION_COOLDOWN: u64 = 300;

/// How often the daemon logs a status snapshot
pub const DEFAULT_STATUS_REPORT: u64 = 2;

/// How often the daemon re-reads monitors edited by other processes
pub const DEFAULT_SYNC_INTERVAL: u64 = 10;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "crate::util::get_database_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: crate::util::get_database_path(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Notification targets; an empty list only logs
    #[serde(default)]
    pub alerts: Vec<Alert>,

    #[serde(default = "default_status_report")]
    pub status_report_secs: u64,

    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            alerts: Vec::new(),
            status_report_secs: default_status_report(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

/// Knobs of the check engine shared by the tracker and the scheduler
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_notification_cooldown")]
    pub notification_cooldown_secs: u64,

    #[serde(default = "default_interval")]
    pub default_interval_secs: u64,

    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            notification_cooldown_secs: default_notification_cooldown(),
            default_interval_secs: default_interval(),
            default_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl EngineConfig {
    /// Failure threshold, never below one
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold.max(1)
    }

    pub fn notification_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.notification_cooldown_secs.min(i64::MAX as u64) as i64)
    }

    /// Effective tick period for a configured interval
    pub fn check_interval(&self, configured_secs: i64) -> Duration {
        Duration::from_secs(normalize_interval(
            configured_secs,
            self.default_interval_secs.max(1),
        ))
    }

    /// Effective request deadline for a configured timeout
    pub fn request_timeout(&self, configured_secs: i64) -> Duration {
        Duration::from_secs(normalize_timeout(
            configured_secs,
            self.default_timeout_secs.max(1),
        ))
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Log,
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

/// Non-positive intervals fall back to `default`, anything else is at least one second.
pub fn normalize_interval(secs: i64, default: u64) -> u64 {
    if secs <= 0 { default } else { (secs as u64).max(1) }
}

/// Non-positive timeouts fall back to `default`.
pub fn normalize_timeout(secs: i64, default: u64) -> u64 {
    if secs <= 0 { default } else { secs as u64 }
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_notification_cooldown() -> u64 {
    DEFAULT_NOTIFICATION_COOLDOWN
}

fn default_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_status_report() -> u64 {
    DEFAULT_STATUS_REPORT
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL
}

pub fn default_user_agent() -> String {
    format!("uptime-monitoring/{}", env!("CARGO_PKG_VERSION"))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
