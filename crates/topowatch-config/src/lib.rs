//! Configuration for the topowatch CLI.
//!
//! Layered with figment: built-in defaults, then the TOML file, then
//! `TOPOWATCH_*` environment variables (`__` separates sections, e.g.
//! `TOPOWATCH_MONITOR__WORKER_COUNT=8`). The result translates into a
//! validated `topowatch_core::MonitorConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use topowatch_core::MonitorConfig;

/// Environment prefix for every override.
pub const ENV_PREFIX: &str = "TOPOWATCH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[monitor]`: pacing and sizing of background work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSection {
    pub hot_reload_interval_ms: u64,
    pub full_sync_interval_ms: u64,
    pub dispatch_interval_ms: u64,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub one_time_capacity: usize,
    pub lock_retry_attempts: u32,
    pub lock_retry_delay_ms: u64,
    pub default_polling_interval_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        let core = MonitorConfig::default();
        Self {
            hot_reload_interval_ms: millis(core.hot_reload_interval),
            full_sync_interval_ms: millis(core.full_sync_interval),
            dispatch_interval_ms: millis(core.dispatch_interval),
            worker_count: core.worker_count,
            queue_capacity: core.queue_capacity,
            one_time_capacity: core.one_time_capacity,
            lock_retry_attempts: core.lock_retry_attempts,
            lock_retry_delay_ms: millis(core.lock_retry_delay),
            default_polling_interval_secs: core.default_polling_interval_secs,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// `[logging]`: defaults for the CLI's tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Filter directive used when neither `-v` nor `RUST_LOG` is given.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate the `[monitor]` section and build the runtime config.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let m = &self.monitor;
        non_zero("monitor.hot_reload_interval_ms", m.hot_reload_interval_ms)?;
        non_zero("monitor.full_sync_interval_ms", m.full_sync_interval_ms)?;
        non_zero("monitor.dispatch_interval_ms", m.dispatch_interval_ms)?;
        non_zero("monitor.worker_count", m.worker_count)?;
        non_zero("monitor.queue_capacity", m.queue_capacity)?;
        non_zero("monitor.one_time_capacity", m.one_time_capacity)?;
        non_zero("monitor.lock_retry_attempts", m.lock_retry_attempts)?;
        if !topowatch_core::VALID_POLLING_RANGE_SECS.contains(&m.default_polling_interval_secs) {
            return Err(ConfigError::Validation {
                field: "monitor.default_polling_interval_secs".into(),
                reason: format!(
                    "must be within {}..={} seconds, got {}",
                    topowatch_core::VALID_POLLING_RANGE_SECS.start(),
                    topowatch_core::VALID_POLLING_RANGE_SECS.end(),
                    m.default_polling_interval_secs
                ),
            });
        }

        Ok(MonitorConfig {
            hot_reload_interval: Duration::from_millis(m.hot_reload_interval_ms),
            full_sync_interval: Duration::from_millis(m.full_sync_interval_ms),
            dispatch_interval: Duration::from_millis(m.dispatch_interval_ms),
            worker_count: m.worker_count,
            queue_capacity: m.queue_capacity,
            one_time_capacity: m.one_time_capacity,
            lock_retry_attempts: m.lock_retry_attempts,
            lock_retry_delay: Duration::from_millis(m.lock_retry_delay_ms),
            default_polling_interval_secs: m.default_polling_interval_secs,
        })
    }
}

fn non_zero<T: PartialEq + Default>(field: &str, value: T) -> Result<(), ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "topowatch", "topowatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("topowatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The provider stack for `path`: defaults, file, environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full Config from `path` (or the platform default) plus environment.
///
/// A missing file is not an error: defaults and environment still apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent directories.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
