use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per task (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_secs: 1.0,
            max_delay_secs: 16,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// How long finished tasks stay in the registry (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Keep at most this many finished records; oldest are dropped first.
    pub max_finished: usize,
    /// Drop finished records this many seconds after completion.
    pub max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_finished: 500,
            max_age_secs: 24 * 3600,
        }
    }
}

/// Global configuration loaded from `~/.config/xfer/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XferConfig {
    /// Maximum number of simultaneously active transfers.
    pub max_concurrency: usize,
    /// Concurrency cap applied while a memory warning is in effect.
    pub memory_pressure_concurrency: usize,
    /// Capacity of the scheduler mailbox (commands + executor reports).
    pub channel_capacity: usize,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional retention policy for finished tasks.
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
}

impl Default for XferConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            memory_pressure_concurrency: 1,
            channel_capacity: 256,
            retry: None,
            retention: None,
        }
    }
}

impl XferConfig {
    /// Retry policy from the `[retry]` section, or the built-in default.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }

    pub fn retention(&self) -> RetentionConfig {
        self.retention.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("xfer")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<XferConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

/// Same as [`load_or_init`] but at an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<XferConfig> {
    if !path.exists() {
        let default_cfg = XferConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: XferConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = XferConfig::default();
        assert_eq!(cfg.max_concurrency, 3);
        assert_eq!(cfg.memory_pressure_concurrency, 1);
        assert!(cfg.retry.is_none());
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(16));
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_concurrency = 5
            memory_pressure_concurrency = 2
            channel_capacity = 64
        "#;
        let cfg: XferConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrency, 5);
        assert_eq!(cfg.memory_pressure_concurrency, 2);
        assert_eq!(cfg.channel_capacity, 64);
        assert!(cfg.retry.is_none());
        assert!(cfg.retention.is_none());
        assert_eq!(cfg.retention().max_finished, 500);
    }

    #[test]
    fn config_toml_retry_and_retention() {
        let toml = r#"
            max_concurrency = 3
            memory_pressure_concurrency = 1
            channel_capacity = 256

            [retry]
            max_attempts = 3
            base_delay_secs = 0.5
            max_delay_secs = 4

            [retention]
            max_finished = 10
            max_age_secs = 60
        "#;
        let cfg: XferConfig = toml::from_str(toml).unwrap();
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(4));
        let retention = cfg.retention();
        assert_eq!(retention.max_finished, 10);
        assert_eq!(retention.max_age_secs, 60);
    }

    #[test]
    fn load_or_init_writes_default_then_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xfer").join("config.toml");
        let created = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.max_concurrency, 3);

        fs::write(&path, "max_concurrency = 7\nmemory_pressure_concurrency = 1\nchannel_capacity = 8\n")
            .unwrap();
        let loaded = load_or_init_at(&path).unwrap();
        assert_eq!(loaded.max_concurrency, 7);
    }

    #[test]
    fn load_or_init_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_concurrency = \"lots\"").unwrap();
        let err = load_or_init_at(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("parse"));
    }
}
