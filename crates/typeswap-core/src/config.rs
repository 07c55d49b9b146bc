use crate::error::{Result, TypeswapError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_FILENAME: &str = "config.json";
pub const DB_FILENAME: &str = "typeswap.json";
pub const HOME_OVERRIDE_VAR: &str = "TYPESWAP_HOME";
pub const DEFAULT_CREDENTIAL_PREFIX: &str = "@";

/// Get the typeswap configuration directory
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = env::var(HOME_OVERRIDE_VAR) {
        return PathBuf::from(dir);
    }
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".typeswap"))
        .unwrap_or_else(|_| PathBuf::from(".typeswap"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    if !config_dir.exists() {
        info!(path = %config_dir.display(), "Creating config directory");
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir)
}

/// Get the path to the database file
pub fn get_db_file_path() -> PathBuf {
    get_config_dir().join(DB_FILENAME)
}

/// Get the path to the optional settings file
pub fn get_config_file_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILENAME)
}

/// Tunables for the expansion pipeline.
///
/// Every field has a default, so a `config.json` only needs to name the
/// values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub replacement_cache_capacity: usize,
    pub credential_cache_capacity: usize,
    pub max_buffer_len: usize,
    pub max_shortcut_len: usize,
    pub max_content_len: usize,
    /// Hard bound of the pending-word channel; words are dropped when full.
    pub queue_capacity: usize,
    /// Health ceiling for the pending-word queue.
    pub max_queue_len: usize,
    /// Health ceiling for both caches combined.
    pub max_cache_population: usize,
    pub credential_prefix: String,
    /// Keep a resolved credential in the credential cache until the next
    /// reload instead of rotating on every use.
    pub pin_credentials: bool,
    pub min_replacement_interval_ms: u64,
    pub clipboard_retry_attempts: u32,
    pub clipboard_base_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub backspace_delay_ms: u64,
    pub paste_delay_ms: u64,
    pub queue_poll_interval_ms: u64,
    pub health_check_interval_secs: u64,
    pub resource_check_interval_secs: u64,
    pub unhealthy_backoff_ms: u64,
    pub max_consecutive_errors: u32,
    pub error_backoff_ms: u64,
    pub restart_pause_ms: u64,
    pub join_timeout_ms: u64,
    pub notification_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replacement_cache_capacity: 1000,
            credential_cache_capacity: 100,
            max_buffer_len: 100,
            max_shortcut_len: 50,
            max_content_len: 10_000,
            queue_capacity: 1024,
            max_queue_len: 1000,
            max_cache_population: 1000,
            credential_prefix: DEFAULT_CREDENTIAL_PREFIX.to_string(),
            pin_credentials: true,
            min_replacement_interval_ms: 100,
            clipboard_retry_attempts: 5,
            clipboard_base_delay_ms: 50,
            settle_delay_ms: 50,
            backspace_delay_ms: 1,
            paste_delay_ms: 50,
            queue_poll_interval_ms: 100,
            health_check_interval_secs: 60,
            resource_check_interval_secs: 60,
            unhealthy_backoff_ms: 1000,
            max_consecutive_errors: 3,
            error_backoff_ms: 1000,
            restart_pause_ms: 1000,
            join_timeout_ms: 1000,
            notification_workers: 2,
        }
    }
}

impl Config {
    /// Load `config.json` from the config directory, falling back to the
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("replacement_cache_capacity", self.replacement_cache_capacity),
            ("credential_cache_capacity", self.credential_cache_capacity),
            ("max_buffer_len", self.max_buffer_len),
            ("max_shortcut_len", self.max_shortcut_len),
            ("max_content_len", self.max_content_len),
            ("queue_capacity", self.queue_capacity),
            ("max_queue_len", self.max_queue_len),
            ("max_cache_population", self.max_cache_population),
            ("notification_workers", self.notification_workers),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(TypeswapError::InvalidConfig(format!(
                "{} must be greater than zero",
                name
            )));
        }
        if self.clipboard_retry_attempts == 0 {
            return Err(TypeswapError::InvalidConfig(
                "clipboard_retry_attempts must be greater than zero".to_string(),
            ));
        }
        if self.credential_prefix.is_empty() {
            return Err(TypeswapError::InvalidConfig(
                "credential_prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn min_replacement_interval(&self) -> Duration {
        Duration::from_millis(self.min_replacement_interval_ms)
    }

    pub fn clipboard_base_delay(&self) -> Duration {
        Duration::from_millis(self.clipboard_base_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn backspace_delay(&self) -> Duration {
        Duration::from_millis(self.backspace_delay_ms)
    }

    pub fn paste_delay(&self) -> Duration {
        Duration::from_millis(self.paste_delay_ms)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn resource_check_interval(&self) -> Duration {
        Duration::from_secs(self.resource_check_interval_secs)
    }

    pub fn unhealthy_backoff(&self) -> Duration {
        Duration::from_millis(self.unhealthy_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, r##"{ "max_shortcut_len": 20, "credential_prefix": "#" }"##).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_shortcut_len, 20);
        assert_eq!(config.credential_prefix, "#");
        assert_eq!(config.replacement_cache_capacity, 1000);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TypeswapError::InvalidConfig(msg)) if msg.contains("queue_capacity")
        ));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let config = Config {
            credential_prefix: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
