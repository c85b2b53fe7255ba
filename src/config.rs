use crate::constants;
use crate::error::{Result, StageError};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed_url: String,
    pub local_feed_path: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    /// `<database file>/<qualified table name>`, e.g. `data/events.sqlite/EVENTS.DBO.INCIDENTS`
    pub destination_table: String,
    pub viewer_role: String,
    pub editor_role: String,
    pub request_timeout_secs: Option<u64>,
    pub lock_stale_after_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: constants::DEFAULT_FEED_URL.to_string(),
            local_feed_path: PathBuf::from(constants::DEFAULT_LOCAL_FEED_PATH),
            log_path: PathBuf::from(constants::DEFAULT_LOG_PATH),
            lock_path: PathBuf::from(constants::DEFAULT_LOCK_PATH),
            destination_table: constants::DEFAULT_DESTINATION_TABLE.to_string(),
            viewer_role: constants::DEFAULT_VIEWER_ROLE.to_string(),
            editor_role: constants::DEFAULT_EDITOR_ROLE.to_string(),
            request_timeout_secs: None,
            lock_stale_after_secs: constants::DEFAULT_LOCK_STALE_AFTER_SECS,
        }
    }
}

impl Config {
    /// Reads `config_path` if it exists, falls back to defaults otherwise, then
    /// applies environment overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let config_content = fs::read_to_string(config_path).map_err(|e| {
                StageError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            Self::from_toml(&config_content)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("GEORSS_FEED_URL") {
            if !url.trim().is_empty() {
                self.feed_url = url;
            }
        }
        if let Ok(table) = env::var("GEORSS_DESTINATION_TABLE") {
            if !table.trim().is_empty() {
                self.destination_table = table;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed_url.trim().is_empty() {
            return Err(StageError::Config("feed_url must not be empty".to_string()));
        }
        if self.viewer_role.trim().is_empty() || self.editor_role.trim().is_empty() {
            return Err(StageError::Config("role names must not be empty".to_string()));
        }
        self.lock_stale_after()?;
        Ok(())
    }

    /// Age after which a held run lock is considered abandoned.
    pub fn lock_stale_after(&self) -> Result<chrono::Duration> {
        if self.lock_stale_after_secs > constants::MAX_LOCK_STALE_AFTER_SECS {
            return Err(StageError::Config(format!(
                "lock_stale_after_secs must be at most {}, got {}",
                constants::MAX_LOCK_STALE_AFTER_SECS,
                self.lock_stale_after_secs
            )));
        }
        Ok(chrono::Duration::seconds(self.lock_stale_after_secs as i64))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
