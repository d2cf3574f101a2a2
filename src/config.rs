//! Runtime configuration, stored at `~/.keeper/config.json`.
//!
//! Every field has a serde default so a missing or partial file still
//! yields a working configuration.

use std::fs;
use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory not found")]
    HomeDirNotFound,

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// IANA timezone name used to resolve phrases like "tomorrow at 7pm"
    /// and to render confirmation prompts.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Applied when no duration phrase is found in the request.
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,

    /// How far before a task's due time its reminder fires.
    #[serde(default = "default_task_lead")]
    pub task_reminder_lead_minutes: u32,

    /// How long after an unanswered check-in the commitment auto-expires
    /// to Missed.
    #[serde(default = "default_grace")]
    pub auto_expiry_grace_minutes: u32,

    /// Scheduler poll cadence.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Ledger database path. Defaults to `~/.keeper/keeper.db` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_duration_minutes() -> u32 {
    60
}

fn default_task_lead() -> u32 {
    30
}

fn default_grace() -> u32 {
    60
}

fn default_poll_interval() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            default_duration_minutes: default_duration_minutes(),
            task_reminder_lead_minutes: default_task_lead(),
            auto_expiry_grace_minutes: default_grace(),
            poll_interval_secs: default_poll_interval(),
            ledger_path: None,
        }
    }
}

impl Config {
    /// Parse the configured timezone name.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

/// Canonical config file path (`~/.keeper/config.json`).
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".keeper").join("config.json"))
}

/// Load the config from disk. A missing file is not an error — defaults
/// apply until the user writes one.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the config back to disk, creating `~/.keeper/` if needed.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(&path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.default_duration_minutes, 60);
        assert_eq!(config.task_reminder_lead_minutes, 30);
        assert_eq!(config.auto_expiry_grace_minutes, 60);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"timezone":"Asia/Kuala_Lumpur"}"#).unwrap();
        assert_eq!(config.timezone, "Asia/Kuala_Lumpur");
        assert_eq!(config.default_duration_minutes, 60);
        assert!(config.tz().is_ok());
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let config: Config = serde_json::from_str(r#"{"timezone":"Mars/Olympus"}"#).unwrap();
        assert!(matches!(config.tz(), Err(ConfigError::InvalidTimezone(_))));
    }
}
