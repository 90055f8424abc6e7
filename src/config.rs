//! Configuration management for Meterbook
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every section carries defaults so a config
//! file only needs to name what differs (usually the contract and credentials).

use crate::error::{MeterbookError, Result};
use crate::record::Resolution;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Contract whose usage is cached; resolved from the account summary when empty
    pub contract_id: String,

    /// Business account id sent as the `ba` query parameter (optional)
    pub account_id: String,

    /// Directory holding `usage_cache_<contract>.json` files
    pub cache_dir: String,

    /// IANA timezone used to decide what "today" is
    pub timezone: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Upstream API configuration
    pub api: ApiConfig,

    /// Sync windows, cadences and retry policy
    pub sync: SyncConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for console output
    pub console_level: Option<String>,

    /// Optional override for the log file
    pub file_level: Option<String>,

    /// Path to log file (its parent directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Contact Energy API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL
    pub base_url: String,

    /// Value of the `x-api-key` header
    pub api_key: String,

    /// Account email
    pub email: String,

    /// Account password
    #[serde(skip_serializing)]
    pub password: String,

    /// Timeout for login and account calls
    pub account_timeout_secs: u64,

    /// Timeout for usage-history calls; the usage endpoint is slow
    pub usage_timeout_secs: u64,
}

/// Retention window, cadence and lookback limit for one resolution.
///
/// `window` and `max_lookback` are in days for hourly and daily data and in
/// months for monthly data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    /// Trailing period kept in cache
    pub window: u32,

    /// Minimum time between two syncs of this resolution
    pub sync_interval_hours: u32,

    /// Oldest data the API will serve
    pub max_lookback: u32,
}

/// Retry behaviour for a single logical fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per request, including the first one
    pub max_attempts: u32,

    /// Linear backoff unit; attempt `n` waits `n * backoff_ms`
    pub backoff_ms: u64,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub hourly: ResolutionPolicy,
    pub daily: ResolutionPolicy,
    pub monthly: ResolutionPolicy,

    /// Retry policy applied to every usage request
    pub retry: RetryConfig,

    /// Period of the background sync loop
    pub cycle_interval_minutes: u64,
}

impl SyncConfig {
    /// Policy row for a resolution
    pub fn policy(&self, resolution: Resolution) -> &ResolutionPolicy {
        match resolution {
            Resolution::Hourly => &self.hourly,
            Resolution::Daily => &self.daily,
            Resolution::Monthly => &self.monthly,
        }
    }

    /// Period of the background sync loop
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_minutes.saturating_mul(60))
    }
}

impl ResolutionPolicy {
    /// Cadence as a chrono duration
    pub fn sync_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.sync_interval_hours))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "meterbook_config.yaml",
            "/data/meterbook_config.yaml",
            "/etc/meterbook/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            MeterbookError::validation("timezone", format!("{}: {}", self.timezone, e).as_str())
        })
    }

    /// Cache directory as a path
    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.trim().is_empty() {
            return Err(MeterbookError::validation(
                "cache_dir",
                "Cache directory cannot be empty",
            ));
        }

        self.tz()?;

        let hourly = &self.sync.hourly;
        if !(1..=14).contains(&hourly.window) {
            return Err(MeterbookError::validation(
                "sync.hourly.window",
                "Must be between 1 and 14 days",
            ));
        }

        for resolution in Resolution::ALL {
            let policy = self.sync.policy(resolution);
            let prefix = format!("sync.{}", resolution);
            if policy.window == 0 {
                return Err(MeterbookError::validation(
                    format!("{}.window", prefix).as_str(),
                    "Must be greater than 0",
                ));
            }
            if policy.window > policy.max_lookback {
                return Err(MeterbookError::validation(
                    format!("{}.window", prefix).as_str(),
                    "Cannot exceed max_lookback",
                ));
            }
            if policy.sync_interval_hours == 0 {
                return Err(MeterbookError::validation(
                    format!("{}.sync_interval_hours", prefix).as_str(),
                    "Must be greater than 0",
                ));
            }
        }

        if self.sync.retry.max_attempts == 0 {
            return Err(MeterbookError::validation(
                "sync.retry.max_attempts",
                "Must be greater than 0",
            ));
        }

        if self.sync.cycle_interval_minutes == 0 {
            return Err(MeterbookError::validation(
                "sync.cycle_interval_minutes",
                "Must be greater than 0",
            ));
        }

        if self.api.usage_timeout_secs == 0 || self.api.account_timeout_secs == 0 {
            return Err(MeterbookError::validation(
                "api",
                "Request timeouts must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.hourly.window, 9);
        assert_eq!(config.sync.daily.window, 35);
        assert_eq!(config.sync.monthly.window, 18);
        assert_eq!(config.sync.monthly.sync_interval_hours, 168);
        assert_eq!(config.sync.retry.max_attempts, 3);
        assert_eq!(config.api.usage_timeout_secs, 60);
        assert_eq!(config.timezone, "Pacific/Auckland");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.sync.hourly.window = 15;
        assert!(config.validate().is_err());

        config = Config::default();
        config.sync.daily.window = 90;
        assert!(config.validate().is_err());

        config = Config::default();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "contract_id: \"123456\"\nsync:\n  daily:\n    window: 40\n    sync_interval_hours: 12\n    max_lookback: 60\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.contract_id, "123456");
        assert_eq!(config.sync.daily.window, 40);
        assert_eq!(config.sync.hourly.window, 9);
        assert_eq!(config.logging.level, "INFO");
    }

    #[test]
    fn test_policy_lookup() {
        let config = SyncConfig::default();
        assert_eq!(config.policy(Resolution::Monthly).max_lookback, 24);
        assert_eq!(
            config.policy(Resolution::Daily).sync_interval(),
            chrono::Duration::hours(24)
        );
    }
}
