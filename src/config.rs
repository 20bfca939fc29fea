//! Runtime configuration
//!
//! Loaded from TOML (`~/.fxlens/config.toml` by default). Every field has a
//! default, so an empty file or no file at all is valid. The FRED key may
//! also come from the `FRED_API_KEY` environment variable, which wins over
//! the file.

use crate::error::{FxLensError, Result};
use crate::sources::exchange_rate_host::EXCHANGE_RATE_HOST_BASE_URL;
use crate::sources::fred::FRED_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const FRED_API_KEY_ENV: &str = "FRED_API_KEY";

/// Longest spot history window a cycle may request
pub const MAX_HISTORY_DAYS: i64 = 3650;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxLensConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    pub fred_api_key: Option<String>,
    pub fred_base_url: String,
    pub spot_base_url: String,
    /// Trailing calendar days of spot history per fetch
    pub history_days: i64,
    /// Annualisation factor for the sampling frequency
    pub periods_per_year: f64,
    pub min_observations: usize,
    /// Concurrent currency fetches
    pub max_concurrency: usize,
    pub cycle_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Scheduler interval for `watch`
    pub interval_hours: u64,
    /// Optional JSON override for the curated ratio table
    pub ratio_table_path: Option<PathBuf>,
}

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fxlens")
}

fn default_db_path() -> PathBuf {
    base_dir().join("data").join("fx_data.db")
}

impl Default for FxLensConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            fred_api_key: None,
            fred_base_url: FRED_BASE_URL.to_string(),
            spot_base_url: EXCHANGE_RATE_HOST_BASE_URL.to_string(),
            history_days: 35,
            periods_per_year: 252.0,
            min_observations: 5,
            max_concurrency: 4,
            cycle_timeout_secs: 120,
            request_timeout_secs: 15,
            interval_hours: 6,
            ratio_table_path: None,
        }
    }
}

impl FxLensConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        base_dir().join("config.toml")
    }

    /// Parse from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| FxLensError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from `path`, or the default location if present, then apply env overrides
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file just means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => {
                if !config_path.exists() {
                    return Err(FxLensError::ConfigError(format!(
                        "Config file not found: {}",
                        config_path.display()
                    )));
                }
                Self::from_toml(&std::fs::read_to_string(config_path)?)?
            }
            None => {
                let default_config = Self::default_path();
                if default_config.exists() {
                    log::debug!("Loading config from {}", default_config.display());
                    Self::from_toml(&std::fs::read_to_string(&default_config)?)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(key) = std::env::var(FRED_API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.fred_api_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_days <= 0 {
            return Err(FxLensError::ConfigError("history_days must be positive".to_string()));
        }
        if self.history_days > MAX_HISTORY_DAYS {
            return Err(FxLensError::ConfigError(format!(
                "history_days must be at most {}",
                MAX_HISTORY_DAYS
            )));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(FxLensError::ConfigError(
                "periods_per_year must be positive".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(FxLensError::ConfigError("max_concurrency must be at least 1".to_string()));
        }
        if self.cycle_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(FxLensError::ConfigError("timeouts must be non-zero".to_string()));
        }
        if self.interval_hours == 0 {
            return Err(FxLensError::ConfigError("interval_hours must be non-zero".to_string()));
        }
        Ok(())
    }

    /// The FRED key, required for live rate fetches
    pub fn require_fred_api_key(&self) -> Result<&str> {
        self.fred_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                FxLensError::ConfigError(format!(
                    "FRED API key missing: set {} or fred_api_key in the config file",
                    FRED_API_KEY_ENV
                ))
            })
    }

    pub fn history_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.history_days)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }

    /// Make sure the database directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FxLensConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_window(), chrono::Duration::days(35));
        assert_eq!(config.interval(), Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_partial_toml() {
        let config = FxLensConfig::from_toml(
            r#"
            db_path = "/tmp/fx.db"
            max_concurrency = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/fx.db"));
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.history_days, 35);
    }

    #[test]
    fn test_invalid_values() {
        let config = FxLensConfig::from_toml("max_concurrency = 0").unwrap();
        assert!(config.validate().is_err());

        let config = FxLensConfig::from_toml("history_days = -3").unwrap();
        assert!(config.validate().is_err());

        let config = FxLensConfig::from_toml("history_days = 9223372036854775807").unwrap();
        assert!(matches!(config.validate(), Err(FxLensError::ConfigError(_))));

        let config = FxLensConfig::from_toml("history_days = 3650").unwrap();
        assert!(config.validate().is_ok());

        assert!(FxLensConfig::from_toml("history_days = \"many\"").is_err());
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = FxLensConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, FxLensError::ConfigError(_)));
    }

    #[test]
    fn test_require_key() {
        let mut config = FxLensConfig::default();
        assert!(config.require_fred_api_key().is_err());
        config.fred_api_key = Some("abc".to_string());
        assert_eq!(config.require_fred_api_key().unwrap(), "abc");
    }
}
