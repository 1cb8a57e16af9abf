//! Configuration loaded from environment variables (and an optional `.env` file).

use std::env;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::application::reservation::EngineSettings;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL. In-memory adapters are used when unset.
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Reservation engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound for booking store and audit log calls
    pub store_timeout_ms: u64,
    /// Upper bound for resource catalog calls
    pub lookup_timeout_ms: u64,
    /// Window in which an identical request without an idempotency key is a replay
    pub dedupe_window_secs: i64,
    /// UTC offset of the lab, e.g. `+08:00`. Decides what "today" is.
    pub lab_utc_offset: String,
    /// JSON file with resources for the in-memory catalog
    pub resource_seed_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LAB_UTC_OFFSET must look like +08:00 (got {0:?})")]
    InvalidLabOffset(String),

    #[error("{key} could not be parsed (got {value:?})")]
    Unparsable { key: &'static str, value: String },

    #[error("{key} must be greater than zero (got {value})")]
    NotPositive { key: &'static str, value: i64 },
}

/// Parse a raw environment value, using `default` only when the variable is unset.
fn parse_value<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Unparsable { key, value }),
    }
}

fn parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    parse_value(key, env::var(key).ok(), default)
}

fn positive(key: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigError::NotPositive { key, value })
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing values fall back to their defaults. A value that is set but
    /// does not parse is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty()),
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed_or("PORT", 3000)?,
            },
            engine: EngineConfig {
                store_timeout_ms: parsed_or("STORE_TIMEOUT_MS", 5_000)?,
                lookup_timeout_ms: parsed_or("LOOKUP_TIMEOUT_MS", 3_000)?,
                dedupe_window_secs: parsed_or("DEDUPE_WINDOW_SECS", 120)?,
                lab_utc_offset: env::var("LAB_UTC_OFFSET").unwrap_or_else(|_| "+08:00".to_string()),
                resource_seed_path: env::var("RESOURCE_SEED_PATH").ok(),
            },
        })
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl EngineConfig {
    /// Runtime settings for the reservation engine
    pub fn settings(&self) -> Result<EngineSettings, ConfigError> {
        let lab_offset = self
            .lab_utc_offset
            .parse::<FixedOffset>()
            .map_err(|_| ConfigError::InvalidLabOffset(self.lab_utc_offset.clone()))?;

        positive("STORE_TIMEOUT_MS", i64::try_from(self.store_timeout_ms).unwrap_or(i64::MAX))?;
        positive("LOOKUP_TIMEOUT_MS", i64::try_from(self.lookup_timeout_ms).unwrap_or(i64::MAX))?;
        let dedupe_window_secs = positive("DEDUPE_WINDOW_SECS", self.dedupe_window_secs)?;

        Ok(EngineSettings {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            dedupe_window: chrono::Duration::seconds(dedupe_window_secs),
            lab_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(offset: &str) -> EngineConfig {
        EngineConfig {
            store_timeout_ms: 250,
            lookup_timeout_ms: 100,
            dedupe_window_secs: 30,
            lab_utc_offset: offset.to_string(),
            resource_seed_path: None,
        }
    }

    #[test]
    fn test_settings_from_engine_config() {
        let settings = engine("+08:00").settings().unwrap();
        assert_eq!(settings.store_timeout, Duration::from_millis(250));
        assert_eq!(settings.lookup_timeout, Duration::from_millis(100));
        assert_eq!(settings.dedupe_window, chrono::Duration::seconds(30));
        assert_eq!(settings.lab_offset.local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_negative_offset() {
        let settings = engine("-05:00").settings().unwrap();
        assert_eq!(settings.lab_offset.local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_non_positive_values_are_rejected() {
        let mut config = engine("+08:00");
        config.dedupe_window_secs = -30;
        assert!(matches!(
            config.settings(),
            Err(ConfigError::NotPositive { key: "DEDUPE_WINDOW_SECS", value: -30 })
        ));

        let mut config = engine("+08:00");
        config.store_timeout_ms = 0;
        assert!(matches!(
            config.settings(),
            Err(ConfigError::NotPositive { key: "STORE_TIMEOUT_MS", .. })
        ));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("STORE_TIMEOUT_MS", None, 5_000u64).unwrap(), 5_000);
        assert_eq!(
            parse_value("STORE_TIMEOUT_MS", Some(" 750 ".to_string()), 5_000u64).unwrap(),
            750
        );
        assert!(matches!(
            parse_value("STORE_TIMEOUT_MS", Some("5s".to_string()), 5_000u64),
            Err(ConfigError::Unparsable { key: "STORE_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            parse_value("DEDUPE_WINDOW_SECS", Some("two minutes".to_string()), 120i64),
            Err(ConfigError::Unparsable { .. })
        ));
    }

    #[test]
    fn test_invalid_offset_is_rejected() {
        assert!(matches!(
            engine("Asia/Taipei").settings(),
            Err(ConfigError::InvalidLabOffset(_))
        ));
    }
}
