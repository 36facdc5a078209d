//! Service configuration loaded from the environment
//!
//! `.env` is read first (if present) by `main`; every setting has a default
//! except that a present-but-unparseable value is a startup error.

use std::env;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "postgresql://campus:campus@db:5432/campus_trade";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Runtime settings for the server
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    /// How many available items SmartMatch scores per request
    pub smartmatch_candidate_limit: i64,
    pub smartmatch_default_limit: usize,
    /// Per-user broadcast buffer for real-time notifications
    pub notification_channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8000,
            db_max_connections: 10,
            run_migrations: true,
            smartmatch_candidate_limit: 100,
            smartmatch_default_limit: 12,
            notification_channel_capacity: 64,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            host: parse_or(&lookup, "HOST", defaults.host)?,
            port: parse_or(&lookup, "PORT", defaults.port)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", defaults.run_migrations)?,
            smartmatch_candidate_limit: parse_or(
                &lookup,
                "SMARTMATCH_CANDIDATE_LIMIT",
                defaults.smartmatch_candidate_limit,
            )?,
            smartmatch_default_limit: parse_or(
                &lookup,
                "SMARTMATCH_DEFAULT_LIMIT",
                defaults.smartmatch_default_limit,
            )?,
            notification_channel_capacity: parse_or(
                &lookup,
                "NOTIFICATION_CHANNEL_CAPACITY",
                defaults.notification_channel_capacity,
            )?,
        };

        if config.notification_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFICATION_CHANNEL_CAPACITY".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{:?}: {}", raw, e),
        }),
        None => {
            info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.smartmatch_candidate_limit, 100);
        assert_eq!(config.smartmatch_default_limit, 12);
        assert!(config.run_migrations);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8000");
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("PORT", "9100"),
            ("HOST", "127.0.0.1"),
            ("RUN_MIGRATIONS", "false"),
            ("DATABASE_URL", "postgresql://x@localhost/y"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9100");
        assert!(!config.run_migrations);
        assert_eq!(config.database_url, "postgresql://x@localhost/y");
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[("NOTIFICATION_CHANNEL_CAPACITY", "0")]));
        assert!(result.is_err());
    }
}
