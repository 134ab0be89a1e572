//! Environment configuration.
//!
//! Every knob is an environment variable with a default; durations use
//! the `"15m"`/`"48h"` form. An unparseable value is fatal at startup —
//! past this point the service only logs and continues.

use std::env;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use tidepool_domain::time::parse_duration;

pub const ENV_EXCHANGES: &str = "EXCHANGES";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_STORE_BACKEND: &str = "STORE_BACKEND";
pub const ENV_STORE_URL: &str = "STORE_URL";
pub const ENV_INFLUXDB_TOKEN: &str = "INFLUXDB_TOKEN";
pub const ENV_INFLUXDB_ORGANIZATION: &str = "INFLUXDB_ORGANIZATION";
pub const ENV_ASSETLIST_URL: &str = "OSMOSIS_ASSETLIST_JSON_URL";
pub const ENV_ASSETLIST_REFRESH_INTERVAL: &str = "OSMOSIS_ASSETLIST_REFRESH_INTERVAL";
pub const ENV_ASSETLIST_RETRY_INTERVAL: &str = "OSMOSIS_ASSETLIST_RETRY_INTERVAL";
pub const ENV_TRADES_MAX_AGE: &str = "TRADES_MAX_AGE";
pub const ENV_CANDLES_INTERVAL: &str = "CANDLES_INTERVAL";
pub const ENV_CANDLES_PERIOD: &str = "CANDLES_PERIOD";
pub const ENV_API_LISTEN_ADDR: &str = "API_LISTEN_ADDR";

const DEFAULT_EXCHANGES: &str = "osmosis";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_STORE_BACKEND: &str = "influxdb2";
const DEFAULT_STORE_URL: &str = "http://localhost:8086";
const DEFAULT_INFLUXDB_ORGANIZATION: &str = "tidepool";
const DEFAULT_ASSETLIST_REFRESH_INTERVAL: &str = "15m";
const DEFAULT_ASSETLIST_RETRY_INTERVAL: &str = "30s";
const DEFAULT_TRADES_MAX_AGE: &str = "48h";
const DEFAULT_CANDLES_INTERVAL: &str = "1m";
const DEFAULT_CANDLES_PERIOD: &str = "48h";
const DEFAULT_API_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: '{value}'")]
    InvalidDuration { name: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub exchanges: Vec<String>,
    pub log_level: String,
    pub store_backend: String,
    pub store_url: String,
    pub influxdb_token: String,
    pub influxdb_organization: String,
    pub assetlist_url: Option<String>,
    pub assetlist_refresh_interval: StdDuration,
    pub assetlist_retry_interval: StdDuration,
    pub trades_max_age: Duration,
    pub candles_interval: Duration,
    pub candles_period: Duration,
    pub api_listen_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let exchanges = split_exchanges(&env_or(ENV_EXCHANGES, DEFAULT_EXCHANGES));
        if exchanges.is_empty() {
            return Err(ConfigError::Empty(ENV_EXCHANGES));
        }
        Ok(Self {
            exchanges,
            log_level: env_or(ENV_LOG_LEVEL, DEFAULT_LOG_LEVEL),
            store_backend: env_or(ENV_STORE_BACKEND, DEFAULT_STORE_BACKEND),
            store_url: env_or(ENV_STORE_URL, DEFAULT_STORE_URL),
            influxdb_token: env::var(ENV_INFLUXDB_TOKEN).unwrap_or_default(),
            influxdb_organization: env_or(
                ENV_INFLUXDB_ORGANIZATION,
                DEFAULT_INFLUXDB_ORGANIZATION,
            ),
            assetlist_url: env::var(ENV_ASSETLIST_URL).ok().filter(|url| !url.is_empty()),
            assetlist_refresh_interval: std_duration_var(
                ENV_ASSETLIST_REFRESH_INTERVAL,
                DEFAULT_ASSETLIST_REFRESH_INTERVAL,
            )?,
            assetlist_retry_interval: std_duration_var(
                ENV_ASSETLIST_RETRY_INTERVAL,
                DEFAULT_ASSETLIST_RETRY_INTERVAL,
            )?,
            trades_max_age: duration_var(ENV_TRADES_MAX_AGE, DEFAULT_TRADES_MAX_AGE)?,
            candles_interval: duration_var(ENV_CANDLES_INTERVAL, DEFAULT_CANDLES_INTERVAL)?,
            candles_period: duration_var(ENV_CANDLES_PERIOD, DEFAULT_CANDLES_PERIOD)?,
            api_listen_addr: env_or(ENV_API_LISTEN_ADDR, DEFAULT_API_LISTEN_ADDR),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn split_exchanges(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn duration_var(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let value = env_or(name, default);
    parse_duration(&value).map_err(|_| ConfigError::InvalidDuration { name, value })
}

fn std_duration_var(name: &'static str, default: &str) -> Result<StdDuration, ConfigError> {
    let value = duration_var(name, default)?;
    value
        .to_std()
        .map_err(|_| ConfigError::InvalidDuration {
            name,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchanges_split_and_trim() {
        assert_eq!(
            split_exchanges("osmosis, kujira ,"),
            vec!["osmosis".to_string(), "kujira".to_string()]
        );
        assert!(split_exchanges("").is_empty());
    }
}
