//! Service configuration
//!
//! Read once from environment variables at startup and immutable afterwards:
//! - `PORT` - listening port (default 3000)
//! - `SHUTDOWN_GRACE_PERIOD_SECS` - drain grace period (default 30)
//! - `RETRY_AFTER_SECS` - `Retry-After` hint sent while draining (default 5)
//! - `APP_ENV` - environment/mode label (default "development")
//! - `POD_NAME` / `HOSTNAME` - instance identity (falls back to a UUID)
//! - `LOG_FORMAT` - `json` or `text` (default text)

use std::time::Duration;
use thiserror::Error;

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Default grace period for in-flight requests after a termination signal
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Default `Retry-After` value for requests rejected during drain
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Default environment label
pub const DEFAULT_ENVIRONMENT: &str = "development";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub grace_period: Duration,
    pub retry_after: Duration,
    pub environment: String,
    pub instance_id: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| invalid("PORT", &raw, e.to_string()))?,
            None => DEFAULT_PORT,
        };

        let grace_period = match get("SHUTDOWN_GRACE_PERIOD_SECS") {
            Some(raw) => parse_positive_secs("SHUTDOWN_GRACE_PERIOD_SECS", &raw)?,
            None => DEFAULT_GRACE_PERIOD,
        };

        let retry_after = match get("RETRY_AFTER_SECS") {
            Some(raw) => parse_positive_secs("RETRY_AFTER_SECS", &raw)?,
            None => DEFAULT_RETRY_AFTER,
        };

        let environment = get("APP_ENV").unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        let instance_id = get("POD_NAME")
            .or_else(|| get("HOSTNAME"))
            .unwrap_or_else(|| format!("lifeline-{}", uuid::Uuid::new_v4()));

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(f) if f.eq_ignore_ascii_case("text") => LogFormat::Text,
            Some(other) => {
                return Err(invalid(
                    "LOG_FORMAT",
                    other,
                    "expected 'json' or 'text'".to_string(),
                ))
            }
            None => LogFormat::Text,
        };

        Ok(Self {
            port,
            grace_period,
            retry_after,
            environment,
            instance_id,
            log_format,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            grace_period: DEFAULT_GRACE_PERIOD,
            retry_after: DEFAULT_RETRY_AFTER,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            instance_id: format!("lifeline-{}", uuid::Uuid::new_v4()),
            log_format: LogFormat::Text,
        }
    }
}

fn parse_positive_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| invalid(key, raw, e.to_string()))?;
    if secs == 0 {
        return Err(invalid(key, raw, "must be greater than zero".to_string()));
    }
    Ok(Duration::from_secs(secs))
}

fn invalid(key: &'static str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
