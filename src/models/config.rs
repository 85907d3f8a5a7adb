//! Configuration module for the underwriting service
//!
//! Every tunable is read from the environment with a documented default.
//! No hardcoded paths or thresholds outside this module.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::underwriting::APPROVAL_THRESHOLD;
use crate::models::errors::{AppError, AppResult, ErrorCode};

/// Fixed-window rate limit settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per window
    pub requests_per_window: u32,
    /// Window duration
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
        }
    }
}

/// Configuration for the underwriting API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite database file
    pub db_path: PathBuf,
    /// JSON model artifact produced by `train_model`
    pub model_path: PathBuf,
    /// Train and save a model when the artifact is missing
    pub auto_train: bool,
    /// Score (0-100) an application must exceed to be approved
    pub approval_threshold: f64,
    pub rate_limit: RateLimitConfig,
    /// Accepted `X-API-Key` values; empty disables auth
    pub api_keys: Vec<String>,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
    /// Where shutdown stats are exported
    pub telemetry_dir: PathBuf,
    /// Emit JSON log lines instead of compact text
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            db_path: PathBuf::from("data/loans.db"),
            model_path: PathBuf::from("artifacts/model.json"),
            auto_train: false,
            approval_threshold: APPROVAL_THRESHOLD,
            rate_limit: RateLimitConfig::default(),
            api_keys: Vec::new(),
            request_timeout: Duration::from_secs(10),
            max_concurrent_requests: 256,
            telemetry_dir: PathBuf::from("telemetry"),
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Build config from process environment
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup (environment, test map)
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Hosting platforms set PORT, fall back to MICROLOAN_PORT for local dev
        let port = match get("PORT").or_else(|| get("MICROLOAN_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let api_keys = get("MICROLOAN_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            host: get("MICROLOAN_HOST").unwrap_or(defaults.host),
            port,
            db_path: get("MICROLOAN_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            model_path: get("MICROLOAN_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            auto_train: opt_bool(&get, "MICROLOAN_AUTO_TRAIN")?.unwrap_or(defaults.auto_train),
            approval_threshold: opt_parse(&get, "MICROLOAN_APPROVAL_THRESHOLD")?
                .unwrap_or(defaults.approval_threshold),
            rate_limit: RateLimitConfig {
                requests_per_window: opt_parse(&get, "MICROLOAN_RATE_LIMIT")?
                    .unwrap_or(defaults.rate_limit.requests_per_window),
                window_duration: opt_parse(&get, "MICROLOAN_RATE_WINDOW_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.rate_limit.window_duration),
            },
            api_keys,
            request_timeout: opt_parse(&get, "MICROLOAN_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_concurrent_requests: opt_parse(&get, "MICROLOAN_MAX_CONCURRENT_REQUESTS")?
                .unwrap_or(defaults.max_concurrent_requests),
            telemetry_dir: get("MICROLOAN_TELEMETRY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.telemetry_dir),
            log_json: opt_bool(&get, "MICROLOAN_LOG_JSON")?.unwrap_or(defaults.log_json),
        };

        config.validate()?;
        Ok(config)
    }

    /// Range checks that parsing alone cannot express
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=100.0).contains(&self.approval_threshold) {
            return Err(AppError::new(
                ErrorCode::ConfigInvalidValue,
                format!(
                    "MICROLOAN_APPROVAL_THRESHOLD must be within 0-100, got {}",
                    self.approval_threshold
                ),
            ));
        }
        if self.rate_limit.requests_per_window == 0 || self.rate_limit.window_duration.is_zero() {
            return Err(AppError::new(
                ErrorCode::ConfigInvalidValue,
                "Rate limit and window must be greater than zero",
            ));
        }
        if self.max_concurrent_requests == 0 || self.request_timeout.is_zero() {
            return Err(AppError::new(
                ErrorCode::ConfigInvalidValue,
                "Concurrency limit and request timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse()
            .map_err(|_| AppError::invalid_config("MICROLOAN_HOST", &self.host))
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::invalid_config(key, raw))
}

fn opt_parse<T, G>(get: &G, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key).map(|raw| parse_value(key, &raw)).transpose()
}

fn opt_bool<G>(get: &G, key: &str) -> AppResult<Option<bool>>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(AppError::invalid_config(key, &raw)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppResult<ServerConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.approval_threshold, 70.0);
        assert_eq!(config.rate_limit.requests_per_window, 100);
        assert!(!config.auth_enabled());
        assert!(!config.auto_train);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("MICROLOAN_PORT", "9100"),
            ("MICROLOAN_API_KEYS", "sk_one, sk_two,"),
            ("MICROLOAN_AUTO_TRAIN", "yes"),
            ("MICROLOAN_RATE_WINDOW_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.api_keys, vec!["sk_one", "sk_two"]);
        assert!(config.auto_train);
        assert_eq!(config.rate_limit.window_duration, Duration::from_secs(5));
    }

    #[test]
    fn test_port_env_takes_precedence() {
        let config = config_from(&[("PORT", "7000"), ("MICROLOAN_PORT", "9100")]).unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = config_from(&[("MICROLOAN_PORT", "eighty")]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);

        let err = config_from(&[("MICROLOAN_APPROVAL_THRESHOLD", "120")]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);

        let err = config_from(&[("MICROLOAN_LOG_JSON", "maybe")]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }
}
