//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_level: Level,
    /// Cadence of dashboard-driven token rotation.
    pub rotation_interval: Duration,
    pub require_selfie: bool,
    /// Per-session buffer of the live attendance feed.
    pub notify_buffer: usize,
    pub cors_origin: HeaderValue,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            db_max_connections: 5,
            log_level: Level::INFO,
            rotation_interval: Duration::from_secs(45),
            require_selfie: false,
            notify_buffer: attendance_core::notify::DEFAULT_BUFFER,
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_address = match var("BIND_ADDRESS") {
            Some(value) => value.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
            })?,
            None => defaults.bind_address,
        };

        let database_url = var("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let db_max_connections =
            parse_positive(&var, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let rotation_secs = parse_positive(
            &var,
            "TOKEN_ROTATION_SECS",
            defaults.rotation_interval.as_secs(),
        )?;

        let require_selfie = match var("REQUIRE_SELFIE") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "REQUIRE_SELFIE".to_string(),
                    format!("'{}' is not a boolean", value),
                )
            })?,
            None => defaults.require_selfie,
        };

        let notify_buffer = parse_positive(&var, "NOTIFY_BUFFER", defaults.notify_buffer)?;

        let cors_origin = match var("CORS_ORIGIN") {
            Some(value) => HeaderValue::from_str(&value).map_err(|e| {
                ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
            })?,
            None => defaults.cors_origin,
        };

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            rotation_interval: Duration::from_secs(rotation_secs),
            require_selfie,
            notify_buffer,
            cors_origin,
        })
    }
}

fn parse_positive<F, T>(var: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = var(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a positive integer", raw),
        )),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
