//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_STOCK_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CORS_ALLOWED_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    /// Postgres is used when set; otherwise the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Bound on waiting for a product row lock held by another order.
    pub stock_lock_timeout: Duration,
    /// Browser origins allowed to call the API cross-origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            stock_lock_timeout: Duration::from_millis(DEFAULT_STOCK_LOCK_TIMEOUT_MS),
            cors_allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGINS.to_string()],
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present), then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEFAULT_JWT_SECRET.to_string()
        });

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), DEFAULT_DB_MAX_CONNECTIONS)?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let lock_timeout_ms = parse_or("STOCK_LOCK_TIMEOUT_MS", get("STOCK_LOCK_TIMEOUT_MS"), DEFAULT_STOCK_LOCK_TIMEOUT_MS)?;

        let cors_allowed_origins = match get("CORS_ALLOWED_ORIGINS") {
            None => vec![DEFAULT_CORS_ALLOWED_ORIGINS.to_string()],
            Some(raw) => parse_origins(&raw)?,
        };

        Ok(Self {
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            db_max_connections,
            stock_lock_timeout: Duration::from_millis(lock_timeout_ms),
            cors_allowed_origins,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Comma-separated list of `http(s)://host[:port]` origins.
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key: "CORS_ALLOWED_ORIGINS",
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| o.trim_end_matches('/').to_string())
        .collect();
    if origins.is_empty() {
        return Err(invalid("no origins listed"));
    }
    if let Some(bad) = origins
        .iter()
        .find(|o| !(o.starts_with("http://") || o.starts_with("https://")))
    {
        return Err(invalid(&format!("origin {bad} must start with http:// or https://")));
    }
    Ok(origins)
}
