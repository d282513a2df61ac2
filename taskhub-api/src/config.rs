//! API Configuration
//!
//! Server settings read from `TASKHUB_*` environment variables. Database
//! settings live in [`crate::db::DbConfig`] and the sweep job settings in
//! [`crate::jobs::TimeoutSweepConfig`].

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::{DEFAULT_BIND_ADDR, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_SWEEP_BATCH_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid bind address {value}: {reason}")]
    InvalidBindAddr { value: String, reason: String },

    #[error("Unknown store kind: {0} (expected postgres or memory)")]
    UnknownStore(String),
}

/// Backing store for marketplace state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Postgres,
    /// Process-local state; lost on restart.
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(ConfigError::UnknownStore(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,

    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    pub cors_max_age_secs: u64,

    /// Bearer secret guarding `POST /cron/timeout`. `None` leaves it open.
    pub cron_secret: Option<String>,
    /// Candidates per pass for sweeps triggered through the cron endpoint.
    pub sweep_batch_size: i64,

    pub store: StoreKind,
    pub log_format: LogFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            cron_secret: None,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            store: StoreKind::Postgres,
            log_format: LogFormat::Text,
        }
    }
}

impl ApiConfig {
    /// Read configuration from the environment.
    ///
    /// # Environment Variables
    /// - `TASKHUB_BIND_ADDR` (default `0.0.0.0:3000`)
    /// - `TASKHUB_CORS_ORIGINS`: comma-separated origins (default: any)
    /// - `TASKHUB_CORS_MAX_AGE_SECS` (default 86400)
    /// - `TASKHUB_CRON_SECRET`: bearer secret for the cron endpoint (default: unset)
    /// - `TASKHUB_SWEEP_BATCH_SIZE` (default 100)
    /// - `TASKHUB_STORE`: `postgres` or `memory` (default `postgres`)
    /// - `TASKHUB_LOG_FORMAT`: `text` or `json` (default `text`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = match std::env::var("TASKHUB_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreKind::default(),
        };

        Ok(Self {
            bind_addr: std::env::var("TASKHUB_BIND_ADDR")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            cors_origins: std::env::var("TASKHUB_CORS_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or_default(),
            cors_max_age_secs: std::env::var("TASKHUB_CORS_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CORS_MAX_AGE_SECS),
            cron_secret: std::env::var("TASKHUB_CRON_SECRET")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sweep_batch_size: std::env::var("TASKHUB_SWEEP_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &i64| *n > 0)
                .unwrap_or(DEFAULT_SWEEP_BATCH_SIZE),
            store,
            log_format: std::env::var("TASKHUB_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidBindAddr {
                value: self.bind_addr.clone(),
                reason: e.to_string(),
            })
    }

    pub fn with_cron_secret(mut self, secret: impl Into<String>) -> Self {
        self.cron_secret = Some(secret.into());
        self
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://a.example, https://b.example,,"),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(parse_origins("  ").is_empty());
    }

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("memory".parse::<StoreKind>(), Ok(StoreKind::Memory));
        assert_eq!(" Postgres ".parse::<StoreKind>(), Ok(StoreKind::Postgres));
        assert!("redis".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.socket_addr().map(|a| a.port()), Ok(3000));

        let bad = ApiConfig {
            bind_addr: "nowhere".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(
            bad.socket_addr(),
            Err(ConfigError::InvalidBindAddr { .. })
        ));
    }
}
