//! Configuration loading and representation.
//!
//! Everything comes from environment variables:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `KIOSK_BIND_ADDR` | `0.0.0.0:8080` | HTTP listen address |
//! | `USE_PERSISTENT_STORES` | `false` | Postgres instead of the in-memory store |
//! | `DATABASE_URL` | none | Required when persistent stores are enabled |
//! | `DATABASE_MAX_CONNECTIONS` | `10` | Pool size |
//! | `KIOSK_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `KIOSK_STATISTICS_SENDER` | `no-reply@cafekiosk.com` | From address of statistics mail |

use std::net::SocketAddr;

use thiserror::Error;

use kiosk_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_STATISTICS_SENDER: &str = "no-reply@cafekiosk.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Which store backs the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KioskConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    pub log_format: LogFormat,
    pub statistics_sender: String,
}

impl KioskConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_with(&lookup, "KIOSK_BIND_ADDR", DEFAULT_BIND_ADDR, |v| {
            v.parse::<SocketAddr>().map_err(|e| e.to_string())
        })?;

        let use_persistent = parse_with(&lookup, "USE_PERSISTENT_STORES", "false", parse_flag)?;
        let store = if use_persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = parse_with(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                &DEFAULT_MAX_CONNECTIONS.to_string(),
                |v| match v.parse::<u32>() {
                    Ok(0) => Err("must be at least 1".to_string()),
                    Ok(n) => Ok(n),
                    Err(e) => Err(e.to_string()),
                },
            )?;
            StoreBackend::Postgres {
                database_url,
                max_connections,
            }
        } else {
            StoreBackend::InMemory
        };

        let log_format = parse_with(&lookup, "KIOSK_LOG_FORMAT", "json", |v| {
            v.parse::<LogFormat>().map_err(|e| e.to_string())
        })?;

        let statistics_sender = lookup("KIOSK_STATISTICS_SENDER")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STATISTICS_SENDER.to_string());

        Ok(Self {
            bind_addr,
            store,
            log_format,
            statistics_sender,
        })
    }
}

fn parse_with<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    parse(value.trim()).map_err(|reason| ConfigError::Invalid { key, value, reason })
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}
