//! Configuration loading and representation.
//!
//! All settings come from environment variables; every one has a default
//! except `DATABASE_URL`, which the SQLite backend requires.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use stockroom_events::in_memory_bus::DEFAULT_CAPACITY;

use crate::ledger::DEFAULT_SUBSCRIPTION_BUFFER;
use crate::store::{DocumentStore, InMemoryDocumentStore, SqliteDocumentStore, StoreError};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is required when {reason}")]
    Missing { var: &'static str, reason: &'static str },

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite { url: String, max_connections: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Change-feed buffer shared by all live subscriptions.
    pub feed_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            feed_capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockroomConfig {
    pub store: StoreConfig,
    pub subscription_buffer: usize,
    pub bind_addr: SocketAddr,
}

impl StockroomConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match get("STOCKROOM_STORE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("sqlite") => StoreBackend::Sqlite {
                url: get("DATABASE_URL").ok_or(ConfigError::Missing {
                    var: "DATABASE_URL",
                    reason: "STOCKROOM_STORE=sqlite",
                })?,
                max_connections: parse_or(
                    "STOCKROOM_DB_MAX_CONNECTIONS",
                    get("STOCKROOM_DB_MAX_CONNECTIONS"),
                    DEFAULT_MAX_CONNECTIONS,
                )?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STOCKROOM_STORE",
                    value: other.to_string(),
                    reason: "expected memory or sqlite".to_string(),
                });
            }
        };

        let feed_capacity = parse_or("STOCKROOM_FEED_CAPACITY", get("STOCKROOM_FEED_CAPACITY"), DEFAULT_CAPACITY)?;
        let subscription_buffer = parse_or(
            "STOCKROOM_SUBSCRIPTION_BUFFER",
            get("STOCKROOM_SUBSCRIPTION_BUFFER"),
            DEFAULT_SUBSCRIPTION_BUFFER,
        )?;
        for (var, value) in [
            ("STOCKROOM_FEED_CAPACITY", feed_capacity),
            ("STOCKROOM_SUBSCRIPTION_BUFFER", subscription_buffer),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        let bind_addr = parse_or(
            "STOCKROOM_BIND_ADDR",
            get("STOCKROOM_BIND_ADDR"),
            SocketAddr::from(([0, 0, 0, 0], 8080)),
        )?;

        Ok(Self {
            store: StoreConfig {
                backend,
                feed_capacity,
            },
            subscription_buffer,
            bind_addr,
        })
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Construct the configured store. The SQLite schema is created on connect.
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match &config.backend {
        StoreBackend::Memory => {
            tracing::info!(feed_capacity = config.feed_capacity, "using in-memory store");
            Ok(Arc::new(
                InMemoryDocumentStore::new().with_feed_capacity(config.feed_capacity),
            ))
        }
        StoreBackend::Sqlite {
            url,
            max_connections,
        } => {
            tracing::info!(max_connections, "connecting to sqlite store");
            let store = SqliteDocumentStore::connect(url, *max_connections)
                .await?
                .with_feed_capacity(config.feed_capacity);
            Ok(Arc::new(store))
        }
    }
}
