//! Trade persistence for the tidepool price index.
//!
//! The engine only ever needs two operations from a store: append a trade
//! and read back a time range for a pair. Candles and tickers are never
//! persisted; they are reconstructible from trades.

/// InfluxDB 2 backend.
pub mod influx;
/// In-memory backend.
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tidepool_domain::{Pair, Trade};

/// Persistence failures. Writes in the hot path are logged and dropped by
/// callers; these never abort ingestion.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("unsupported store backend '{0}'")]
    UnsupportedBackend(String),
}

/// Minimal persistence contract for one exchange's trades.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    /// Queues one trade for durable, at-least-once persistence.
    async fn save_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Trades for `pair` within `[start, end)`, strictly newest first.
    /// Matches rows stored under either orientation and normalizes each
    /// returned trade so `trade.base.symbol == pair.base`.
    async fn trades(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StoreError>;
}

/// Hands out one store per exchange for the configured backend.
pub enum StoreManager {
    Influxdb2(influx::Influxdb2Manager),
    Memory(memory::MemoryManager),
}

impl StoreManager {
    /// Selects a backend by config name (`influxdb2` or `memory`).
    pub fn new(
        backend: &str,
        url: &str,
        token: &str,
        organization: &str,
    ) -> Result<Self, StoreError> {
        match backend {
            "influxdb2" => Ok(Self::Influxdb2(influx::Influxdb2Manager::new(
                url,
                token,
                organization,
            )?)),
            "memory" => Ok(Self::Memory(memory::MemoryManager::new())),
            other => Err(StoreError::UnsupportedBackend(other.to_string())),
        }
    }

    /// Returns the store for `name`, creating it on first use.
    pub async fn store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        match self {
            Self::Influxdb2(manager) => manager.store(name).await,
            Self::Memory(manager) => manager.store(name).await,
        }
    }

    /// Backend reachability check, run once at startup.
    pub async fn health(&self) -> Result<(), StoreError> {
        match self {
            Self::Influxdb2(manager) => manager.health().await,
            Self::Memory(_) => Ok(()),
        }
    }
}
