//! In-memory store backend, used by tests and the `memory` config option.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use tidepool_domain::{Pair, Trade};

use crate::{Store, StoreError};

/// Hands out one [`MemoryStore`] per exchange.
#[derive(Default)]
pub struct MemoryManager {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        let mut stores = self.stores.lock().await;
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new(name)))
            .clone();
        Ok(store)
    }
}

/// Append-only trade log with range queries over both pair orientations.
pub struct MemoryStore {
    name: String,
    trades: RwLock<Vec<Trade>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trades: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        self.trades.write().await.push(trade.clone());
        Ok(())
    }

    async fn trades(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StoreError> {
        let reversed = pair.reversed();
        let mut matches: Vec<Trade> = self
            .trades
            .read()
            .await
            .iter()
            .filter(|trade| trade.time >= start && trade.time < end)
            .filter_map(|trade| {
                let trade_pair = trade.pair();
                if trade_pair == *pair {
                    Some(trade.clone())
                } else if trade_pair == reversed {
                    Some(trade.reversed())
                } else {
                    None
                }
            })
            .collect();
        matches.sort_by(|a, b| b.time.cmp(&a.time));
        Ok(matches)
    }
}
