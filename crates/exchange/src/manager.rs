//! Exchange registry: the trait every venue adapter implements and the
//! per-process collection the API serves from.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use tidepool_domain::{Pair, Trade};

use crate::assets::AssetListConfig;
use crate::error::ExchangeError;
use crate::osmosis::{OsmosisExchange, OSMOSIS_RPC_URL};
use crate::router::ExchangeRouter;

/// A venue that emits a live trade stream and a periodic pair list.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    /// Starts the venue's background work; idempotent.
    async fn start(&self) -> Result<(), ExchangeError>;
    fn subscribe_trades(&self) -> broadcast::Receiver<Trade>;
    fn subscribe_pairs(&self) -> broadcast::Receiver<Vec<Pair>>;
}

/// Builds the adapter for a configured exchange name.
pub fn new_exchange(
    name: &str,
    assets_config: AssetListConfig,
) -> Result<Arc<dyn Exchange>, ExchangeError> {
    match name {
        "osmosis" => Ok(Arc::new(OsmosisExchange::new(OSMOSIS_RPC_URL, assets_config))),
        other => Err(ExchangeError::UnsupportedExchange(other.to_string())),
    }
}

/// Everything the HTTP API needs to answer queries for one process.
pub struct ExchangeManager {
    exchanges: HashMap<String, Arc<dyn Exchange>>,
    routers: HashMap<String, Arc<ExchangeRouter>>,
}

impl ExchangeManager {
    pub fn new(
        exchanges: HashMap<String, Arc<dyn Exchange>>,
        routers: HashMap<String, Arc<ExchangeRouter>>,
    ) -> Self {
        Self { exchanges, routers }
    }

    pub fn exchange(&self, name: &str) -> Option<&Arc<dyn Exchange>> {
        self.exchanges.get(name)
    }

    pub fn router(&self, name: &str) -> Option<&Arc<ExchangeRouter>> {
        self.routers.get(name)
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Arc<dyn Exchange>> {
        self.exchanges.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.exchanges.keys().cloned().collect()
    }
}
