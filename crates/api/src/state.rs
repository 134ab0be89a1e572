use std::sync::Arc;

use chrono::Duration;

use tidepool_data::StoreManager;
use tidepool_exchange::ExchangeManager;

/// Everything the handlers read from.
pub struct AppState {
    pub manager: Arc<ExchangeManager>,
    pub stores: Arc<StoreManager>,
    /// Widest trade range a single query may ask for.
    pub max_trade_period: Duration,
}

impl AppState {
    pub fn new(
        manager: Arc<ExchangeManager>,
        stores: Arc<StoreManager>,
        max_trade_period: Duration,
    ) -> Self {
        Self {
            manager,
            stores,
            max_trade_period,
        }
    }
}
