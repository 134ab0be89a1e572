//! Per-exchange data router.
//!
//! Owns every candle window for one exchange and serializes all mutation
//! behind a single lock: pair bootstraps, live trade ingestion, and the
//! interval tick that slides the windows forward. Queries read snapshots
//! through the same lock, so no window is ever observed mid-shift.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use tidepool_data::Store;
use tidepool_domain::{time, Candle, CandleRing, Pair, Ticker, Trade};

/// Candle geometry for every window the router creates.
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub interval: Duration,
    pub period: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::minutes(1),
            period: Duration::hours(48),
        }
    }
}

#[derive(Default)]
struct RouterInner {
    rings: HashMap<String, CandleRing>,
    tickers: HashMap<String, Ticker>,
}

pub struct ExchangeRouter {
    exchange: String,
    interval: Duration,
    period: Duration,
    store: Arc<dyn Store>,
    inner: RwLock<RouterInner>,
}

impl ExchangeRouter {
    pub fn new(exchange: impl Into<String>, store: Arc<dyn Store>, config: RouterConfig) -> Arc<Self> {
        Arc::new(Self {
            exchange: exchange.into(),
            interval: config.interval,
            period: config.period,
            store,
            inner: RwLock::new(RouterInner::default()),
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Spawns the three router activities. Pair and trade handlers stop
    /// when their channel closes; the tick loop runs for the process
    /// lifetime, like the windows it advances.
    pub fn start(
        self: &Arc<Self>,
        pairs: broadcast::Receiver<Vec<Pair>>,
        trades: broadcast::Receiver<Trade>,
    ) {
        tokio::spawn(self.clone().pair_loop(pairs));
        tokio::spawn(self.clone().trade_loop(trades));
        tokio::spawn(self.clone().tick_loop());
        info!(exchange = %self.exchange, "data router started");
    }

    async fn pair_loop(self: Arc<Self>, mut pairs: broadcast::Receiver<Vec<Pair>>) {
        loop {
            match pairs.recv().await {
                Ok(list) => {
                    for pair in list {
                        self.ensure_ring(&pair).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(exchange = %self.exchange, skipped, "pair subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(exchange = %self.exchange, "pair handler stopped");
    }

    async fn trade_loop(self: Arc<Self>, mut trades: broadcast::Receiver<Trade>) {
        loop {
            match trades.recv().await {
                Ok(trade) => self.handle_trade(trade).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(exchange = %self.exchange, skipped, "trade subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(exchange = %self.exchange, "trade handler stopped");
    }

    async fn tick_loop(self: Arc<Self>) {
        loop {
            let now = Utc::now();
            let boundary = time::next_boundary(now, self.interval);
            let sleep = (boundary - now).to_std().unwrap_or_default();
            tokio::time::sleep(sleep).await;
            self.advance(boundary).await;
        }
    }

    /// Installs a candle window for a pair the registry just announced,
    /// seeded from stored history. Existing windows are left untouched
    /// and never removed.
    async fn ensure_ring(&self, pair: &Pair) {
        let key = pair.to_string();
        if self.inner.read().await.rings.contains_key(&key) {
            return;
        }
        let end = time::next_boundary(Utc::now(), self.interval);
        let history = match self.store.trades(pair, end - self.period, end).await {
            Ok(history) => history,
            Err(err) => {
                error!(
                    exchange = %self.exchange,
                    pair = %key,
                    error = %err,
                    "failed to load trade history"
                );
                return;
            }
        };
        let mut ring = CandleRing::new(pair.clone(), self.interval, self.period, end);
        if let Err(err) = ring.set_trades(&history) {
            error!(
                exchange = %self.exchange,
                pair = %key,
                error = %err,
                "failed to seed candle window"
            );
            return;
        }
        let ticker = ring.ticker();
        let mut inner = self.inner.write().await;
        inner.rings.entry(key.clone()).or_insert(ring);
        inner.tickers.insert(key.clone(), ticker);
        debug!(
            exchange = %self.exchange,
            pair = %key,
            num_trades = history.len(),
            "installed candle window"
        );
    }

    /// Persists and ingests one live trade. A trade whose pair only
    /// exists reversed is flipped before ingestion; one with no window at
    /// all is dropped. Window rejections are logged, never fatal.
    async fn handle_trade(&self, trade: Trade) {
        if let Err(err) = self.store.save_trade(&trade).await {
            error!(exchange = %self.exchange, error = %err, "failed to persist trade");
        }
        let mut inner = self.inner.write().await;
        let primary = trade.pair().to_string();
        let (key, routed) = if inner.rings.contains_key(&primary) {
            (primary, trade)
        } else {
            let fallback = trade.pair().reversed().to_string();
            if inner.rings.contains_key(&fallback) {
                (fallback, trade.reversed())
            } else {
                debug!(exchange = %self.exchange, pair = %primary, "dropping trade with no candle window");
                return;
            }
        };
        let ticker = {
            let Some(ring) = inner.rings.get_mut(&key) else {
                return;
            };
            match ring.push_trade(&routed) {
                Ok(()) => ring.ticker(),
                Err(err) => {
                    warn!(exchange = %self.exchange, pair = %key, error = %err, "dropping trade");
                    return;
                }
            }
        };
        inner.tickers.insert(key, ticker);
    }

    /// Slides every window to the given boundary and refreshes tickers.
    async fn advance(&self, boundary: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        let RouterInner { rings, tickers } = &mut *inner;
        for (key, ring) in rings.iter_mut() {
            ring.extend(boundary);
            tickers.insert(key.clone(), ring.ticker());
        }
    }

    /// Pair strings with an installed window.
    pub async fn pairs(&self) -> Vec<String> {
        self.inner.read().await.rings.keys().cloned().collect()
    }

    /// Snapshot of the candle window for exactly this pair orientation.
    pub async fn candles(&self, pair: &Pair) -> Option<Vec<Candle>> {
        let inner = self.inner.read().await;
        let ring = inner.rings.get(&pair.to_string())?;
        Some(ring.list_range(0, ring.len()).to_vec())
    }

    /// Ticker for the pair, falling back to the reversed orientation.
    pub async fn ticker(&self, pair: &Pair) -> Option<Ticker> {
        let inner = self.inner.read().await;
        if let Some(ticker) = inner.tickers.get(&pair.to_string()) {
            return Some(ticker.clone());
        }
        inner
            .tickers
            .get(&pair.reversed().to_string())
            .map(Ticker::reversed)
    }

    /// Snapshot of every cached ticker.
    pub async fn tickers(&self) -> Vec<Ticker> {
        self.inner.read().await.tickers.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tidepool_data::memory::MemoryStore;
    use tidepool_domain::Token;

    fn config() -> RouterConfig {
        RouterConfig {
            interval: Duration::minutes(1),
            period: Duration::hours(1),
        }
    }

    fn trade(base: &str, base_amount: rust_decimal::Decimal, quote: &str, quote_amount: rust_decimal::Decimal, time: DateTime<Utc>) -> Trade {
        Trade::new(
            Token::new(base_amount, base),
            Token::new(quote_amount, quote),
            time,
        )
    }

    fn router() -> (Arc<ExchangeRouter>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new("osmosis"));
        let router = ExchangeRouter::new("osmosis", store.clone(), config());
        (router, store)
    }

    #[tokio::test]
    async fn pair_bootstrap_seeds_from_history() {
        let (router, store) = router();
        let pair = Pair::new("ATOM", "USDC");
        let earlier = Utc::now() - Duration::minutes(5);
        store
            .save_trade(&trade("ATOM", dec!(1), "USDC", dec!(10), earlier))
            .await
            .unwrap();
        store
            .save_trade(&trade("ATOM", dec!(2), "USDC", dec!(24), earlier + Duration::seconds(10)))
            .await
            .unwrap();

        router.ensure_ring(&pair).await;

        assert_eq!(router.pairs().await, vec!["ATOM/USDC".to_string()]);
        let ticker = router.ticker(&pair).await.unwrap();
        assert_eq!(ticker.base_volume, dec!(3));
        assert_eq!(ticker.quote_volume, dec!(34));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let (router, store) = router();
        let pair = Pair::new("ATOM", "USDC");
        router.ensure_ring(&pair).await;
        store
            .save_trade(&trade("ATOM", dec!(1), "USDC", dec!(10), Utc::now()))
            .await
            .unwrap();
        // second announcement must not rebuild the existing window
        router.ensure_ring(&pair).await;
        assert_eq!(router.ticker(&pair).await.unwrap().base_volume, dec!(0));
        assert_eq!(router.pairs().await.len(), 1);
    }

    #[tokio::test]
    async fn live_trade_updates_window_and_store() {
        let (router, store) = router();
        let pair = Pair::new("ATOM", "USDC");
        router.ensure_ring(&pair).await;

        router
            .handle_trade(trade("ATOM", dec!(2), "USDC", dec!(30), Utc::now()))
            .await;

        let ticker = router.ticker(&pair).await.unwrap();
        assert_eq!(ticker.base_volume, dec!(2));
        assert_eq!(ticker.price, dec!(15));

        let saved = store
            .trades(&pair, Utc::now() - Duration::minutes(1), Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn reversed_trade_is_flipped_into_window() {
        let (router, _) = router();
        let pair = Pair::new("ATOM", "USDC");
        router.ensure_ring(&pair).await;

        router
            .handle_trade(trade("USDC", dec!(30), "ATOM", dec!(2), Utc::now()))
            .await;

        let ticker = router.ticker(&pair).await.unwrap();
        assert_eq!(ticker.base_volume, dec!(2));
        assert_eq!(ticker.quote_volume, dec!(30));
    }

    #[tokio::test]
    async fn unknown_pair_trade_is_dropped() {
        let (router, _) = router();
        router
            .handle_trade(trade("JUNO", dec!(1), "USDC", dec!(3), Utc::now()))
            .await;
        assert!(router.pairs().await.is_empty());
        assert!(router.tickers().await.is_empty());
    }

    #[tokio::test]
    async fn ticker_query_reverses_on_fallback() {
        let (router, _) = router();
        let pair = Pair::new("ATOM", "USDC");
        router.ensure_ring(&pair).await;
        router
            .handle_trade(trade("ATOM", dec!(2), "USDC", dec!(30), Utc::now()))
            .await;

        let reversed = router.ticker(&pair.reversed()).await.unwrap();
        assert_eq!(reversed.base_asset, "USDC");
        assert_eq!(reversed.base_volume, dec!(30));
        assert_eq!(reversed.price, dec!(1) / dec!(15));
    }

    #[tokio::test]
    async fn candles_query_is_orientation_exact() {
        let (router, _) = router();
        let pair = Pair::new("ATOM", "USDC");
        router.ensure_ring(&pair).await;
        assert!(router.candles(&pair).await.is_some());
        assert!(router.candles(&pair.reversed()).await.is_none());
        let candles = router.candles(&pair).await.unwrap();
        assert_eq!(candles.len(), 61);
    }

    #[tokio::test]
    async fn advance_slides_all_windows() {
        let (router, _) = router();
        let pair = Pair::new("ATOM", "USDC");
        router.ensure_ring(&pair).await;
        let now = Utc::now();
        router
            .handle_trade(trade("ATOM", dec!(1), "USDC", dec!(10), now))
            .await;

        let boundary = time::next_boundary(now, Duration::minutes(1)) + Duration::minutes(2);
        router.advance(boundary).await;

        let candles = router.candles(&pair).await.unwrap();
        assert_eq!(candles[0].end, boundary);
        assert!(candles[0].is_empty());
        // the fill survived the slide and the ticker still sees it
        let ticker = router.ticker(&pair).await.unwrap();
        assert_eq!(ticker.base_volume, dec!(1));
        assert_eq!(ticker.price, dec!(10));
    }
}
