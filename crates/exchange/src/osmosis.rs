//! Osmosis exchange adapter: one chain subscription in, a normalized
//! trade stream and a pair stream out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use tidepool_domain::{Pair, Trade};

use crate::assets::{
    rebase_token, spawn_loader, supported_pools, AssetListConfig, AssetRegistry,
};
use crate::comet::CometRpc;
use crate::error::ExchangeError;
use crate::manager::Exchange;
use crate::swap::{parse_token_swaps, SwapEvent, SWAP_EVENT_QUERY};

/// Public RPC endpoint used when none is configured.
pub const OSMOSIS_RPC_URL: &str = "https://osmosis-rpc.polkachu.com:443";

const PAIR_CHANNEL_CAPACITY: usize = 16;
const TRADE_CHANNEL_CAPACITY: usize = 1024;

pub struct OsmosisExchange {
    rpc: CometRpc,
    assets_config: AssetListConfig,
    registry: Arc<RwLock<Arc<AssetRegistry>>>,
    pairs_tx: broadcast::Sender<Vec<Pair>>,
    trades_tx: broadcast::Sender<Trade>,
    started: AtomicBool,
}

impl OsmosisExchange {
    pub fn new(rpc_url: &str, assets_config: AssetListConfig) -> Self {
        let (pairs_tx, _) = broadcast::channel(PAIR_CHANNEL_CAPACITY);
        let (trades_tx, _) = broadcast::channel(TRADE_CHANNEL_CAPACITY);
        Self {
            rpc: CometRpc::new(rpc_url),
            assets_config,
            registry: Arc::new(RwLock::new(Arc::new(AssetRegistry::default()))),
            pairs_tx,
            trades_tx,
            started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Exchange for OsmosisExchange {
    fn name(&self) -> &str {
        "osmosis"
    }

    fn display_name(&self) -> &str {
        "Osmosis"
    }

    /// Starts the registry loader and the swap event loop. Safe to call
    /// more than once; only the first call does anything.
    async fn start(&self) -> Result<(), ExchangeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        spawn_loader(
            self.assets_config.clone(),
            self.registry.clone(),
            self.pairs_tx.clone(),
        );
        let mut events = self.rpc.subscribe(SWAP_EVENT_QUERY).await?;
        info!(url = %self.rpc.url(), "subscribed to swap events");
        let registry = self.registry.clone();
        let trades_tx = self.trades_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let generation = registry.read().await.clone();
                for trade in trades_from_event(&event, &generation) {
                    debug!(base = %trade.base, quote = %trade.quote, "trade");
                    // send only fails with no subscribers; drop silently
                    let _ = trades_tx.send(trade);
                }
            }
        });
        Ok(())
    }

    fn subscribe_trades(&self) -> broadcast::Receiver<Trade> {
        self.trades_tx.subscribe()
    }

    fn subscribe_pairs(&self) -> broadcast::Receiver<Vec<Pair>> {
        self.pairs_tx.subscribe()
    }
}

/// Normalizes one chain event into trades: parse the swaps, keep the ones
/// on a pool both assets declare, rebase to display denoms, and stamp the
/// receive time. Degenerate swaps and every per-swap failure are dropped.
pub fn trades_from_event(event: &SwapEvent, registry: &AssetRegistry) -> Vec<Trade> {
    let swaps = match parse_token_swaps(event) {
        Ok(swaps) => swaps,
        Err(err) => {
            error!(error = %err, "failed to parse swap event");
            return Vec::new();
        }
    };
    if swaps.is_empty() {
        return Vec::new();
    }
    if registry.is_empty() {
        warn!("cannot process trades when asset list is empty");
        return Vec::new();
    }
    let now = Utc::now();
    let mut trades = Vec::with_capacity(swaps.len());
    for swap in swaps {
        let Some(in_asset) = registry.by_base.get(&swap.token_in.symbol) else {
            debug!(symbol = %swap.token_in.symbol, "skipping unlisted asset swap");
            continue;
        };
        let Some(out_asset) = registry.by_base.get(&swap.token_out.symbol) else {
            debug!(symbol = %swap.token_out.symbol, "skipping unlisted asset swap");
            continue;
        };
        let pools = supported_pools([in_asset.as_ref(), out_asset.as_ref()]);
        if !pools.contains_key(&swap.pool_id) {
            debug!(pool = %swap.pool_id, "skipping swap on undeclared pool");
            continue;
        }
        let base = match rebase_token(&swap.token_in, in_asset) {
            Ok(token) => token,
            Err(err) => {
                debug!(error = %err, symbol = %swap.token_in.symbol, "failed to rebase in token");
                continue;
            }
        };
        let quote = match rebase_token(&swap.token_out, out_asset) {
            Ok(token) => token,
            Err(err) => {
                debug!(error = %err, symbol = %swap.token_out.symbol, "failed to rebase out token");
                continue;
            }
        };
        if base.amount.is_zero() || quote.amount.is_zero() {
            debug!(pool = %swap.pool_id, "skipping degenerate swap");
            continue;
        }
        trades.push(Trade::new(base, quote, now));
    }
    trades
}
