//! Asset registry: the periodically refreshed list of chain assets that
//! maps raw denoms to display denoms and declares which pools count.
//!
//! Each refresh publishes a whole new [`AssetRegistry`] by `Arc` swap, so
//! readers never observe a partially updated generation, and broadcasts
//! the derived pair list to subscribers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use tidepool_domain::{Pair, Token};

use crate::error::ExchangeError;

/// Published asset list for the Osmosis mainnet.
pub const DEFAULT_ASSETLIST_URL: &str =
    "https://raw.githubusercontent.com/osmosis-labs/assetlists/main/osmosis-1/osmosis-1.assetlist.json";

/// The chain's native quote asset; it never opens a pair on its own.
const NATIVE_QUOTE_SYMBOL: &str = "OSMO";

// Axelar-bridged stables share their upstream symbol in the published
// list; rename them so they stay distinguishable from native issuance.
const AXELAR_USDC_DENOM: &str =
    "ibc/D189335C6E4A68B513C10AB227BF1C1D38C746766278BA3EEB4FB14124F1D858";
const AXELAR_USDT_DENOM: &str =
    "ibc/8242AD24008032E457D2E12D46588FD39FB54FB29680C6C7663D296B383C37C4";
const AXELAR_USDC_SYMBOL: &str = "USDC.axl";
const AXELAR_USDT_SYMBOL: &str = "USDT.axl";

/// Root of the published asset list JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetList {
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// One listed asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    pub base: String,
    pub symbol: String,
    pub display: String,
    #[serde(default)]
    pub denom_units: Vec<DenomUnit>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenomUnit {
    pub denom: String,
    #[serde(default)]
    pub exponent: u32,
}

/// Pools declared by the given assets via `"QSYMBOL:POOL_ID"` keywords,
/// as a `pool_id -> quote symbol` map. Keywords that do not fit the form
/// (no colon, or a non-numeric pool id) are ignored.
pub fn supported_pools<'a>(assets: impl IntoIterator<Item = &'a Asset>) -> HashMap<String, String> {
    let mut pools = HashMap::new();
    for asset in assets {
        for keyword in &asset.keywords {
            let Some((symbol, pool_id)) = keyword.split_once(':') else {
                continue;
            };
            if pool_id.parse::<u64>().is_err() {
                continue;
            }
            pools.insert(pool_id.to_string(), symbol.to_string());
        }
    }
    pools
}

/// Converts a raw-denom token into the asset's display denom: the decimal
/// point moves left by the display unit's exponent and the symbol becomes
/// the listed one.
pub fn rebase_token(token: &Token, asset: &Asset) -> Result<Token, ExchangeError> {
    let exponent = asset
        .denom_units
        .iter()
        .find(|unit| unit.denom == asset.display)
        .map(|unit| unit.exponent)
        .ok_or_else(|| ExchangeError::UnknownDisplay(token.symbol.clone()))?;
    Ok(token.rebase(exponent, asset.symbol.clone())?)
}

/// One generation of the indexed asset list.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    pub by_base: HashMap<String, Arc<Asset>>,
    pub by_symbol: HashMap<String, Arc<Asset>>,
    pub pairs: Vec<Pair>,
}

impl AssetRegistry {
    /// Indexes a fetched list and derives the tradable pairs: every
    /// non-native asset contributes one pair per pool it declares, the
    /// first declaration of a pool wins, and pairs whose quote symbol is
    /// not itself listed are dropped.
    pub fn build(mut list: AssetList) -> Self {
        for asset in &mut list.assets {
            if asset.base == AXELAR_USDC_DENOM {
                asset.symbol = AXELAR_USDC_SYMBOL.to_string();
            } else if asset.base == AXELAR_USDT_DENOM {
                asset.symbol = AXELAR_USDT_SYMBOL.to_string();
            }
        }
        let mut by_base = HashMap::with_capacity(list.assets.len());
        let mut by_symbol = HashMap::with_capacity(list.assets.len());
        for asset in list.assets {
            let asset = Arc::new(asset);
            by_base.insert(asset.base.clone(), asset.clone());
            by_symbol.insert(asset.symbol.clone(), asset);
        }
        let mut pairs = Vec::new();
        let mut seen_pools = HashSet::new();
        for asset in by_base.values() {
            if asset.symbol == NATIVE_QUOTE_SYMBOL {
                continue;
            }
            for (pool_id, quote_symbol) in supported_pools([asset.as_ref()]) {
                if seen_pools.contains(&pool_id) {
                    debug!(
                        base = %asset.symbol,
                        quote = %quote_symbol,
                        pool = %pool_id,
                        "skipping already present pool"
                    );
                    continue;
                }
                let Some(quote) = by_symbol.get(&quote_symbol) else {
                    debug!(symbol = %quote_symbol, "skipping unlisted asset pair");
                    continue;
                };
                pairs.push(Pair::new(asset.symbol.clone(), quote.symbol.clone()));
                seen_pools.insert(pool_id);
            }
        }
        Self {
            by_base,
            by_symbol,
            pairs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_base.is_empty()
    }
}

/// Loader timing knobs.
#[derive(Debug, Clone)]
pub struct AssetListConfig {
    pub url: String,
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
}

impl Default for AssetListConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ASSETLIST_URL.to_string(),
            refresh_interval: Duration::from_secs(15 * 60),
            retry_interval: Duration::from_secs(30),
        }
    }
}

/// Fetches and decodes the asset list; an empty list counts as a failure.
pub async fn fetch_asset_list(
    client: &reqwest::Client,
    url: &str,
) -> Result<AssetList, ExchangeError> {
    let list: AssetList = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if list.assets.is_empty() {
        return Err(ExchangeError::EmptyAssetList);
    }
    Ok(list)
}

/// Runs the refresh loop: fetch, index, publish, broadcast, sleep.
/// Failures are retried forever on the shorter interval.
pub fn spawn_loader(
    config: AssetListConfig,
    registry: Arc<RwLock<Arc<AssetRegistry>>>,
    pairs_tx: broadcast::Sender<Vec<Pair>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        loop {
            let list = match fetch_asset_list(&client, &config.url).await {
                Ok(list) => list,
                Err(err) => {
                    error!(error = %err, url = %config.url, "failed to load asset list");
                    tokio::time::sleep(config.retry_interval).await;
                    continue;
                }
            };
            let generation = Arc::new(AssetRegistry::build(list));
            debug!(
                num_assets = generation.by_base.len(),
                num_pairs = generation.pairs.len(),
                "refreshed asset list"
            );
            *registry.write().await = generation.clone();
            // nobody listening yet is fine; the next refresh rebroadcasts
            let _ = pairs_tx.send(generation.pairs.clone());
            tokio::time::sleep(config.refresh_interval).await;
        }
    })
}
