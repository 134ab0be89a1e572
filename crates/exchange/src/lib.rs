//! Chain swap ingestion for the tidepool price index.
//!
//! The flow per exchange: a CometBFT subscription yields raw swap events,
//! the swap parser and asset registry turn them into normalized trades,
//! and the data router feeds those trades (plus stored history) into one
//! rolling candle window per pair.

/// Asset registry model and refresh loop.
pub mod assets;
/// CometBFT JSON-RPC websocket client.
pub mod comet;
/// Error types.
pub mod error;
/// Exchange trait and per-process registry.
pub mod manager;
/// Osmosis exchange adapter.
pub mod osmosis;
/// Per-exchange candle/ticker router.
pub mod router;
/// Raw swap event decoding.
pub mod swap;

pub use assets::{AssetList, AssetListConfig, AssetRegistry};
pub use error::ExchangeError;
pub use manager::{new_exchange, Exchange, ExchangeManager};
pub use osmosis::OsmosisExchange;
pub use router::{ExchangeRouter, RouterConfig};
pub use swap::{SwapEvent, TokenSwap};
