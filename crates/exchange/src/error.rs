use thiserror::Error;

use tidepool_domain::TradingError;

/// Errors raised while turning chain events into normalized trades.
///
/// Inside the streaming hot path every one of these is logged and the
/// offending swap dropped; none of them aborts a task.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("swap event missing attribute '{0}'")]
    MissingAttribute(&'static str),
    #[error("swap event attribute lengths mismatch")]
    AttributeLengthMismatch,
    #[error("failed to parse {side} token '{value}': {source}")]
    SwapToken {
        side: &'static str,
        value: String,
        source: TradingError,
    },
    #[error("could not determine display units for '{0}'")]
    UnknownDisplay(String),
    #[error(transparent)]
    Trading(#[from] TradingError),
    #[error("asset list is empty")]
    EmptyAssetList,
    #[error("asset list request failed: {0}")]
    AssetListRequest(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("unsupported exchange '{0}'")]
    UnsupportedExchange(String),
}
