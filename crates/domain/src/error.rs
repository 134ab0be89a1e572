use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the trading primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradingError {
    /// A token string did not match the `<amount><symbol>` wire format.
    #[error("failed to parse token '{0}'")]
    TokenParse(String),
    /// A token amount could not be represented as a decimal.
    #[error("failed to parse token amount '{0}'")]
    AmountParse(String),
    /// Rebasing would push the decimal scale past what the amount can carry.
    #[error("rebase exponent out of range for '{symbol}' (scale {scale} + {exponent})")]
    RebaseScale {
        symbol: String,
        scale: u32,
        exponent: u32,
    },
    /// A pair string was missing its separator.
    #[error("separator '{separator}' not found in pair string '{value}'")]
    PairFormat { value: String, separator: String },
    /// A trade was offered to a candle window keyed to a different pair.
    #[error("trade pair {trade} does not match candle pair {ring}")]
    PairMismatch { trade: String, ring: String },
    /// A trade predates the whole candle window.
    #[error("trade at {time} is too old for the candle window")]
    StaleTrade { time: DateTime<Utc> },
    /// A trade arrived with a timestamp behind the ingestion cutoff.
    #[error("trade at {time} is out of order (cutoff {cutoff})")]
    OutOfOrder {
        time: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    },
    /// A duration string did not parse.
    #[error("invalid duration '{0}'")]
    DurationFormat(String),
}
