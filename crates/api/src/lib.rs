//! Read-only HTTP API for the tidepool price index.
//!
//! Serves exchanges, their pairs, 24h tickers, paginated candle history
//! and raw trade ranges. Everything is a snapshot read; all state lives
//! in the exchange routers and the store.

/// Error responses.
pub mod error;
/// Route handlers.
pub mod routes;
/// Server setup and request logging.
pub mod server;
/// Shared application state.
pub mod state;

pub use error::ApiError;
pub use server::{ApiServer, ServerConfig};
pub use state::AppState;
