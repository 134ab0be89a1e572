//! Route handlers.
//!
//! All endpoints are reads: exchanges and their pairs, cached tickers,
//! candle pages out of the rolling windows, and raw trade ranges straight
//! from the store. Pair-shaped routes fall back to the reversed
//! orientation, reversing the payload on the way out.

use std::ops::Range;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use tidepool_domain::{time, Pair};

use crate::error::ApiError;
use crate::state::AppState;

/// Closed candles returned per page.
pub const CANDLES_PER_PAGE: usize = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/exchanges", get(list_exchanges))
        .route("/exchanges/:exchange", get(exchange_detail))
        .route("/exchanges/:exchange/pairs", get(list_pairs))
        .route("/exchanges/:exchange/tickers", get(list_tickers))
        .route("/exchanges/:exchange/tickers/:base/:quote", get(get_ticker))
        .route("/exchanges/:exchange/candles", get(candles_hint))
        .route("/exchanges/:exchange/candles/:base/:quote", get(get_candles))
        .route("/exchanges/:exchange/trades", get(trades_hint))
        .route("/exchanges/:exchange/trades/:base/:quote", get(get_trades))
}

/// GET / — minimal HTML landing page linking the JSON surface.
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut items = String::new();
    let mut names = state.manager.names();
    names.sort();
    for name in names {
        let display = state
            .manager
            .exchange(&name)
            .map(|exchange| exchange.display_name().to_string())
            .unwrap_or_else(|| name.clone());
        items.push_str(&format!(
            "<li><a href=\"/exchanges/{name}\">{display}</a><ul>\
             <li><a href=\"/exchanges/{name}/pairs\">Pairs</a></li>\
             <li><a href=\"/exchanges/{name}/tickers\">Tickers</a></li>\
             <li><a href=\"/exchanges/{name}/candles\">Candles</a></li>\
             <li><a href=\"/exchanges/{name}/trades\">Trades</a></li>\
             </ul></li>"
        ));
    }
    Html(format!(
        "<html><head><title>tidepool | Price API</title></head><body>\
         <h1>tidepool</h1><p>Exchange price tracking simplified.</p>\
         <h2><a href=\"/exchanges\">Exchanges</a></h2><ul>{items}</ul>\
         </body></html>"
    ))
}

/// GET /exchanges
async fn list_exchanges(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut names = state.manager.names();
    names.sort();
    Json(json!({ "exchanges": names }))
}

/// GET /exchanges/:exchange
async fn exchange_detail(
    State(state): State<Arc<AppState>>,
    Path(exchange): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let exchange = state
        .manager
        .exchange(&exchange)
        .ok_or(ApiError::NotFound("exchange not found"))?;
    Ok(Json(json!({
        "exchange": {
            "name": exchange.name(),
            "display": exchange.display_name(),
        }
    })))
}

/// GET /exchanges/:exchange/pairs — sorted pair strings.
async fn list_pairs(
    State(state): State<Arc<AppState>>,
    Path(exchange): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let router = state
        .manager
        .router(&exchange)
        .ok_or(ApiError::NotFound("exchange not found"))?;
    let mut pairs = router.pairs().await;
    pairs.sort();
    Ok(Json(json!({ "pairs": pairs })))
}

/// GET /exchanges/:exchange/tickers — sorted by base asset.
async fn list_tickers(
    State(state): State<Arc<AppState>>,
    Path(exchange): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let router = state
        .manager
        .router(&exchange)
        .ok_or(ApiError::NotFound("exchange not found"))?;
    let mut tickers = router.tickers().await;
    tickers.sort_by(|a, b| a.base_asset.cmp(&b.base_asset));
    Ok(Json(json!({ "tickers": tickers })))
}

/// GET /exchanges/:exchange/tickers/:base/:quote
async fn get_ticker(
    State(state): State<Arc<AppState>>,
    Path((exchange, base, quote)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    let router = state
        .manager
        .router(&exchange)
        .ok_or(ApiError::NotFound("exchange not found"))?;
    let ticker = router
        .ticker(&Pair::new(base, quote))
        .await
        .ok_or(ApiError::NotFound("ticker not found"))?;
    Ok(Json(json!({ "ticker": ticker })))
}

async fn candles_hint(Path(exchange): Path<String>) -> ApiError {
    ApiError::BadRequest(format!(
        "must provide base/quote pair in request, e.g. /exchanges/{exchange}/candles/BASE/QUOTE"
    ))
}

async fn trades_hint(Path(exchange): Path<String>) -> ApiError {
    ApiError::BadRequest(format!(
        "must provide base/quote pair in request, e.g. /exchanges/{exchange}/trades/BASE/QUOTE"
    ))
}

#[derive(Debug, Deserialize)]
struct CandlesQuery {
    page: Option<usize>,
}

/// GET /exchanges/:exchange/candles/:base/:quote?page=N
///
/// Page 1 is the newest closed candle; the in-progress bucket is never
/// paged. A pair stored under its reverse is served reversed per candle.
async fn get_candles(
    State(state): State<Arc<AppState>>,
    Path((exchange, base, quote)): Path<(String, String, String)>,
    Query(query): Query<CandlesQuery>,
) -> Result<Json<Value>, ApiError> {
    let router = state
        .manager
        .router(&exchange)
        .ok_or(ApiError::NotFound("exchange not found"))?;
    let pair = Pair::new(base, quote);
    let (candles, reversed) = match router.candles(&pair).await {
        Some(candles) => (candles, false),
        None => {
            let candles = router
                .candles(&pair.reversed())
                .await
                .ok_or(ApiError::NotFound("candles not found"))?;
            (candles, true)
        }
    };
    let page = query.page.unwrap_or(1);
    let (range, total_pages) = candle_page_bounds(candles.len(), page)
        .ok_or_else(|| ApiError::BadRequest("invalid page".to_string()))?;
    let page_candles: Vec<Value> = candles[range]
        .iter()
        .map(|candle| {
            if reversed {
                json!(candle.reversed())
            } else {
                json!(candle)
            }
        })
        .collect();
    Ok(Json(json!({
        "page": { "current": page, "total": total_pages },
        "candles": page_candles,
    })))
}

/// Slot range for a candle page, skipping the in-progress slot 0.
/// `None` when the page is out of range or there is nothing to page.
fn candle_page_bounds(num_slots: usize, page: usize) -> Option<(Range<usize>, usize)> {
    let pageable = num_slots.saturating_sub(1);
    let total_pages = pageable.div_ceil(CANDLES_PER_PAGE);
    if page < 1 || page > total_pages {
        return None;
    }
    let start = 1 + (page - 1) * CANDLES_PER_PAGE;
    let end = (start + CANDLES_PER_PAGE).min(num_slots);
    Some((start..end, total_pages))
}

#[derive(Debug, Deserialize)]
struct TradesQuery {
    period: Option<String>,
    end: Option<String>,
}

/// GET /exchanges/:exchange/trades/:base/:quote?period=1h&end=now|RFC3339
async fn get_trades(
    State(state): State<Arc<AppState>>,
    Path((exchange, base, quote)): Path<(String, String, String)>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .manager
        .exchange(&exchange)
        .ok_or(ApiError::NotFound("exchange not found"))?;
    let period = time::parse_duration(query.period.as_deref().unwrap_or("1h"))
        .map_err(|_| ApiError::BadRequest("invalid period".to_string()))?;
    if period > state.max_trade_period {
        return Err(ApiError::BadRequest("invalid period".to_string()));
    }
    let end = match query.end.as_deref().unwrap_or("now") {
        "now" => Utc::now(),
        value => DateTime::parse_from_rfc3339(value)
            .map(|end| end.with_timezone(&Utc))
            .map_err(|_| ApiError::BadRequest("invalid end".to_string()))?,
    };
    let store = state.stores.store(&exchange).await?;
    let pair = Pair::new(base, quote);
    let trades = store.trades(&pair, end - period, end).await?;
    Ok(Json(json!({ "trades": trades })))
}
