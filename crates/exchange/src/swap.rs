//! Raw swap event decoding.
//!
//! A transaction event carries parallel string arrays under the
//! `token_swapped.*` keys, one entry per swap hop. Only hops executed by
//! the `gamm` module count; other entries at the same indices are ignored.

use std::collections::HashMap;

use tidepool_domain::Token;

use crate::error::ExchangeError;

/// Subscription query matching swap transactions.
pub const SWAP_EVENT_QUERY: &str = "tm.event='Tx' AND token_swapped.module='gamm'";

const ATTR_MODULE: &str = "token_swapped.module";
const ATTR_POOL_ID: &str = "token_swapped.pool_id";
const ATTR_TOKENS_IN: &str = "token_swapped.tokens_in";
const ATTR_TOKENS_OUT: &str = "token_swapped.tokens_out";
const SWAP_MODULE: &str = "gamm";

/// One transaction's worth of event attributes, keyed by
/// `<event_type>.<attribute>` with one value per occurrence.
#[derive(Debug, Clone, Default)]
pub struct SwapEvent {
    pub events: HashMap<String, Vec<String>>,
}

impl From<HashMap<String, Vec<String>>> for SwapEvent {
    fn from(events: HashMap<String, Vec<String>>) -> Self {
        Self { events }
    }
}

/// A single pool swap before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSwap {
    pub token_in: Token,
    pub token_out: Token,
    pub pool_id: String,
}

/// Extracts the `gamm` swaps from an event.
///
/// An event without the module attribute is simply not a swap event and
/// yields an empty list; once the module attribute is present, the other
/// three arrays are required and must all have the same length.
pub fn parse_token_swaps(event: &SwapEvent) -> Result<Vec<TokenSwap>, ExchangeError> {
    let Some(modules) = event.events.get(ATTR_MODULE) else {
        return Ok(Vec::new());
    };
    let pool_ids = event
        .events
        .get(ATTR_POOL_ID)
        .ok_or(ExchangeError::MissingAttribute(ATTR_POOL_ID))?;
    let tokens_in = event
        .events
        .get(ATTR_TOKENS_IN)
        .ok_or(ExchangeError::MissingAttribute(ATTR_TOKENS_IN))?;
    let tokens_out = event
        .events
        .get(ATTR_TOKENS_OUT)
        .ok_or(ExchangeError::MissingAttribute(ATTR_TOKENS_OUT))?;
    if pool_ids.len() != modules.len()
        || tokens_in.len() != modules.len()
        || tokens_out.len() != modules.len()
    {
        return Err(ExchangeError::AttributeLengthMismatch);
    }
    let mut swaps = Vec::with_capacity(modules.len());
    for (i, module) in modules.iter().enumerate() {
        if module != SWAP_MODULE {
            continue;
        }
        let token_in = Token::parse(&tokens_in[i]).map_err(|source| ExchangeError::SwapToken {
            side: "input",
            value: tokens_in[i].clone(),
            source,
        })?;
        let token_out = Token::parse(&tokens_out[i]).map_err(|source| ExchangeError::SwapToken {
            side: "output",
            value: tokens_out[i].clone(),
            source,
        })?;
        swaps.push(TokenSwap {
            token_in,
            token_out,
            pool_id: pool_ids[i].clone(),
        });
    }
    Ok(swaps)
}
