//! CometBFT JSON-RPC websocket client.
//!
//! The only RPC surface the indexer needs is the event subscription: one
//! `subscribe` call, then a stream of transaction events whose attribute
//! maps are forwarded on a channel. The reader task responds to pings and
//! ends when the connection drops; reconnection is the operator's
//! concern, matching the start-once contract of the exchange adapter.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::ExchangeError;
use crate::swap::SwapEvent;

const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Minimal CometBFT RPC connection, addressed by its HTTP(S) base URL.
pub struct CometRpc {
    url: String,
}

impl CometRpc {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Opens the websocket, issues a `subscribe` for `query`, and
    /// forwards each event's attribute map. The returned channel closes
    /// when the connection does.
    pub async fn subscribe(
        &self,
        query: &str,
    ) -> Result<mpsc::Receiver<SwapEvent>, ExchangeError> {
        let endpoint = websocket_url(&self.url);
        let (stream, _) = connect_async(&endpoint).await?;
        let (mut sink, mut source) = stream.split();
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "subscribe",
            "id": 1,
            "params": { "query": query },
        });
        sink.send(Message::Text(request.to_string())).await?;
        debug!(query, "subscribed");

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let url = self.url.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(err) => {
                        error!(url = %url, error = %err, "websocket read failed");
                        break;
                    }
                };
                match message {
                    Message::Text(text) => {
                        if let Some(event) = parse_event(&text) {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Message::Ping(payload) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => {
                        warn!(url = %url, "websocket closed by remote");
                        break;
                    }
                    _ => {}
                }
            }
            info!(url = %url, "event subscription ended");
        });
        Ok(event_rx)
    }
}

/// Derives the websocket endpoint from the RPC base URL.
fn websocket_url(url: &str) -> String {
    let base = url.trim_end_matches('/');
    let switched = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{switched}/websocket")
}

/// Pulls the flattened attribute map out of a subscription message.
/// Responses without events (the subscribe ack, keepalives) yield `None`.
fn parse_event(text: &str) -> Option<SwapEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let events = value.get("result")?.get("events")?;
    let map: HashMap<String, Vec<String>> = serde_json::from_value(events.clone()).ok()?;
    if map.is_empty() {
        return None;
    }
    Some(SwapEvent { events: map })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_switches_scheme() {
        assert_eq!(
            websocket_url("https://rpc.example.com:443"),
            "wss://rpc.example.com:443/websocket"
        );
        assert_eq!(
            websocket_url("http://localhost:26657/"),
            "ws://localhost:26657/websocket"
        );
    }

    #[test]
    fn parse_event_extracts_attribute_map() {
        let text = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "query": "tm.event='Tx'",
                "events": {
                    "token_swapped.module": ["gamm"],
                    "token_swapped.pool_id": ["678"]
                }
            }
        }"#;
        let event = parse_event(text).unwrap();
        assert_eq!(
            event.events["token_swapped.pool_id"],
            vec!["678".to_string()]
        );
    }

    #[test]
    fn subscribe_ack_is_ignored() {
        assert!(parse_event(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).is_none());
        assert!(parse_event("not json").is_none());
    }
}
