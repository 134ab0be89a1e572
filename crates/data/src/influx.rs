//! InfluxDB 2 store backend.
//!
//! Trades are written as `trade` measurement points: `base_asset`,
//! `quote_asset` and a random `id` as tags (the id keeps concurrent fills
//! with identical tags from colliding), volumes as string fields. Writes
//! are batched by a background task whose failures land on an error
//! channel that is drained and logged, never surfaced to the producer.
//! Reads run a Flux range query with a pivot and normalize orientation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

use tidepool_domain::{Pair, Token, Trade};

use crate::{Store, StoreError};

const WRITE_BATCH_SIZE: usize = 5;
const WRITE_FLUSH_INTERVAL: Duration = Duration::from_millis(250);
const WRITE_QUEUE_CAPACITY: usize = 1024;

/// Shared client handing out one bucket-scoped store per exchange.
pub struct Influxdb2Manager {
    client: reqwest::Client,
    url: String,
    token: String,
    organization: String,
    stores: Mutex<HashMap<String, Arc<Influxdb2Store>>>,
}

impl Influxdb2Manager {
    pub fn new(url: &str, token: &str, organization: &str) -> Result<Self, StoreError> {
        if token.is_empty() {
            return Err(StoreError::Backend(
                "missing influxdb2 auth token".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            organization: organization.to_string(),
            stores: Mutex::new(HashMap::new()),
        })
    }

    pub async fn store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        let mut stores = self.stores.lock().await;
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Influxdb2Store::new(
                    name,
                    self.client.clone(),
                    &self.url,
                    &self.token,
                    &self.organization,
                ))
            })
            .clone();
        Ok(store)
    }

    /// Queries the `/health` endpoint and requires a passing status.
    pub async fn health(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .get(format!("{}/health", self.url))
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        let status = body["status"].as_str().unwrap_or("unknown");
        if status != "pass" {
            return Err(StoreError::Backend(format!(
                "influxdb2 health check failed: {status}"
            )));
        }
        debug!(status, "database health check passed");
        Ok(())
    }
}

/// One exchange's trade log, stored in the bucket named after it.
pub struct Influxdb2Store {
    name: String,
    client: reqwest::Client,
    url: String,
    token: String,
    organization: String,
    lines: mpsc::Sender<String>,
}

impl Influxdb2Store {
    fn new(
        name: &str,
        client: reqwest::Client,
        url: &str,
        token: &str,
        organization: &str,
    ) -> Self {
        let (line_tx, line_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (error_tx, mut error_rx) = mpsc::channel::<StoreError>(WRITE_QUEUE_CAPACITY);
        let store_name = name.to_string();
        tokio::spawn(async move {
            while let Some(err) = error_rx.recv().await {
                error!(store = %store_name, error = %err, "database write error");
            }
        });
        let writer = LineWriter {
            client: client.clone(),
            endpoint: format!(
                "{url}/api/v2/write?org={organization}&bucket={name}&precision=ms"
            ),
            token: token.to_string(),
            errors: error_tx,
        };
        tokio::spawn(writer.run(line_rx));
        Self {
            name: name.to_string(),
            client,
            url: url.to_string(),
            token: token.to_string(),
            organization: organization.to_string(),
            lines: line_tx,
        }
    }
}

#[async_trait]
impl Store for Influxdb2Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let line = trade_line(trade, Uuid::new_v4());
        debug!(store = %self.name, base = %trade.base, quote = %trade.quote, "saving trade");
        self.lines
            .send(line)
            .await
            .map_err(|_| StoreError::Backend("write queue closed".to_string()))
    }

    async fn trades(
        &self,
        pair: &Pair,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StoreError> {
        let query = trades_query(&self.name, pair, start, end);
        let response = self
            .client
            .post(format!("{}/api/v2/query?org={}", self.url, self.organization))
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(query)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        parse_trades_csv(&body, pair)
    }
}

/// Background batch writer; never blocks or fails the producer.
struct LineWriter {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    errors: mpsc::Sender<StoreError>,
}

impl LineWriter {
    async fn run(self, mut lines: mpsc::Receiver<String>) {
        let mut batch: Vec<String> = Vec::with_capacity(WRITE_BATCH_SIZE);
        let mut flush = tokio::time::interval(WRITE_FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => {
                        batch.push(line);
                        if batch.len() >= WRITE_BATCH_SIZE {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => {
                        self.flush(&mut batch).await;
                        break;
                    }
                },
                _ = flush.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }
    }

    async fn flush(&self, batch: &mut Vec<String>) {
        if batch.is_empty() {
            return;
        }
        let body = batch.join("\n");
        batch.clear();
        let result = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Token {}", self.token))
            .body(body)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        if let Err(err) = result {
            let _ = self.errors.send(StoreError::Request(err)).await;
        }
    }
}

fn trade_line(trade: &Trade, id: Uuid) -> String {
    format!(
        "trade,base_asset={},quote_asset={},id={} base_volume=\"{}\",quote_volume=\"{}\" {}",
        trade.base.symbol,
        trade.quote.symbol,
        id,
        trade.base.amount,
        trade.quote.amount,
        trade.time.timestamp_millis()
    )
}

fn trades_query(bucket: &str, pair: &Pair, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        r#"from(bucket: "{bucket}")
    |> range(start: {start}, stop: {stop})
    |> filter(fn: (r) => r._measurement == "trade" and ((r.base_asset == "{base}" and r.quote_asset == "{quote}") or (r.base_asset == "{quote}" and r.quote_asset == "{base}")))
    |> pivot(rowKey:["_time"], columnKey: ["_field"], valueColumn: "_value")
"#,
        bucket = bucket,
        start = start.to_rfc3339_opts(SecondsFormat::Millis, true),
        stop = end.to_rfc3339_opts(SecondsFormat::Millis, true),
        base = pair.base,
        quote = pair.quote,
    )
}

/// Parses the annotated CSV a Flux query returns, normalizing each row so
/// the base symbol matches the queried pair. Malformed rows are skipped.
fn parse_trades_csv(body: &str, pair: &Pair) -> Result<Vec<Trade>, StoreError> {
    let mut trades = Vec::new();
    let mut header: Option<HashMap<String, usize>> = None;
    for raw_line in body.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            // annotations restart the table; the next plain row is a header
            header = None;
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let Some(columns) = header.as_ref() else {
            header = Some(
                fields
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.to_string(), i))
                    .collect(),
            );
            continue;
        };
        let column = |key: &str| {
            columns
                .get(key)
                .and_then(|&i| fields.get(i))
                .map(|value| value.to_string())
        };
        let (Some(time), Some(base_asset), Some(quote_asset), Some(base_volume), Some(quote_volume)) = (
            column("_time"),
            column("base_asset"),
            column("quote_asset"),
            column("base_volume"),
            column("quote_volume"),
        ) else {
            debug!(row = line, "skipping row with missing columns");
            continue;
        };
        let (base_asset, base_volume, quote_asset, quote_volume) = if base_asset == pair.base {
            (base_asset, base_volume, quote_asset, quote_volume)
        } else if quote_asset == pair.base {
            (quote_asset, quote_volume, base_asset, base_volume)
        } else {
            warn!(
                row_base = %base_asset,
                row_quote = %quote_asset,
                query = %pair,
                "unexpected symbol in query result"
            );
            continue;
        };
        let Ok(time) = DateTime::parse_from_rfc3339(&time) else {
            debug!(value = %time, "skipping row with unparseable time");
            continue;
        };
        let (Ok(base_amount), Ok(quote_amount)) = (
            base_volume.parse::<Decimal>(),
            quote_volume.parse::<Decimal>(),
        ) else {
            debug!(row = line, "skipping row with unparseable volume");
            continue;
        };
        trades.push(Trade::new(
            Token::new(base_amount, base_asset),
            Token::new(quote_amount, quote_asset),
            time.with_timezone(&Utc),
        ));
    }
    trades.sort_by(|a, b| b.time.cmp(&a.time));
    Ok(trades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn pair() -> Pair {
        Pair::new("ATOM", "USDC")
    }

    #[test]
    fn line_protocol_format() {
        let trade = Trade::new(
            Token::new(dec!(1.5), "ATOM"),
            Token::new(dec!(15), "USDC"),
            Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap(),
        );
        let id = Uuid::nil();
        let line = trade_line(&trade, id);
        assert_eq!(
            line,
            format!(
                "trade,base_asset=ATOM,quote_asset=USDC,id={id} \
                 base_volume=\"1.5\",quote_volume=\"15\" 1682942400000"
            )
        );
    }

    #[test]
    fn query_covers_both_orientations() {
        let start = Utc.with_ymd_and_hms(2023, 5, 1, 11, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
        let query = trades_query("osmosis", &pair(), start, end);
        assert!(query.contains(r#"from(bucket: "osmosis")"#));
        assert!(query.contains(r#"r.base_asset == "ATOM" and r.quote_asset == "USDC""#));
        assert!(query.contains(r#"r.base_asset == "USDC" and r.quote_asset == "ATOM""#));
        assert!(query.contains("2023-05-01T11:00:00.000Z"));
    }

    #[test]
    fn csv_rows_parse_and_normalize() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,string,string,string,string,string,string
#group,false,false,true,true,false,true,true,true,false,false,true
#default,_result,,,,,,,,,,
,result,table,_start,_stop,_time,base_asset,quote_asset,id,base_volume,quote_volume,_measurement
,,0,2023-05-01T11:00:00Z,2023-05-01T12:00:00Z,2023-05-01T11:01:00Z,ATOM,USDC,aaa,1.5,15,trade
,,0,2023-05-01T11:00:00Z,2023-05-01T12:00:00Z,2023-05-01T11:02:00Z,USDC,ATOM,bbb,20,2,trade
";
        let trades = parse_trades_csv(body, &pair()).unwrap();
        assert_eq!(trades.len(), 2);
        // newest first, reversed row normalized to the queried orientation
        assert_eq!(trades[0].base.symbol, "ATOM");
        assert_eq!(trades[0].base.amount, dec!(2));
        assert_eq!(trades[0].quote.amount, dec!(20));
        assert_eq!(trades[1].base.amount, dec!(1.5));
        assert!(trades[0].time > trades[1].time);
    }

    #[test]
    fn csv_skips_foreign_and_malformed_rows() {
        let body = "\
,result,table,_start,_stop,_time,base_asset,quote_asset,id,base_volume,quote_volume,_measurement
,,0,2023-05-01T11:00:00Z,2023-05-01T12:00:00Z,2023-05-01T11:01:00Z,OSMO,JUNO,aaa,1,2,trade
,,0,2023-05-01T11:00:00Z,2023-05-01T12:00:00Z,2023-05-01T11:02:00Z,ATOM,USDC,bbb,not-a-number,3,trade
,,0,2023-05-01T11:00:00Z,2023-05-01T12:00:00Z,2023-05-01T11:03:00Z,ATOM,USDC,ccc,1,10,trade
";
        let trades = parse_trades_csv(body, &pair()).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quote.amount, dec!(10));
    }

    #[test]
    fn empty_body_yields_no_trades() {
        assert!(parse_trades_csv("", &pair()).unwrap().is_empty());
    }

    #[test]
    fn manager_requires_token() {
        assert!(Influxdb2Manager::new("http://localhost:8086", "", "org").is_err());
    }
}
