//! tidepool service binary: wires config, store, exchanges, routers and
//! the HTTP API together.

mod config;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tidepool_api::{ApiServer, AppState, ServerConfig};
use tidepool_data::StoreManager;
use tidepool_exchange::assets::DEFAULT_ASSETLIST_URL;
use tidepool_exchange::{new_exchange, AssetListConfig, ExchangeManager, ExchangeRouter, RouterConfig};

use crate::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let settings = Settings::from_env().context("configuration error")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!(exchanges = ?settings.exchanges, backend = %settings.store_backend, "starting tidepool");

    let stores = Arc::new(
        StoreManager::new(
            &settings.store_backend,
            &settings.store_url,
            &settings.influxdb_token,
            &settings.influxdb_organization,
        )
        .context("store setup failed")?,
    );
    stores.health().await.context("store health check failed")?;

    let assets_config = AssetListConfig {
        url: settings
            .assetlist_url
            .clone()
            .unwrap_or_else(|| DEFAULT_ASSETLIST_URL.to_string()),
        refresh_interval: settings.assetlist_refresh_interval,
        retry_interval: settings.assetlist_retry_interval,
    };
    let router_config = RouterConfig {
        interval: settings.candles_interval,
        period: settings.candles_period,
    };

    let mut exchanges = HashMap::new();
    let mut routers = HashMap::new();
    for name in &settings.exchanges {
        let exchange = new_exchange(name, assets_config.clone())
            .with_context(|| format!("cannot configure exchange '{name}'"))?;
        let store = stores
            .store(name)
            .await
            .with_context(|| format!("cannot open store for '{name}'"))?;
        let router = ExchangeRouter::new(name.clone(), store, router_config);
        // subscribe before starting so the first pair broadcast lands
        router.start(exchange.subscribe_pairs(), exchange.subscribe_trades());
        if let Err(err) = exchange.start().await {
            error!(exchange = %name, error = %err, "failed to start exchange, leaving it disabled");
        }
        exchanges.insert(name.clone(), exchange);
        routers.insert(name.clone(), router);
    }

    let manager = Arc::new(ExchangeManager::new(exchanges, routers));
    let state = Arc::new(AppState::new(manager, stores, settings.trades_max_age));
    let server = ApiServer::new(
        ServerConfig {
            listen_addr: settings.api_listen_addr.clone(),
        },
        state,
    );
    server.serve().await.context("api server failed")?;
    Ok(())
}
