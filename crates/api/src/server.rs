use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use tracing::{error, info};

use crate::routes;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// HTTP server wrapping the route tree with request logging.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub async fn serve(self) -> std::io::Result<()> {
        let app = routes::routes()
            .layer(middleware::from_fn(log_request))
            .with_state(self.state);
        let listener = tokio::net::TcpListener::bind(&self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "api listening");
        axum::serve(listener, app).await
    }
}

/// Logs one line per request; server errors at error level.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    let latency = start.elapsed();
    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "request failed"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "request"
        );
    }
    response
}
