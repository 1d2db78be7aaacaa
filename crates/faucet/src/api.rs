//! HTTP API for faucet service

use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger::TransactionRecord;
use crate::service::{DripChallenge, FaucetService, FaucetStats};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const BANNER: &str = "XELIS Faucet API";

/// Drip request
#[derive(Debug, Deserialize)]
pub struct DripRequest {
    #[serde(default)]
    pub address: String,
}

/// Captcha confirmation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub session_id: String,
    pub solution: String,
}

/// Payout history query
#[derive(Debug, Default, Deserialize)]
pub struct TxsQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// Build the faucet router
pub fn router(service: Arc<FaucetService>) -> Router {
    let config = service.config().clone();

    let mut app = Router::new()
        .route("/request-drip", post(request_drip_handler).get(root_handler))
        .route("/confirm-drip", post(confirm_drip_handler).get(root_handler))
        .route("/stats", post(stats_handler).get(root_handler))
        .route("/txs", post(txs_handler).get(root_handler));

    if config.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    let mut app = app
        .fallback(root_handler)
        .with_state(service)
        .layer(TraceLayer::new_for_http());

    if config.use_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
        info!("CORS enabled");
    }

    app
}

/// Bind the HTTP listener, resolving `host` if it is a name.
pub async fn bind_listener(config: &FaucetConfig) -> std::io::Result<TcpListener> {
    TcpListener::bind((config.host.as_str(), config.port)).await
}

/// Resolve the caller's IP, trusting the first `X-Forwarded-For` hop.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| peer.ip())
}

fn bad_json(rejection: JsonRejection) -> FaucetError {
    FaucetError::InvalidInput(rejection.body_text())
}

/// Request drip handler
pub async fn request_drip_handler(
    State(service): State<Arc<FaucetService>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<DripRequest>, JsonRejection>,
) -> FaucetResult<Json<DripChallenge>> {
    let Json(request) = body.map_err(bad_json)?;
    let ip = client_ip(&headers, peer);

    service
        .request_drip(&request.address, ip)
        .await
        .map(Json)
        .map_err(|e| log_failure("request-drip", e))
}

/// Confirm drip handler
pub async fn confirm_drip_handler(
    State(service): State<Arc<FaucetService>>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> FaucetResult<Json<serde_json::Value>> {
    let Json(request) = body.map_err(bad_json)?;

    service
        .confirm_drip(&request.session_id, &request.solution)
        .await
        .map_err(|e| log_failure("confirm-drip", e))?;

    Ok(Json(json!({})))
}

/// Stats handler
pub async fn stats_handler(State(service): State<Arc<FaucetService>>) -> FaucetResult<Json<FaucetStats>> {
    service
        .stats()
        .await
        .map(Json)
        .map_err(|e| log_failure("stats", e))
}

/// Payout history handler; the body is optional.
pub async fn txs_handler(
    State(service): State<Arc<FaucetService>>,
    body: Option<Json<TxsQuery>>,
) -> FaucetResult<Json<Vec<TransactionRecord>>> {
    let query = body.map(|Json(q)| q).unwrap_or_default();

    service
        .transactions(query.page, query.size)
        .map(Json)
        .map_err(|e| log_failure("txs", e))
}

/// Prometheus metrics handler
pub async fn metrics_handler(State(service): State<Arc<FaucetService>>) -> FaucetResult<impl IntoResponse> {
    let body = service.metrics().render()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// Any other path
pub async fn root_handler() -> &'static str {
    BANNER
}

fn log_failure(endpoint: &str, err: FaucetError) -> FaucetError {
    if err.is_user_facing() {
        info!(endpoint, "Request refused: {}", err);
    } else {
        error!(endpoint, "Request failed: {}", err);
    }
    err
}
