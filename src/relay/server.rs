//! HTTP surface of the relay
//!
//! - `POST /permissioned` `{ "transaction": base64 }` -> `{ "signature" }`
//! - `GET /health`
//! - `GET /metrics` (Prometheus text format, when enabled)

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::metrics::metrics;
use crate::observability::{CorrelationId, TraceContext};
use crate::relay::pipeline::PermissionedRelay;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Deserialize)]
pub struct RelayRequest {
    #[serde(alias = "envelope")]
    pub transaction: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayResponse {
    pub signature: String,
    pub confirmed: bool,
}

#[derive(Clone)]
struct AppState {
    relay: Arc<PermissionedRelay>,
    metrics_enabled: bool,
}

fn missing_transaction() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Serialized transaction is required." })),
    )
        .into_response()
}

async fn permissioned(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RelayRequest>, JsonRejection>,
) -> Response {
    let encoded = match payload {
        Ok(Json(RelayRequest {
            transaction: Some(encoded),
        })) if !encoded.trim().is_empty() => encoded,
        _ => return missing_transaction(),
    };

    let trace = match headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(id) => TraceContext::with_correlation_id("permissioned", CorrelationId::from(id)),
        None => TraceContext::new("permissioned"),
    };

    match state.relay.relay_base64(&encoded, &trace).await {
        Ok(submitted) => Json(RelayResponse {
            signature: submitted.signature.to_string(),
            confirmed: submitted.confirmed,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "authority": state.relay.authority().to_string(),
        "program": state.relay.whitelist().program_id().to_string(),
        "allowed_instructions": state.relay.whitelist().names().collect::<Vec<_>>(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    match metrics().render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Build the relay router
pub fn router(relay: PermissionedRelay, metrics_enabled: bool) -> Router {
    let state = AppState {
        relay: Arc::new(relay),
        metrics_enabled,
    };

    Router::new()
        .route("/permissioned", post(permissioned))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Serve until Ctrl-C
pub async fn serve(relay: PermissionedRelay, addr: SocketAddr, metrics_enabled: bool) -> anyhow::Result<()> {
    use anyhow::Context;

    let app = router(relay, metrics_enabled);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay server on {addr}"))?;
    info!(addr = %addr, "Relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal");
        })
        .await
        .context("relay server error")?;
    Ok(())
}
