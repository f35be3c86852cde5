//! Read API
//!
//! Read-only HTTP surface over the state directory: a health probe, the
//! latest metrics snapshot and the newest alerts.

use crate::state::StateStore;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

/// Alerts returned when `limit` is not given
pub const DEFAULT_ALERT_LIMIT: usize = 50;

struct AppState {
    store: StateStore,
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

/// Build the router for `store`, allowing cross-origin reads from `origins`
pub fn router(store: StateStore, origins: &[String]) -> Router {
    let state = Arc::new(AppState { store });

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/alerts", get(alerts))
        .layer(cors_layer(origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // A credentialed wildcard is not allowed, so "*" echoes the caller's origin
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "time": Utc::now().timestamp_millis() }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.store.read_metrics().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "metrics not ready" })),
        )
            .into_response(),
    }
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    Json(state.store.read_alerts(limit).await).into_response()
}

/// Serve `app` on `listener` until `shutdown` flips to true
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Read API listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            tracing::info!("Read API shutting down");
        })
        .await
}
