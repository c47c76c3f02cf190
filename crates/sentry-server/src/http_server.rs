//! HTTP facade: node status API, Prometheus metrics and notification target admin.

use crate::metrics::MetricsRegistry;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use liveness::{CallsignEmail, CallsignTime, Partition, SharedStore, Store, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub store: SharedStore,
    pub metrics: Arc<MetricsRegistry>,
}

/// Current standing of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub callsign: String,
    pub last_seen: DateTime<Utc>,
    pub partition: Partition,
    /// Heard within the liveness window
    pub seen_recently: bool,
}

/// Store failure surfaced as a 500
struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(error = %self.0, "Store request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

/// Public routes: `/api/live`, `/api/dead`, `/api/node/:node`, `/metrics`
pub fn public_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/live", get(live_handler))
        .route("/api/dead", get(dead_handler))
        .route("/api/node/:node", get(node_handler))
        .route("/metrics", get(metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Admin routes for notification targets. Bind these to loopback only.
pub fn admin_router(store: SharedStore) -> Router {
    Router::new()
        .route("/email", get(list_email_handler))
        .route(
            "/email/:node",
            get(get_email_handler)
                .put(put_email_handler)
                .delete(delete_email_handler),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(store)
}

/// One axum listener
pub struct HttpServer {
    name: &'static str,
    listen_addr: String,
    router: Router,
}

impl HttpServer {
    pub fn new(name: &'static str, listen_addr: String, router: Router) -> Self {
        Self {
            name,
            listen_addr,
            router,
        }
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> common::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> common::Result<()> {
        let addr = listener.local_addr()?;
        info!(server = self.name, listen_addr = %addr, "HTTP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!(server = self.name, "HTTP server stopped");
        Ok(())
    }
}

async fn live_handler(State(state): State<ApiState>) -> Result<Json<Vec<CallsignTime>>, ApiError> {
    Ok(Json(state.store.list_live(Utc::now()).await?))
}

async fn dead_handler(State(state): State<ApiState>) -> Result<Json<Vec<CallsignTime>>, ApiError> {
    Ok(Json(state.store.list_dead().await?))
}

async fn node_handler(
    State(state): State<ApiState>,
    Path(node): Path<String>,
) -> Result<Response, ApiError> {
    let status = if let Some(last_seen) = state.store.get_live(&node).await? {
        Some(NodeStatus {
            callsign: node,
            last_seen,
            partition: Partition::Live,
            seen_recently: true,
        })
    } else {
        state
            .store
            .get_dead(&node)
            .await?
            .map(|last_seen| NodeStatus {
                callsign: node,
                last_seen,
                partition: Partition::Dead,
                seen_recently: false,
            })
    };

    Ok(match status {
        Some(status) => Json(status).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

async fn metrics_handler(State(state): State<ApiState>) -> Response {
    match state.store.count_live().await {
        Ok(n) => state.metrics.set_nodes(Partition::Live, n),
        Err(e) => warn!(error = %e, "Failed to count live nodes"),
    }
    match state.store.count_dead().await {
        Ok(n) => state.metrics.set_nodes(Partition::Dead, n),
        Err(e) => warn!(error = %e, "Failed to count dead nodes"),
    }

    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn list_email_handler(
    State(store): State<SharedStore>,
) -> Result<Json<Vec<CallsignEmail>>, ApiError> {
    Ok(Json(store.list_email().await?))
}

async fn get_email_handler(
    State(store): State<SharedStore>,
    Path(node): Path<String>,
) -> Result<Response, ApiError> {
    Ok(match store.get_email(&node).await? {
        Some(email) => email.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

async fn put_email_handler(
    State(store): State<SharedStore>,
    Path(node): Path<String>,
    body: String,
) -> Result<Response, ApiError> {
    let email = body.trim();
    if email.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "empty address").into_response());
    }

    store.add_email(&node, email).await?;
    info!(callsign = %node, email = %email, "Registered notification target");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn delete_email_handler(
    State(store): State<SharedStore>,
    Path(node): Path<String>,
) -> Result<StatusCode, ApiError> {
    store.remove_email(&node).await?;
    info!(callsign = %node, "Removed notification target");
    Ok(StatusCode::NO_CONTENT)
}
