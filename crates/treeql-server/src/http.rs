//! HTTP API using Axum

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::warn;
use treeql_core::Error;
use treeql_engine::MemoryEngine;
use treeql_query::QueryFactory;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub factory: QueryFactory<MemoryEngine>,
    pub start_time: Instant,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Version information
    pub version: String,

    /// Uptime in seconds
    pub uptime_seconds: u64,
}

/// Create HTTP server router
pub fn create_router(factory: QueryFactory<MemoryEngine>) -> Router {
    let state = AppState {
        factory,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/query", post(execute_query))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// The body is the raw query text; the response is the serialized roots
async fn execute_query(State(state): State<AppState>, body: String) -> Response {
    let factory = state.factory.clone();
    match tokio::task::spawn_blocking(move || factory.parse_query(&body)).await {
        Ok(Ok(document)) => (StatusCode::OK, Json(document)).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            warn!("Query task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

fn error_response(error: &Error) -> Response {
    let status = if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!("Query rejected ({}): {}", status, error);
    (status, Json(json!({"error": error.to_string()}))).into_response()
}
