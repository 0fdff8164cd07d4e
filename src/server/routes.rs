//! HTTP routes
//!
//! - `GET /health` - liveness with uptime
//! - `GET /api` - hostname echo
//! - anything else - 404 `{"error":"Route not found"}`

use axum::{
    extract::{Request, State},
    middleware,
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, field, warn};

use super::error::ApiError;
use super::middleware::{access_log, client_ip, handle_panic, report_errors, shutdown_gate};
use super::shutdown::ShutdownState;
use crate::metadata::MetadataCache;

/// State shared by every request
#[derive(Debug, Clone)]
pub struct AppState {
    pub shutdown: ShutdownState,
    pub metadata: MetadataCache,
    pub hostname: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(shutdown: ShutdownState, metadata: MetadataCache, hostname: impl Into<String>) -> Self {
        AppState {
            shutdown,
            metadata,
            hostname: Arc::from(hostname.into()),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: f64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: &'static str,
    pub hostname: String,
}

/// Liveness handler
///
/// Checks the shutdown flag itself as well: on the multi-threaded runtime
/// the flag can flip between the gate and this handler. Both paths return
/// the same 503 body.
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    debug!("Health check endpoint accessed");

    if state.shutdown.is_shutting_down() {
        return Err(ApiError::ShuttingDown);
    }

    Ok(Json(HealthResponse {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs_f64(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn api(State(state): State<AppState>) -> Json<ApiResponse> {
    debug!(hostname = %state.hostname, "API endpoint accessed");

    Json(ApiResponse {
        message: "200 :: API working",
        hostname: state.hostname.to_string(),
    })
}

async fn not_found(request: Request) -> ApiError {
    warn!(
        method = %request.method(),
        url = %request.uri(),
        ip = client_ip(&request).map(field::display),
        "Route not found"
    );
    ApiError::NotFound
}

/// Application routes without the pipeline
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api", get(api))
}

/// Wrap routes in the request pipeline and attach state
///
/// Unknown paths and unsupported methods on known paths both get 404.
pub fn with_pipeline(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), shutdown_gate))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(report_errors))
        .layer(middleware::from_fn_with_state(state.clone(), access_log))
        .with_state(state)
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    with_pipeline(routes(), state)
}
