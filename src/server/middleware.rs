//! Request pipeline middleware
//!
//! Outermost first:
//! 1. `access_log` - entry and completion records
//! 2. `report_errors` - one ERROR record per internal failure
//! 3. `handle_panic` (via `CatchPanicLayer`) - turns a panicking handler into a 500
//! 4. `shutdown_gate` - 503 for everything once shutdown has begun
//!
//! Routing and the not-found fallback sit inside the gate.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use tracing::{error, field, info, warn};

use super::error::{ApiError, ErrorDetail};
use super::routes::AppState;
use crate::logging::panic_message;

/// Per-request facts captured at entry
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub started_at: Instant,
    pub method: Method,
    pub url: String,
    pub client_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_request(request: &Request) -> Self {
        RequestContext {
            started_at: Instant::now(),
            method: request.method().clone(),
            url: request.uri().to_string(),
            client_ip: client_ip(request),
            user_agent: request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    /// Elapsed time formatted as `<n>ms`
    pub fn duration(&self) -> String {
        format!("{}ms", self.started_at.elapsed().as_millis())
    }
}

/// Peer address recorded by `into_make_service_with_connect_info`
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Log request entry and completion
///
/// Field names (`userAgent`, `statusCode`, `awsCluster`, `awsZone`) are
/// camelCase so existing log queries keep matching. The completion record of a 200 response carries the placement once it
/// has been resolved.
pub async fn access_log(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ctx = RequestContext::from_request(&request);

    info!(
        method = %ctx.method,
        url = %ctx.url,
        ip = ctx.client_ip.map(field::display),
        userAgent = ctx.user_agent.as_deref(),
        "Incoming request"
    );

    let response = next.run(request).await;
    let status = response.status();

    match state.metadata.get().filter(|_| status == StatusCode::OK) {
        Some(placement) => info!(
            method = %ctx.method,
            url = %ctx.url,
            statusCode = status.as_u16(),
            duration = %ctx.duration(),
            awsCluster = %placement.cluster,
            awsZone = %placement.zone,
            "Request completed"
        ),
        None => info!(
            method = %ctx.method,
            url = %ctx.url,
            statusCode = status.as_u16(),
            duration = %ctx.duration(),
            "Request completed"
        ),
    }

    response
}

/// Log internal failures flagged by `ApiError::Internal` or a caught panic
pub async fn report_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let url = request.uri().to_string();

    let response = next.run(request).await;

    if let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>() {
        error!(
            error = %detail,
            method = %method,
            url = %url,
            statusCode = response.status().as_u16(),
            "Internal server error"
        );
    }

    response
}

/// Reject every request once shutdown has begun
pub async fn shutdown_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.shutdown.is_shutting_down() {
        warn!(
            method = %request.method(),
            url = %request.uri(),
            "Rejecting request, server is shutting down"
        );
        let mut response = ApiError::ShuttingDown.into_response();
        // Keep-alive clients should reconnect elsewhere
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        return response;
    }

    next.run(request).await
}

/// `CatchPanicLayer` handler: 500 with the panic message attached for logging
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal(format!("panic: {}", panic_message(&*panic))).into_response()
}
