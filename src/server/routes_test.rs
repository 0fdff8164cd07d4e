//! Tests for the request pipeline
//!
//! Requests are driven in-process through the full middleware stack.

use super::*;
use crate::logging::capture::CapturedLogs;
use crate::metadata::{MetadataCache, Placement, PlacementSource};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower::ServiceExt;

fn placement() -> Placement {
    Placement {
        zone: "eu-central-1a".to_string(),
        cluster: "checkout".to_string(),
        source: PlacementSource::Imds,
    }
}

fn app_state(metadata: MetadataCache) -> (ShutdownController, AppState) {
    let (controller, _signal) = shutdown_channel();
    let state = AppState::new(controller.state(), metadata, "web-7f9c");
    (controller, state)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

async fn fail() -> Result<&'static str, ApiError> {
    Err(ApiError::Internal("upstream refused connection".to_string()))
}

fn router_with_faults(state: AppState) -> Router {
    with_pipeline(
        routes().route("/boom", get(explode)).route("/fail", get(fail)),
        state,
    )
}

#[tokio::test]
async fn test_health_returns_ok_with_uptime() {
    let (_controller, state) = app_state(MetadataCache::new());
    let router = build_router(state);

    let response = send(&router, get_request("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_api_returns_message_and_hostname() {
    let (_controller, state) = app_state(MetadataCache::new());
    let router = build_router(state);

    let response = send(&router, get_request("/api")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"message": "200 :: API working", "hostname": "web-7f9c"})
    );
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (_controller, state) = app_state(MetadataCache::new());
    let router = build_router(state);

    let response = send(&router, get_request("/unknown-path")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Route not found"}));

    let not_found = logs.with_message("Route not found");
    assert_eq!(not_found.len(), 1);
    assert_eq!(not_found[0]["level"], "WARN");
    assert_eq!(not_found[0]["url"], "/unknown-path");
}

#[tokio::test]
async fn test_wrong_method_on_known_path_returns_404() {
    let (_controller, state) = app_state(MetadataCache::new());
    let router = build_router(state);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Route not found"}));
}

#[tokio::test]
async fn test_every_request_rejected_while_draining() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (controller, state) = app_state(MetadataCache::new());
    let router = build_router(state);
    controller.trigger();

    for uri in ["/health", "/api", "/unknown-path"] {
        let response = send(&router, get_request(uri)).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        assert_eq!(
            response.headers().get(header::CONNECTION).unwrap(),
            "close"
        );
        assert_eq!(
            body_json(response).await,
            json!({"error": "Server is shutting down"})
        );
    }

    // Route handlers were never reached
    assert!(logs.with_message("Health check endpoint accessed").is_empty());
    assert!(logs.with_message("API endpoint accessed").is_empty());
    assert!(logs.with_message("Route not found").is_empty());
    assert_eq!(
        logs.with_message("Rejecting request, server is shutting down")
            .len(),
        3
    );
}

#[tokio::test]
async fn test_health_during_shutdown_matches_gate_contract() {
    // Mounted without the gate, the handler's own check yields the same body
    let (controller, state) = app_state(MetadataCache::new());
    let router = routes().with_state(state);
    controller.trigger();

    let response = send(&router, get_request("/health")).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Server is shutting down"})
    );
}

#[tokio::test]
async fn test_panicking_handler_returns_500_and_keeps_serving() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (_controller, state) = app_state(MetadataCache::new());
    let router = router_with_faults(state);

    let response = send(&router, get_request("/boom")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Internal server error"})
    );

    let errors = logs.at_level("ERROR");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "Internal server error");
    assert_eq!(errors[0]["url"], "/boom");
    assert!(errors[0]["error"]
        .as_str()
        .unwrap()
        .contains("handler exploded"));

    // Still serving afterwards
    let response = send(&router, get_request("/api")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(logs.at_level("ERROR").len(), 1);
}

#[tokio::test]
async fn test_handler_error_returns_500_without_detail() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (_controller, state) = app_state(MetadataCache::new());
    let router = router_with_faults(state);

    let response = send(&router, get_request("/fail")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body, json!({"error": "Internal server error"}));

    let errors = logs.at_level("ERROR");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error"], "upstream refused connection");
    assert_eq!(errors[0]["method"], "GET");
}

#[tokio::test]
async fn test_access_log_records_entry_and_completion() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (_controller, state) = app_state(MetadataCache::new());
    let router = build_router(state);

    let mut request = Request::builder()
        .method(Method::GET)
        .uri("/api?verbose=1")
        .header(header::USER_AGENT, "curl/8.5.0")
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 3, 17], 52114))));
    send(&router, request).await;

    let incoming = logs.with_message("Incoming request");
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0]["method"], "GET");
    assert_eq!(incoming[0]["url"], "/api?verbose=1");
    assert_eq!(incoming[0]["ip"], "10.0.3.17");
    assert_eq!(incoming[0]["userAgent"], "curl/8.5.0");

    let completed = logs.with_message("Request completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["statusCode"], 200);
    assert!(completed[0]["duration"].as_str().unwrap().ends_with("ms"));
    // Metadata not fetched yet
    assert!(completed[0].get("awsZone").is_none());
    assert!(completed[0].get("awsCluster").is_none());
}

#[tokio::test]
async fn test_completion_enriched_with_placement_on_200() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (_controller, state) = app_state(MetadataCache::resolved(placement()));
    let router = build_router(state);

    send(&router, get_request("/health")).await;

    let completed = logs.with_message("Request completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["awsZone"], "eu-central-1a");
    assert_eq!(completed[0]["awsCluster"], "checkout");
}

#[tokio::test]
async fn test_completion_not_enriched_on_non_200() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (controller, state) = app_state(MetadataCache::resolved(placement()));
    let router = build_router(state);

    send(&router, get_request("/missing")).await;
    controller.trigger();
    send(&router, get_request("/health")).await;

    let completed = logs.with_message("Request completed");
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0]["statusCode"], 404);
    assert_eq!(completed[1]["statusCode"], 503);
    for record in &completed {
        assert!(record.get("awsZone").is_none());
        assert!(record.get("awsCluster").is_none());
    }
}

#[tokio::test]
async fn test_access_log_records_500_completion() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (_controller, state) = app_state(MetadataCache::resolved(placement()));
    let router = router_with_faults(state);

    send(&router, get_request("/boom")).await;

    let completed = logs.with_message("Request completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["statusCode"], 500);
    assert!(completed[0].get("awsZone").is_none());
}
