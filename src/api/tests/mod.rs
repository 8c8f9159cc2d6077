use super::*;
use crate::Config;
use crate::broadcaster::ProgressBroadcaster;
use crate::retrieval::tests::{METADATA_JSON, ScriptFetcher, succeeding_script};
use axum::body::Body;
use axum::http::Request;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::StatusCode;
use axum::response::Response;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;


/// Build app state around a shell-script fetcher writing into `dir`
async fn create_test_state(dir: &Path, script: String, config: Option<Config>) -> AppState {
    let mut config = config.unwrap_or_default();
    config.retrieval.temp_dir = dir.to_path_buf();
    let retriever = Retriever::with_fetcher(
        config,
        Arc::new(ScriptFetcher {
            script,
            metadata: METADATA_JSON.to_string(),
        }),
        Arc::new(ProgressBroadcaster::new(16)),
    )
    .await
    .unwrap();
    AppState::new(retriever, CancellationToken::new())
}

/// Router with a fixed peer address for the rate limiter
fn test_app(state: AppState) -> Router {
    create_router(state).layer(MockConnectInfo(SocketAddr::from(([192, 168, 1, 20], 50000))))
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_api_server_starts_and_stops_on_shutdown() {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let state = create_test_state(temp_dir.path(), String::new(), Some(config)).await;

    let shutdown = CancellationToken::new();
    let mut subscription = state.broadcaster.subscribe().await;
    let api_handle = tokio::spawn(start_api_server(state.retriever.clone(), shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
    // observers are closed at shutdown
    assert!(subscription.recv().await.is_none());
}

#[tokio::test]
async fn test_cors_enabled() {
    let temp_dir = tempdir().unwrap();
    let state = create_test_state(temp_dir.path(), String::new(), None).await;
    let app = test_app(state);

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.server.api.cors_enabled = false;
    let state = create_test_state(temp_dir.path(), String::new(), Some(config)).await;

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = test_app(state).oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_rate_limit_applies_to_download_routes_only() {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.server.api.rate_limit.burst_size = 2;
    let state = create_test_state(temp_dir.path(), String::new(), Some(config)).await;
    let app = test_app(state);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get("/api/download/info?url=https://x.com/u/status/1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get("/api/download/info?url=https://x.com/u/status/1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "rate_limited");

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_swagger_ui_enabled() {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.server.api.swagger_ui = true;
    let state = create_test_state(temp_dir.path(), String::new(), Some(config)).await;

    let response = test_app(state)
        .oneshot(get("/swagger-ui/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let temp_dir = tempdir().unwrap();
    let state = create_test_state(temp_dir.path(), String::new(), None).await;

    let response = test_app(state).oneshot(get("/api/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
