//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for listing renditions,
//! retrieving media and observing retrieval progress.

use crate::{Result, Retriever};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Download
/// - `GET /api/download/info?url=` - List renditions of a post
/// - `GET /api/download/content?url=` - Post text, author and counters
/// - `POST /api/download/process` - Retrieve a rendition and stream the media
///
/// ## System
/// - `GET /api/health` - Health check
/// - `GET /api/openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /api/events` - Server-sent progress events
/// - `GET /api/ws` - WebSocket progress push
pub fn create_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let router = Router::new()
        // Download
        .route("/api/download/info", get(routes::video_info))
        .route("/api/download/content", get(routes::post_content))
        .route("/api/download/process", post(routes::process_download))
        // System
        .route("/api/health", get(routes::health_check))
        .route("/api/openapi.json", get(routes::openapi_spec))
        .route("/api/events", get(routes::event_stream))
        .route("/api/ws", get(routes::progress_socket));

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    // The last layer applied is the outermost: Trace → CORS → Rate Limit → Handler

    let router = if config.server.api.rate_limit.enabled {
        let limiter = Arc::new(rate_limit::RateLimiter::new(
            config.server.api.rate_limit.clone(),
        ));
        router.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit_middleware,
        ))
    } else {
        router
    };

    let router = if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Build a CORS layer based on configured origins
///
/// Supports "*" for any origin. All methods and headers are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until `shutdown` is cancelled, then stops accepting connections,
/// cancels running retrievals and closes all progress observers.
///
/// # Example
///
/// ```no_run
/// use postclip_dl::{Config, ProgressBroadcaster, Retriever};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let broadcaster = Arc::new(ProgressBroadcaster::new(config.retrieval.observer_buffer));
/// let retriever = Retriever::new(config, broadcaster).await?;
///
/// // Start API server (blocks until shutdown)
/// postclip_dl::api::start_api_server(retriever, CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(retriever: Retriever, shutdown: CancellationToken) -> Result<()> {
    let state = AppState::new(retriever, shutdown.clone());
    let bind_address = state.config.server.api.bind_address;
    let broadcaster = Arc::clone(&state.broadcaster);

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(state);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(bind_address),
        "API server listening"
    );

    // Must use into_make_service_with_connect_info to provide ConnectInfo<SocketAddr>
    // for the rate limiting middleware
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        let broadcaster = Arc::clone(&broadcaster);
        async move {
            shutdown.cancelled().await;
            // end SSE and WebSocket streams so connections can drain
            broadcaster.close_all().await;
        }
    })
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()));

    broadcaster.close_all().await;
    tracing::info!("API server stopped");
    result
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
