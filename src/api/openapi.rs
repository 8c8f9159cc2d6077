//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the postclip-dl REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the postclip-dl REST API
///
/// The spec can be accessed via:
/// - `/api/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "postclip-dl REST API",
        version = "0.1.0",
        description = "Retrieve videos from social media posts: list renditions, fetch one with live progress, read the post text",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server")
    ),
    paths(
        // Download
        crate::api::routes::video_info,
        crate::api::routes::post_content,
        crate::api::routes::process_download,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::progress_socket,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::Rendition,
        crate::types::ProgressRecord,
        crate::types::PostContent,
        crate::types::PostAuthor,
        crate::types::PostStats,
        crate::types::SessionState,

        // Config types from config.rs
        crate::config::Config,
        crate::config::ToolConfig,
        crate::config::RetrievalConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,
        crate::config::RateLimitConfig,

        // API request types from routes
        crate::api::routes::UrlQuery,
        crate::api::routes::ProcessRequest,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "download", description = "Renditions, post text and media retrieval"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, progress events"),
    )
)]
pub struct ApiDoc;
