//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`media`] — Rendition listing, post text, media retrieval
//! - [`system`] — Health, OpenAPI, progress events

use serde::{Deserialize, Serialize};

mod media;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use media::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /download/info and GET /download/content
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams, utoipa::ToSchema)]
pub struct UrlQuery {
    /// Post URL
    pub url: Option<String>,
}

/// Request body for POST /download/process
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ProcessRequest {
    /// Post URL
    pub url: Option<String>,
    /// Quality label from GET /download/info (e.g. "720p")
    pub quality: Option<String>,
}

/// Reject missing or blank request fields
fn required(value: Option<String>, field: &str) -> crate::Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(crate::Error::Validation(format!("{} is required", field))),
    }
}
