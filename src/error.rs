//! Error types for postclip-dl
//!
//! This module provides the error handling for the library:
//! - Domain-specific error kinds for metadata queries, retrievals and artifacts
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//!
//! Classifiable failures carry a stable, user-presentable message. Everything
//! else is reported to API callers as a generic "operation failed" and the
//! diagnostic detail stays in the logs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for postclip-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to API callers for failures that cannot be classified
pub const GENERIC_FAILURE_MESSAGE: &str = "operation failed";

/// Main error type for postclip-dl
#[derive(Debug, Error)]
pub enum Error {
    /// The source content requires authentication (privacy-restricted)
    #[error("this content requires authentication and cannot be retrieved")]
    ContentRestricted,

    /// The source content is missing, deleted, or otherwise inaccessible
    #[error("this content is unavailable or has been removed")]
    ContentUnavailable,

    /// The requested quality does not match any resolved rendition
    #[error("no rendition with quality {quality} is available")]
    RenditionNotFound {
        /// The quality label the caller asked for
        quality: String,
        /// Quality labels that were resolved for the source
        available: Vec<String>,
    },

    /// The fetch invocation exited unsuccessfully
    #[error("media retrieval failed ({})", describe_exit(.exit_code))]
    ExternalToolFailure {
        /// Exit code of the external tool, `None` if it was killed by a signal
        exit_code: Option<i32>,
    },

    /// A retrieval reported success but its output file cannot be located
    #[error("retrieved media file is missing")]
    ArtifactMissing {
        /// Where the file was expected
        path: PathBuf,
    },

    /// Metadata output could not be interpreted as the expected structured data
    #[error("failed to parse media metadata: {0}")]
    ParseFailure(String),

    /// The metadata query failed for an unclassified reason
    #[error("metadata retrieval failed: {0}")]
    MetadataFailed(String),

    /// The external fetch tool binary could not be located
    #[error("external fetch tool not found: {0}")]
    ToolNotFound(String),

    /// The external fetch tool could not be executed
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// A retrieval for the same source and rendition is already running
    #[error("a retrieval for this rendition is already in progress")]
    RetrievalInProgress {
        /// The session key that is already claimed
        key: String,
    },

    /// The chosen rendition exceeds the configured size limit
    #[error("media is too large: {size} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge {
        /// Known size of the rendition in bytes
        size: u64,
        /// Configured maximum in bytes
        limit: u64,
    },

    /// The retrieval was cancelled before it completed
    #[error("retrieval cancelled")]
    Cancelled,

    /// Invalid caller input
    #[error("invalid request: {0}")]
    Validation(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retrieval.temp_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl Error {
    /// Whether the message of this error is safe and meaningful to show to end users
    pub fn is_user_presentable(&self) -> bool {
        matches!(
            self,
            Error::ContentRestricted
                | Error::ContentUnavailable
                | Error::RenditionNotFound { .. }
                | Error::ExternalToolFailure { .. }
                | Error::ArtifactMissing { .. }
                | Error::RetrievalInProgress { .. }
                | Error::FileTooLarge { .. }
                | Error::Cancelled
                | Error::Validation(_)
        )
    }
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "rendition_not_found",
///     "message": "no rendition with quality 1080p is available",
///     "details": { "quality": "1080p", "available": ["720p", "480p"] }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "content_restricted")
    pub code: String,

    /// Human-readable error message, suitable for end users
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal() -> Self {
        Self::new("internal_error", GENERIC_FAILURE_MESSAGE)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Validation(_) => 400,
            Error::Config { .. } => 400,

            // 403 Forbidden - content exists but requires authentication
            Error::ContentRestricted => 403,

            // 404 Not Found
            Error::ContentUnavailable => 404,
            Error::RenditionNotFound { .. } => 404,

            // 409 Conflict
            Error::RetrievalInProgress { .. } => 409,

            // 413 Payload Too Large
            Error::FileTooLarge { .. } => 413,

            // 408 Request Timeout - the requester went away
            Error::Cancelled => 408,

            // 502 Bad Gateway - the external tool misbehaved
            Error::ExternalToolFailure { .. } => 502,
            Error::MetadataFailed(_) => 502,
            Error::ParseFailure(_) => 502,

            // 503 Service Unavailable - the tool is missing or cannot run
            Error::ToolNotFound(_) => 503,
            Error::ExternalTool(_) => 503,

            // 500 Internal Server Error
            Error::ArtifactMissing { .. } => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::ContentRestricted => "content_restricted",
            Error::ContentUnavailable => "content_unavailable",
            Error::RenditionNotFound { .. } => "rendition_not_found",
            Error::ExternalToolFailure { .. } => "external_tool_failure",
            Error::ArtifactMissing { .. } => "artifact_missing",
            Error::ParseFailure(_) => "parse_failure",
            Error::MetadataFailed(_) => "metadata_failed",
            Error::ToolNotFound(_) => "tool_not_found",
            Error::ExternalTool(_) => "external_tool_error",
            Error::RetrievalInProgress { .. } => "retrieval_in_progress",
            Error::FileTooLarge { .. } => "file_too_large",
            Error::Cancelled => "cancelled",
            Error::Validation(_) => "validation_error",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();

        if !error.is_user_presentable() {
            return ApiError {
                error: ErrorDetail {
                    code,
                    message: GENERIC_FAILURE_MESSAGE.to_string(),
                    details: None,
                },
            };
        }

        let details = match &error {
            Error::RenditionNotFound { quality, available } => Some(serde_json::json!({
                "quality": quality,
                "available": available,
            })),
            Error::ExternalToolFailure { exit_code } => Some(serde_json::json!({
                "exit_code": exit_code,
            })),
            Error::FileTooLarge { size, limit } => Some(serde_json::json!({
                "size_bytes": size,
                "limit_bytes": limit,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message: error.to_string(),
                details,
            },
        }
    }
}
