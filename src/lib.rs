//! # postclip-dl
//!
//! Retrieve videos from social media posts with live progress.
//!
//! ## Design Philosophy
//!
//! postclip-dl is designed to be:
//! - **Library-first** - Every component works without the HTTP layer
//! - **Leak-free** - Transient media files are removed on every exit path
//! - **Observable** - Progress is pushed to any number of observers, no polling required
//! - **Thin over yt-dlp** - The external tool does the fetching; this crate orchestrates it
//!
//! ## Quick Start
//!
//! ```no_run
//! use postclip_dl::{Config, ProgressBroadcaster, Retriever, responder};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let broadcaster = Arc::new(ProgressBroadcaster::new(config.retrieval.observer_buffer));
//!     let retriever = Retriever::new(config, broadcaster.clone()).await?;
//!
//!     // Observe progress
//!     let mut progress = broadcaster.subscribe().await;
//!     tokio::spawn(async move {
//!         while let Some(record) = progress.recv().await {
//!             println!("{:.1}%", record.display_percent());
//!         }
//!     });
//!
//!     let url = "https://x.com/user/status/1";
//!     for rendition in retriever.renditions(url).await? {
//!         println!("{} ({})", rendition.quality_label, rendition.container_format);
//!     }
//!
//!     let completed = retriever.retrieve(url, "720p", CancellationToken::new()).await?;
//!     let mut out = tokio::fs::File::create("clip.mp4").await?;
//!     responder::stream_to_sink(completed, &mut out).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Progress fan-out to observers
pub mod broadcaster;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// External fetch tool integration
pub mod fetcher;
/// Progress line parsing
pub mod progress;
/// Rendition resolution and selection
pub mod renditions;
/// Media delivery and transient file cleanup
pub mod responder;
/// Retrieval orchestration
pub mod retrieval;
/// Core types
pub mod types;

// Re-export commonly used types
pub use broadcaster::{ObserverId, ProgressBroadcaster, Subscription};
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use fetcher::{CliMediaFetcher, MediaFetcher};
pub use progress::parse_progress_line;
pub use responder::{ArtifactStream, open_artifact, stream_to_sink};
pub use retrieval::{CompletedRetrieval, RetrievalSession, Retriever, TransientFile};
pub use types::{PostContent, ProgressRecord, Rendition, SessionId, SessionState};

use tokio_util::sync::CancellationToken;

/// Helper function to run the API server with graceful signal handling.
///
/// Serves until a termination signal arrives, then cancels running
/// retrievals, closes progress observers and waits for the server to stop.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use postclip_dl::{Config, ProgressBroadcaster, Retriever, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let broadcaster = Arc::new(ProgressBroadcaster::new(config.retrieval.observer_buffer));
///     let retriever = Retriever::new(config, broadcaster).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(retriever).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(retriever: Retriever) -> Result<()> {
    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(api::start_api_server(retriever, shutdown.clone()));

    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("Shutting down");
            shutdown.cancel();
        }
        // server stopped on its own (bind failure, serve error)
        joined = &mut server => return flatten_server_result(joined),
    }

    flatten_server_result(server.await)
}

fn flatten_server_result(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.unwrap_or_else(|e| Err(Error::ApiServerError(format!("server task failed: {}", e))))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
