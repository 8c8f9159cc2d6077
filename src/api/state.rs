//! Application state for the API server

use crate::Config;
use crate::broadcaster::ProgressBroadcaster;
use crate::retrieval::Retriever;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the retriever, the progress broadcaster and configuration.
#[derive(Clone)]
pub struct AppState {
    /// Retrieval orchestrator
    pub retriever: Retriever,

    /// Progress fan-out for SSE and WebSocket observers
    pub broadcaster: Arc<ProgressBroadcaster>,

    /// Configuration (read-only)
    pub config: Arc<Config>,

    /// Cancelled when the server shuts down; retrievals use child tokens
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new AppState
    pub fn new(retriever: Retriever, shutdown: CancellationToken) -> Self {
        Self {
            broadcaster: Arc::clone(retriever.broadcaster()),
            config: Arc::new(retriever.config().clone()),
            retriever,
            shutdown,
        }
    }
}
