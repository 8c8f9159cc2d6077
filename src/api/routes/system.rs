//! System handlers: health, OpenAPI, progress events.

use crate::api::AppState;
use crate::broadcaster::ProgressBroadcaster;
use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "in_flight": state.retriever.in_flight(),
        "observers": state.broadcaster.observer_count().await,
    }))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/api/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// GET /events - Server-sent progress stream
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "system",
    responses(
        (status = 200, description = "Progress records as `progress` events (text/event-stream)", content_type = "text/event-stream", body = crate::types::ProgressRecord)
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.broadcaster.subscribe().await;

    let sse_stream = subscription.filter_map(|record| match serde_json::to_string(&record) {
        Ok(json_data) => Some(Ok(SseEvent::default().event("progress").data(json_data))),
        Err(e) => {
            tracing::warn!("Failed to serialize progress record to JSON: {}", e);
            None
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}

/// GET /ws - WebSocket progress push
#[utoipa::path(
    get,
    path = "/api/ws",
    tag = "system",
    responses(
        (status = 101, description = "Upgraded; progress records follow as JSON text frames", body = crate::types::ProgressRecord)
    )
)]
pub async fn progress_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let broadcaster = Arc::clone(&state.broadcaster);
    ws.on_upgrade(move |socket| forward_progress(socket, broadcaster))
}

async fn forward_progress(mut socket: WebSocket, broadcaster: Arc<ProgressBroadcaster>) {
    let mut subscription = broadcaster.subscribe().await;
    let observer_id = subscription.id();

    loop {
        tokio::select! {
            record = subscription.recv() => {
                let Some(record) = record else {
                    // broadcaster closed (shutdown)
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let Ok(text) = serde_json::to_string(&record) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    broadcaster.unsubscribe(observer_id).await;
}
