//! Media handlers: renditions, post text, retrieval.

use super::{ProcessRequest, UrlQuery, required};
use crate::api::AppState;
use crate::error::ApiError;
use crate::responder::open_artifact;
use crate::Result;
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// GET /download/info - List available renditions
#[utoipa::path(
    get,
    path = "/api/download/info",
    tag = "download",
    params(UrlQuery),
    responses(
        (status = 200, description = "Renditions, highest quality first", body = Vec<crate::types::Rendition>),
        (status = 400, description = "Missing or invalid URL", body = ApiError),
        (status = 403, description = "Content requires authentication", body = ApiError),
        (status = 404, description = "Content unavailable", body = ApiError),
        (status = 502, description = "Metadata retrieval failed", body = ApiError)
    )
)]
pub async fn video_info(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse> {
    let url = required(query.url, "url")?;
    let renditions = state.retriever.renditions(&url).await?;
    Ok(Json(renditions))
}

/// GET /download/content - Post text and author
#[utoipa::path(
    get,
    path = "/api/download/content",
    tag = "download",
    params(UrlQuery),
    responses(
        (status = 200, description = "Post text with mentions and short links removed", body = crate::types::PostContent),
        (status = 400, description = "Missing or invalid URL", body = ApiError),
        (status = 403, description = "Content requires authentication", body = ApiError),
        (status = 404, description = "Content unavailable", body = ApiError),
        (status = 502, description = "Metadata retrieval failed", body = ApiError)
    )
)]
pub async fn post_content(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<impl IntoResponse> {
    let url = required(query.url, "url")?;
    let content = state.retriever.post_content(&url).await?;
    Ok(Json(content))
}

/// POST /download/process - Retrieve a rendition and stream it back
///
/// Progress is published to `/api/events` and `/api/ws` while the fetch runs.
/// If the requester disconnects, the retrieval is cancelled and its transient
/// file removed.
#[utoipa::path(
    post,
    path = "/api/download/process",
    tag = "download",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Media bytes", content_type = "video/mp4"),
        (status = 400, description = "Missing or invalid URL or quality", body = ApiError),
        (status = 403, description = "Content requires authentication", body = ApiError),
        (status = 404, description = "Content or rendition unavailable", body = ApiError),
        (status = 409, description = "The same rendition is already being retrieved", body = ApiError),
        (status = 413, description = "Media exceeds the size limit", body = ApiError),
        (status = 502, description = "Fetch tool failed", body = ApiError)
    )
)]
pub async fn process_download(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Response> {
    let url = required(request.url, "url")?;
    let quality = required(request.quality, "quality")?;

    // fires when this handler is dropped (requester gone) or finishes
    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let completed = state.retriever.retrieve(&url, &quality, cancel).await?;
    let stream = open_artifact(completed).await?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, stream.content_type())
        .header(header::CONTENT_LENGTH, stream.content_length())
        .header(header::CONTENT_DISPOSITION, stream.content_disposition())
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build media response");
            ApiError::internal().into_response()
        });

    Ok(response)
}
