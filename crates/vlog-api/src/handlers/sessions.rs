//! Incremental session handlers.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vlog_models::{SessionId, SessionMetadata};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub template: String,
    pub image_path: PathBuf,
}

#[derive(Serialize)]
pub struct InitResponse {
    pub session_id: SessionId,
    pub segment_index: usize,
    pub status: &'static str,
}

/// `POST /api/render/init` — create a session and render the cover segment.
pub async fn init(
    State(state): State<AppState>,
    Json(req): Json<InitRequest>,
) -> ApiResult<Json<InitResponse>> {
    info!(template = %req.template, "session init requested");

    let ctx = state.render.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        vlog_render::session_init(&ctx, &req.template, &req.image_path)
    })
    .await
    .map_err(|e| ApiError::internal(format!("init task failed: {e}")))??;

    Ok(Json(InitResponse {
        session_id: outcome.session_id,
        segment_index: outcome.segment_index,
        status: "initialized",
    }))
}

#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub session_id: String,
    pub video_path: PathBuf,
}

#[derive(Serialize)]
pub struct AppendResponse {
    pub session_id: SessionId,
    pub segment_index: usize,
    pub transition_used: String,
    pub status: &'static str,
}

/// `POST /api/render/append` — render one more segment onto a session.
///
/// Appends on one session are serialized: a second append arriving while
/// one is still rendering is rejected with a conflict.
pub async fn append(
    State(state): State<AppState>,
    Json(req): Json<AppendRequest>,
) -> ApiResult<Json<AppendResponse>> {
    let session_id = parse_session_id(&req.session_id)?;
    info!(session = %session_id, "append requested");

    let lock = state.session_lock(&session_id).await;
    let _guard = lock
        .try_lock()
        .map_err(|_| ApiError::conflict("an operation is already running for this session"))?;

    let ctx = state.render.clone();
    let id = session_id.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        vlog_render::session_append(&ctx, &id, &req.video_path)
    })
    .await
    .map_err(|e| ApiError::internal(format!("append task failed: {e}")))??;

    Ok(Json(AppendResponse {
        session_id: outcome.session_id,
        segment_index: outcome.segment_index,
        transition_used: outcome.transition_used,
        status: "rendering",
    }))
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub session_id: String,
    #[serde(default)]
    pub output_filename: Option<String>,
}

#[derive(Serialize)]
pub struct FinalizeResponse {
    pub session_id: SessionId,
    pub video_url: String,
    pub total_segments: usize,
    pub status: &'static str,
}

/// `POST /api/render/finalize` — concatenate segments, mux audio, publish.
pub async fn finalize(
    State(state): State<AppState>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<Json<FinalizeResponse>> {
    let session_id = parse_session_id(&req.session_id)?;
    info!(session = %session_id, "finalize requested");

    let lock = state.session_lock(&session_id).await;
    let _guard = lock
        .try_lock()
        .map_err(|_| ApiError::conflict("an operation is already running for this session"))?;

    let ctx = state.render.clone();
    let id = session_id.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        vlog_render::session_finalize(&ctx, &id, req.output_filename.as_deref())
    })
    .await
    .map_err(|e| ApiError::internal(format!("finalize task failed: {e}")))??;

    let filename = outcome
        .output_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ApiError::internal("finalize produced an unnamed file"))?;

    Ok(Json(FinalizeResponse {
        session_id: outcome.session_id,
        video_url: state.video_url(&filename),
        total_segments: outcome.total_segments,
        status: "completed",
    }))
}

/// `GET /api/render/status/{session_id}` — full session metadata.
pub async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionMetadata>> {
    let session_id = parse_session_id(&session_id)?;
    let ctx = state.render.clone();
    let meta =
        tokio::task::spawn_blocking(move || vlog_render::session_status(&ctx, &session_id))
            .await
            .map_err(|e| ApiError::internal(format!("status task failed: {e}")))??;
    Ok(Json(meta))
}

fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("malformed session id '{raw}'")))
}
