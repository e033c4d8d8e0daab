//! One-shot render handler.

use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub template: String,
    pub image_path: PathBuf,
    pub video_paths: Vec<PathBuf>,
}

#[derive(Serialize)]
pub struct RenderResponse {
    pub video_url: String,
}

/// `POST /api/render` — render a cover plus clips and return the video URL.
pub async fn render(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> ApiResult<Json<RenderResponse>> {
    info!(template = %req.template, clips = req.video_paths.len(), "render requested");

    let ctx = state.render.clone();
    let published = tokio::task::spawn_blocking(move || {
        vlog_render::render_oneshot(&ctx, &req.template, &req.image_path, &req.video_paths)
    })
    .await
    .map_err(|e| ApiError::internal(format!("render task failed: {e}")))??;

    let filename = published
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ApiError::internal("render produced an unnamed file"))?;

    Ok(Json(RenderResponse {
        video_url: state.video_url(&filename),
    }))
}
