//! Template catalogue handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct TemplateEntry {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

#[derive(Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<TemplateEntry>,
    pub count: usize,
}

/// `GET /api/templates` — list the loadable templates.
pub async fn list_templates(State(state): State<AppState>) -> ApiResult<Json<TemplatesResponse>> {
    let store = state.render.templates.clone();
    let summaries = tokio::task::spawn_blocking(move || store.list())
        .await
        .map_err(|e| ApiError::internal(format!("template scan failed: {e}")))?;

    let templates: Vec<TemplateEntry> = summaries
        .into_iter()
        .map(|s| TemplateEntry {
            name: s.name,
            display_name: s.display_name,
            description: s.description,
        })
        .collect();

    Ok(Json(TemplatesResponse {
        count: templates.len(),
        templates,
    }))
}
