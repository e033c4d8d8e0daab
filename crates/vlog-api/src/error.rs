//! API error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vlog_media::MediaError;
use vlog_render::RenderError;
use vlog_session::SessionError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Render(e) => render_status(e),
            ApiError::Session(e) => session_status(e),
        }
    }

    /// Stable machine-readable code for clients.
    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal_error",
            ApiError::Render(e) => render_code(e),
            ApiError::Session(e) => session_code(e),
        }
    }
}

fn render_status(e: &RenderError) -> StatusCode {
    match e {
        RenderError::Config(_) | RenderError::Input(_) => StatusCode::BAD_REQUEST,
        RenderError::Session(s) => session_status(s),
        RenderError::Gpu(_) | RenderError::Media(_) | RenderError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn render_code(e: &RenderError) -> &'static str {
    match e {
        RenderError::Config(_) => "config_error",
        RenderError::Input(_) => "input_error",
        RenderError::Gpu(_) => "gpu_error",
        RenderError::Session(s) => session_code(s),
        RenderError::Media(m) => media_code(m),
        RenderError::Io(_) => "internal_error",
    }
}

fn media_code(e: &MediaError) -> &'static str {
    match e {
        MediaError::DecodeFailed { .. } | MediaError::InvalidVideo(_) => "decode_error",
        MediaError::EncodeFailed { .. } | MediaError::FrameSize { .. } => "encode_error",
        MediaError::MuxFailed { .. } => "mux_error",
        _ => "internal_error",
    }
}

fn session_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Conflict(_) => StatusCode::CONFLICT,
        SessionError::Corrupt(_) | SessionError::Io(_) | SessionError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn session_code(e: &SessionError) -> &'static str {
    match e {
        SessionError::NotFound(_) => "session_not_found",
        SessionError::Conflict(_) => "session_conflict",
        _ => "session_error",
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            detail: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn config_and_input_errors_are_client_errors() {
        let e = ApiError::from(RenderError::config("unknown template 'x'"));
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code(), "config_error");

        let e = ApiError::from(RenderError::input("too many clips"));
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code(), "input_error");
    }

    #[test]
    fn session_errors_map_to_404_and_409() {
        let id = "gone".parse().unwrap();
        let e = ApiError::from(SessionError::NotFound(id));
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(e.code(), "session_not_found");

        let e = ApiError::from(SessionError::conflict("append in progress"));
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
        assert_eq!(e.code(), "session_conflict");
    }

    #[test]
    fn processing_errors_are_server_errors() {
        let e = ApiError::from(RenderError::gpu("shader failed to link"));
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code(), "gpu_error");

        let e = ApiError::from(RenderError::Media(MediaError::decode_failed(
            PathBuf::from("/in/v.mp4"),
            "no first frame",
        )));
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code(), "decode_error");
    }
}
