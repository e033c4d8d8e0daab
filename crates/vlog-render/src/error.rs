//! Error types for the render core.

use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised while composing a render.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Template or global configuration problems: unknown template, empty
    /// transition list, missing assets, invalid output geometry.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied input problems: missing files, unsupported
    /// extensions, wrong clip count.
    #[error("Input error: {0}")]
    Input(String),

    /// GPU failures: no adapter, shader compile/link, readback.
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error(transparent)]
    Media(#[from] vlog_media::MediaError),

    #[error(transparent)]
    Session(#[from] vlog_session::SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }
}
