//! Application state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use vlog_models::SessionId;
use vlog_render::{RenderContext, TemplateStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub render: RenderContext,
    /// Per-session locks serializing append/finalize operations.
    session_locks: Arc<Mutex<HashMap<SessionId, Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Self {
        let render = RenderContext {
            settings: config.load_render_settings(),
            templates: TemplateStore::new(&config.templates_dir),
            output_dir: config.output_dir.clone(),
            session_root: config.session_root.clone(),
        };
        Self {
            config: Arc::new(config),
            render,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Lock guarding mutating operations on one session.
    pub async fn session_lock(&self, id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    /// Absolute URL a published file is served under.
    pub fn video_url(&self, filename: &str) -> String {
        format!(
            "{}/videos/{filename}",
            self.config.public_base_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn video_urls_do_not_double_slash() {
        let state = AppState::new(ApiConfig {
            public_base_url: "http://media.example.com/".to_string(),
            ..ApiConfig::default()
        });
        assert_eq!(
            state.video_url("abc.mp4"),
            "http://media.example.com/videos/abc.mp4"
        );
    }

    #[tokio::test]
    async fn session_locks_are_shared_per_session() {
        let state = AppState::new(ApiConfig::default());
        let id: SessionId = "abc".parse().unwrap();
        let a = state.session_lock(&id).await;
        let b = state.session_lock(&id).await;
        assert!(Arc::ptr_eq(&a, &b));

        let guard = a.try_lock().unwrap();
        assert!(b.try_lock().is_err());
        drop(guard);
        assert!(b.try_lock().is_ok());
    }
}
