//! API configuration.

use std::path::PathBuf;

use tracing::{info, warn};
use vlog_models::RenderSettings;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory of template definitions
    pub templates_dir: PathBuf,
    /// Root of the incremental session directories
    pub session_root: PathBuf,
    /// Where finished renders are published and served from
    pub output_dir: PathBuf,
    /// Optional global render settings file
    pub global_config: Option<PathBuf>,
    /// Base URL used to build returned video URLs
    pub public_base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            templates_dir: PathBuf::from("templates"),
            session_root: std::env::temp_dir().join("vlog_sessions"),
            output_dir: PathBuf::from("outputs"),
            global_config: Some(PathBuf::from("config/global.yaml")),
            public_base_url: "http://localhost:8000".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(default.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.port),
            templates_dir: std::env::var("TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.templates_dir),
            session_root: std::env::var("SESSION_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.session_root),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.output_dir),
            global_config: std::env::var("GLOBAL_CONFIG")
                .map(PathBuf::from)
                .ok()
                .or(default.global_config),
            public_base_url: std::env::var("PUBLIC_BASE_URL").unwrap_or(default.public_base_url),
        }
    }

    /// Load the global render settings, falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load_render_settings(&self) -> RenderSettings {
        let Some(path) = &self.global_config else {
            return RenderSettings::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match RenderSettings::from_yaml_str(&raw) {
                Ok(settings) => {
                    info!(path = %path.display(), "global render settings loaded");
                    settings
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid global config, using defaults");
                    RenderSettings::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no global config file, using defaults");
                RenderSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_global_config_falls_back_to_defaults() {
        let config = ApiConfig {
            global_config: Some(PathBuf::from("/nope/global.yaml")),
            ..ApiConfig::default()
        };
        assert_eq!(config.load_render_settings(), RenderSettings::default());
    }

    #[test]
    fn global_config_file_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("global.yaml");
        std::fs::write(&path, "global:\n  fps: 30\n  image_duration: 4.0\n").unwrap();

        let config = ApiConfig {
            global_config: Some(path),
            ..ApiConfig::default()
        };
        let settings = config.load_render_settings();
        assert_eq!(settings.fps, 30);
        assert_eq!(settings.width, 1920);
    }
}
