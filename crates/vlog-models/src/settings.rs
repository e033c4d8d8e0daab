//! Global render settings.

use serde::{Deserialize, Serialize};

/// Output geometry and phase durations shared by every render run.
///
/// Loaded from the `global:` section of the global configuration file;
/// defaults match the production profile (1080p at 25 fps, 8 s cover,
/// 16 s per clip, 2 s transitions).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Seconds the cover image is shown
    pub image_duration: f64,
    /// Seconds each clip occupies
    pub video_duration: f64,
    /// Seconds of cross-fade between segments
    pub transition_duration: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 25,
            image_duration: 8.0,
            video_duration: 16.0,
            transition_duration: 2.0,
        }
    }
}

/// File shape of the global configuration.
#[derive(Debug, Deserialize)]
struct GlobalFile {
    global: RenderSettings,
}

impl RenderSettings {
    /// Parse the `global:` document.
    pub fn from_yaml_str(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str::<GlobalFile>(s).map(|f| f.global)
    }

    /// Bytes in one packed RGB24 frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_profile() {
        let s = RenderSettings::default();
        assert_eq!((s.width, s.height, s.fps), (1920, 1080, 25));
        assert_eq!(s.frame_size(), 1920 * 1080 * 3);
    }

    #[test]
    fn parses_global_section() {
        let yaml = r#"
global:
  width: 1280
  height: 720
  fps: 30
  image_duration: 4.0
  video_duration: 10.0
  transition_duration: 1.0
"#;
        let s = RenderSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(s.width, 1280);
        assert_eq!(s.fps, 30);
        assert!((s.video_duration - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let s = RenderSettings::from_yaml_str("global:\n  fps: 24\n").unwrap();
        assert_eq!(s.fps, 24);
        assert_eq!(s.width, 1920);
    }
}
