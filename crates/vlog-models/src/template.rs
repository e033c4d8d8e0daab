//! Template specification.
//!
//! One YAML file per template describes the borders, background music,
//! transition rotation, and subtitle styling used by a render run.

use std::path::PathBuf;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// A file referenced by a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRef {
    pub path: PathBuf,
}

/// Font and text styling for the typewriter subtitle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontSpec {
    pub path: PathBuf,
    pub size: u32,
    /// Fill color, RGBA
    pub color: [u8; 4],
    /// Outline color, RGBA
    pub outline_color: [u8; 4],
    /// Outline radius in pixels
    pub outline_width: u32,
}

/// Subtitle content and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleSpec {
    /// Text with `{year}`, `{month}`, `{day}` placeholders
    pub template: String,
    /// Frames per revealed character
    pub typewriter_speed: u32,
    /// Seconds the subtitle stays on screen
    pub duration: f64,
}

impl SubtitleSpec {
    /// Expand the date placeholders against `date`.
    pub fn resolve_text(&self, date: impl Datelike) -> String {
        self.template
            .replace("{year}", &date.year().to_string())
            .replace("{month}", &date.month().to_string())
            .replace("{day}", &date.day().to_string())
    }
}

/// Full template specification as loaded from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Border composited over the cover segment
    pub border: AssetRef,
    /// Border composited over video segments; falls back to `border`
    #[serde(default)]
    pub border_video: Option<AssetRef>,
    /// Background music track
    pub bgm: AssetRef,
    /// Ordered transition effect files; rotation order is significant
    pub transitions: Vec<PathBuf>,
    pub font: FontSpec,
    pub subtitle: SubtitleSpec,
}

impl TemplateSpec {
    pub fn from_yaml_str(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    /// Border used for video segments (explicit variant or the cover border).
    pub fn video_border(&self) -> &AssetRef {
        self.border_video.as_ref().unwrap_or(&self.border)
    }

    /// Every asset path the template references.
    pub fn asset_paths(&self) -> Vec<&PathBuf> {
        let mut paths = vec![&self.border.path, &self.bgm.path, &self.font.path];
        if let Some(v) = &self.border_video {
            paths.push(&v.path);
        }
        paths.extend(self.transitions.iter());
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const CLASSIC: &str = r#"
name: Classic
description: Warm border with date subtitle
border: { path: templates/classic/border.png }
border_video: { path: templates/classic/border_video.png }
bgm: { path: templates/classic/bgm.mp3 }
transitions:
  - transitions/ripple.glsl
  - transitions/fade.glsl
font:
  path: fonts/NotoSansSC-Bold.otf
  size: 72
  color: [255, 255, 255, 255]
  outline_color: [0, 0, 0, 200]
  outline_width: 3
subtitle:
  template: "{year}-{month}-{day} memories"
  typewriter_speed: 3
  duration: 6.0
"#;

    #[test]
    fn parses_full_template() {
        let t = TemplateSpec::from_yaml_str(CLASSIC).unwrap();
        assert_eq!(t.name, "Classic");
        assert_eq!(t.transitions.len(), 2);
        assert_eq!(t.font.outline_width, 3);
        assert_eq!(
            t.video_border().path,
            PathBuf::from("templates/classic/border_video.png")
        );
        assert_eq!(t.asset_paths().len(), 6);
    }

    #[test]
    fn video_border_falls_back_to_cover_border() {
        let trimmed = CLASSIC.replace("border_video: { path: templates/classic/border_video.png }\n", "");
        let t = TemplateSpec::from_yaml_str(&trimmed).unwrap();
        assert_eq!(t.video_border().path, t.border.path);
    }

    #[test]
    fn subtitle_placeholders_expand() {
        let t = TemplateSpec::from_yaml_str(CLASSIC).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(t.subtitle.resolve_text(date), "2026-3-7 memories");
    }
}
