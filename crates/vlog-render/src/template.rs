//! Template resolution.
//!
//! Templates live under a root directory, one subdirectory per template
//! with a `config.yaml` describing borders, BGM, transition rotation and
//! subtitle styling. Asset paths are used as written (absolute, or
//! relative to the process working directory).

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vlog_models::TemplateSpec;

use crate::error::{RenderError, RenderResult};

/// A transition effect: a name and its GLSL fragment body.
#[derive(Debug, Clone)]
pub struct TransitionEffect {
    pub name: String,
    pub source: String,
}

/// A template with its transition sources loaded.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub spec: TemplateSpec,
    pub transitions: Vec<TransitionEffect>,
}

impl LoadedTemplate {
    /// Transition for the 0-based rotation index.
    pub fn transition(&self, index: usize) -> &TransitionEffect {
        &self.transitions[index % self.transitions.len()]
    }
}

/// Listing entry for the template catalogue.
#[derive(Debug, Clone)]
pub struct TemplateSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

/// Resolves template names against a directory of template definitions.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join("config.yaml")
    }

    /// Load and validate a template by directory name.
    pub fn load(&self, name: &str) -> RenderResult<LoadedTemplate> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(RenderError::config(format!("invalid template name '{name}'")));
        }

        let config_path = self.config_path(name);
        if !config_path.exists() {
            return Err(RenderError::config(format!("unknown template '{name}'")));
        }

        let raw = std::fs::read_to_string(&config_path)?;
        let spec = TemplateSpec::from_yaml_str(&raw).map_err(|e| {
            RenderError::config(format!("template '{name}' has invalid config: {e}"))
        })?;

        if spec.transitions.is_empty() {
            return Err(RenderError::config(format!(
                "template '{name}' declares no transitions"
            )));
        }

        for asset in spec.asset_paths() {
            if !asset.exists() {
                return Err(RenderError::config(format!(
                    "template '{name}' references missing asset {}",
                    asset.display()
                )));
            }
        }

        let mut transitions = Vec::with_capacity(spec.transitions.len());
        for path in &spec.transitions {
            transitions.push(load_transition(path)?);
        }

        debug!(template = name, transitions = transitions.len(), "template loaded");
        Ok(LoadedTemplate { spec, transitions })
    }

    /// Scan the root for templates; unloadable entries are logged and skipped.
    pub fn list(&self) -> Vec<TemplateSummary> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            warn!(root = %self.root.display(), "template root not readable");
            return Vec::new();
        };

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let config = self.config_path(&name);
            if !config.is_file() {
                continue;
            }
            match std::fs::read_to_string(&config)
                .map_err(RenderError::from)
                .and_then(|raw| {
                    TemplateSpec::from_yaml_str(&raw)
                        .map_err(|e| RenderError::config(e.to_string()))
                }) {
                Ok(spec) => summaries.push(TemplateSummary {
                    name: name.clone(),
                    display_name: spec.name,
                    description: spec.description,
                }),
                Err(e) => warn!(template = %name, error = %e, "skipping unloadable template"),
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

fn load_transition(path: &Path) -> RenderResult<TransitionEffect> {
    let source = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "transition".to_string());
    Ok(TransitionEffect { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_template(root: &Path, name: &str, transitions: &[&str]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for asset in ["border.png", "bgm.mp3", "font.otf"] {
            fs::write(dir.join(asset), b"x").unwrap();
        }
        let mut transition_lines = String::new();
        for t in transitions {
            let p = dir.join(t);
            fs::write(&p, "vec4 transition(vec2 uv) { return getToColor(uv); }").unwrap();
            transition_lines.push_str(&format!("  - {}\n", p.display()));
        }
        let config = format!(
            r#"name: {name} Display
description: test template
border: {{ path: {border} }}
bgm: {{ path: {bgm} }}
transitions:
{transition_lines}font:
  path: {font}
  size: 72
  color: [255, 255, 255, 255]
  outline_color: [0, 0, 0, 200]
  outline_width: 3
subtitle:
  template: "{{year}}.{{month}}.{{day}}"
  typewriter_speed: 3
  duration: 6.0
"#,
            border = dir.join("border.png").display(),
            bgm = dir.join("bgm.mp3").display(),
            font = dir.join("font.otf").display(),
        );
        fs::write(dir.join("config.yaml"), config).unwrap();
    }

    #[test]
    fn loads_template_with_transitions() {
        let tmp = tempfile::tempdir().unwrap();
        write_template(tmp.path(), "classic", &["fade.glsl", "wipe.glsl"]);

        let store = TemplateStore::new(tmp.path());
        let loaded = store.load("classic").unwrap();
        assert_eq!(loaded.spec.name, "classic Display");
        assert_eq!(loaded.transitions.len(), 2);
        assert_eq!(loaded.transition(0).name, "fade");
        // rotation wraps
        assert_eq!(loaded.transition(3).name, "wipe");
    }

    #[test]
    fn unknown_template_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        let err = store.load("missing").unwrap_err();
        assert!(matches!(err, RenderError::Config(msg) if msg.contains("unknown template")));
    }

    #[test]
    fn template_names_cannot_traverse() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        assert!(store.load("../etc").is_err());
        assert!(store.load(".hidden").is_err());
    }

    #[test]
    fn missing_asset_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_template(tmp.path(), "classic", &["fade.glsl"]);
        fs::remove_file(tmp.path().join("classic/bgm.mp3")).unwrap();

        let store = TemplateStore::new(tmp.path());
        let err = store.load("classic").unwrap_err();
        assert!(matches!(err, RenderError::Config(msg) if msg.contains("missing asset")));
    }

    #[test]
    fn empty_transition_list_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_template(tmp.path(), "classic", &["fade.glsl"]);
        let config = tmp.path().join("classic/config.yaml");
        let body = fs::read_to_string(&config).unwrap();
        let line = format!("  - {}\n", tmp.path().join("classic/fade.glsl").display());
        fs::write(&config, body.replace(&line, "").replace("transitions:", "transitions: []")).unwrap();

        let store = TemplateStore::new(tmp.path());
        let err = store.load("classic").unwrap_err();
        assert!(matches!(err, RenderError::Config(msg) if msg.contains("no transitions")));
    }

    #[test]
    fn list_skips_broken_templates() {
        let tmp = tempfile::tempdir().unwrap();
        write_template(tmp.path(), "classic", &["fade.glsl"]);
        let broken = tmp.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("config.yaml"), "not: [valid template").unwrap();

        let store = TemplateStore::new(tmp.path());
        let list = store.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "classic");
        assert_eq!(list[0].display_name, "classic Display");
    }
}
