//! Shared data models for the vlog composition engine.
//!
//! This crate provides Serde-serializable types for:
//! - Incremental render sessions and their segments
//! - Template specifications (borders, BGM, transitions, subtitle styling)
//! - Global render settings (output geometry, fps, phase durations)

pub mod session;
pub mod settings;
pub mod template;

pub use session::{SegmentInfo, SegmentKind, SessionId, SessionMetadata, SessionStatus};
pub use settings::RenderSettings;
pub use template::{AssetRef, FontSpec, SubtitleSpec, TemplateSpec};
