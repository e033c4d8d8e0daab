//! Incremental render session types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
#[error("Invalid session id: {0}")]
pub struct SessionIdParseError(String);

impl FromStr for SessionId {
    type Err = SessionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Session ids double as directory names; reject anything that could
        // escape the session root.
        let valid = !s.is_empty()
            && s.len() <= 64
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(SessionIdParseError(s.to_string()))
        }
    }
}

/// Lifecycle state of an incremental session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initialized,
    Rendering,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Whether another segment may still be appended.
    pub fn accepts_append(&self) -> bool {
        matches!(self, SessionStatus::Initialized | SessionStatus::Rendering)
    }

    /// Whether the session may be finalized.
    pub fn accepts_finalize(&self) -> bool {
        matches!(self, SessionStatus::Initialized | SessionStatus::Rendering)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initialized => "initialized",
            SessionStatus::Rendering => "rendering",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a segment was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Image,
    Video,
}

/// One rendered segment of a session, persisted as an elementary stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// 0-based segment index
    pub index: usize,
    /// Frames encoded into the segment
    pub frames: u64,
    pub kind: SegmentKind,
    /// Source media the segment was rendered from
    pub source_path: PathBuf,
    /// Transition effect blended at the head of the segment (None for the cover)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
}

/// On-disk session metadata, rewritten after every mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: SessionId,
    pub template_name: String,
    pub created_at: DateTime<Utc>,
    pub total_frames: u64,
    pub segments: Vec<SegmentInfo>,
    pub status: SessionStatus,
    /// Cursor into the template's transition list for the next append.
    pub current_transition_index: usize,
}

impl SessionMetadata {
    pub fn new(session_id: SessionId, template_name: impl Into<String>) -> Self {
        Self {
            session_id,
            template_name: template_name.into(),
            created_at: Utc::now(),
            total_frames: 0,
            segments: Vec::new(),
            status: SessionStatus::Initialized,
            current_transition_index: 0,
        }
    }

    /// Index the next appended segment will receive.
    pub fn next_segment_index(&self) -> usize {
        self.segments.len()
    }

    /// Number of video segments appended so far.
    pub fn appended_videos(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Video)
            .count()
    }

    /// Record a finished segment and keep the frame total in sync.
    pub fn push_segment(&mut self, segment: SegmentInfo) {
        self.total_frames += segment.frames;
        self.segments.push(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_rejects_path_separators() {
        assert!("ab12-cd34".parse::<SessionId>().is_ok());
        assert!("../escape".parse::<SessionId>().is_err());
        assert!("".parse::<SessionId>().is_err());
        assert!("a/b".parse::<SessionId>().is_err());
    }

    #[test]
    fn generated_ids_parse_back() {
        let id = SessionId::new();
        let parsed: SessionId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_gates_append_and_finalize() {
        assert!(SessionStatus::Initialized.accepts_append());
        assert!(SessionStatus::Rendering.accepts_finalize());
        assert!(!SessionStatus::Completed.accepts_append());
        assert!(!SessionStatus::Failed.accepts_finalize());
    }

    #[test]
    fn push_segment_tracks_totals() {
        let mut meta = SessionMetadata::new(SessionId::new(), "classic");
        meta.push_segment(SegmentInfo {
            index: 0,
            frames: 200,
            kind: SegmentKind::Image,
            source_path: "/in/cover.png".into(),
            transition: None,
        });
        meta.push_segment(SegmentInfo {
            index: 1,
            frames: 400,
            kind: SegmentKind::Video,
            source_path: "/in/v1.mp4".into(),
            transition: Some("ripple".into()),
        });
        assert_eq!(meta.total_frames, 600);
        assert_eq!(meta.next_segment_index(), 2);
        assert_eq!(meta.appended_videos(), 1);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let meta = SessionMetadata::new(SessionId::new(), "classic");
        let json = serde_json::to_string(&meta).unwrap();
        let back: SessionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, meta.session_id);
        assert_eq!(back.status, SessionStatus::Initialized);
        assert_eq!(back.current_transition_index, 0);
    }
}
