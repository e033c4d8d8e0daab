//! Filesystem-backed session store.
//!
//! One directory per session under a configurable root:
//!
//! ```text
//! <root>/<session_id>/
//!     metadata.json          rewritten atomically on every mutation
//!     segments/segment_N.h264
//!     last_frame.rgb         raw RGB24 of the last composited frame
//!     final_<id>.mp4         after finalize (when no output path given)
//! ```
//!
//! The registry is the directory tree itself: a scan recovers every
//! session after a crash, so no in-memory state is authoritative.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use vlog_models::{SegmentInfo, SessionId, SessionMetadata, SessionStatus};

use crate::error::{SessionError, SessionResult};

const METADATA_FILE: &str = "metadata.json";
const LAST_FRAME_FILE: &str = "last_frame.rgb";
const SEGMENTS_DIR: &str = "segments";
const MANIFEST_FILE: &str = "concat.txt";

/// Typed access to the session directory tree.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn segment_path(&self, id: &SessionId, index: usize) -> PathBuf {
        self.session_dir(id)
            .join(SEGMENTS_DIR)
            .join(format!("segment_{index}.h264"))
    }

    pub fn manifest_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(MANIFEST_FILE)
    }

    fn metadata_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(METADATA_FILE)
    }

    fn last_frame_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(LAST_FRAME_FILE)
    }

    pub fn exists(&self, id: &SessionId) -> bool {
        self.metadata_path(id).is_file()
    }

    /// Create a new session directory with fresh metadata.
    pub fn create(&self, template_name: &str) -> SessionResult<SessionMetadata> {
        let id = SessionId::new();
        let dir = self.session_dir(&id);
        std::fs::create_dir_all(dir.join(SEGMENTS_DIR))?;

        let meta = SessionMetadata::new(id.clone(), template_name);
        self.save(&meta)?;
        info!(session = %id, template = template_name, "session created");
        Ok(meta)
    }

    /// Load a session's metadata.
    pub fn load(&self, id: &SessionId) -> SessionResult<SessionMetadata> {
        let path = self.metadata_path(id);
        if !path.is_file() {
            return Err(SessionError::NotFound(id.clone()));
        }
        let raw = std::fs::read_to_string(&path)?;
        let meta: SessionMetadata = serde_json::from_str(&raw)
            .map_err(|e| SessionError::corrupt(format!("metadata for {id} unreadable: {e}")))?;
        Ok(meta)
    }

    /// Rewrite metadata atomically (temp file + rename on the same
    /// filesystem).
    fn save(&self, meta: &SessionMetadata) -> SessionResult<()> {
        let path = self.metadata_path(&meta.session_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(meta)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            SessionError::Io(e)
        })?;
        Ok(())
    }

    /// Record the cover segment produced by init. Status stays
    /// `initialized`; the first append moves it to `rendering`.
    pub fn record_cover(&self, id: &SessionId, segment: SegmentInfo) -> SessionResult<SessionMetadata> {
        let mut meta = self.load(id)?;
        if !meta.segments.is_empty() {
            return Err(SessionError::conflict(format!(
                "session {id} already has a cover segment"
            )));
        }
        meta.push_segment(segment);
        self.save(&meta)?;
        Ok(meta)
    }

    /// Record an appended video segment: bumps the transition cursor and
    /// moves the session to `rendering`.
    pub fn record_append(
        &self,
        id: &SessionId,
        segment: SegmentInfo,
        transition_count: usize,
    ) -> SessionResult<SessionMetadata> {
        if transition_count == 0 {
            return Err(SessionError::corrupt("template has no transitions"));
        }
        let mut meta = self.load(id)?;
        if !meta.status.accepts_append() {
            return Err(SessionError::conflict(format!(
                "session {id} is {} and no longer accepts appends",
                meta.status
            )));
        }
        if segment.index != meta.next_segment_index() {
            return Err(SessionError::conflict(format!(
                "segment index {} out of order, expected {}",
                segment.index,
                meta.next_segment_index()
            )));
        }

        meta.push_segment(segment);
        meta.current_transition_index = meta.appended_videos() % transition_count;
        meta.status = SessionStatus::Rendering;
        self.save(&meta)?;
        debug!(session = %id, cursor = meta.current_transition_index, "transition cursor advanced");
        Ok(meta)
    }

    pub fn mark_failed(&self, id: &SessionId) -> SessionResult<()> {
        let mut meta = self.load(id)?;
        meta.status = SessionStatus::Failed;
        self.save(&meta)?;
        warn!(session = %id, "session marked failed");
        Ok(())
    }

    pub fn mark_completed(&self, id: &SessionId) -> SessionResult<SessionMetadata> {
        let mut meta = self.load(id)?;
        if !meta.status.accepts_finalize() {
            return Err(SessionError::conflict(format!(
                "session {id} is {} and cannot complete",
                meta.status
            )));
        }
        meta.status = SessionStatus::Completed;
        self.save(&meta)?;
        Ok(meta)
    }

    /// Persist the last composited frame as raw RGB24.
    pub fn save_last_frame(&self, id: &SessionId, rgb: &[u8]) -> SessionResult<()> {
        if !self.exists(id) {
            return Err(SessionError::NotFound(id.clone()));
        }
        std::fs::write(self.last_frame_path(id), rgb)?;
        Ok(())
    }

    /// Load the cached last frame for the next append's transition.
    pub fn load_last_frame(&self, id: &SessionId) -> SessionResult<Vec<u8>> {
        let path = self.last_frame_path(id);
        if !path.is_file() {
            return Err(SessionError::corrupt(format!(
                "session {id} has no last-frame cache"
            )));
        }
        Ok(std::fs::read(path)?)
    }

    /// Segment files in index order, per the metadata.
    pub fn segment_paths(&self, meta: &SessionMetadata) -> Vec<PathBuf> {
        meta.segments
            .iter()
            .map(|s| self.segment_path(&meta.session_id, s.index))
            .collect()
    }

    /// Drop the intermediates after a successful finalize; metadata (for
    /// status reads) and the published file survive.
    pub fn cleanup_after_finalize(&self, id: &SessionId) -> SessionResult<()> {
        let dir = self.session_dir(id);
        remove_if_present(&dir.join(SEGMENTS_DIR))?;
        let _ = std::fs::remove_file(dir.join(LAST_FRAME_FILE));
        let _ = std::fs::remove_file(dir.join(MANIFEST_FILE));
        debug!(session = %id, "session intermediates removed");
        Ok(())
    }

    /// Delete a session entirely.
    pub fn remove(&self, id: &SessionId) -> SessionResult<()> {
        remove_if_present(&self.session_dir(id))
    }

    /// Scan the root for sessions; the directory tree is the registry.
    pub fn list_sessions(&self) -> SessionResult<Vec<SessionId>> {
        let mut ids = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            match name.parse::<SessionId>() {
                Ok(id) if self.exists(&id) => ids.push(id),
                _ => {}
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

fn remove_if_present(path: &Path) -> SessionResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vlog_models::SegmentKind;

    fn segment(index: usize, kind: SegmentKind, frames: u64) -> SegmentInfo {
        SegmentInfo {
            index,
            frames,
            kind,
            source_path: format!("/in/input_{index}").into(),
            transition: match kind {
                SegmentKind::Image => None,
                SegmentKind::Video => Some("ripple".into()),
            },
        }
    }

    fn store() -> (tempfile::TempDir, SessionStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn create_load_round_trip() {
        let (_tmp, store) = store();
        let meta = store.create("classic").unwrap();
        let loaded = store.load(&meta.session_id).unwrap();
        assert_eq!(loaded.template_name, "classic");
        assert_eq!(loaded.status, SessionStatus::Initialized);
        assert_eq!(loaded.current_transition_index, 0);
        assert!(store.segment_path(&meta.session_id, 0)
            .parent()
            .unwrap()
            .is_dir());
    }

    #[test]
    fn unknown_session_is_not_found() {
        let (_tmp, store) = store();
        let id: SessionId = "no-such-session".parse().unwrap();
        assert!(matches!(store.load(&id), Err(SessionError::NotFound(_))));
        assert!(matches!(
            store.save_last_frame(&id, &[0u8; 3]),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn transition_cursor_rotates_over_three_appends() {
        let (_tmp, store) = store();
        let id = store.create("classic").unwrap().session_id;
        store.record_cover(&id, segment(0, SegmentKind::Image, 200)).unwrap();

        // two transitions in the template
        let m1 = store.record_append(&id, segment(1, SegmentKind::Video, 400), 2).unwrap();
        assert_eq!(m1.current_transition_index, 1);
        let m2 = store.record_append(&id, segment(2, SegmentKind::Video, 400), 2).unwrap();
        assert_eq!(m2.current_transition_index, 0);
        let m3 = store.record_append(&id, segment(3, SegmentKind::Video, 400), 2).unwrap();
        assert_eq!(m3.current_transition_index, 1);
        assert_eq!(m3.total_frames, 200 + 3 * 400);
        assert_eq!(m3.status, SessionStatus::Rendering);
    }

    #[test]
    fn segment_indices_are_strictly_sequential() {
        let (_tmp, store) = store();
        let id = store.create("classic").unwrap().session_id;
        store.record_cover(&id, segment(0, SegmentKind::Image, 200)).unwrap();

        let m = store.record_append(&id, segment(1, SegmentKind::Video, 400), 3).unwrap();
        assert_eq!(m.next_segment_index(), 2);

        let err = store.record_append(&id, segment(3, SegmentKind::Video, 400), 3);
        assert!(matches!(err, Err(SessionError::Conflict(_))));
    }

    #[test]
    fn completed_sessions_reject_further_mutation() {
        let (_tmp, store) = store();
        let id = store.create("classic").unwrap().session_id;
        store.record_cover(&id, segment(0, SegmentKind::Image, 200)).unwrap();
        store.mark_completed(&id).unwrap();

        assert!(matches!(
            store.record_append(&id, segment(1, SegmentKind::Video, 400), 3),
            Err(SessionError::Conflict(_))
        ));
        assert!(matches!(
            store.mark_completed(&id),
            Err(SessionError::Conflict(_))
        ));
    }

    #[test]
    fn failed_sessions_cannot_finalize() {
        let (_tmp, store) = store();
        let id = store.create("classic").unwrap().session_id;
        store.mark_failed(&id).unwrap();
        assert!(matches!(
            store.mark_completed(&id),
            Err(SessionError::Conflict(_))
        ));
    }

    #[test]
    fn last_frame_cache_round_trips_raw_bytes() {
        let (_tmp, store) = store();
        let id = store.create("classic").unwrap().session_id;

        assert!(matches!(
            store.load_last_frame(&id),
            Err(SessionError::Corrupt(_))
        ));

        let frame: Vec<u8> = (0..=254).collect();
        store.save_last_frame(&id, &frame).unwrap();
        assert_eq!(store.load_last_frame(&id).unwrap(), frame);
    }

    #[test]
    fn cleanup_keeps_metadata_for_status_reads() {
        let (_tmp, store) = store();
        let id = store.create("classic").unwrap().session_id;
        store.record_cover(&id, segment(0, SegmentKind::Image, 200)).unwrap();
        store.save_last_frame(&id, &[1, 2, 3]).unwrap();
        std::fs::write(store.manifest_path(&id), "file 'x'\n").unwrap();
        store.mark_completed(&id).unwrap();
        store.cleanup_after_finalize(&id).unwrap();

        let meta = store.load(&id).unwrap();
        assert_eq!(meta.status, SessionStatus::Completed);
        assert!(!store.segment_path(&id, 0).parent().unwrap().exists());
        assert!(matches!(
            store.load_last_frame(&id),
            Err(SessionError::Corrupt(_))
        ));
    }

    #[test]
    fn registry_scan_recovers_sessions_from_disk() {
        let (_tmp, store) = store();
        let a = store.create("classic").unwrap().session_id;
        let b = store.create("modern").unwrap().session_id;
        // stray files and junk directories are ignored
        std::fs::create_dir(store.session_dir(&a).parent().unwrap().join("not a session!")).unwrap();

        let mut expected = vec![a, b];
        expected.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(store.list_sessions().unwrap(), expected);
    }

    #[test]
    fn double_cover_is_rejected() {
        let (_tmp, store) = store();
        let id = store.create("classic").unwrap().session_id;
        store.record_cover(&id, segment(0, SegmentKind::Image, 200)).unwrap();
        assert!(matches!(
            store.record_cover(&id, segment(0, SegmentKind::Image, 200)),
            Err(SessionError::Conflict(_))
        ));
    }
}
