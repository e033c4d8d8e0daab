//! In-process render entry points.
//!
//! These are the operations the HTTP layer (or any embedder) calls: the
//! one-shot render and the incremental session lifecycle. All of them are
//! synchronous and CPU/GPU bound; callers on an async runtime should wrap
//! them in `spawn_blocking`.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use uuid::Uuid;

use vlog_media::{concat_segments, mux_background_audio, probe_video, EncoderSink, MediaError};
use vlog_models::{RenderSettings, SegmentInfo, SegmentKind, SessionId, SessionMetadata};
use vlog_session::{SessionError, SessionStore};

use crate::driver::RenderDriver;
use crate::error::{RenderError, RenderResult};
use crate::template::TemplateStore;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];
const MAX_CLIPS: usize = 5;

/// Everything a render run needs from the environment.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub settings: RenderSettings,
    pub templates: TemplateStore,
    /// Where finished MP4s are published
    pub output_dir: PathBuf,
    /// Root of the incremental session directories
    pub session_root: PathBuf,
}

impl RenderContext {
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(&self.session_root)
    }
}

/// Result of a session init.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub session_id: SessionId,
    pub segment_index: usize,
}

/// Result of a session append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub session_id: SessionId,
    pub segment_index: usize,
    pub transition_used: String,
}

/// Result of a session finalize.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub session_id: SessionId,
    pub output_path: PathBuf,
    pub total_segments: usize,
    pub total_frames: u64,
}

/// Render a cover plus 1..=5 clips into a published MP4.
pub fn render_oneshot(
    ctx: &RenderContext,
    template_name: &str,
    image: &Path,
    videos: &[PathBuf],
) -> RenderResult<PathBuf> {
    if videos.is_empty() || videos.len() > MAX_CLIPS {
        return Err(RenderError::input(format!(
            "expected 1 to {MAX_CLIPS} clips, got {}",
            videos.len()
        )));
    }
    validate_image(image)?;
    for video in videos {
        validate_video(video)?;
    }

    let template = ctx.templates.load(template_name)?;
    let bgm = template.spec.bgm.path.clone();

    let run_id = Uuid::new_v4();
    std::fs::create_dir_all(&ctx.output_dir)?;
    let silent = ctx.output_dir.join(format!("{run_id}_silent.mp4"));
    let published = ctx.output_dir.join(format!("{run_id}.mp4"));

    let mut driver = RenderDriver::new(ctx.settings, template)?;
    let expected = driver.schedule().oneshot_total(videos.len());
    let mut sink = EncoderSink::spawn(&ctx.settings, &silent)?;

    let total = match driver.render_oneshot(image, videos, &mut sink) {
        Ok(total) => total,
        Err(e) => {
            error!(error = %e, "one-shot render aborted");
            sink.abort();
            return Err(e);
        }
    };
    sink.close()?;

    if total != expected {
        warn!(total, expected, "frame budget mismatch in one-shot render");
    }
    info!(run = %run_id, frames = total, "one-shot render encoded");

    mux_background_audio(&silent, &bgm, &published)?;
    std::fs::remove_file(&silent).ok();

    info!(output = %published.display(), "one-shot render published");
    Ok(published)
}

/// Create a session and render its cover segment.
pub fn session_init(
    ctx: &RenderContext,
    template_name: &str,
    image: &Path,
) -> RenderResult<InitOutcome> {
    validate_image(image)?;
    let template = ctx.templates.load(template_name)?;

    let store = ctx.session_store();
    let meta = store.create(template_name)?;
    let session_id = meta.session_id.clone();

    let result = (|| -> RenderResult<()> {
        let mut driver = RenderDriver::new(ctx.settings, template)?;
        let segment_path = store.segment_path(&session_id, 0);
        let mut sink = EncoderSink::spawn(&ctx.settings, &segment_path)?;

        let last = match driver.render_cover(image, &mut sink) {
            Ok(last) => last,
            Err(e) => {
                sink.abort();
                return Err(e);
            }
        };
        let frames = sink.frames_written();
        sink.close()?;

        store.save_last_frame(&session_id, &last)?;
        store.record_cover(
            &session_id,
            SegmentInfo {
                index: 0,
                frames,
                kind: SegmentKind::Image,
                source_path: image.to_path_buf(),
                transition: None,
            },
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            info!(session = %session_id, "session initialized");
            Ok(InitOutcome {
                session_id,
                segment_index: 0,
            })
        }
        Err(e) => {
            let _ = store.mark_failed(&session_id);
            Err(e)
        }
    }
}

/// Append one clip to a session.
pub fn session_append(
    ctx: &RenderContext,
    session_id: &SessionId,
    video: &Path,
) -> RenderResult<AppendOutcome> {
    validate_video(video)?;

    let store = ctx.session_store();
    let meta = store.load(session_id)?;
    if !meta.status.accepts_append() {
        return Err(SessionError::conflict(format!(
            "session {session_id} is {} and no longer accepts appends",
            meta.status
        ))
        .into());
    }

    let template = ctx.templates.load(&meta.template_name)?;
    let transition_index = meta.current_transition_index;
    let transition_used = template.transition(transition_index).name.clone();
    let transition_count = template.transitions.len();
    let segment_index = meta.next_segment_index();

    let result = (|| -> RenderResult<u64> {
        let last_frame = store.load_last_frame(session_id)?;
        let mut driver = RenderDriver::new(ctx.settings, template)?;
        let segment_path = store.segment_path(session_id, segment_index);
        let mut sink = EncoderSink::spawn(&ctx.settings, &segment_path)?;

        let (frames, last) =
            match driver.render_append_segment(&last_frame, video, transition_index, &mut sink) {
                Ok(out) => out,
                Err(e) => {
                    sink.abort();
                    return Err(e);
                }
            };
        sink.close()?;

        store.save_last_frame(session_id, &last)?;
        store.record_append(
            session_id,
            SegmentInfo {
                index: segment_index,
                frames,
                kind: SegmentKind::Video,
                source_path: video.to_path_buf(),
                transition: Some(transition_used.clone()),
            },
            transition_count,
        )?;
        Ok(frames)
    })();

    match result {
        Ok(frames) => {
            info!(session = %session_id, segment = segment_index, frames, "segment appended");
            Ok(AppendOutcome {
                session_id: session_id.clone(),
                segment_index,
                transition_used,
            })
        }
        Err(e) => {
            error!(session = %session_id, error = %e, "append aborted");
            let _ = store.mark_failed(session_id);
            Err(e)
        }
    }
}

/// Concatenate a session's segments, mux the BGM, and publish the result.
pub fn session_finalize(
    ctx: &RenderContext,
    session_id: &SessionId,
    output_filename: Option<&str>,
) -> RenderResult<FinalizeOutcome> {
    let store = ctx.session_store();
    let meta = store.load(session_id)?;
    if !meta.status.accepts_finalize() {
        return Err(SessionError::conflict(format!(
            "session {session_id} is {} and cannot be finalized",
            meta.status
        ))
        .into());
    }
    if meta.segments.is_empty() {
        return Err(SessionError::conflict(format!("session {session_id} has no segments")).into());
    }

    let template = ctx.templates.load(&meta.template_name)?;

    std::fs::create_dir_all(&ctx.output_dir)?;
    let filename = sanitize_output_filename(output_filename, session_id);
    let published = ctx.output_dir.join(filename);
    let concat_out = store.session_dir(session_id).join("concat_silent.mp4");

    let result = (|| -> RenderResult<()> {
        let segments = store.segment_paths(&meta);
        concat_segments(&segments, &store.manifest_path(session_id), &concat_out)?;
        mux_background_audio(&concat_out, &template.spec.bgm.path, &published)?;
        std::fs::remove_file(&concat_out).ok();
        Ok(())
    })();

    match result {
        Ok(()) => {
            store.mark_completed(session_id)?;
            store.cleanup_after_finalize(session_id)?;
            info!(session = %session_id, output = %published.display(), "session finalized");
            Ok(FinalizeOutcome {
                session_id: session_id.clone(),
                output_path: published,
                total_segments: meta.segments.len(),
                total_frames: meta.total_frames,
            })
        }
        Err(e) => {
            error!(session = %session_id, error = %e, "finalize aborted");
            let _ = store.mark_failed(session_id);
            Err(e)
        }
    }
}

/// Read a session's metadata.
pub fn session_status(ctx: &RenderContext, session_id: &SessionId) -> RenderResult<SessionMetadata> {
    Ok(ctx.session_store().load(session_id)?)
}

fn validate_image(path: &Path) -> RenderResult<()> {
    validate_input(path, IMAGE_EXTENSIONS, "image")
}

fn validate_video(path: &Path) -> RenderResult<()> {
    validate_input(path, VIDEO_EXTENSIONS, "video")?;
    // Reject inputs the decoder would choke on before any GPU work starts.
    match probe_video(path) {
        Ok(info) => {
            info!(video = %path.display(), duration = info.duration, codec = %info.codec, "input probed");
            Ok(())
        }
        Err(MediaError::InvalidVideo(msg)) => Err(RenderError::input(format!(
            "{} is not a usable video: {msg}",
            path.display()
        ))),
        // Probe tooling problems should not mask a renderable input.
        Err(e) => {
            warn!(video = %path.display(), error = %e, "probe failed, continuing");
            Ok(())
        }
    }
}

fn validate_input(path: &Path, extensions: &[&str], kind: &str) -> RenderResult<()> {
    if !path.is_absolute() {
        return Err(RenderError::input(format!(
            "{kind} path must be absolute: {}",
            path.display()
        )));
    }
    if !path.exists() {
        return Err(RenderError::input(format!(
            "{kind} does not exist: {}",
            path.display()
        )));
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !extensions.contains(&ext.as_str()) {
        return Err(RenderError::input(format!(
            "unsupported {kind} format '{ext}' for {}",
            path.display()
        )));
    }
    Ok(())
}

/// Reduce a caller-supplied filename to a safe `.mp4` basename.
fn sanitize_output_filename(requested: Option<&str>, session_id: &SessionId) -> String {
    let fallback = || format!("final_{session_id}.mp4");
    match requested {
        None => fallback(),
        Some(name) => {
            let base = Path::new(name)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if base.is_empty() || base.starts_with('.') {
                return fallback();
            }
            if base.to_lowercase().ends_with(".mp4") {
                base
            } else {
                format!("{base}.mp4")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_count_is_bounded() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RenderContext {
            settings: RenderSettings::default(),
            templates: TemplateStore::new(tmp.path().join("templates")),
            output_dir: tmp.path().join("out"),
            session_root: tmp.path().join("sessions"),
        };
        let image = tmp.path().join("cover.png");
        std::fs::write(&image, b"x").unwrap();

        let err = render_oneshot(&ctx, "classic", &image, &[]).unwrap_err();
        assert!(matches!(err, RenderError::Input(_)));

        let too_many: Vec<PathBuf> = (0..6).map(|i| tmp.path().join(format!("v{i}.mp4"))).collect();
        let err = render_oneshot(&ctx, "classic", &image, &too_many).unwrap_err();
        assert!(matches!(err, RenderError::Input(_)));
    }

    #[test]
    fn input_validation_checks_extension_and_existence() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("cover.png");
        assert!(matches!(
            validate_image(&missing),
            Err(RenderError::Input(_))
        ));

        let wrong = tmp.path().join("cover.gif");
        std::fs::write(&wrong, b"x").unwrap();
        assert!(matches!(validate_image(&wrong), Err(RenderError::Input(_))));

        assert!(matches!(
            validate_image(Path::new("relative/cover.png")),
            Err(RenderError::Input(_))
        ));

        let ok = tmp.path().join("cover.PNG");
        std::fs::write(&ok, b"x").unwrap();
        assert!(validate_image(&ok).is_ok());
    }

    #[test]
    fn output_filenames_are_sanitized() {
        let id: SessionId = "abc-123".parse().unwrap();
        assert_eq!(sanitize_output_filename(None, &id), "final_abc-123.mp4");
        assert_eq!(
            sanitize_output_filename(Some("../../etc/passwd"), &id),
            "passwd.mp4"
        );
        assert_eq!(sanitize_output_filename(Some("trip.mp4"), &id), "trip.mp4");
        assert_eq!(sanitize_output_filename(Some("trip"), &id), "trip.mp4");
        assert_eq!(sanitize_output_filename(Some(".."), &id), "final_abc-123.mp4");
    }
}
