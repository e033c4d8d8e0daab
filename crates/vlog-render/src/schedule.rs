//! Frame arithmetic for the three-phase render schedule.
//!
//! All phase lengths derive from the global settings. A one-shot run plays
//! the cover, then every clip opens with a transition blended from the
//! previous segment's tail; interior clips also give up their own tail to
//! the next transition, while the last clip plays that tail as solo. An
//! incremental append always renders transition + solo against a cached
//! still, so every appended segment carries the full clip frame budget.

use vlog_models::RenderSettings;

use crate::error::{RenderError, RenderResult};

/// Resolved per-phase frame counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSchedule {
    /// Frames of the cover segment
    pub image_frames: u64,
    /// Frames each clip occupies end to end
    pub video_frames: u64,
    /// Frames of one cross-fade
    pub transition_frames: u64,
    /// Frames of one subtitle-visible window per second config; derived lazily
    fps: u32,
}

impl RenderSchedule {
    pub fn new(settings: &RenderSettings) -> RenderResult<Self> {
        if settings.width == 0 || settings.height == 0 {
            return Err(RenderError::config("output geometry must be non-zero"));
        }
        if settings.width % 2 != 0 || settings.height % 2 != 0 {
            return Err(RenderError::config(
                "output geometry must be even for yuv420p encoding",
            ));
        }
        if settings.fps == 0 {
            return Err(RenderError::config("fps must be non-zero"));
        }

        let image_frames = (settings.image_duration * settings.fps as f64).round() as u64;
        let video_frames = (settings.video_duration * settings.fps as f64).round() as u64;
        let transition_frames = (settings.transition_duration * settings.fps as f64).round() as u64;

        if image_frames == 0 || video_frames == 0 {
            return Err(RenderError::config("phase durations must be positive"));
        }
        if transition_frames >= video_frames {
            return Err(RenderError::config(format!(
                "transition ({transition_frames} frames) must be shorter than a clip ({video_frames} frames)"
            )));
        }

        Ok(Self {
            image_frames,
            video_frames,
            transition_frames,
            fps: settings.fps,
        })
    }

    /// Solo frames for clip `index` of `clip_count` in a one-shot run.
    ///
    /// Interior clips surrender their tail to the next transition; the last
    /// clip keeps it.
    pub fn solo_frames(&self, index: usize, clip_count: usize) -> RenderResult<u64> {
        let is_last = index + 1 == clip_count;
        let reserved = if is_last {
            self.transition_frames
        } else {
            2 * self.transition_frames
        };
        self.video_frames.checked_sub(reserved).ok_or_else(|| {
            RenderError::config(format!(
                "clip budget ({} frames) cannot fit two {}-frame transitions",
                self.video_frames, self.transition_frames
            ))
        })
    }

    /// Total frames a one-shot run with `clip_count` clips emits.
    pub fn oneshot_total(&self, clip_count: usize) -> u64 {
        if clip_count == 0 {
            self.image_frames
        } else {
            self.image_frames
                + clip_count as u64 * (self.video_frames - self.transition_frames)
                + self.transition_frames
        }
    }

    /// Frames one incremental append emits (transition + solo).
    pub fn append_frames(&self) -> u64 {
        self.video_frames
    }

    /// Solo frames of one incremental append.
    pub fn append_solo_frames(&self) -> u64 {
        self.video_frames - self.transition_frames
    }

    /// Decoder trim window in seconds for a source that must survive its
    /// own playback plus a trailing transition.
    ///
    /// A one second guard lets EOF padding, not pipe starvation, close out
    /// short sources.
    pub fn trim_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.fps as f64 + 1.0
    }

    /// Frames the subtitle stays visible.
    pub fn subtitle_frames(&self, duration_secs: f64) -> u64 {
        (duration_secs * self.fps as f64).round() as u64
    }

    /// Transition progress at step `f` of the cross-fade.
    pub fn transition_progress(&self, f: u64) -> f32 {
        (f + 1) as f32 / self.transition_frames as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> RenderSchedule {
        RenderSchedule::new(&RenderSettings::default()).unwrap()
    }

    #[test]
    fn production_profile_counts() {
        let s = schedule();
        assert_eq!(s.image_frames, 200);
        assert_eq!(s.video_frames, 400);
        assert_eq!(s.transition_frames, 50);
    }

    #[test]
    fn oneshot_totals_match_frame_count_identity() {
        let s = schedule();
        // cover only
        assert_eq!(s.oneshot_total(0), 200);
        // one clip: 200 + (400 - 50) + 50
        assert_eq!(s.oneshot_total(1), 600);
        // three clips: 200 + 3 * 350 + 50
        assert_eq!(s.oneshot_total(3), 1300);
    }

    #[test]
    fn oneshot_totals_decompose_into_phases() {
        let s = schedule();
        for n in 1..=5usize {
            let mut total = s.image_frames;
            for k in 0..n {
                total += s.transition_frames + s.solo_frames(k, n).unwrap();
            }
            assert_eq!(total, s.oneshot_total(n), "clip count {n}");
        }
    }

    #[test]
    fn interior_clips_surrender_their_tail() {
        let s = schedule();
        assert_eq!(s.solo_frames(0, 3).unwrap(), 300);
        assert_eq!(s.solo_frames(1, 3).unwrap(), 300);
        assert_eq!(s.solo_frames(2, 3).unwrap(), 350);
        assert_eq!(s.solo_frames(0, 1).unwrap(), 350);
    }

    #[test]
    fn append_budget_is_a_full_clip() {
        let s = schedule();
        assert_eq!(s.append_frames(), 400);
        assert_eq!(s.append_solo_frames(), 350);
    }

    #[test]
    fn transition_longer_than_clip_is_rejected() {
        let settings = RenderSettings {
            video_duration: 1.0,
            transition_duration: 2.0,
            ..RenderSettings::default()
        };
        assert!(matches!(
            RenderSchedule::new(&settings),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn interior_clip_too_small_for_two_transitions_is_rejected() {
        let settings = RenderSettings {
            video_duration: 3.0,
            transition_duration: 2.0,
            ..RenderSettings::default()
        };
        let s = RenderSchedule::new(&settings).unwrap();
        // last clip still fits
        assert!(s.solo_frames(1, 2).is_ok());
        // interior clip does not
        assert!(s.solo_frames(0, 2).is_err());
    }

    #[test]
    fn odd_geometry_is_rejected() {
        let settings = RenderSettings {
            width: 1919,
            ..RenderSettings::default()
        };
        assert!(RenderSchedule::new(&settings).is_err());
    }

    #[test]
    fn transition_progress_reaches_one() {
        let s = schedule();
        assert!((s.transition_progress(49) - 1.0).abs() < f32::EPSILON);
        assert!(s.transition_progress(0) > 0.0);
    }
}
