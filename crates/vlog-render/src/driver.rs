//! Render driver.
//!
//! Executes the phase schedule against one compositor and one encoder:
//! cover phase with the typewriter subtitle, then per clip a transition
//! blended from the previous segment's tail followed by solo play. The
//! driver owns the frame sources and advances their lifetimes; frames flow
//! strictly in production order.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use vlog_media::{EncoderSink, FrameSource};
use vlog_models::RenderSettings;

use crate::compositor::{BorderKind, Compositor};
use crate::error::{RenderError, RenderResult};
use crate::overlay::load_border_rgba;
use crate::schedule::RenderSchedule;
use crate::subtitle::{SubtitleRasterizer, SubtitleTimeline};
use crate::template::LoadedTemplate;

/// Drives the three-phase schedule for one run.
pub struct RenderDriver {
    compositor: Compositor,
    schedule: RenderSchedule,
    settings: RenderSettings,
    template: LoadedTemplate,
    rasterizer: SubtitleRasterizer,
    timeline: SubtitleTimeline,
    /// Subtitle string currently uploaded to the GPU
    uploaded_subtitle: Option<String>,
}

impl RenderDriver {
    pub fn new(settings: RenderSettings, template: LoadedTemplate) -> RenderResult<Self> {
        let schedule = RenderSchedule::new(&settings)?;
        let mut compositor = Compositor::new(&settings)?;

        let cover_border =
            load_border_rgba(&template.spec.border.path, settings.width, settings.height)?;
        compositor.set_cover_border(&cover_border);
        let video_border = load_border_rgba(
            &template.spec.video_border().path,
            settings.width,
            settings.height,
        )?;
        compositor.set_video_border(&video_border);

        let text = template.spec.subtitle.resolve_text(Local::now().date_naive());
        let timeline = SubtitleTimeline::new(
            text,
            template.spec.subtitle.typewriter_speed,
            schedule.subtitle_frames(template.spec.subtitle.duration),
        );
        let rasterizer =
            SubtitleRasterizer::new(&template.spec.font, settings.width, settings.height)?;

        Ok(Self {
            compositor,
            schedule,
            settings,
            template,
            rasterizer,
            timeline,
            uploaded_subtitle: None,
        })
    }

    pub fn schedule(&self) -> &RenderSchedule {
        &self.schedule
    }

    pub fn template(&self) -> &LoadedTemplate {
        &self.template
    }

    /// Render the cover phase; returns the final composited frame.
    pub fn render_cover(
        &mut self,
        image_path: &Path,
        sink: &mut EncoderSink,
    ) -> RenderResult<Vec<u8>> {
        let mut source = FrameSource::image(
            image_path,
            self.settings.width,
            self.settings.height,
            self.schedule.image_frames,
        )?;

        info!(frames = self.schedule.image_frames, image = %image_path.display(), "cover phase");

        let mut last = Vec::new();
        for f in 0..self.schedule.image_frames {
            let frame = source.pull();
            self.compositor.upload_from(frame);

            let subtitle = match self.timeline.visible_text(f) {
                Some(text) => {
                    if self.uploaded_subtitle.as_deref() != Some(text) {
                        let text = text.to_string();
                        let raster = self.rasterizer.render(&text);
                        self.compositor.set_subtitle(raster);
                        self.uploaded_subtitle = Some(text);
                    }
                    true
                }
                None => false,
            };

            let out = self.compositor.compose_solo(BorderKind::Cover, subtitle)?;
            sink.write(&out)?;
            last = out;
        }

        source.close();
        Ok(last)
    }

    /// Render a full one-shot run (cover already validated by the caller);
    /// returns the total frames emitted.
    pub fn render_oneshot(
        &mut self,
        image_path: &Path,
        videos: &[PathBuf],
        sink: &mut EncoderSink,
    ) -> RenderResult<u64> {
        let cover_last = self.render_cover(image_path, sink)?;
        if videos.is_empty() {
            return Ok(sink.frames_written());
        }

        let trans_frames = self.schedule.transition_frames;
        let clip_count = videos.len();
        let mut prev: Option<FrameSource> = None;

        for (k, video) in videos.iter().enumerate() {
            let solo = self.schedule.solo_frames(k, clip_count)?;
            let is_last = k + 1 == clip_count;
            // Pull budget: the opening transition's `to` frames, the solo
            // window, and the tail handed to the next clip's transition.
            let budget = trans_frames + solo + if is_last { 0 } else { trans_frames };
            let mut source = FrameSource::video(
                video,
                self.settings.width,
                self.settings.height,
                self.settings.fps,
                budget,
                self.schedule.trim_secs(budget),
            )?;

            let effect = self.template.transition(k);
            info!(clip = k, effect = %effect.name, solo, "clip phase");
            let effect = effect.clone();
            self.compositor.install_transition(&effect)?;

            for f in 0..trans_frames {
                match prev.as_mut() {
                    Some(p) => {
                        let tail = p.pull();
                        self.compositor.upload_from(tail);
                    }
                    None => self.compositor.upload_from(&cover_last),
                }
                let opening = source.pull();
                self.compositor.upload_to(opening);
                let out = self.compositor.compose_transition(
                    self.schedule.transition_progress(f),
                    BorderKind::Video,
                    false,
                )?;
                sink.write(&out)?;
            }

            if let Some(p) = prev.take() {
                p.close();
            }

            for _ in 0..solo {
                let frame = source.pull();
                self.compositor.upload_from(frame);
                let out = self.compositor.compose_solo(BorderKind::Video, false)?;
                sink.write(&out)?;
            }

            if source.is_exhausted() {
                debug!(clip = k, "source ended early, tail was last-frame padding");
            }
            prev = Some(source);
        }

        if let Some(p) = prev.take() {
            p.close();
        }
        Ok(sink.frames_written())
    }

    /// Render one appended segment: a transition from the cached last frame
    /// into the clip, then solo play. Returns (frames, final frame).
    pub fn render_append_segment(
        &mut self,
        last_frame: &[u8],
        video: &Path,
        transition_index: usize,
        sink: &mut EncoderSink,
    ) -> RenderResult<(u64, Vec<u8>)> {
        if last_frame.len() != self.settings.frame_size() {
            return Err(RenderError::input(format!(
                "cached last frame is {} bytes, expected {}",
                last_frame.len(),
                self.settings.frame_size()
            )));
        }

        let budget = self.schedule.append_frames();
        let mut source = FrameSource::video(
            video,
            self.settings.width,
            self.settings.height,
            self.settings.fps,
            budget,
            self.schedule.trim_secs(budget),
        )?;

        let effect = self.template.transition(transition_index).clone();
        info!(effect = %effect.name, frames = budget, video = %video.display(), "append segment");
        self.compositor.install_transition(&effect)?;

        // The `from` side is a still; upload it once.
        self.compositor.upload_from(last_frame);
        for f in 0..self.schedule.transition_frames {
            let opening = source.pull();
            self.compositor.upload_to(opening);
            let out = self.compositor.compose_transition(
                self.schedule.transition_progress(f),
                BorderKind::Video,
                false,
            )?;
            sink.write(&out)?;
        }

        let mut last = Vec::new();
        for _ in 0..self.schedule.append_solo_frames() {
            let frame = source.pull();
            self.compositor.upload_from(frame);
            let out = self.compositor.compose_solo(BorderKind::Video, false)?;
            sink.write(&out)?;
            last = out;
        }

        if source.is_exhausted() {
            debug!(video = %video.display(), "source ended early, tail was last-frame padding");
        }
        source.close();
        Ok((budget, last))
    }
}
