//! CPU-side subtitle rendering.
//!
//! `SubtitleTimeline` decides which prefix of the subtitle is visible at a
//! given frame (typewriter effect); `SubtitleRasterizer` turns that prefix
//! into a full-frame transparent RGBA raster with an outline, memoizing the
//! last rendered string so unchanged frames cost nothing.

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use tracing::debug;
use vlog_models::FontSpec;

use crate::error::{RenderError, RenderResult};

/// Pixels between the glyph box and the bottom edge of the frame.
const BOTTOM_MARGIN: u32 = 100;

/// Typewriter reveal state for one subtitle.
#[derive(Debug, Clone)]
pub struct SubtitleTimeline {
    text: String,
    /// Byte offset of each character boundary, ending at `text.len()`
    boundaries: Vec<usize>,
    /// Frames per revealed character
    speed: u32,
    /// Frames the subtitle stays on screen
    visible_frames: u64,
}

impl SubtitleTimeline {
    pub fn new(text: impl Into<String>, speed: u32, visible_frames: u64) -> Self {
        let text = text.into();
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self {
            text,
            boundaries,
            speed: speed.max(1),
            visible_frames,
        }
    }

    /// Characters in the full subtitle.
    pub fn char_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// The prefix visible at `frame`, or None when nothing should be drawn.
    pub fn visible_text(&self, frame: u64) -> Option<&str> {
        if frame >= self.visible_frames {
            return None;
        }
        let chars = ((frame / self.speed as u64) as usize).min(self.char_count());
        if chars == 0 {
            return None;
        }
        Some(&self.text[..self.boundaries[chars]])
    }
}

/// Text-to-raster renderer with outline and memoization.
pub struct SubtitleRasterizer {
    font: Font,
    px: f32,
    width: u32,
    height: u32,
    fill: [u8; 4],
    outline: [u8; 4],
    outline_width: i32,
    last_text: Option<String>,
    raster: Vec<u8>,
}

impl SubtitleRasterizer {
    pub fn new(spec: &FontSpec, width: u32, height: u32) -> RenderResult<Self> {
        let bytes = std::fs::read(&spec.path)?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| RenderError::config(format!("unusable font {}: {e}", spec.path.display())))?;

        Ok(Self {
            font,
            px: spec.size as f32,
            width,
            height,
            fill: spec.color,
            outline: spec.outline_color,
            outline_width: spec.outline_width as i32,
            last_text: None,
            raster: vec![0u8; width as usize * height as usize * 4],
        })
    }

    /// Render `text` into a full-frame RGBA raster.
    ///
    /// Returns the cached raster untouched when `text` matches the previous
    /// call.
    pub fn render(&mut self, text: &str) -> &[u8] {
        if self.last_text.as_deref() == Some(text) {
            return &self.raster;
        }

        self.raster.fill(0);

        let glyphs = self.layout_glyphs(text);
        if !glyphs.is_empty() {
            let (min_x, min_y, max_x, max_y) = bounding_box(&glyphs);
            let text_w = max_x - min_x;
            let text_h = max_y - min_y;
            let origin_x = (self.width as f32 - text_w) / 2.0 - min_x;
            let origin_y =
                (self.height as f32 - BOTTOM_MARGIN as f32) - text_h - min_y;

            // Outline first: stamp the glyphs at every offset in the
            // outline square, then lay the fill color on top.
            let w = self.outline_width;
            if w > 0 {
                for dx in -w..=w {
                    for dy in -w..=w {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        self.stamp(&glyphs, origin_x + dx as f32, origin_y + dy as f32, self.outline);
                    }
                }
            }
            self.stamp(&glyphs, origin_x, origin_y, self.fill);
        }

        debug!(chars = text.chars().count(), "subtitle raster updated");
        self.last_text = Some(text.to_string());
        &self.raster
    }

    fn layout_glyphs(&self, text: &str) -> Vec<RenderedGlyph> {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings::default());
        layout.append(&[&self.font], &TextStyle::new(text, self.px, 0));

        layout
            .glyphs()
            .iter()
            .filter(|g| g.width > 0 && g.height > 0)
            .map(|g| {
                let (_, bitmap) = self.font.rasterize_config(g.key);
                RenderedGlyph {
                    x: g.x,
                    y: g.y,
                    width: g.width,
                    height: g.height,
                    bitmap,
                }
            })
            .collect()
    }

    /// Alpha-blend the glyph coverage masks into the raster at an offset.
    fn stamp(&mut self, glyphs: &[RenderedGlyph], origin_x: f32, origin_y: f32, color: [u8; 4]) {
        for glyph in glyphs {
            let gx = (glyph.x + origin_x).round() as i64;
            let gy = (glyph.y + origin_y).round() as i64;
            for row in 0..glyph.height {
                let py = gy + row as i64;
                if py < 0 || py >= self.height as i64 {
                    continue;
                }
                for col in 0..glyph.width {
                    let px = gx + col as i64;
                    if px < 0 || px >= self.width as i64 {
                        continue;
                    }
                    let coverage = glyph.bitmap[row * glyph.width + col];
                    if coverage == 0 {
                        continue;
                    }
                    let idx = (py as usize * self.width as usize + px as usize) * 4;
                    blend_over(&mut self.raster[idx..idx + 4], color, coverage);
                }
            }
        }
    }
}

struct RenderedGlyph {
    x: f32,
    y: f32,
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

fn bounding_box(glyphs: &[RenderedGlyph]) -> (f32, f32, f32, f32) {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for g in glyphs {
        min_x = min_x.min(g.x);
        min_y = min_y.min(g.y);
        max_x = max_x.max(g.x + g.width as f32);
        max_y = max_y.max(g.y + g.height as f32);
    }
    (min_x, min_y, max_x, max_y)
}

/// Source-over blend of a straight-alpha color scaled by a coverage mask.
fn blend_over(dst: &mut [u8], color: [u8; 4], coverage: u8) {
    let sa = color[3] as f32 / 255.0 * coverage as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let s = color[c] as f32;
        let d = dst[c] as f32;
        dst[c] = ((s * sa + d * da * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typewriter_reveals_by_whole_characters() {
        let t = SubtitleTimeline::new("abcd", 3, 1000);
        assert_eq!(t.visible_text(0), None);
        assert_eq!(t.visible_text(2), None);
        assert_eq!(t.visible_text(3), Some("a"));
        assert_eq!(t.visible_text(6), Some("ab"));
        assert_eq!(t.visible_text(11), Some("abc"));
        // saturates at the full string
        assert_eq!(t.visible_text(500), Some("abcd"));
    }

    #[test]
    fn typewriter_respects_multibyte_boundaries() {
        let t = SubtitleTimeline::new("年月日", 1, 1000);
        assert_eq!(t.char_count(), 3);
        assert_eq!(t.visible_text(1), Some("年"));
        assert_eq!(t.visible_text(2), Some("年月"));
        assert_eq!(t.visible_text(3), Some("年月日"));
    }

    #[test]
    fn subtitle_disappears_after_its_window() {
        let t = SubtitleTimeline::new("hi", 1, 150);
        assert_eq!(t.visible_text(149), Some("hi"));
        assert_eq!(t.visible_text(150), None);
        assert_eq!(t.visible_text(151), None);
    }

    #[test]
    fn zero_speed_is_clamped() {
        let t = SubtitleTimeline::new("xy", 0, 10);
        assert_eq!(t.visible_text(1), Some("x"));
    }

    #[test]
    fn blend_over_is_opaque_on_full_coverage() {
        let mut dst = [0u8, 0, 0, 0];
        blend_over(&mut dst, [255, 255, 255, 255], 255);
        assert_eq!(dst, [255, 255, 255, 255]);
    }

    #[test]
    fn blend_over_keeps_transparent_pixels_transparent() {
        let mut dst = [0u8, 0, 0, 0];
        blend_over(&mut dst, [255, 255, 255, 255], 0);
        assert_eq!(dst, [0, 0, 0, 0]);
    }

    #[test]
    fn blend_over_composites_partial_coverage() {
        let mut dst = [0u8, 0, 0, 255];
        blend_over(&mut dst, [200, 100, 0, 255], 128);
        // ~50% coverage over opaque black
        assert!(dst[0] > 90 && dst[0] < 110);
        assert_eq!(dst[3], 255);
    }
}
