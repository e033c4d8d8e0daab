//! Canonical RGB24 frame production.
//!
//! A `FrameSource` normalizes one input (still image or video) to a lazy
//! sequence of packed RGB frames at the output geometry. Video inputs are
//! decoded by an FFmpeg child process writing raw frames to a pipe; after
//! the pipe runs dry the last successfully decoded frame is repeated, so a
//! source never under-delivers against its terminal frame count.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::imageops::FilterType;
use tracing::{debug, warn};

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// Lazy frame producer for one input.
#[derive(Debug)]
pub struct FrameSource {
    inner: SourceKind,
    frames_remaining: u64,
}

#[derive(Debug)]
enum SourceKind {
    Image {
        raster: Vec<u8>,
    },
    Video {
        path: PathBuf,
        child: Child,
        stdout: ChildStdout,
        /// Last good frame; returned verbatim once the pipe is exhausted
        frame: Vec<u8>,
        /// Scratch buffer so a truncated read cannot corrupt `frame`
        scratch: Vec<u8>,
        /// The preloaded first frame has not been handed out yet
        preloaded: bool,
        eof: bool,
    },
}

impl FrameSource {
    /// Source that yields a resized still image `frames` times.
    pub fn image(path: impl AsRef<Path>, width: u32, height: u32, frames: u64) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let img = image::open(path).map_err(|e| MediaError::InvalidImage {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let img = img.to_rgb8();
        let raster = if img.dimensions() == (width, height) {
            img.into_raw()
        } else {
            image::imageops::resize(&img, width, height, FilterType::Lanczos3).into_raw()
        };

        debug!(path = %path.display(), frames, "image source ready");
        Ok(Self {
            inner: SourceKind::Image { raster },
            frames_remaining: frames,
        })
    }

    /// Source that decodes a video, rescaled and resampled to the output
    /// geometry, bounded to `frames` pulls.
    ///
    /// The decoder is trimmed to `trim_secs` of output so it terminates on
    /// its own; the first frame is preloaded before this returns, and a
    /// failure to produce it is fatal.
    pub fn video(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: u32,
        frames: u64,
        trim_secs: f64,
    ) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        check_ffmpeg()?;

        let filter = format!("setpts=PTS-STARTPTS,scale={width}:{height},fps={fps}:round=up");
        let mut child = Command::new("ffmpeg")
            .args([
                "-v",
                "error",
                "-nostdin",
                "-i",
                &path.to_string_lossy(),
                "-vf",
                &filter,
                "-t",
                &format!("{trim_secs:.3}"),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::decode_failed(path, "decoder stdout not captured"))?;

        // Mandatory first-frame preload: block until the decoder proves it
        // can produce output, so the pipeline never sees a black frame.
        let frame_size = width as usize * height as usize * 3;
        let mut frame = vec![0u8; frame_size];
        let got = read_full(&mut stdout, &mut frame)?;
        if got != frame_size {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MediaError::decode_failed(
                path,
                format!("decoder produced {got} bytes before EOF, expected a full first frame"),
            ));
        }

        debug!(path = %path.display(), frames, trim_secs, "video source ready");
        Ok(Self {
            inner: SourceKind::Video {
                path: path.to_path_buf(),
                child,
                stdout,
                frame,
                scratch: vec![0u8; frame_size],
                preloaded: true,
                eof: false,
            },
            frames_remaining: frames,
        })
    }

    /// Frames this source will still deliver.
    pub fn frames_remaining(&self) -> u64 {
        self.frames_remaining
    }

    /// Produce the next frame.
    ///
    /// Infallible after construction: decoder exhaustion is converted into
    /// repetition of the last good frame.
    pub fn pull(&mut self) -> &[u8] {
        self.frames_remaining = self.frames_remaining.saturating_sub(1);
        match &mut self.inner {
            SourceKind::Image { raster } => raster.as_slice(),
            SourceKind::Video {
                path,
                stdout,
                frame,
                scratch,
                preloaded,
                eof,
                ..
            } => {
                if *preloaded {
                    *preloaded = false;
                    return frame.as_slice();
                }
                if *eof {
                    return frame.as_slice();
                }
                match read_full(stdout, scratch) {
                    Ok(n) if n == scratch.len() => {
                        std::mem::swap(frame, scratch);
                    }
                    Ok(_) => {
                        debug!(path = %path.display(), "decoder exhausted, padding with last frame");
                        *eof = true;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "decoder read failed, padding with last frame");
                        *eof = true;
                    }
                }
                frame.as_slice()
            }
        }
    }

    /// Whether the decoder hit end of stream before its terminal count.
    pub fn is_exhausted(&self) -> bool {
        match &self.inner {
            SourceKind::Image { .. } => false,
            SourceKind::Video { eof, .. } => *eof,
        }
    }

    /// Release the decoder process.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let SourceKind::Video { child, .. } = &mut self.inner {
            // The decoder may still be blocked on a full pipe; reap it.
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_full_handles_short_streams() {
        let mut buf = [0u8; 8];
        let mut short = Cursor::new(vec![1u8, 2, 3]);
        assert_eq!(read_full(&mut short, &mut buf).unwrap(), 3);

        let mut exact = Cursor::new(vec![9u8; 8]);
        assert_eq!(read_full(&mut exact, &mut buf).unwrap(), 8);
        assert_eq!(buf, [9u8; 8]);
    }

    #[test]
    fn image_source_counts_down_and_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        let img = image::RgbImage::from_pixel(4, 2, image::Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let mut src = FrameSource::image(&path, 8, 4, 3).unwrap();
        assert_eq!(src.frames_remaining(), 3);
        let first = src.pull().to_vec();
        assert_eq!(first.len(), 8 * 4 * 3);
        assert_eq!(src.pull(), first.as_slice());
        assert_eq!(src.pull(), first.as_slice());
        assert_eq!(src.frames_remaining(), 0);
        assert!(!src.is_exhausted());
    }

    #[test]
    fn image_source_resizes_to_output_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        image::RgbImage::from_pixel(64, 64, image::Rgb([200, 0, 0]))
            .save(&path)
            .unwrap();

        let mut src = FrameSource::image(&path, 16, 9, 1).unwrap();
        assert_eq!(src.pull().len(), 16 * 9 * 3);
    }

    #[test]
    fn missing_image_is_an_input_error() {
        let err = FrameSource::image("/nonexistent/cover.png", 8, 4, 1).unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
