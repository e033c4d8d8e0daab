//! Stream-copy concatenation and background-audio muxing.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Concatenate elementary streams into a video-only MP4 without re-encoding.
///
/// Writes a concat manifest next to the output, then runs a `-f concat`
/// stream copy. All segments must come from the same encoder configuration;
/// a parameter mismatch surfaces as a mux failure.
pub fn concat_segments(
    segments: &[PathBuf],
    manifest_path: &Path,
    output: &Path,
) -> MediaResult<()> {
    if segments.is_empty() {
        return Err(MediaError::mux_failed("no segments to concatenate", None, None));
    }
    for seg in segments {
        if !seg.exists() {
            return Err(MediaError::FileNotFound(seg.clone()));
        }
    }

    std::fs::write(manifest_path, concat_manifest(segments))?;

    info!(segments = segments.len(), output = %output.display(), "concatenating segments");
    FfmpegCommand::new(output)
        .input_arg("-f")
        .input_arg("concat")
        .input_arg("-safe")
        .input_arg("0")
        .input(manifest_path.to_string_lossy())
        .video_codec("copy")
        .output_arg("-movflags")
        .output_arg("+faststart")
        .run()
}

/// Attach the background track to a video-only file.
///
/// The audio source loops if shorter than the video and is truncated when
/// the video ends; output audio is AAC, 44.1 kHz stereo.
pub fn mux_background_audio(video: &Path, bgm: &Path, output: &Path) -> MediaResult<()> {
    if !bgm.exists() {
        return Err(MediaError::FileNotFound(bgm.to_path_buf()));
    }

    info!(video = %video.display(), bgm = %bgm.display(), "muxing background audio");
    FfmpegCommand::new(output)
        .input(video.to_string_lossy())
        .input_arg("-stream_loop")
        .input_arg("-1")
        .input(bgm.to_string_lossy())
        .map("0:v:0")
        .map("1:a:0")
        .video_codec("copy")
        .audio_codec("aac")
        .output_arg("-b:a")
        .output_arg("192k")
        .output_arg("-ar")
        .output_arg("44100")
        .output_arg("-ac")
        .output_arg("2")
        .output_arg("-shortest")
        .output_arg("-movflags")
        .output_arg("+faststart")
        .run()
}

/// Manifest body for the concat demuxer, one `file` directive per segment.
fn concat_manifest(segments: &[PathBuf]) -> String {
    let mut body = String::new();
    for seg in segments {
        body.push_str(&format!("file '{}'\n", seg.display()));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_segments_in_order() {
        let segs = vec![
            PathBuf::from("/s/segments/segment_0.h264"),
            PathBuf::from("/s/segments/segment_1.h264"),
        ];
        let manifest = concat_manifest(&segs);
        assert_eq!(
            manifest,
            "file '/s/segments/segment_0.h264'\nfile '/s/segments/segment_1.h264'\n"
        );
    }

    #[test]
    fn concat_rejects_empty_input() {
        let err = concat_segments(&[], Path::new("/tmp/c.txt"), Path::new("/tmp/o.mp4"));
        assert!(matches!(err, Err(MediaError::MuxFailed { .. })));
    }

    #[test]
    fn concat_rejects_missing_segment() {
        let segs = vec![PathBuf::from("/definitely/not/here.h264")];
        let err = concat_segments(&segs, Path::new("/tmp/c.txt"), Path::new("/tmp/o.mp4"));
        assert!(matches!(err, Err(MediaError::FileNotFound(_))));
    }
}
