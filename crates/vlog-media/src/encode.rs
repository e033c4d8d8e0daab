//! Hardware H.264 encoder sink.
//!
//! The sink is an FFmpeg child process consuming raw RGB24 frames on stdin
//! with a fixed encoder configuration: NVENC H.264, CBR at 15 Mbps,
//! lookahead disabled, fastest preset. Segments destined for stream-copy
//! concatenation are written as Annex-B elementary streams (`.h264`);
//! one-shot renders write an intermediate `.mp4`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info};
use vlog_models::RenderSettings;

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// Fixed encoder bitrate.
const BITRATE: &str = "15M";

/// Synchronous frame-by-frame encoder.
pub struct EncoderSink {
    /// Present until the sink is closed or aborted
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    frame_size: usize,
    frames_written: u64,
}

/// Build the full FFmpeg argument list for the encoder process.
///
/// Split out of `spawn` so the configuration is testable without FFmpeg.
pub(crate) fn encoder_args(settings: &RenderSettings, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", settings.width, settings.height),
        "-r".into(),
        settings.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-c:v".into(),
        "h264_nvenc".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-b:v".into(),
        BITRATE.into(),
        "-rc".into(),
        "cbr".into(),
        "-rc-lookahead".into(),
        "0".into(),
        "-preset".into(),
        "p1".into(),
    ];

    // Elementary streams need the muxer forced; .mp4 is inferred.
    if output.extension().is_some_and(|e| e == "h264") {
        args.push("-f".into());
        args.push("h264".into());
    }

    args.push(output.to_string_lossy().to_string());
    args
}

impl EncoderSink {
    /// Spawn the encoder writing to `output`.
    pub fn spawn(settings: &RenderSettings, output: impl AsRef<Path>) -> MediaResult<Self> {
        let output = output.as_ref();
        check_ffmpeg()?;

        if let Some(parent) = output.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let args = encoder_args(settings, output);
        debug!("Starting encoder: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::encode_failed("encoder stdin not captured", None, None))?;

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            path: output.to_path_buf(),
            frame_size: settings.frame_size(),
            frames_written: 0,
        })
    }

    /// Feed one packed RGB24 frame; blocks while the encoder's pipe is full.
    pub fn write(&mut self, frame: &[u8]) -> MediaResult<()> {
        if frame.len() != self.frame_size {
            return Err(MediaError::FrameSize {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::encode_failed("encoder already closed", None, None))?;

        stdin.write_all(frame).map_err(|e| {
            MediaError::encode_failed(format!("encoder rejected frame: {e}"), None, None)
        })?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Close stdin, wait for the encoder to drain, and return the output path.
    pub fn close(mut self) -> MediaResult<PathBuf> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| MediaError::encode_failed("encoder already closed", None, None))?;

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(MediaError::encode_failed(
                "encoder exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ));
        }

        info!(path = %self.path.display(), frames = self.frames_written, "encoder finished");
        Ok(std::mem::take(&mut self.path))
    }

    /// Abort the run: close the input pipe, reap the process, remove the
    /// partial output.
    pub fn abort(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for EncoderSink {
    fn drop(&mut self) {
        // Normal shutdown goes through close()/abort(); this covers early
        // error returns so no encoder process or partial file is leaked.
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RenderSettings {
        RenderSettings::default()
    }

    #[test]
    fn encoder_uses_fixed_cbr_configuration() {
        let args = encoder_args(&settings(), Path::new("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-c:v h264_nvenc"));
        assert!(joined.contains("-b:v 15M"));
        assert!(joined.contains("-rc cbr"));
        assert!(joined.contains("-rc-lookahead 0"));
        assert!(joined.contains("-preset p1"));
        assert!(joined.contains("-s 1920x1080"));
        assert!(joined.contains("-r 25"));
    }

    #[test]
    fn elementary_stream_output_forces_h264_muxer() {
        let args = encoder_args(&settings(), Path::new("segments/segment_3.h264"));
        let f_positions: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-f")
            .map(|(i, _)| i)
            .collect();
        // rawvideo on the input side, h264 on the output side
        assert_eq!(f_positions.len(), 2);
        assert_eq!(args[f_positions[1] + 1], "h264");

        let mp4_args = encoder_args(&settings(), Path::new("out.mp4"));
        let count = mp4_args.iter().filter(|a| *a == "-f").count();
        assert_eq!(count, 1);
    }
}
