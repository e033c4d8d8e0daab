//! FFmpeg command builder and blocking runner.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// One FFmpeg input with the arguments that precede its `-i`.
#[derive(Debug, Clone)]
struct InputSpec {
    args: Vec<String>,
    source: String,
}

/// Builder for FFmpeg commands with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<InputSpec>,
    /// Arguments collected for the next `input()` call
    pending_input_args: Vec<String>,
    /// Output arguments (after all inputs)
    output_args: Vec<String>,
    /// Output file path
    output: PathBuf,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            pending_input_args: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Queue an argument for the next input (placed before its `-i`).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.pending_input_args.push(arg.into());
        self
    }

    /// Add an input, consuming any queued input arguments.
    pub fn input(mut self, source: impl Into<String>) -> Self {
        self.inputs.push(InputSpec {
            args: std::mem::take(&mut self.pending_input_args),
            source: source.into(),
        });
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Map a stream from an input into the output.
    pub fn map(self, selector: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(selector)
    }

    /// Force the output container format.
    pub fn format(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(fmt)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.clone());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }

    /// Run to completion, capturing stderr for diagnostics.
    pub fn run(&self) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = self.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::mux_failed(
                "FFmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ))
        }
    }
}

/// Check that FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check that FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_input_command() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input("in.mp4")
            .video_codec("copy")
            .output_arg("-movflags")
            .output_arg("+faststart");

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "in.mp4");
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"copy".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn input_args_attach_to_their_input() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input("video.mp4")
            .input_arg("-stream_loop")
            .input_arg("-1")
            .input("bgm.mp3");

        let args = cmd.build_args();
        let loop_pos = args.iter().position(|a| a == "-stream_loop").unwrap();
        let first_i = args.iter().position(|a| a == "-i").unwrap();
        // The loop flag belongs to the second input, after the first -i.
        assert!(loop_pos > first_i);
        assert_eq!(args[loop_pos + 1], "-1");
        assert_eq!(args[loop_pos + 2], "-i");
        assert_eq!(args[loop_pos + 3], "bgm.mp3");
    }

    #[test]
    fn mapping_and_format_flags() {
        let args = FfmpegCommand::new("out.h264")
            .input("in.mp4")
            .map("0:v:0")
            .format("h264")
            .build_args();
        let m = args.iter().position(|a| a == "-map").unwrap();
        assert_eq!(args[m + 1], "0:v:0");
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "h264");
    }
}
