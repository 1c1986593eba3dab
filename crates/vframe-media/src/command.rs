//! FFmpeg invocations for frame extraction.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Bytes of FFmpeg's stderr kept when a run fails.
const STDERR_KEEP: usize = 4096;

/// An FFmpeg call that decodes one video into an image sequence.
///
/// Options are appended in call order after the input; the output pattern
/// always comes last.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    video: PathBuf,
    pattern: PathBuf,
    options: Vec<(String, String)>,
}

impl FfmpegCommand {
    pub fn new(video: impl AsRef<Path>, pattern: impl AsRef<Path>) -> Self {
        Self {
            video: video.as_ref().to_path_buf(),
            pattern: pattern.as_ref().to_path_buf(),
            options: Vec::new(),
        }
    }

    fn option(mut self, flag: &str, value: impl ToString) -> Self {
        self.options.push((flag.to_string(), value.to_string()));
        self
    }

    /// Filter graph applied to the decoded frames.
    pub fn video_filter(self, graph: impl Into<String>) -> Self {
        self.option("-vf", graph.into())
    }

    /// Index substituted into the pattern for the first written image.
    pub fn start_number(self, first: u32) -> Self {
        self.option("-start_number", first)
    }

    /// Emit decoded frames one-to-one.
    pub fn passthrough_timestamps(self) -> Self {
        self.option("-vsync", 0)
    }

    /// JPEG `-q:v` scale, 2 being the best quality.
    pub fn quality(self, scale: u8) -> Self {
        self.option("-q:v", scale)
    }

    pub fn video(&self) -> &Path {
        &self.video
    }

    pub fn pattern(&self) -> &Path {
        &self.pattern
    }

    /// Full argument list, without the program name.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            self.video.to_string_lossy().into_owned(),
        ];
        for (flag, value) in &self.options {
            args.push(flag.clone());
            args.push(value.clone());
        }
        args.push(self.pattern.to_string_lossy().into_owned());
        args
    }
}

/// Spawns FFmpeg and waits for it, optionally bounded by a deadline.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    deadline: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill runs that exceed `secs` seconds.
    pub fn with_timeout(self, secs: u64) -> Self {
        Self {
            deadline: Some(Duration::from_secs(secs)),
        }
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let program = check_ffmpeg()?;
        let args = cmd.to_args();
        debug!(video = %cmd.video().display(), "ffmpeg {}", args.join(" "));

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let waiting = child.wait_with_output();
        let output = match self.deadline {
            None => waiting.await?,
            Some(limit) => match tokio::time::timeout(limit, waiting).await {
                Ok(done) => done?,
                Err(_) => {
                    warn!(video = %cmd.video().display(), "FFmpeg exceeded {:?}, killed", limit);
                    return Err(MediaError::Timeout(limit.as_secs()));
                }
            },
        };

        if output.status.success() {
            return Ok(());
        }
        Err(MediaError::ffmpeg_failed(
            format!("extraction from {} failed", cmd.video().display()),
            Some(last_bytes(&output.stderr)),
            output.status.code(),
        ))
    }
}

fn last_bytes(stderr: &[u8]) -> String {
    let from = stderr.len().saturating_sub(STDERR_KEEP);
    String::from_utf8_lossy(&stderr[from..]).trim().to_string()
}

/// Locate the `ffmpeg` binary on `PATH`.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Locate the `ffprobe` binary on `PATH`.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_args() {
        let args = FfmpegCommand::new("input.mp4", "/frames/input/%06d.jpg")
            .start_number(1)
            .video_filter("scale=640:-2")
            .quality(2)
            .to_args();

        assert_eq!(&args[..3], ["-y", "-loglevel", "error"]);
        assert!(args.windows(2).any(|w| w == ["-i", "input.mp4"]));
        assert!(args.windows(2).any(|w| w == ["-start_number", "1"]));
        assert!(args.windows(2).any(|w| w == ["-vf", "scale=640:-2"]));
        assert_eq!(args.last().map(String::as_str), Some("/frames/input/%06d.jpg"));
    }

    #[test]
    fn test_options_follow_input() {
        let args = FfmpegCommand::new("in.mp4", "out.jpg").passthrough_timestamps().to_args();
        let input = args.iter().position(|a| a == "-i").unwrap();
        let vsync = args.iter().position(|a| a == "-vsync").unwrap();
        assert!(input < vsync);
    }

    #[test]
    fn test_last_bytes_truncates() {
        let long = vec![b'x'; STDERR_KEEP + 100];
        assert_eq!(last_bytes(&long).len(), STDERR_KEEP);
        assert_eq!(last_bytes(b"  boom \n"), "boom");
    }
}
