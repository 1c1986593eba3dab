//! Video metadata from `ffprobe`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use vframe_models::VideoMetadata;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// What `ffprobe` reports about the first video stream of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Seconds; 0 when neither the stream nor the container declares it
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    /// `nb_frames`, or duration times fps when the container has no index
    pub frame_count: Option<u64>,
    pub codec: String,
}

impl VideoInfo {
    pub fn to_metadata(&self) -> VideoMetadata {
        let positive_u32 = |v: u32| (v > 0).then_some(v);
        VideoMetadata {
            frame_rate: self.fps,
            total_frame_count: self.frame_count,
            duration: (self.duration > 0.0).then_some(self.duration),
            frame_width: positive_u32(self.width),
            frame_height: positive_u32(self.height),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: ProbeContainer,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeContainer {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

impl ProbeStream {
    fn rate(&self) -> Option<f64> {
        [&self.avg_frame_rate, &self.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|r| parse_frame_rate(r))
    }

    fn indexed_frames(&self) -> Option<u64> {
        self.nb_frames
            .as_deref()
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|&n| n > 0)
    }
}

/// Run `ffprobe` on a video file.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = Command::new(check_ffprobe()?)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("could not read {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        });
    }
    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let report: ProbeReport = serde_json::from_slice(stdout)?;
    let stream = report
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("no video stream".to_string()))?;

    let duration = [&stream.duration, &report.format.duration]
        .into_iter()
        .flatten()
        .find_map(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let fps = stream.rate();
    let frame_count = stream.indexed_frames().or_else(|| {
        fps.filter(|_| duration > 0.0)
            .map(|fps| (duration * fps).round() as u64)
    });

    Ok(VideoInfo {
        duration,
        width: stream.width.unwrap_or_default(),
        height: stream.height.unwrap_or_default(),
        fps,
        frame_count,
        codec: stream.codec_name.clone().unwrap_or_default(),
    })
}

/// `"30000/1001"` or `"29.97"`. Zero or malformed rates are unknown.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let (num, den) = (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?);
            if den <= 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse::<f64>().ok()?,
    };
    (value > 0.0).then_some(value)
}

/// Source of per-video media metadata.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, filepath: &str) -> MediaResult<VideoMetadata>;
}

/// `MetadataProbe` backed by the `ffprobe` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeMetadata;

#[async_trait]
impl MetadataProbe for FfprobeMetadata {
    async fn probe(&self, filepath: &str) -> MediaResult<VideoMetadata> {
        Ok(probe_video(filepath).await?.to_metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(rate: &str) -> f64 {
        parse_frame_rate(rate).unwrap()
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((approx("30/1") - 30.0).abs() < 0.01);
        assert!((approx("30000/1001") - 29.97).abs() < 0.01);
        assert!((approx("29.97") - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
        assert!(parse_frame_rate("0/1").is_none());
        assert!(parse_frame_rate("abc").is_none());
    }

    #[test]
    fn test_indexed_frame_count() {
        let json = br#"{
            "format": {"duration": "10.0"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 640, "height": 360,
                 "avg_frame_rate": "10/1", "nb_frames": "100"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_count, Some(100));
        assert_eq!(info.fps, Some(10.0));

        let metadata = info.to_metadata();
        assert_eq!(metadata.total_frame_count, Some(100));
        assert_eq!(metadata.frame_width, Some(640));
    }

    #[test]
    fn test_frame_count_from_duration() {
        let json = br#"{
            "format": {"duration": "4.0"},
            "streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.fps, Some(25.0));
        assert_eq!(info.frame_count, Some(100));
    }

    #[test]
    fn test_unknown_rate_leaves_count_unknown() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "video", "avg_frame_rate": "0/0"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.fps.is_none());
        assert!(info.frame_count.is_none());
        assert!(info.to_metadata().frame_width.is_none());
    }

    #[test]
    fn test_no_video_stream() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(parse_probe_output(json), Err(MediaError::InvalidVideo(_))));
    }
}
