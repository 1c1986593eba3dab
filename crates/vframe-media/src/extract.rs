//! Frame extraction.
//!
//! A [`FrameExtractor`] writes the frames selected for each video into a
//! per-video directory: the video path without its extension, with one image
//! per frame named by a printf-style pattern such as `%06d.jpg`.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use vframe_models::{format_frame_pattern, has_frame_directive, ExtractionParams, FrameNumber, FrameSelection};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_dir, file_exists, move_file};
use crate::size::{compute_output_size, scale_filter};

/// Directory receiving explicitly selected frames before renaming.
const STAGING_DIR: &str = ".staging";

/// Pattern used inside the staging directory.
const STAGING_SEQUENCE: &str = "%08d";

/// Longest `select` expression passed in one FFmpeg argument; Linux caps
/// a single argument at 128 KiB.
const MAX_SELECT_BYTES: usize = 32 * 1024;

/// JPEG quality scale passed to FFmpeg.
const JPEG_QUALITY: u8 = 2;

/// Frames to extract from one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionPlan {
    pub video_path: String,

    pub frames: FrameSelection,

    /// Native `(width, height)`, used to resolve relative output sizes
    #[serde(default)]
    pub frame_size: Option<(u32, u32)>,
}

impl ExtractionPlan {
    pub fn new(video_path: impl Into<String>, frames: FrameSelection) -> Self {
        Self {
            video_path: video_path.into(),
            frames,
            frame_size: None,
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }
}

/// A batch of per-video plans sharing sizing and naming parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub plans: Vec<ExtractionPlan>,

    /// Image file pattern, e.g. `%06d.jpg`
    pub frames_pattern: String,

    pub params: ExtractionParams,
}

impl ExtractionRequest {
    /// Total explicitly requested frames, and the number of videos whose
    /// frames are all requested.
    pub fn frame_counts(&self) -> (usize, usize) {
        self.plans.iter().fold((0, 0), |(only, all), plan| match &plan.frames {
            FrameSelection::Only(frames) => (only + frames.len(), all),
            FrameSelection::All => (only, all + 1),
            FrameSelection::Nothing => (only, all),
        })
    }
}

/// Directory holding the extracted frames of a video.
pub fn frames_output_dir(video_path: impl AsRef<Path>) -> PathBuf {
    video_path.as_ref().with_extension("")
}

/// Image path of one extracted frame.
pub fn frame_path(video_path: impl AsRef<Path>, frames_pattern: &str, frame_number: FrameNumber) -> PathBuf {
    frames_output_dir(video_path).join(format_frame_pattern(frames_pattern, frame_number))
}

/// Writes frame images for a batch of videos.
///
/// Implementations block until every plan of the request has completed.
/// Unless `params.force` is set, frames whose image already exists are
/// skipped.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> MediaResult<()>;
}

/// `FrameExtractor` running one FFmpeg process per video.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    runner: FfmpegRunner,
    max_parallel: usize,
}

impl FfmpegFrameExtractor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            runner: FfmpegRunner::new(),
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    fn base_command(&self, plan: &ExtractionPlan, output: impl AsRef<Path>) -> FfmpegCommand {
        FfmpegCommand::new(&plan.video_path, output)
            .start_number(1)
            .passthrough_timestamps()
            .quality(JPEG_QUALITY)
    }

    async fn extract_video(
        &self,
        plan: &ExtractionPlan,
        frames_pattern: &str,
        params: &ExtractionParams,
    ) -> MediaResult<()> {
        let output_dir = frames_output_dir(&plan.video_path);
        ensure_dir(&output_dir).await?;
        let scale = compute_output_size(plan.frame_size, params).map(scale_filter);

        let frames = match &plan.frames {
            FrameSelection::Nothing => return Ok(()),
            FrameSelection::All => {
                let mut cmd = self.base_command(plan, output_dir.join(frames_pattern));
                if let Some(filter) = scale {
                    cmd = cmd.video_filter(filter);
                }
                self.runner.run(&cmd).await?;
                info!(video = %plan.video_path, "Extracted all frames");
                return Ok(());
            }
            FrameSelection::Only(frames) => frames,
        };

        let mut pending = Vec::with_capacity(frames.len());
        for &n in frames {
            let path = output_dir.join(format_frame_pattern(frames_pattern, n));
            if params.force || !file_exists(&path).await {
                pending.push((n, path));
            }
        }
        if pending.is_empty() {
            debug!(video = %plan.video_path, "Requested frames already extracted");
            return Ok(());
        }

        let ext = Path::new(frames_pattern)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let staged_pattern = format!("{}.{}", STAGING_SEQUENCE, ext);
        let staging = output_dir.join(STAGING_DIR);

        let numbers: Vec<FrameNumber> = pending.iter().map(|(n, _)| *n).collect();
        let mut done = 0;
        for batch in select_batches(&numbers, MAX_SELECT_BYTES) {
            let chunk = &pending[done..done + batch.frames];
            let filter = match &scale {
                Some(scale) => format!("select={},{}", batch.expr, scale),
                None => format!("select={}", batch.expr),
            };
            self.extract_staged(plan, &staging, &staged_pattern, filter, chunk)
                .await?;
            done += batch.frames;
        }

        info!(video = %plan.video_path, frames = pending.len(), "Extracted frames");
        Ok(())
    }

    /// One FFmpeg run writing `chunk` into a fresh staging directory, then
    /// renaming each image into place.
    async fn extract_staged(
        &self,
        plan: &ExtractionPlan,
        staging: &Path,
        staged_pattern: &str,
        filter: String,
        chunk: &[(FrameNumber, PathBuf)],
    ) -> MediaResult<()> {
        if tokio::fs::metadata(staging).await.is_ok() {
            tokio::fs::remove_dir_all(staging).await?;
        }
        ensure_dir(staging).await?;

        let cmd = self
            .base_command(plan, staging.join(staged_pattern))
            .video_filter(filter);
        let result = match self.runner.run(&cmd).await {
            Ok(()) => rename_staged(&plan.video_path, staging, staged_pattern, chunk).await,
            Err(e) => Err(e),
        };
        if let Err(e) = tokio::fs::remove_dir_all(staging).await {
            debug!("Failed to clean {}: {}", staging.display(), e);
        }
        result
    }
}

/// One `select` expression and the number of frames it picks.
#[derive(Debug, Clone, PartialEq)]
struct SelectBatch {
    expr: String,
    frames: usize,
}

/// Split ascending frame numbers into `select` expressions of at most
/// `max_bytes` each.
///
/// Consecutive runs collapse into one `between` term. FFmpeg counts frames
/// from 0.
fn select_batches(frames: &[FrameNumber], max_bytes: usize) -> Vec<SelectBatch> {
    let mut terms: Vec<(String, usize)> = Vec::new();
    let mut i = 0;
    while i < frames.len() {
        let mut j = i;
        while j + 1 < frames.len() && frames[j].checked_add(1) == Some(frames[j + 1]) {
            j += 1;
        }
        let (first, last) = (frames[i].saturating_sub(1), frames[j].saturating_sub(1));
        let term = if first == last {
            format!("eq(n\\,{})", first)
        } else {
            format!("between(n\\,{}\\,{})", first, last)
        };
        terms.push((term, j - i + 1));
        i = j + 1;
    }

    let mut batches: Vec<SelectBatch> = Vec::new();
    for (term, count) in terms {
        match batches.last_mut() {
            Some(batch) if batch.expr.len() + 1 + term.len() <= max_bytes => {
                batch.expr.push('+');
                batch.expr.push_str(&term);
                batch.frames += count;
            }
            _ => batches.push(SelectBatch { expr: term, frames: count }),
        }
    }
    batches
}

/// Move the `i`-th staged image to the path of the `i`-th pending frame.
async fn rename_staged(
    video_path: &str,
    staging: &Path,
    staged_pattern: &str,
    pending: &[(FrameNumber, PathBuf)],
) -> MediaResult<()> {
    for (i, (n, dst)) in pending.iter().enumerate() {
        let src = staging.join(format_frame_pattern(staged_pattern, i as u32 + 1));
        if !file_exists(&src).await {
            return Err(MediaError::extraction_failed(
                video_path,
                format!("frame {} was not written", n),
            ));
        }
        move_file(&src, dst).await?;
    }
    Ok(())
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> MediaResult<()> {
        if !has_frame_directive(&request.frames_pattern) {
            return Err(MediaError::InvalidPattern(request.frames_pattern.clone()));
        }

        let plans: Vec<&ExtractionPlan> = request
            .plans
            .iter()
            .filter(|p| !p.frames.is_nothing())
            .collect();
        let semaphore = Semaphore::new(self.max_parallel);
        let semaphore = &semaphore;

        let futures: Vec<_> = plans
            .iter()
            .map(|plan| async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| MediaError::internal("extraction semaphore closed"))?;
                self.extract_video(plan, &request.frames_pattern, &request.params)
                    .await
            })
            .collect();

        let results = join_all(futures).await;

        let mut first_error = None;
        for (plan, result) in plans.iter().zip(results) {
            if let Err(e) = result {
                warn!(video = %plan.video_path, "Frame extraction failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        assert_eq!(frames_output_dir("/data/videos/a.mp4"), PathBuf::from("/data/videos/a"));
        assert_eq!(
            frame_path("/data/videos/a.mp4", "%06d.jpg", 12),
            PathBuf::from("/data/videos/a/000012.jpg")
        );
    }

    #[test]
    fn test_frame_counts() {
        let request = ExtractionRequest {
            plans: vec![
                ExtractionPlan::new("a.mp4", FrameSelection::from_frames([1, 2, 3])),
                ExtractionPlan::new("b.mp4", FrameSelection::All),
                ExtractionPlan::new("c.mp4", FrameSelection::Nothing),
            ],
            frames_pattern: "%06d.jpg".into(),
            params: ExtractionParams::default(),
        };
        assert_eq!(request.frame_counts(), (3, 1));
    }

    #[test]
    fn test_select_collapses_runs() {
        let batches = select_batches(&[1, 2, 3, 7, 9, 10], MAX_SELECT_BYTES);
        assert_eq!(
            batches,
            vec![SelectBatch {
                expr: "between(n\\,0\\,2)+eq(n\\,6)+between(n\\,8\\,9)".into(),
                frames: 6,
            }]
        );
    }

    #[test]
    fn test_large_selection_is_split_into_bounded_filters() {
        // 5 fps out of a one hour 30 fps video
        let frames: Vec<FrameNumber> = (0..18_000).map(|i| 1 + i * 6).collect();
        let batches = select_batches(&frames, MAX_SELECT_BYTES);

        assert!(batches.len() > 1);
        assert!(batches.iter().all(|b| b.expr.len() <= MAX_SELECT_BYTES));
        assert_eq!(batches.iter().map(|b| b.frames).sum::<usize>(), frames.len());

        let args = FfmpegCommand::new("long.mp4", "%08d.jpg")
            .video_filter(format!("select={}", batches[0].expr))
            .to_args();
        assert!(args.iter().all(|a| a.len() < 128 * 1024));
    }

    #[tokio::test]
    async fn test_existing_frames_are_skipped_without_ffmpeg() {
        let dir = tempfile::TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        let frames_dir = frames_output_dir(&video);
        tokio::fs::create_dir_all(&frames_dir).await.unwrap();
        for n in [1u32, 2] {
            tokio::fs::write(frames_dir.join(format_frame_pattern("%06d.jpg", n)), b"")
                .await
                .unwrap();
        }

        let request = ExtractionRequest {
            plans: vec![ExtractionPlan::new(
                video.to_string_lossy(),
                FrameSelection::from_frames([1, 2]),
            )],
            frames_pattern: "%06d.jpg".into(),
            params: ExtractionParams::default(),
        };

        // Every frame exists, so no FFmpeg process is started
        tokio_test::assert_ok!(FfmpegFrameExtractor::new(2).extract(&request).await);
    }

    #[tokio::test]
    async fn test_rejects_pattern_without_directive() {
        let request = ExtractionRequest {
            plans: vec![],
            frames_pattern: "frame.jpg".into(),
            params: ExtractionParams::default(),
        };
        let result = FfmpegFrameExtractor::new(1).extract(&request).await;
        assert!(matches!(result, Err(MediaError::InvalidPattern(_))));
    }
}
