//! Frame selection planning.
//!
//! For each video the planner decides which frame numbers need a row in the
//! frame collection (`doc_frames`) and which need an image on disk
//! (`sample_frames`). Planning is pure apart from checking which frame
//! images already exist.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use vframe_media::{frame_path, sample_frames_uniform, ExtractionPlan};
use vframe_models::{FrameNumber, FrameSelection, SamplingParams, VideoRecord};

/// Planner output for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    /// Frame numbers needing a frame row, in ascending order
    pub doc_frames: Vec<FrameNumber>,
    /// Frames needing extraction
    pub sample_frames: FrameSelection,
}

impl FramePlan {
    /// Log the extraction decision for a video.
    pub fn log_summary(&self, video: &VideoRecord) {
        let total = video
            .total_frame_count()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        match &self.sample_frames {
            FrameSelection::All => {
                info!(video = %video.filepath, "Must sample all {} frames", total)
            }
            FrameSelection::Only(frames) => info!(
                video = %video.filepath,
                "Must sample {}/{} frames",
                frames.len(),
                total
            ),
            FrameSelection::Nothing => {
                info!(video = %video.filepath, "Required frames already present")
            }
        }
    }
}

/// Plan a video, checking the frames directory for existing images.
pub fn plan_frames(video: &VideoRecord, params: &SamplingParams, frames_pattern: &str) -> FramePlan {
    plan_frames_with(video, params, |n| frame_path(&video.filepath, frames_pattern, n).is_file())
}

/// Plan a video. `is_extracted` reports whether a frame image exists.
pub fn plan_frames_with<F>(video: &VideoRecord, params: &SamplingParams, is_extracted: F) -> FramePlan
where
    F: Fn(FrameNumber) -> bool,
{
    let total = video.total_frame_count();

    let target: Option<Vec<FrameNumber>> = if params.is_rate_limited() {
        sample_frames_uniform(video.frame_rate(), total, video.support, params.fps, params.max_fps)
    } else {
        video.support.map(|s| s.frame_numbers())
    };

    let mut doc_frames: Vec<FrameNumber> = match (&target, total) {
        (Some(frames), _) => frames.clone(),
        // Unknown frame count: never invent frames beyond the known ones
        (None, None) => video.frames.keys().copied().collect(),
        (None, Some(total)) => (1..=u32::try_from(total).unwrap_or(u32::MAX)).collect(),
    };

    if params.sparse {
        doc_frames.retain(|n| video.frames.contains_key(n));
    }

    if !params.sample_frames || doc_frames.is_empty() {
        return FramePlan {
            doc_frames,
            sample_frames: FrameSelection::Nothing,
        };
    }

    let all_frames = !params.sparse && video.support.is_none() && target.is_none();

    let sample_frames = if params.force_sample {
        if all_frames {
            FrameSelection::All
        } else {
            FrameSelection::from_frames(doc_frames.iter().copied())
        }
    } else {
        let missing: Vec<FrameNumber> = doc_frames.iter().copied().filter(|n| !is_extracted(*n)).collect();
        if all_frames && missing.len() == doc_frames.len() {
            FrameSelection::All
        } else {
            FrameSelection::from_frames(missing)
        }
    };

    FramePlan {
        doc_frames,
        sample_frames,
    }
}

#[derive(Debug, Clone)]
struct PathRequest {
    frames: FrameSelection,
    frame_size: Option<(u32, u32)>,
}

/// Accumulates plans across the videos of one build.
///
/// Clip records may share a video file. With deduplication enabled each
/// frame number of a file is emitted as a row at most once, and extraction
/// requests for a file are unioned into a single plan.
#[derive(Debug, Clone, Default)]
pub struct PlanAccumulator {
    dedupe_rows: bool,
    seen: HashMap<String, BTreeSet<FrameNumber>>,
    order: Vec<String>,
    requests: HashMap<String, PathRequest>,
}

impl PlanAccumulator {
    pub fn new(dedupe_rows: bool) -> Self {
        Self {
            dedupe_rows,
            ..Default::default()
        }
    }

    /// Frame numbers of `frames` not yet emitted as rows for `path`.
    pub fn claim_rows(&mut self, path: &str, frames: &[FrameNumber]) -> Vec<FrameNumber> {
        if !self.dedupe_rows {
            return frames.to_vec();
        }
        let seen = self.seen.entry(path.to_string()).or_default();
        frames.iter().copied().filter(|n| seen.insert(*n)).collect()
    }

    /// Add an extraction selection for `path`.
    pub fn request(&mut self, path: &str, frames: FrameSelection, frame_size: Option<(u32, u32)>) {
        if frames.is_nothing() {
            return;
        }
        match self.requests.get_mut(path) {
            Some(request) => {
                request.frames.merge(frames);
                request.frame_size = request.frame_size.or(frame_size);
            }
            None => {
                self.order.push(path.to_string());
                self.requests
                    .insert(path.to_string(), PathRequest { frames, frame_size });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// One extraction plan per path, in order of first request.
    pub fn into_plans(mut self) -> Vec<ExtractionPlan> {
        self.order
            .iter()
            .filter_map(|path| {
                let request = self.requests.remove(path)?;
                Some(ExtractionPlan {
                    video_path: path.clone(),
                    frames: request.frames,
                    frame_size: request.frame_size,
                })
            })
            .collect()
    }
}
