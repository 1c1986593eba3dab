//! Sampling and extraction parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::Validate;

use crate::frame::FrameNumber;

/// Image dimensions. A dimension of `-1` means "unconstrained" / "keep
/// aspect ratio".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ImageSize {
    #[validate(range(min = -1))]
    pub width: i32,
    #[validate(range(min = -1))]
    pub height: i32,
}

impl ImageSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Parameters forwarded to the frame extraction delegate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ExtractionParams {
    /// Exact output size
    #[serde(default)]
    #[validate(nested)]
    pub size: Option<ImageSize>,

    /// Minimum output size (aspect preserving upscale)
    #[serde(default)]
    #[validate(nested)]
    pub min_size: Option<ImageSize>,

    /// Maximum output size (aspect preserving downscale)
    #[serde(default)]
    #[validate(nested)]
    pub max_size: Option<ImageSize>,

    /// Re-extract frames even if their image files exist
    #[serde(default)]
    pub force: bool,
}

/// Parameters controlling which frames a frame collection materializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SamplingParams {
    /// Extract frame images to disk (otherwise rows point at the video)
    #[serde(default = "default_true")]
    pub sample_frames: bool,

    /// Naming pattern for extracted images, e.g. `%06d.jpg`
    #[serde(default)]
    pub frames_pattern: Option<String>,

    /// Sampling rate in frames per second
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0))]
    pub fps: Option<f64>,

    /// Maximum sampling rate; faster videos are downsampled
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0))]
    pub max_fps: Option<f64>,

    /// Only materialize frames that already have frame-level data
    #[serde(default)]
    pub sparse: bool,

    /// Re-extract frames whose images already exist
    #[serde(default)]
    pub force_sample: bool,

    /// Log per-video sampling decisions
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    #[validate(nested)]
    pub extraction: ExtractionParams,
}

fn default_true() -> bool {
    true
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            sample_frames: true,
            frames_pattern: None,
            fps: None,
            max_fps: None,
            sparse: false,
            force_sample: false,
            verbose: false,
            extraction: ExtractionParams::default(),
        }
    }
}

impl SamplingParams {
    /// True if a subsampling rate was requested.
    pub fn is_rate_limited(&self) -> bool {
        self.fps.is_some() || self.max_fps.is_some()
    }
}

/// Which frames of a video require on-disk extraction.
///
/// `All` and `Nothing` are distinct outcomes: `All` asks the extractor to
/// write every frame of the video, `Nothing` means no extraction at all.
/// `Only` never holds an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "frames", rename_all = "snake_case")]
pub enum FrameSelection {
    All,
    Only(BTreeSet<FrameNumber>),
    Nothing,
}

impl FrameSelection {
    /// Build an explicit selection; an empty input yields `Nothing`.
    pub fn from_frames<I: IntoIterator<Item = FrameNumber>>(frames: I) -> Self {
        let frames: BTreeSet<FrameNumber> = frames.into_iter().collect();
        if frames.is_empty() {
            FrameSelection::Nothing
        } else {
            FrameSelection::Only(frames)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FrameSelection::All)
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, FrameSelection::Nothing)
    }

    /// Explicit frame numbers, if this is an explicit selection.
    pub fn frames(&self) -> Option<&BTreeSet<FrameNumber>> {
        match self {
            FrameSelection::Only(frames) => Some(frames),
            _ => None,
        }
    }

    /// Sorted explicit frame numbers (empty for `All` and `Nothing`).
    pub fn to_vec(&self) -> Vec<FrameNumber> {
        self.frames()
            .map(|f| f.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Union another selection into this one. `All` absorbs everything.
    pub fn merge(&mut self, other: FrameSelection) {
        match other {
            FrameSelection::Nothing => {}
            FrameSelection::All => *self = FrameSelection::All,
            FrameSelection::Only(more) => match self {
                FrameSelection::All => {}
                FrameSelection::Nothing => *self = FrameSelection::Only(more),
                FrameSelection::Only(frames) => frames.extend(more),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_is_nothing() {
        assert_eq!(FrameSelection::from_frames(Vec::new()), FrameSelection::Nothing);
        assert!(FrameSelection::from_frames([3, 1]).frames().is_some());
    }

    #[test]
    fn test_merge_unions_explicit_frames() {
        let mut selection = FrameSelection::from_frames([1, 2, 3]);
        selection.merge(FrameSelection::from_frames([3, 4]));
        assert_eq!(selection.to_vec(), vec![1, 2, 3, 4]);

        selection.merge(FrameSelection::Nothing);
        assert_eq!(selection.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_all_absorbs() {
        let mut selection = FrameSelection::Nothing;
        selection.merge(FrameSelection::All);
        selection.merge(FrameSelection::from_frames([9]));
        assert!(selection.is_all());
    }

    #[test]
    fn test_validation_rejects_non_positive_fps() {
        let params = SamplingParams {
            fps: Some(0.0),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = SamplingParams {
            fps: Some(2.0),
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validation_checks_nested_sizes() {
        let params = SamplingParams {
            extraction: ExtractionParams {
                max_size: Some(ImageSize::new(-5, 100)),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
