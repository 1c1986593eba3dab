//! Video-level models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::frame::FrameNumber;
use crate::ids::{RowId, VideoId};

/// Media type of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive `[first, last]` frame range of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Support(pub FrameNumber, pub FrameNumber);

impl Support {
    pub fn new(first: FrameNumber, last: FrameNumber) -> Self {
        Self(first, last)
    }

    pub fn first(&self) -> FrameNumber {
        self.0
    }

    pub fn last(&self) -> FrameNumber {
        self.1
    }

    /// All frame numbers in the window, in order. Empty if `last < first`.
    pub fn frame_numbers(&self) -> Vec<FrameNumber> {
        (self.0..=self.1).collect()
    }

    pub fn contains(&self, frame_number: FrameNumber) -> bool {
        self.0 <= frame_number && frame_number <= self.1
    }
}

/// Media metadata computed for a video file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// Frames per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,

    /// Total number of frames, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frame_count: Option<u64>,

    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,
}

impl VideoMetadata {
    pub fn new(frame_rate: f64, total_frame_count: u64) -> Self {
        Self {
            frame_rate: Some(frame_rate),
            total_frame_count: Some(total_frame_count),
            ..Default::default()
        }
    }
}

/// One record of a video collection, as read by the frame builder.
///
/// For clip collections the record describes a sub-clip: `parent_id` points
/// at the video that owns the frames and `support` bounds the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Record ID (the clip ID for clip collections)
    pub id: VideoId,

    /// Owning video ID for clips
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<VideoId>,

    /// Path to the video file
    pub filepath: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub metadata: Option<VideoMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<Support>,

    /// Frame rows that already exist for this video, by frame number
    #[serde(default)]
    pub frames: BTreeMap<FrameNumber, RowId>,
}

impl VideoRecord {
    pub fn new(id: VideoId, filepath: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: None,
            filepath: filepath.into(),
            tags: Vec::new(),
            metadata: None,
            support: None,
            frames: BTreeMap::new(),
        }
    }

    /// ID of the video that owns this record's frames.
    pub fn owner_id(&self) -> &VideoId {
        self.parent_id.as_ref().unwrap_or(&self.id)
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.frame_rate)
    }

    pub fn total_frame_count(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.total_frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_serializes_as_pair() {
        let support = Support::new(3, 7);
        assert_eq!(serde_json::to_value(support).unwrap(), serde_json::json!([3, 7]));
        assert_eq!(support.frame_numbers(), vec![3, 4, 5, 6, 7]);
        assert!(Support::new(5, 4).frame_numbers().is_empty());
    }

    #[test]
    fn test_owner_id_prefers_parent() {
        let mut record = VideoRecord::new(VideoId::from("clip"), "/videos/a.mp4");
        assert_eq!(record.owner_id().as_str(), "clip");

        record.parent_id = Some(VideoId::from("video"));
        assert_eq!(record.owner_id().as_str(), "video");
    }
}
