//! Shared data models for the vframe engine.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their per-frame rows
//! - Field schemas and protected field sets
//! - Sampling and extraction parameters
//! - Frame selections and sync scopes
//! - Frame image naming patterns

pub mod error;
pub mod frame;
pub mod ids;
pub mod naming;
pub mod sampling;
pub mod schema;
pub mod sync;
pub mod video;

/// A raw document as stored in the backing document store.
pub type Document = serde_json::Map<String, serde_json::Value>;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use frame::{FrameNumber, FrameRow};
pub use ids::{RowId, VideoId};
pub use naming::{format_frame_pattern, has_frame_directive, DEFAULT_FRAMES_PATTERN};
pub use sampling::{ExtractionParams, FrameSelection, ImageSize, SamplingParams};
pub use schema::{FieldKind, FieldSchema, FieldType};
pub use sync::SyncScope;
pub use video::{MediaType, Support, VideoMetadata, VideoRecord};
