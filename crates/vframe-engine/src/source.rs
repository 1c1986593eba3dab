//! The source collection a frame collection is built from.

use async_trait::async_trait;

use vframe_models::{Document, FieldSchema, FieldType, FrameNumber, MediaType, VideoId, VideoRecord};
use vframe_store::Stage;

use crate::error::EngineResult;

/// A video-level collection whose frames are materialized into a frame
/// collection and kept in sync with it.
#[async_trait]
pub trait SourceCollection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    fn media_type(&self) -> MediaType;

    /// True if records are clips (sub-ranges of a parent video).
    fn is_clips(&self) -> bool;

    /// Compute missing per-video metadata (frame rate, frame count).
    async fn compute_metadata(&self) -> EngineResult<()>;

    /// All records in a stable order, with their known frames attached.
    async fn videos(&self) -> EngineResult<Vec<VideoRecord>>;

    /// Store collection holding the source's frame documents.
    fn frame_collection(&self) -> &str;

    /// Stages selecting this collection's frame documents from
    /// [`frame_collection`](Self::frame_collection).
    async fn frame_rows_pipeline(&self) -> EngineResult<Vec<Stage>>;

    /// Schema of the frame-level namespace.
    async fn frame_field_schema(&self) -> EngineResult<FieldSchema>;

    /// Declare a frame field. Returns false if it already existed.
    async fn add_frame_field(&self, name: &str, field: &FieldType) -> EngineResult<bool>;

    /// Delete a frame field and its values. Returns false if it did not exist.
    async fn remove_frame_field(&self, name: &str) -> EngineResult<bool>;

    /// Set fields on the frame keyed by `(sample_id, frame_number)`. Returns
    /// the number of matched frames.
    async fn update_frame(
        &self,
        sample_id: &VideoId,
        frame_number: FrameNumber,
        set: Document,
    ) -> EngineResult<u64>;

    /// Delete labels by id. `fields` are namespaced (`frames.<field>` for
    /// frame-level fields); `None` means every label field.
    async fn delete_labels(&self, ids: &[String], fields: Option<&[String]>) -> EngineResult<()>;

    /// Refresh the collection from the store.
    async fn reload(&self) -> EngineResult<()>;
}
