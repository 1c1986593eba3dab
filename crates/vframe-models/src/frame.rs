//! Frame rows of a derived frame collection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::ids::{RowId, VideoId};
use crate::Document;

/// 1-based frame number within a video.
pub type FrameNumber = u32;

/// Database field names shared by frame rows and source frame documents.
pub mod fields {
    pub const ID: &str = "_id";
    pub const SAMPLE_ID: &str = "_sample_id";
    pub const FRAME_NUMBER: &str = "frame_number";
    pub const FILEPATH: &str = "filepath";
    pub const TAGS: &str = "tags";
    pub const METADATA: &str = "metadata";
    pub const MEDIA_TYPE: &str = "_media_type";
    pub const RAND: &str = "_rand";

    /// Prefix addressing frame-level fields from the video collection.
    pub const FRAMES_PREFIX: &str = "frames.";

    /// Database fields every frame row carries. Never synced as user data.
    pub const FRAME_ROW_DEFAULTS: &[&str] = &[
        ID,
        FILEPATH,
        TAGS,
        METADATA,
        MEDIA_TYPE,
        RAND,
        SAMPLE_ID,
        FRAME_NUMBER,
    ];

    /// Composite key joining frame rows to source frame documents.
    pub const FRAME_KEY: &[&str] = &[SAMPLE_ID, FRAME_NUMBER];

    pub fn is_frame_row_default(name: &str) -> bool {
        FRAME_ROW_DEFAULTS.contains(&name)
    }
}

/// One row of a frame collection: a single frame of a single video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    #[serde(rename = "_id")]
    pub id: RowId,

    /// Owning video ID
    #[serde(rename = "_sample_id")]
    pub sample_id: VideoId,

    pub frame_number: FrameNumber,

    /// Extracted image path, or the video path when frames are not sampled
    pub filepath: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub metadata: Option<Value>,

    #[serde(rename = "_media_type", default = "default_media_type")]
    pub media_type: String,

    #[serde(rename = "_rand", default)]
    pub rand: f64,

    /// Frame-level fields beyond the defaults (labels etc.)
    #[serde(flatten)]
    pub fields: Document,
}

fn default_media_type() -> String {
    "image".to_string()
}

impl FrameRow {
    /// Build a stub row for a frame that has no frame-level data yet.
    pub fn stub(
        id: RowId,
        sample_id: VideoId,
        frame_number: FrameNumber,
        filepath: impl Into<String>,
        tags: Vec<String>,
        rand: f64,
    ) -> Self {
        Self {
            id,
            sample_id,
            frame_number,
            filepath: filepath.into(),
            tags,
            metadata: None,
            media_type: default_media_type(),
            rand,
            fields: Document::new(),
        }
    }

    /// Parse a row from a raw document.
    pub fn from_document(doc: Document) -> ModelResult<Self> {
        serde_json::from_value(Value::Object(doc)).map_err(ModelError::from)
    }

    /// Serialize the row into a raw document.
    pub fn to_document(&self) -> ModelResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            other => Err(ModelError::invalid_document(format!(
                "frame row serialized to non-object: {}",
                other
            ))),
        }
    }

    /// Get a frame-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a frame-level field. Default fields are rejected.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> ModelResult<()> {
        let field = field.into();
        if fields::is_frame_row_default(&field) {
            return Err(ModelError::invalid_document(format!(
                "'{}' is a default frame field",
                field
            )));
        }
        self.fields.insert(field, value);
        Ok(())
    }

    /// Frame-level values that differ from the default row shape.
    pub fn user_fields(&self) -> Document {
        self.fields
            .iter()
            .filter(|(k, _)| !fields::is_frame_row_default(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> FrameRow {
        FrameRow::stub(
            RowId::from("r1"),
            VideoId::from("v1"),
            4,
            "/videos/a/000004.jpg",
            vec!["train".to_string()],
            0.25,
        )
    }

    #[test]
    fn test_document_uses_db_field_names() {
        let doc = row().to_document().unwrap();
        assert_eq!(doc["_id"], json!("r1"));
        assert_eq!(doc["_sample_id"], json!("v1"));
        assert_eq!(doc["frame_number"], json!(4));
        assert_eq!(doc["_media_type"], json!("image"));
        assert_eq!(doc["metadata"], Value::Null);
    }

    #[test]
    fn test_extra_fields_are_flattened() {
        let mut row = row();
        row.set("labels", json!({"label": "cat"})).unwrap();

        let doc = row.to_document().unwrap();
        assert_eq!(doc["labels"], json!({"label": "cat"}));

        let parsed = FrameRow::from_document(doc).unwrap();
        assert_eq!(parsed.get("labels"), Some(&json!({"label": "cat"})));
        assert_eq!(parsed.user_fields().len(), 1);
    }

    #[test]
    fn test_default_fields_cannot_be_set() {
        let mut row = row();
        assert!(row.set("frame_number", json!(9)).is_err());
        assert!(row.set("_sample_id", json!("x")).is_err());
    }
}
