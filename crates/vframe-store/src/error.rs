//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("E11000 duplicate key error collection: {collection} index: {index} dup key: {key}")]
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] vframe_models::ModelError),
}

impl StoreError {
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    pub fn invalid_pipeline(msg: impl Into<String>) -> Self {
        Self::InvalidPipeline(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// True if the error was caused by a unique index violation.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_message() {
        let err = StoreError::DuplicateKey {
            collection: "frames".into(),
            index: "_sample_id_1_frame_number_1".into(),
            key: "{ _sample_id: \"a\", frame_number: 1 }".into(),
        };
        assert!(err.is_duplicate_key());
        assert!(err.to_string().starts_with("E11000 duplicate key error"));
        assert!(err.to_string().contains("_sample_id_1_frame_number_1"));
    }
}
