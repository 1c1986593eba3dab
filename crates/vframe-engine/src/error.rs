//! Engine error types.

use thiserror::Error;

use vframe_media::MediaError;
use vframe_models::{MediaType, ModelError, SyncScope};
use vframe_store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Collection '{collection}' has media type {found}; frames can only be built from video collections")]
    InvalidCollectionType { collection: String, found: MediaType },

    /// A bulk write hit a unique index. `message` is the store's own text.
    #[error("Failed to populate {collection}: {message}")]
    SchemaOrUniquenessViolation {
        collection: String,
        message: String,
        #[source]
        source: StoreError,
    },

    #[error("Sync failed ({scope}): {source}")]
    SyncFailed {
        scope: SyncScope,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Frames view is not built: {0}")]
    NotBuilt(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn not_built(msg: impl Into<String>) -> Self {
        Self::NotBuilt(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach the scope of a failed sync call.
    pub fn sync_failed(scope: &SyncScope, source: EngineError) -> Self {
        Self::SyncFailed {
            scope: scope.clone(),
            source: Box::new(source),
        }
    }

    /// Map a bulk insert failure, keeping duplicate key diagnostics intact.
    pub fn from_insert(collection: &str, err: StoreError) -> Self {
        if err.is_duplicate_key() {
            Self::SchemaOrUniquenessViolation {
                collection: collection.to_string(),
                message: err.to_string(),
                source: err,
            }
        } else {
            Self::Store(err)
        }
    }

    /// Scope of the sync call that failed, if any.
    pub fn sync_scope(&self) -> Option<&SyncScope> {
        match self {
            EngineError::SyncFailed { scope, .. } => Some(scope),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidParams(errors.to_string())
    }
}
