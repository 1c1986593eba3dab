//! The document store interface.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{Filter, IndexSpec, Stage, Update};
use vframe_models::Document;

/// A document database exposing bulk, server-side primitives.
///
/// Every method is atomic per call: a failing call leaves the touched
/// collections exactly as they were. Documents are keyed by `_id`, which is
/// implicitly unique in every collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create an empty collection. Succeeds if it already exists.
    async fn create_collection(&self, name: &str) -> StoreResult<()>;

    /// Drop a collection and its indexes. Succeeds if it does not exist.
    async fn drop_collection(&self, name: &str) -> StoreResult<()>;

    async fn collection_exists(&self, name: &str) -> StoreResult<bool>;

    /// Create an index and return its name. Creating an existing index is a
    /// no-op; creating a unique index over duplicated data fails.
    async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<String>;

    /// Insert a batch of documents. The whole batch is rejected if any
    /// document violates a unique index.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<usize>;

    /// Documents matching a filter, in insertion order.
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Apply an update to the first matching document. Returns the number of
    /// matched documents (0 or 1).
    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64>;

    /// Replace the document with the given `_id`. Returns false if absent.
    async fn replace_one(&self, collection: &str, doc: Document) -> StoreResult<bool>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Run an aggregation pipeline over a collection.
    ///
    /// A pipeline ending in `Merge` or `Out` writes its output and returns no
    /// documents; otherwise the output documents are returned.
    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
}
