//! Document store abstraction.
//!
//! This crate provides:
//! - The `DocumentStore` trait with bulk insert, keyed upsert-merge and
//!   collection replace primitives
//! - Pipeline stage and filter types
//! - `MemoryStore`, an in-process backend enforcing unique indexes
//! - `SchemaCatalog`, per-collection field schema persistence
//! - Operation metrics

pub mod catalog;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod store;
pub mod types;

pub use catalog::SchemaCatalog;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::DocumentStore;
pub use types::{Condition, Filter, IndexSpec, MergeSpec, Stage, Update, WhenMatched, WhenNotMatched};
pub use vframe_models::Document;
