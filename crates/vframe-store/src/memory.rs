//! In-process document store.
//!
//! `MemoryStore` keeps every collection behind a single `RwLock`, so each
//! call observes and produces a consistent snapshot. Writes are staged on a
//! copy of the target collection and committed only after every unique
//! index has been checked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use vframe_models::{Document, RowId};

use crate::error::{StoreError, StoreResult};
use crate::metrics::{record_operation, record_written};
use crate::store::DocumentStore;
use crate::types::{Filter, IndexSpec, MergeSpec, Stage, Update, WhenMatched, WhenNotMatched};

#[derive(Debug, Clone, Default)]
struct MemoryCollection {
    docs: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

type Collections = HashMap<String, MemoryCollection>;

/// Document store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all collections, sorted.
    pub async fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Indexes defined on a collection.
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }
}

fn finish<T>(operation: &str, collection: &str, started: Instant, result: &StoreResult<T>) {
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    record_operation(operation, collection, result.is_ok(), latency_ms);
    if let Err(e) = result {
        debug!(operation, collection, "Store operation failed: {}", e);
    }
}

// =============================================================================
// Unique index enforcement
// =============================================================================

fn key_of(doc: &Document, keys: &[String]) -> Vec<Value> {
    keys.iter()
        .map(|k| doc.get(k).cloned().unwrap_or(Value::Null))
        .collect()
}

fn encode_key(key: &[Value]) -> StoreResult<String> {
    Ok(serde_json::to_string(key)?)
}

fn render_key(keys: &[String], values: &[Value]) -> String {
    let parts: Vec<String> = keys
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

fn check_unique(collection: &str, docs: &[Document], indexes: &[IndexSpec]) -> StoreResult<()> {
    let id_index = IndexSpec::new(["_id"]).unique();
    let unique = std::iter::once(&id_index).chain(indexes.iter().filter(|i| i.unique));

    for index in unique {
        let mut seen = HashSet::with_capacity(docs.len());
        for doc in docs {
            let key = key_of(doc, &index.keys);
            if !seen.insert(encode_key(&key)?) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    index: index.name(),
                    key: render_key(&index.keys, &key),
                });
            }
        }
    }
    Ok(())
}

fn ensure_id(doc: &mut Document) {
    if !doc.contains_key("_id") {
        doc.insert("_id".to_string(), Value::String(RowId::new().0));
    }
}

// =============================================================================
// Operations on a locked snapshot
// =============================================================================

fn insert_docs(collections: &mut Collections, name: &str, docs: Vec<Document>) -> StoreResult<usize> {
    let coll = collections.entry(name.to_string()).or_default();
    let count = docs.len();

    let mut staged = coll.docs.clone();
    for mut doc in docs {
        ensure_id(&mut doc);
        staged.push(doc);
    }

    check_unique(name, &staged, &coll.indexes)?;
    coll.docs = staged;
    record_written("insert_many", count as u64);
    Ok(count)
}

fn update_doc(collections: &mut Collections, name: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
    let Some(coll) = collections.get_mut(name) else {
        return Ok(0);
    };
    let Some(pos) = coll.docs.iter().position(|d| filter.matches(d)) else {
        return Ok(0);
    };

    let mut staged = coll.docs.clone();
    update.apply(&mut staged[pos]);
    check_unique(name, &staged, &coll.indexes)?;
    coll.docs = staged;
    record_written("update_one", 1);
    Ok(1)
}

fn replace_doc(collections: &mut Collections, name: &str, doc: Document) -> StoreResult<bool> {
    let id = doc
        .get("_id")
        .cloned()
        .ok_or_else(|| StoreError::invalid_document("replacement document has no _id"))?;
    let Some(coll) = collections.get_mut(name) else {
        return Ok(false);
    };
    let Some(pos) = coll.docs.iter().position(|d| d.get("_id") == Some(&id)) else {
        return Ok(false);
    };

    let mut staged = coll.docs.clone();
    staged[pos] = doc;
    check_unique(name, &staged, &coll.indexes)?;
    coll.docs = staged;
    record_written("replace_one", 1);
    Ok(true)
}

fn merge_docs(collections: &mut Collections, spec: &MergeSpec, docs: Vec<Document>) -> StoreResult<u64> {
    if spec.on.is_empty() {
        return Err(StoreError::invalid_pipeline("$merge requires at least one key field"));
    }

    let target = collections.entry(spec.into.clone()).or_default();
    let mut staged = target.docs.clone();

    let mut positions: HashMap<String, usize> = HashMap::with_capacity(staged.len());
    for (i, doc) in staged.iter().enumerate() {
        positions.entry(encode_key(&key_of(doc, &spec.on))?).or_insert(i);
    }

    let mut written = 0u64;
    for mut doc in docs {
        let key = encode_key(&key_of(&doc, &spec.on))?;
        match positions.get(&key).copied() {
            Some(i) => match spec.when_matched {
                WhenMatched::Merge => {
                    let existing = &mut staged[i];
                    for (k, v) in doc {
                        if k != "_id" {
                            existing.insert(k, v);
                        }
                    }
                    written += 1;
                }
                WhenMatched::Replace => {
                    if let Some(id) = staged[i].get("_id").cloned() {
                        doc.insert("_id".to_string(), id);
                    }
                    staged[i] = doc;
                    written += 1;
                }
                WhenMatched::KeepExisting => {}
            },
            None => match spec.when_not_matched {
                WhenNotMatched::Discard => {}
                WhenNotMatched::Insert => {
                    ensure_id(&mut doc);
                    positions.insert(key, staged.len());
                    staged.push(doc);
                    written += 1;
                }
            },
        }
    }

    check_unique(&spec.into, &staged, &target.indexes)?;
    target.docs = staged;
    record_written("merge", written);
    Ok(written)
}

fn replace_collection(collections: &mut Collections, name: &str, docs: Vec<Document>) -> StoreResult<u64> {
    if docs.iter().any(|d| !d.contains_key("_id")) {
        return Err(StoreError::invalid_document("$out documents require an _id"));
    }

    let target = collections.entry(name.to_string()).or_default();
    check_unique(name, &docs, &target.indexes)?;

    let written = docs.len() as u64;
    target.docs = docs;
    record_written("out", written);
    Ok(written)
}

fn run_pipeline(collections: &mut Collections, name: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>> {
    if let Some(pos) = pipeline.iter().position(Stage::is_terminal) {
        if pos + 1 != pipeline.len() {
            return Err(StoreError::invalid_pipeline(format!(
                "{} must be the last stage",
                pipeline[pos].name()
            )));
        }
    }

    let mut docs = collections
        .get(name)
        .map(|c| c.docs.clone())
        .unwrap_or_default();

    for stage in pipeline {
        match stage {
            Stage::Match(filter) => docs.retain(|d| filter.matches(d)),
            Stage::Project(fields) => {
                for doc in &mut docs {
                    *doc = doc
                        .iter()
                        .filter(|(k, _)| fields.contains(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                }
            }
            Stage::Unset(fields) => {
                for doc in &mut docs {
                    for field in fields {
                        doc.remove(field);
                    }
                }
            }
            Stage::Merge(spec) => {
                merge_docs(collections, spec, docs)?;
                return Ok(Vec::new());
            }
            Stage::Out(target) => {
                replace_collection(collections, target, docs)?;
                return Ok(Vec::new());
            }
        }
    }

    Ok(docs)
}

// =============================================================================
// DocumentStore implementation
// =============================================================================

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_some() {
            debug!(collection = name, "Dropped collection");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        let collections = self.collections.read().await;
        Ok(collections.contains_key(name))
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<String> {
        let started = Instant::now();
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();

        let name = index.name();
        let result = if coll.indexes.iter().any(|i| i.keys == index.keys) {
            Ok(name)
        } else if index.unique {
            check_unique(collection, &coll.docs, std::slice::from_ref(&index)).map(|_| {
                coll.indexes.push(index);
                name
            })
        } else {
            coll.indexes.push(index);
            Ok(name)
        };

        finish("create_index", collection, started, &result);
        result
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<usize> {
        let started = Instant::now();
        let mut collections = self.collections.write().await;
        let result = insert_docs(&mut collections, collection, docs);
        finish("insert_many", collection, started, &result);
        result
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        let started = Instant::now();
        let collections = self.collections.read().await;
        let result = Ok(collections
            .get(collection)
            .map(|c| c.docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default());
        finish("find", collection, started, &result);
        result
    }

    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let started = Instant::now();
        let mut collections = self.collections.write().await;
        let result = update_doc(&mut collections, collection, filter, update);
        finish("update_one", collection, started, &result);
        result
    }

    async fn replace_one(&self, collection: &str, doc: Document) -> StoreResult<bool> {
        let started = Instant::now();
        let mut collections = self.collections.write().await;
        let result = replace_doc(&mut collections, collection, doc);
        finish("replace_one", collection, started, &result);
        result
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let started = Instant::now();
        let mut collections = self.collections.write().await;
        let result = Ok(match collections.get_mut(collection) {
            Some(coll) => {
                let before = coll.docs.len();
                coll.docs.retain(|d| !filter.matches(d));
                (before - coll.docs.len()) as u64
            }
            None => 0,
        });
        finish("delete_many", collection, started, &result);
        result
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>> {
        let started = Instant::now();
        let mut collections = self.collections.write().await;
        let result = run_pipeline(&mut collections, collection, pipeline);
        finish("aggregate", collection, started, &result);
        result
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.docs.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn frames_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_index("frames", IndexSpec::new(["_sample_id", "frame_number"]).unique())
            .await
            .unwrap();
        store
            .insert_many(
                "frames",
                vec![
                    doc(json!({"_id": "f1", "_sample_id": "v1", "frame_number": 1, "a": 1})),
                    doc(json!({"_id": "f2", "_sample_id": "v1", "frame_number": 2, "a": 2})),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_many_rejects_whole_batch() {
        let store = frames_store().await;

        let err = store
            .insert_many(
                "frames",
                vec![
                    doc(json!({"_id": "f3", "_sample_id": "v1", "frame_number": 3})),
                    doc(json!({"_id": "f4", "_sample_id": "v1", "frame_number": 1})),
                ],
            )
            .await
            .unwrap_err();

        assert!(err.is_duplicate_key());
        assert!(err.to_string().contains("frame_number: 1"));
        assert_eq!(store.count("frames", &Filter::all()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_generates_missing_ids() {
        let store = MemoryStore::new();
        store
            .insert_many("c", vec![doc(json!({"x": 1})), doc(json!({"x": 2}))])
            .await
            .unwrap();
        let docs = store.find("c", &Filter::all()).await.unwrap();
        assert!(docs.iter().all(|d| d.contains_key("_id")));
    }

    #[tokio::test]
    async fn test_merge_updates_matches_and_discards_others() {
        let store = frames_store().await;
        store
            .insert_many(
                "incoming",
                vec![
                    doc(json!({"_id": "x1", "_sample_id": "v1", "frame_number": 2, "b": "new"})),
                    doc(json!({"_id": "x2", "_sample_id": "v9", "frame_number": 1, "b": "lost"})),
                ],
            )
            .await
            .unwrap();

        let out = store
            .aggregate(
                "incoming",
                &[Stage::Merge(MergeSpec::upsert_merge("frames", ["_sample_id", "frame_number"]))],
            )
            .await
            .unwrap();
        assert!(out.is_empty());

        let frames = store.find("frames", &Filter::all()).await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(
            Value::Object(frames[1].clone()),
            json!({"_id": "f2", "_sample_id": "v1", "frame_number": 2, "a": 2, "b": "new"})
        );
    }

    #[tokio::test]
    async fn test_project_and_unset() {
        let store = frames_store().await;
        let docs = store
            .aggregate(
                "frames",
                &[
                    Stage::Match(Filter::by_id("f1")),
                    Stage::Project(vec!["_id".into(), "a".into(), "frame_number".into()]),
                    Stage::Unset(vec!["frame_number".into()]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(docs, vec![doc(json!({"_id": "f1", "a": 1}))]);
    }

    #[tokio::test]
    async fn test_out_replaces_contents_and_keeps_indexes() {
        let store = frames_store().await;
        store
            .insert_many(
                "staging",
                vec![doc(json!({"_id": "n1", "_sample_id": "v2", "frame_number": 1}))],
            )
            .await
            .unwrap();

        store
            .aggregate("staging", &[Stage::Out("frames".into())])
            .await
            .unwrap();

        let frames = store.find("frames", &Filter::all()).await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(store.indexes("frames").await.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_stage_must_be_last() {
        let store = frames_store().await;
        let err = store
            .aggregate(
                "frames",
                &[Stage::Out("other".into()), Stage::Match(Filter::all())],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPipeline(_)));
    }

    #[tokio::test]
    async fn test_update_one_respects_unique_index() {
        let store = frames_store().await;
        let mut set = Document::new();
        set.insert("frame_number".into(), json!(2));

        let err = store
            .update_one("frames", &Filter::by_id("f1"), &Update::set(set))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        let mut set = Document::new();
        set.insert("label".into(), json!("cat"));
        let matched = store
            .update_one("frames", &Filter::by_id("f1"), &Update::set(set))
            .await
            .unwrap();
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_unique_index_over_duplicates_fails() {
        let store = MemoryStore::new();
        store
            .insert_many("c", vec![doc(json!({"k": 1})), doc(json!({"k": 1}))])
            .await
            .unwrap();
        let result = store.create_index("c", IndexSpec::new(["k"]).unique()).await;
        tokio_test::assert_err!(result);
        assert!(store.indexes("c").await.is_empty());
    }
}
