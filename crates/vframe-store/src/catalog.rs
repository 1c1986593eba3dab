//! Persistent per-collection field schemas.
//!
//! Each field is stored as its own document keyed by
//! `"{collection}:{field}"`, so concurrent additions of the same field
//! collapse onto one document through the `_id` uniqueness of the store.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use vframe_models::{Document, FieldSchema, FieldType};

use crate::error::{StoreError, StoreResult};
use crate::store::DocumentStore;
use crate::types::Filter;

/// Collection holding schema documents.
pub const SCHEMA_COLLECTION: &str = "_field_schemas";

/// Field schema registry backed by a document store.
#[derive(Clone)]
pub struct SchemaCatalog {
    store: Arc<dyn DocumentStore>,
}

impl SchemaCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn field_id(collection: &str, field: &str) -> String {
        format!("{}:{}", collection, field)
    }

    /// Load the schema of a collection. Unknown collections have an empty
    /// schema.
    pub async fn load(&self, collection: &str) -> StoreResult<FieldSchema> {
        let docs = self
            .store
            .find(SCHEMA_COLLECTION, &Filter::all().eq("collection", collection))
            .await?;

        docs.into_iter()
            .map(|mut doc| {
                let name = match doc.remove("field") {
                    Some(Value::String(name)) => name,
                    _ => return Err(StoreError::invalid_document("schema document has no field name")),
                };
                let field_type = doc
                    .remove("type")
                    .ok_or_else(|| StoreError::invalid_document("schema document has no type"))?;
                Ok((name, serde_json::from_value::<FieldType>(field_type)?))
            })
            .collect()
    }

    /// Register a field. Returns false if the field was already registered.
    pub async fn add_field(&self, collection: &str, name: &str, field: &FieldType) -> StoreResult<bool> {
        let doc = json!({
            "_id": Self::field_id(collection, name),
            "collection": collection,
            "field": name,
            "type": field,
        });
        let doc: Document = match doc {
            Value::Object(map) => map,
            _ => return Err(StoreError::invalid_document("schema document is not an object")),
        };

        match self.store.insert_many(SCHEMA_COLLECTION, vec![doc]).await {
            Ok(_) => {
                debug!(collection, field = name, "Registered field");
                Ok(true)
            }
            Err(e) if e.is_duplicate_key() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Register every field of a schema. Returns the names that were new.
    pub async fn add_fields(&self, collection: &str, schema: &FieldSchema) -> StoreResult<Vec<String>> {
        let mut added = Vec::new();
        for (name, field) in schema.iter() {
            if self.add_field(collection, name, field).await? {
                added.push(name.clone());
            }
        }
        Ok(added)
    }

    /// Unregister a field. Returns false if it was not registered.
    pub async fn remove_field(&self, collection: &str, name: &str) -> StoreResult<bool> {
        let deleted = self
            .store
            .delete_many(SCHEMA_COLLECTION, &Filter::by_id(Self::field_id(collection, name)))
            .await?;
        if deleted > 0 {
            debug!(collection, field = name, "Unregistered field");
        }
        Ok(deleted > 0)
    }

    /// Forget the whole schema of a collection.
    pub async fn drop(&self, collection: &str) -> StoreResult<()> {
        self.store
            .delete_many(SCHEMA_COLLECTION, &Filter::all().eq("collection", collection))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use vframe_models::FieldKind;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_add_and_load() {
        let catalog = catalog();
        assert!(catalog
            .add_field("frames.a", "labels", &FieldType::embedded("Detections"))
            .await
            .unwrap());
        assert!(catalog
            .add_field("frames.b", "other", &FieldType::new(FieldKind::Int))
            .await
            .unwrap());

        let schema = catalog.load("frames.a").await.unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema.get("labels"), Some(&FieldType::embedded("Detections")));
    }

    #[tokio::test]
    async fn test_duplicate_add_is_noop() {
        let catalog = catalog();
        let field = FieldType::new(FieldKind::Float);
        assert!(catalog.add_field("c", "score", &field).await.unwrap());
        assert!(!catalog
            .add_field("c", "score", &FieldType::new(FieldKind::String))
            .await
            .unwrap());
        assert_eq!(catalog.load("c").await.unwrap().get("score"), Some(&field));
    }

    #[tokio::test]
    async fn test_concurrent_adds_converge() {
        let catalog = catalog();
        let field = FieldType::new(FieldKind::Bool);
        let (a, b) = tokio::join!(
            catalog.add_field("c", "flag", &field),
            catalog.add_field("c", "flag", &field)
        );
        assert!(a.unwrap() ^ b.unwrap());
        assert_eq!(catalog.load("c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_drop() {
        let catalog = catalog();
        let schema: FieldSchema = [
            ("a".to_string(), FieldType::new(FieldKind::Int)),
            ("b".to_string(), FieldType::new(FieldKind::Int)),
        ]
        .into_iter()
        .collect();
        assert_eq!(catalog.add_fields("c", &schema).await.unwrap(), vec!["a", "b"]);

        assert!(catalog.remove_field("c", "a").await.unwrap());
        assert!(!catalog.remove_field("c", "a").await.unwrap());
        assert_eq!(catalog.load("c").await.unwrap().len(), 1);

        catalog.drop("c").await.unwrap();
        assert!(catalog.load("c").await.unwrap().is_empty());
    }
}
