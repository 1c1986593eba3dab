//! Field schema reconciliation between a frame collection and its source.

use tracing::{debug, info};

use vframe_models::schema::is_default_field;
use vframe_models::FieldSchema;

use crate::error::EngineResult;
use crate::source::SourceCollection;

/// Schema changes to apply to the source's frame namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub to_add: FieldSchema,
    pub to_remove: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compare the frame collection schema with the source frame schema.
///
/// With `fields` set only those fields are considered and nothing is ever
/// removed. Otherwise every non-default field missing from the source is
/// added, and with `delete` every non-default source field missing from the
/// frame collection is removed.
pub fn reconcile(
    derived: &FieldSchema,
    source: &FieldSchema,
    fields: Option<&[String]>,
    delete: bool,
) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    match fields {
        Some(fields) => {
            for name in fields {
                if source.contains(name) {
                    continue;
                }
                if let Some(field) = derived.get(name) {
                    diff.to_add.insert(name.clone(), field.clone());
                }
            }
        }
        None => {
            for (name, field) in derived.iter() {
                if !source.contains(name) && !is_default_field(name) {
                    diff.to_add.insert(name.clone(), field.clone());
                }
            }
            if delete {
                diff.to_remove = source
                    .names()
                    .filter(|name| !derived.contains(name) && !is_default_field(name))
                    .cloned()
                    .collect();
            }
        }
    }

    diff
}

/// Declare the diff's new fields on the source. Fields added concurrently by
/// another writer are skipped. Returns the names actually added.
pub async fn apply_additions(source: &dyn SourceCollection, diff: &SchemaDiff) -> EngineResult<Vec<String>> {
    let mut added = Vec::new();
    for (name, field) in diff.to_add.iter() {
        if source.add_frame_field(name, field).await? {
            added.push(name.clone());
        } else {
            debug!(collection = source.name(), field = %name, "Frame field already present");
        }
    }
    if !added.is_empty() {
        info!(collection = source.name(), fields = ?added, "Added frame fields to source");
    }
    Ok(added)
}

/// Delete the diff's stale fields from the source.
pub async fn apply_removals(source: &dyn SourceCollection, diff: &SchemaDiff) -> EngineResult<()> {
    for name in &diff.to_remove {
        if source.remove_frame_field(name).await? {
            info!(collection = source.name(), field = %name, "Removed frame field from source");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vframe_models::schema::{default_frame_row_schema, default_frame_schema};
    use vframe_models::{FieldKind, FieldType};

    fn derived() -> FieldSchema {
        let mut schema = default_frame_row_schema();
        schema.insert("labels", FieldType::embedded("Detections"));
        schema.insert("score", FieldType::new(FieldKind::Float));
        schema
    }

    fn source() -> FieldSchema {
        let mut schema = default_frame_schema();
        schema.insert("score", FieldType::new(FieldKind::Float));
        schema.insert("stale", FieldType::new(FieldKind::String));
        schema
    }

    #[test]
    fn test_scoped_adds_only_named_fields() {
        let fields = vec!["labels".to_string(), "score".to_string(), "unknown".to_string()];
        let diff = reconcile(&derived(), &source(), Some(&fields), true);
        assert_eq!(diff.to_add.names().collect::<Vec<_>>(), vec!["labels"]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_full_sync_skips_defaults() {
        let diff = reconcile(&derived(), &source(), None, false);
        assert_eq!(diff.to_add.names().collect::<Vec<_>>(), vec!["labels"]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_full_sync_with_delete_removes_stale() {
        let diff = reconcile(&derived(), &source(), None, true);
        assert_eq!(diff.to_remove, vec!["stale".to_string()]);
    }

    #[test]
    fn test_protected_fields_never_removed() {
        let empty = FieldSchema::new();
        let diff = reconcile(&empty, &default_frame_schema(), None, true);
        assert!(diff.is_empty());
    }
}
