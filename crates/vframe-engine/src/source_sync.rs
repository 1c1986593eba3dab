//! Write-back of frame collection changes into the source collection.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, Instrument};

use vframe_models::frame::fields::{self, FRAMES_PREFIX, FRAME_KEY};
use vframe_models::schema::is_default_field;
use vframe_models::{FrameRow, RowId, SyncScope};
use vframe_store::{DocumentStore, MergeSpec, SchemaCatalog, Stage};

use crate::error::{EngineError, EngineResult};
use crate::logging::OperationLogger;
use crate::schema_sync::{apply_additions, apply_removals, reconcile};
use crate::source::SourceCollection;

/// Default fields stripped before writing rows back, minus `keep`.
fn defaults_except(keep: &[&str]) -> Vec<String> {
    fields::FRAME_ROW_DEFAULTS
        .iter()
        .filter(|f| !keep.contains(f))
        .map(|f| f.to_string())
        .collect()
}

/// Pipeline run over the frame collection to write rows back to `dst`.
///
/// - Full sync: strip defaults (keeping `_id` and the frame key) and replace
///   the source frames wholesale.
/// - Otherwise: optionally restrict to `ids`, then either strip defaults or
///   project `fields` plus the frame key, and merge into the source on the
///   frame key, discarding rows with no source counterpart.
pub fn sync_pipeline(fields: Option<&[String]>, ids: Option<&[RowId]>, dst: &str) -> Vec<Stage> {
    if fields.is_none() && ids.is_none() {
        return vec![
            Stage::Unset(defaults_except(&[fields::ID, fields::SAMPLE_ID, fields::FRAME_NUMBER])),
            Stage::Out(dst.to_string()),
        ];
    }

    let mut pipeline = Vec::with_capacity(3);

    if let Some(ids) = ids {
        let ids = ids.iter().map(|id| Value::String(id.to_string()));
        pipeline.push(Stage::Match(vframe_store::Filter::all().is_in(fields::ID, ids)));
    }

    match fields {
        None => pipeline.push(Stage::Unset(defaults_except(&[fields::SAMPLE_ID, fields::FRAME_NUMBER]))),
        Some(names) => {
            let mut project: Vec<String> = names.to_vec();
            project.extend([fields::ID, fields::SAMPLE_ID, fields::FRAME_NUMBER].map(String::from));
            pipeline.push(Stage::Project(project));
        }
    }

    pipeline.push(Stage::Merge(MergeSpec::upsert_merge(dst, FRAME_KEY.iter().copied())));
    pipeline
}

/// Propagates writes on a frame collection into its source.
#[derive(Clone)]
pub struct SourceSync {
    store: Arc<dyn DocumentStore>,
    catalog: SchemaCatalog,
    source: Arc<dyn SourceCollection>,
    frames: String,
}

impl SourceSync {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        catalog: SchemaCatalog,
        source: Arc<dyn SourceCollection>,
        frames: impl Into<String>,
    ) -> Self {
        Self {
            store,
            catalog,
            source,
            frames: frames.into(),
        }
    }

    /// Frame collection being synced from.
    pub fn frames_collection(&self) -> &str {
        &self.frames
    }

    /// Push one saved row. Returns false if the row carries no user fields.
    pub async fn sync_row(&self, row: &FrameRow) -> EngineResult<bool> {
        let updates = row.user_fields();
        let touched: Vec<String> = updates.keys().cloned().collect();
        let scope = SyncScope::fields(touched.clone()).with_ids(vec![row.id.clone()]);

        if updates.is_empty() {
            return Ok(false);
        }

        let result = async {
            let derived = self.catalog.load(&self.frames).await?;
            let source_schema = self.source.frame_field_schema().await?;
            let diff = reconcile(&derived, &source_schema, Some(touched.as_slice()), false);
            apply_additions(self.source.as_ref(), &diff).await?;

            self.source
                .update_frame(&row.sample_id, row.frame_number, updates)
                .await
        }
        .await;

        match result {
            Ok(matched) => {
                debug!(
                    frames = %self.frames,
                    sample_id = %row.sample_id,
                    frame_number = row.frame_number,
                    matched,
                    "Synced frame row"
                );
                Ok(true)
            }
            Err(e) => Err(EngineError::sync_failed(&scope, e)),
        }
    }

    /// Push many rows with a single bulk pipeline.
    ///
    /// `scope.fields` limits the write-back to those fields (defaults are
    /// ignored; nothing is written if none remain). A full scope rewrites the
    /// source frames and deletes source fields missing from the frame
    /// collection.
    pub async fn sync_bulk(&self, scope: &SyncScope) -> EngineResult<()> {
        let fields: Option<Vec<String>> = scope
            .fields
            .as_ref()
            .map(|f| f.iter().filter(|name| !is_default_field(name)).cloned().collect());
        if matches!(&fields, Some(f) if f.is_empty()) {
            return Ok(());
        }

        let scope = SyncScope {
            fields,
            ids: scope.ids.clone(),
        };
        let logger = OperationLogger::new(&self.frames, "sync_source");
        let span = logger.span();

        self.run_bulk(&scope, &logger)
            .instrument(span)
            .await
            .map_err(|e| EngineError::sync_failed(&scope, e))
    }

    async fn run_bulk(&self, scope: &SyncScope, logger: &OperationLogger) -> EngineResult<()> {
        let delete = scope.is_full();
        logger.log_start(&format!("syncing {} into {}", scope, self.source.name()));

        let derived = self.catalog.load(&self.frames).await?;
        let source_schema = self.source.frame_field_schema().await?;
        let diff = reconcile(&derived, &source_schema, scope.fields.as_deref(), delete);
        apply_additions(self.source.as_ref(), &diff).await?;

        let pipeline = sync_pipeline(
            scope.fields.as_deref(),
            scope.ids.as_deref(),
            self.source.frame_collection(),
        );
        self.store.aggregate(&self.frames, &pipeline).await?;

        if delete {
            apply_removals(self.source.as_ref(), &diff).await?;
        }

        logger.log_completion(&format!("synced {}", scope));
        Ok(())
    }

    /// Forward a label deletion to the source, namespacing field names.
    pub async fn sync_deletion(&self, ids: &[String], fields: Option<&[String]>) -> EngineResult<()> {
        let frame_fields: Option<Vec<String>> =
            fields.map(|f| f.iter().map(|name| format!("{}{}", FRAMES_PREFIX, name)).collect());

        self.source
            .delete_labels(ids, frame_fields.as_deref())
            .await
            .map_err(|e| {
                let scope = SyncScope {
                    fields: fields.map(|f| f.to_vec()),
                    ids: Some(ids.iter().map(|id| RowId::from(id.as_str())).collect()),
                };
                EngineError::sync_failed(&scope, e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sync_pipeline() {
        let pipeline = sync_pipeline(None, None, "ds.frames");
        assert_eq!(pipeline.len(), 2);
        match &pipeline[0] {
            Stage::Unset(fields) => {
                assert!(fields.contains(&"filepath".to_string()));
                assert!(fields.contains(&"_rand".to_string()));
                assert!(!fields.contains(&"_id".to_string()));
                assert!(!fields.contains(&"_sample_id".to_string()));
                assert!(!fields.contains(&"frame_number".to_string()));
            }
            other => panic!("unexpected stage {:?}", other),
        }
        assert_eq!(pipeline[1], Stage::Out("ds.frames".into()));
    }

    #[test]
    fn test_ids_only_pipeline_strips_row_ids() {
        let ids = vec![RowId::from("a")];
        let pipeline = sync_pipeline(None, Some(&ids), "ds.frames");
        assert_eq!(pipeline.len(), 3);
        assert!(matches!(pipeline[0], Stage::Match(_)));
        match &pipeline[1] {
            Stage::Unset(fields) => assert!(fields.contains(&"_id".to_string())),
            other => panic!("unexpected stage {:?}", other),
        }
        assert!(matches!(pipeline[2], Stage::Merge(_)));
    }

    #[test]
    fn test_fields_pipeline_projects_key() {
        let fields = vec!["labels".to_string()];
        let pipeline = sync_pipeline(Some(&fields), None, "ds.frames");
        assert_eq!(
            pipeline[0],
            Stage::Project(vec![
                "labels".into(),
                "_id".into(),
                "_sample_id".into(),
                "frame_number".into()
            ])
        );
        match &pipeline[1] {
            Stage::Merge(spec) => {
                assert_eq!(spec.into, "ds.frames");
                assert_eq!(spec.on, vec!["_sample_id", "frame_number"]);
            }
            other => panic!("unexpected stage {:?}", other),
        }
    }
}
