//! Frames views.
//!
//! A `FramesView` owns a frame collection built from a source collection
//! and routes every write on it back to the source. Reloading discards the
//! frame collection and builds a fresh one; rows read before a reload are
//! not refreshed.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use vframe_models::frame::fields;
use vframe_models::schema::is_default_field;
use vframe_models::{Document, FieldType, FrameRow, RowId, SamplingParams, SyncScope};
use vframe_store::{DocumentStore, Filter, SchemaCatalog};

use crate::builder::{BuildReport, BuiltFrames, FrameCollectionBuilder};
use crate::error::{EngineError, EngineResult};
use crate::labels::delete_in_document;
use crate::source::SourceCollection;
use crate::source_sync::SourceSync;

#[derive(Debug, Clone, PartialEq)]
enum ViewState {
    Unbuilt,
    Built(BuiltFrames),
}

/// Set `value` at a dotted `path` inside `doc`, creating intermediate
/// objects as needed.
fn set_path(doc: &mut Document, path: &str, value: Value) {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return;
    };
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        doc.insert(first.to_string(), value);
        return;
    }

    let mut current = doc
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Document::new()));
    for part in rest {
        if !current.is_object() {
            *current = Value::Object(Document::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
    }
    *current = value;
}

/// A view with one row per frame of a source collection's videos.
#[derive(Clone)]
pub struct FramesView {
    source: Arc<dyn SourceCollection>,
    builder: Arc<FrameCollectionBuilder>,
    params: SamplingParams,
    state: ViewState,
    /// Row IDs the view is restricted to
    selection: Option<Vec<RowId>>,
}

impl FramesView {
    /// Create an unbuilt view.
    pub fn new(source: Arc<dyn SourceCollection>, builder: Arc<FrameCollectionBuilder>, params: SamplingParams) -> Self {
        Self {
            source,
            builder,
            params,
            state: ViewState::Unbuilt,
            selection: None,
        }
    }

    /// Create a view and build its frame collection.
    pub async fn create(
        source: Arc<dyn SourceCollection>,
        builder: Arc<FrameCollectionBuilder>,
        params: SamplingParams,
    ) -> EngineResult<Self> {
        let mut view = Self::new(source, builder, params);
        view.build().await?;
        Ok(view)
    }

    /// Build the frame collection if the view is unbuilt.
    pub async fn build(&mut self) -> EngineResult<&BuildReport> {
        if let ViewState::Unbuilt = self.state {
            let built = self.builder.build(self.source.as_ref(), &self.params).await?;
            self.state = ViewState::Built(built);
        }
        match &self.state {
            ViewState::Built(built) => Ok(&built.report),
            ViewState::Unbuilt => Err(EngineError::not_built(self.name())),
        }
    }

    pub fn name(&self) -> String {
        format!("{}-frames", self.source.name())
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, ViewState::Built(_))
    }

    pub fn is_filtered(&self) -> bool {
        self.selection.is_some()
    }

    /// Store collection holding the frame rows.
    pub fn collection_name(&self) -> EngineResult<&str> {
        match &self.state {
            ViewState::Built(built) => Ok(&built.collection),
            ViewState::Unbuilt => Err(EngineError::not_built(self.name())),
        }
    }

    pub fn report(&self) -> Option<&BuildReport> {
        match &self.state {
            ViewState::Built(built) => Some(&built.report),
            ViewState::Unbuilt => None,
        }
    }

    fn store(&self) -> &Arc<dyn DocumentStore> {
        self.builder.store()
    }

    fn catalog(&self) -> &SchemaCatalog {
        self.builder.catalog()
    }

    fn filter(&self) -> Filter {
        match &self.selection {
            Some(ids) => Filter::all().is_in(fields::ID, ids.iter().map(|id| id.to_string())),
            None => Filter::all(),
        }
    }

    fn sync(&self) -> EngineResult<SourceSync> {
        Ok(SourceSync::new(
            self.store().clone(),
            self.catalog().clone(),
            self.source.clone(),
            self.collection_name()?,
        ))
    }

    /// Rows of the view.
    pub async fn rows(&self) -> EngineResult<Vec<FrameRow>> {
        let docs = self.store().find(self.collection_name()?, &self.filter()).await?;
        docs.into_iter()
            .map(|doc| Ok(FrameRow::from_document(doc)?))
            .collect()
    }

    pub async fn count(&self) -> EngineResult<u64> {
        Ok(self.store().count(self.collection_name()?, &self.filter()).await?)
    }

    /// A single row by ID.
    pub async fn row(&self, id: &RowId) -> EngineResult<Option<FrameRow>> {
        let docs = self
            .store()
            .find(self.collection_name()?, &Filter::by_id(id.as_str()))
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(FrameRow::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Restrict the view to the given rows.
    pub fn select<I>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = RowId>,
    {
        let mut ids: Vec<RowId> = ids.into_iter().collect();
        if let Some(current) = &self.selection {
            let current: HashSet<&RowId> = current.iter().collect();
            ids.retain(|id| current.contains(id));
        }
        Self {
            selection: Some(ids),
            ..self.clone()
        }
    }

    async fn register_fields(&self, collection: &str, values: &Document) -> EngineResult<()> {
        for (name, value) in values {
            if let Some(field) = FieldType::infer(value) {
                self.catalog().add_field(collection, name, &field).await?;
            }
        }
        Ok(())
    }

    /// Save one row and write its frame-level fields to the source.
    pub async fn save_row(&self, row: &FrameRow) -> EngineResult<()> {
        let collection = self.collection_name()?;
        self.register_fields(collection, &row.user_fields()).await?;

        if !self.store().replace_one(collection, row.to_document()?).await? {
            return Err(EngineError::invalid_params(format!(
                "row '{}' is not in {}",
                row.id,
                self.name()
            )));
        }
        self.sync()?.sync_row(row).await?;
        Ok(())
    }

    /// Set a field on many rows, then sync that field to the source.
    ///
    /// `field` may be a dotted path into an embedded document; the whole
    /// root field is synced. On a filtered view only selected rows are
    /// written and synced.
    pub async fn set_values(&self, field: &str, values: &BTreeMap<RowId, Value>) -> EngineResult<()> {
        let root = field.split('.').next().unwrap_or(field);
        if root.is_empty() || is_default_field(root) {
            return Err(EngineError::invalid_params(format!("cannot set default field '{}'", field)));
        }

        let collection = self.collection_name()?;
        let selected: Option<HashSet<&RowId>> = self.selection.as_ref().map(|ids| ids.iter().collect());

        for (id, value) in values {
            if selected.as_ref().is_some_and(|s| !s.contains(id)) {
                continue;
            }
            let Some(mut doc) = self
                .store()
                .find(collection, &Filter::by_id(id.as_str()))
                .await?
                .into_iter()
                .next()
            else {
                continue;
            };

            set_path(&mut doc, field, value.clone());
            if let Some(root_value) = doc.get(root) {
                if let Some(field_type) = FieldType::infer(root_value) {
                    self.catalog().add_field(collection, root, &field_type).await?;
                }
            }
            self.store().replace_one(collection, doc).await?;
        }

        let mut scope = SyncScope::fields([root]);
        if let Some(ids) = &self.selection {
            scope = scope.with_ids(ids.clone());
        }
        self.sync()?.sync_bulk(&scope).await
    }

    /// Write the view back to the source.
    ///
    /// With `fields` only those fields are synced. Saving a filtered view
    /// without `fields` first deletes the unselected rows, then replaces the
    /// source frames with the remaining rows.
    pub async fn save(&self, fields: Option<&[String]>) -> EngineResult<()> {
        let collection = self.collection_name()?;

        if fields.is_none() {
            if let Some(ids) = &self.selection {
                let keep: HashSet<&str> = ids.iter().map(RowId::as_str).collect();
                let drop: Vec<String> = self
                    .store()
                    .find(collection, &Filter::all())
                    .await?
                    .into_iter()
                    .filter_map(|doc| doc.get(fields::ID).and_then(Value::as_str).map(String::from))
                    .filter(|id| !keep.contains(id.as_str()))
                    .collect();
                if !drop.is_empty() {
                    let deleted = self
                        .store()
                        .delete_many(collection, &Filter::all().is_in(fields::ID, drop))
                        .await?;
                    info!(view = %self.name(), deleted, "Deleted unselected frame rows");
                }
            }
        }

        let scope = SyncScope {
            fields: fields.map(|f| f.to_vec()),
            ids: None,
        };
        self.sync()?.sync_bulk(&scope).await
    }

    /// Delete labels by ID from the view, then from the source.
    ///
    /// A row whose own ID is listed loses the fields entirely; otherwise only
    /// the listed labels inside the fields are removed. `fields` defaults to
    /// every non-default field.
    pub async fn delete_labels(&self, ids: &[String], fields: Option<&[String]>) -> EngineResult<()> {
        let collection = self.collection_name()?;

        let targets: Vec<String> = match fields {
            Some(names) => names.to_vec(),
            None => self
                .catalog()
                .load(collection)
                .await?
                .names()
                .filter(|name| !is_default_field(name))
                .cloned()
                .collect(),
        };

        let selected: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for mut doc in self.store().find(collection, &self.filter()).await? {
            if delete_in_document(&mut doc, &selected, &targets) {
                self.store().replace_one(collection, doc).await?;
            }
        }

        self.sync()?.sync_deletion(ids, fields).await
    }

    /// Reload the source and rebuild the frame collection.
    pub async fn reload(&mut self) -> EngineResult<&BuildReport> {
        self.source.reload().await?;

        if let ViewState::Built(built) = &self.state {
            self.builder.drop_frames_collection(&built.collection).await?;
            info!(view = %self.name(), collection = %built.collection, "Dropped frame collection");
        }
        self.state = ViewState::Unbuilt;
        self.build().await
    }
}
