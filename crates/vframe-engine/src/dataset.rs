//! Store-backed video collections.
//!
//! A `VideoDataset` keeps its video records in `{name}.samples` and its
//! frame-level documents in `{name}.frames`, with the frame field schema
//! registered in the [`SchemaCatalog`]. A clips dataset holds sub-clips of
//! a parent dataset's videos and shares the parent's frames.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use vframe_media::MetadataProbe;
use vframe_models::frame::fields::{self, FRAMES_PREFIX, FRAME_KEY};
use vframe_models::schema::{default_frame_schema, is_default_field};
use vframe_models::{
    Document, FieldSchema, FieldType, FrameNumber, MediaType, RowId, Support, VideoId, VideoMetadata,
    VideoRecord,
};
use vframe_store::{DocumentStore, Filter, IndexSpec, SchemaCatalog, Stage, Update};

use crate::error::{EngineError, EngineResult};
use crate::labels::delete_in_document;
use crate::source::SourceCollection;

#[derive(Debug, Deserialize)]
struct SampleDoc {
    #[serde(rename = "_id")]
    id: VideoId,
    filepath: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: Option<VideoMetadata>,
    #[serde(rename = "_sample_id", default)]
    parent_id: Option<VideoId>,
    #[serde(default)]
    support: Option<Support>,
}

#[derive(Debug, Deserialize)]
struct FrameKeyDoc {
    #[serde(rename = "_id")]
    id: RowId,
    #[serde(rename = "_sample_id")]
    sample_id: VideoId,
    frame_number: FrameNumber,
}

fn into_document(value: Value) -> EngineResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EngineError::invalid_params(format!("expected a document, got {}", other))),
    }
}

/// A video collection persisted in a [`DocumentStore`].
#[derive(Clone)]
pub struct VideoDataset {
    store: Arc<dyn DocumentStore>,
    catalog: SchemaCatalog,
    probe: Arc<dyn MetadataProbe>,
    name: String,
    samples: String,
    frames: String,
    media_type: MediaType,
    /// Samples collection of the parent dataset, for clips
    parent_samples: Option<String>,
}

impl VideoDataset {
    /// Create (or open) a video dataset.
    pub async fn create(
        store: Arc<dyn DocumentStore>,
        probe: Arc<dyn MetadataProbe>,
        name: &str,
    ) -> EngineResult<Self> {
        let dataset = Self {
            catalog: SchemaCatalog::new(store.clone()),
            store,
            probe,
            name: name.to_string(),
            samples: format!("{}.samples", name),
            frames: format!("{}.frames", name),
            media_type: MediaType::Video,
            parent_samples: None,
        };

        dataset.store.create_collection(&dataset.samples).await?;
        dataset.store.create_collection(&dataset.frames).await?;
        dataset
            .store
            .create_index(&dataset.frames, IndexSpec::new(FRAME_KEY.iter().copied()).unique())
            .await?;
        dataset
            .catalog
            .add_fields(&dataset.frames, &default_frame_schema())
            .await?;

        info!(dataset = %dataset.name, "Created video dataset");
        Ok(dataset)
    }

    /// Create a clips dataset over the videos of `parent`.
    pub async fn clips_of(parent: &VideoDataset, name: &str) -> EngineResult<Self> {
        let dataset = Self {
            store: parent.store.clone(),
            catalog: parent.catalog.clone(),
            probe: parent.probe.clone(),
            name: name.to_string(),
            samples: format!("{}.samples", name),
            frames: parent.frames.clone(),
            media_type: MediaType::Video,
            parent_samples: Some(parent.samples.clone()),
        };
        dataset.store.create_collection(&dataset.samples).await?;
        Ok(dataset)
    }

    /// Override the media type of the dataset.
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn samples_collection(&self) -> &str {
        &self.samples
    }

    /// Add a video record.
    pub async fn add_video(&self, filepath: &str, metadata: Option<VideoMetadata>) -> EngineResult<VideoId> {
        self.add_video_with_tags(filepath, Vec::new(), metadata).await
    }

    pub async fn add_video_with_tags(
        &self,
        filepath: &str,
        tags: Vec<String>,
        metadata: Option<VideoMetadata>,
    ) -> EngineResult<VideoId> {
        let id = VideoId::new();
        let doc = into_document(json!({
            "_id": id,
            "filepath": filepath,
            "tags": tags,
            "metadata": metadata,
            "_media_type": self.media_type.as_str(),
        }))?;
        self.store.insert_many(&self.samples, vec![doc]).await?;
        Ok(id)
    }

    /// Add a clip of a parent video. Only valid on clips datasets.
    pub async fn add_clip(&self, parent_id: &VideoId, support: Support) -> EngineResult<VideoId> {
        let parent_samples = self
            .parent_samples
            .as_deref()
            .ok_or_else(|| EngineError::invalid_params(format!("'{}' is not a clips dataset", self.name)))?;

        let parent = self
            .store
            .find(parent_samples, &Filter::by_id(parent_id.as_str()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::invalid_params(format!("unknown video '{}'", parent_id)))?;

        let id = VideoId::new();
        let mut doc = parent;
        doc.insert(fields::ID.to_string(), json!(id));
        doc.insert(fields::SAMPLE_ID.to_string(), json!(parent_id));
        doc.insert("support".to_string(), json!(support));
        self.store.insert_many(&self.samples, vec![doc]).await?;
        Ok(id)
    }

    /// Record frame-level fields for a frame. Field types are inferred from
    /// the values and registered in the frame schema.
    pub async fn add_frame(
        &self,
        sample_id: &VideoId,
        frame_number: FrameNumber,
        values: Document,
    ) -> EngineResult<RowId> {
        for (name, value) in &values {
            if fields::is_frame_row_default(name) {
                return Err(EngineError::invalid_params(format!("'{}' is a default frame field", name)));
            }
            if let Some(field) = FieldType::infer(value) {
                self.catalog.add_field(&self.frames, name, &field).await?;
            }
        }

        let id = RowId::new();
        let mut doc = values;
        doc.insert(fields::ID.to_string(), json!(id));
        doc.insert(fields::SAMPLE_ID.to_string(), json!(sample_id));
        doc.insert(fields::FRAME_NUMBER.to_string(), json!(frame_number));
        self.store.insert_many(&self.frames, vec![doc]).await?;
        Ok(id)
    }

    /// Frame document of a video, if one exists.
    pub async fn frame(&self, sample_id: &VideoId, frame_number: FrameNumber) -> EngineResult<Option<Document>> {
        let filter = Filter::all()
            .eq(fields::SAMPLE_ID, sample_id.as_str())
            .eq(fields::FRAME_NUMBER, frame_number);
        Ok(self.store.find(&self.frames, &filter).await?.into_iter().next())
    }

    /// All frame documents of the dataset's videos.
    pub async fn frames(&self) -> EngineResult<Vec<Document>> {
        let owners = self.owner_ids().await?;
        Ok(self
            .store
            .find(&self.frames, &Filter::all().is_in(fields::SAMPLE_ID, owners))
            .await?)
    }

    async fn samples(&self) -> EngineResult<Vec<SampleDoc>> {
        let docs = self.store.find(&self.samples, &Filter::all()).await?;
        docs.into_iter()
            .map(|doc| Ok(serde_json::from_value(Value::Object(doc))?))
            .collect()
    }

    /// IDs of the videos owning this dataset's frames.
    async fn owner_ids(&self) -> EngineResult<Vec<String>> {
        let mut seen = HashSet::new();
        Ok(self
            .samples()
            .await?
            .into_iter()
            .map(|s| s.parent_id.unwrap_or(s.id).0)
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }

    async fn label_fields(&self) -> EngineResult<Vec<String>> {
        Ok(self
            .catalog
            .load(&self.frames)
            .await?
            .names()
            .filter(|name| !is_default_field(name))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SourceCollection for VideoDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn is_clips(&self) -> bool {
        self.parent_samples.is_some()
    }

    async fn compute_metadata(&self) -> EngineResult<()> {
        let docs = self.store.find(&self.samples, &Filter::all()).await?;
        let missing: Vec<(Value, String)> = docs
            .iter()
            .filter(|doc| doc.get(fields::METADATA).map_or(true, Value::is_null))
            .filter_map(|doc| {
                let id = doc.get(fields::ID)?.clone();
                let filepath = doc.get(fields::FILEPATH)?.as_str()?.to_string();
                Some((id, filepath))
            })
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        info!(dataset = %self.name, count = missing.len(), "Computing metadata");

        for (id, filepath) in missing {
            match self.probe.probe(&filepath).await {
                Ok(metadata) => {
                    let mut set = Document::new();
                    set.insert(fields::METADATA.to_string(), serde_json::to_value(&metadata)?);
                    self.store
                        .update_one(&self.samples, &Filter::by_id(id), &Update::set(set))
                        .await?;
                }
                Err(e) => warn!(dataset = %self.name, video = %filepath, "Failed to compute metadata: {}", e),
            }
        }
        Ok(())
    }

    async fn videos(&self) -> EngineResult<Vec<VideoRecord>> {
        let samples = self.samples().await?;

        let mut frames: HashMap<VideoId, BTreeMap<FrameNumber, RowId>> = HashMap::new();
        for doc in self.store.find(&self.frames, &Filter::all()).await? {
            let key: FrameKeyDoc = serde_json::from_value(Value::Object(doc))?;
            frames
                .entry(key.sample_id)
                .or_default()
                .insert(key.frame_number, key.id);
        }

        Ok(samples
            .into_iter()
            .map(|sample| {
                let owner = sample.parent_id.as_ref().unwrap_or(&sample.id);
                let mut known = frames.get(owner).cloned().unwrap_or_default();
                if let Some(support) = sample.support {
                    known.retain(|n, _| support.contains(*n));
                }
                VideoRecord {
                    id: sample.id,
                    parent_id: sample.parent_id,
                    filepath: sample.filepath,
                    tags: sample.tags,
                    metadata: sample.metadata,
                    support: sample.support,
                    frames: known,
                }
            })
            .collect())
    }

    fn frame_collection(&self) -> &str {
        &self.frames
    }

    async fn frame_rows_pipeline(&self) -> EngineResult<Vec<Stage>> {
        let owners = self.owner_ids().await?;
        Ok(vec![Stage::Match(Filter::all().is_in(fields::SAMPLE_ID, owners))])
    }

    async fn frame_field_schema(&self) -> EngineResult<FieldSchema> {
        Ok(self.catalog.load(&self.frames).await?)
    }

    async fn add_frame_field(&self, name: &str, field: &FieldType) -> EngineResult<bool> {
        Ok(self.catalog.add_field(&self.frames, name, field).await?)
    }

    async fn remove_frame_field(&self, name: &str) -> EngineResult<bool> {
        if is_default_field(name) {
            return Ok(false);
        }
        if !self.catalog.remove_field(&self.frames, name).await? {
            return Ok(false);
        }
        self.store
            .aggregate(
                &self.frames,
                &[Stage::Unset(vec![name.to_string()]), Stage::Out(self.frames.clone())],
            )
            .await?;
        Ok(true)
    }

    async fn update_frame(&self, sample_id: &VideoId, frame_number: FrameNumber, set: Document) -> EngineResult<u64> {
        let filter = Filter::all()
            .eq(fields::SAMPLE_ID, sample_id.as_str())
            .eq(fields::FRAME_NUMBER, frame_number);
        Ok(self.store.update_one(&self.frames, &filter, &Update::set(set)).await?)
    }

    async fn delete_labels(&self, ids: &[String], fields: Option<&[String]>) -> EngineResult<()> {
        let (frame_fields, sample_fields): (Vec<String>, Vec<String>) = match fields {
            Some(names) => {
                let mut frame_fields = Vec::new();
                let mut sample_fields = Vec::new();
                for name in names {
                    match name.strip_prefix(FRAMES_PREFIX) {
                        Some(field) => frame_fields.push(field.to_string()),
                        None => sample_fields.push(name.clone()),
                    }
                }
                (frame_fields, sample_fields)
            }
            None => (self.label_fields().await?, Vec::new()),
        };

        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut changed = 0usize;

        if !frame_fields.is_empty() {
            for mut doc in self.frames().await? {
                if delete_in_document(&mut doc, &ids, &frame_fields) {
                    self.store.replace_one(&self.frames, doc).await?;
                    changed += 1;
                }
            }
        }

        if !sample_fields.is_empty() {
            for mut doc in self.store.find(&self.samples, &Filter::all()).await? {
                if delete_in_document(&mut doc, &ids, &sample_fields) {
                    self.store.replace_one(&self.samples, doc).await?;
                    changed += 1;
                }
            }
        }

        debug!(dataset = %self.name, documents = changed, "Deleted labels");
        Ok(())
    }

    async fn reload(&self) -> EngineResult<()> {
        if !self.store.collection_exists(&self.samples).await? {
            return Err(EngineError::DatasetNotFound(self.name.clone()));
        }
        Ok(())
    }
}
