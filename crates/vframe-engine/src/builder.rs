//! Frame collection builder.
//!
//! Materializes one row per selected frame of every video in a source
//! collection, backfills frame-level fields already recorded on the source,
//! and extracts the frame images that are missing on disk.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;
use validator::Validate;

use vframe_media::{frame_path, ExtractionRequest, FfmpegFrameExtractor, FrameExtractor};
use vframe_models::frame::fields::{FILEPATH, FRAME_KEY, SAMPLE_ID};
use vframe_models::schema::default_frame_row_schema;
use vframe_models::{
    has_frame_directive, Document, ExtractionParams, FrameRow, MediaType, RowId, SamplingParams, VideoRecord,
};
use vframe_store::{DocumentStore, IndexSpec, MergeSpec, SchemaCatalog, Stage};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::OperationLogger;
use crate::planner::{plan_frames, PlanAccumulator};
use crate::source::SourceCollection;

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub rows_inserted: usize,
    /// Videos handed to the extractor
    pub videos_to_extract: usize,
    /// Explicitly listed frames handed to the extractor
    pub frames_requested: usize,
    /// Videos extracted in full
    pub all_frames_videos: usize,
    pub built_at: DateTime<Utc>,
}

/// A frame collection produced by a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltFrames {
    /// Store collection holding the frame rows
    pub collection: String,
    pub report: BuildReport,
}

/// Deterministic `[0, 1)` value derived from a file path.
pub fn rand_for_path(filepath: &str) -> f64 {
    let digest = Sha256::digest(filepath.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}

fn native_size(video: &VideoRecord) -> Option<(u32, u32)> {
    let metadata = video.metadata.as_ref()?;
    Some((metadata.frame_width?, metadata.frame_height?))
}

/// Builds frame collections from source collections.
#[derive(Clone)]
pub struct FrameCollectionBuilder {
    store: Arc<dyn DocumentStore>,
    catalog: SchemaCatalog,
    extractor: Arc<dyn FrameExtractor>,
    config: EngineConfig,
}

impl FrameCollectionBuilder {
    pub fn new(store: Arc<dyn DocumentStore>, extractor: Arc<dyn FrameExtractor>, config: EngineConfig) -> Self {
        let catalog = SchemaCatalog::new(store.clone());
        Self {
            store,
            catalog,
            extractor,
            config,
        }
    }

    /// Builder extracting frames with FFmpeg.
    pub fn with_ffmpeg(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        let extractor = FfmpegFrameExtractor::new(config.max_extract_parallel)
            .with_timeout(config.ffmpeg_timeout.as_secs());
        Self::new(store, Arc::new(extractor), config)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build a new frame collection from `source`.
    pub async fn build(&self, source: &dyn SourceCollection, params: &SamplingParams) -> EngineResult<BuiltFrames> {
        params.validate()?;
        if let Some(pattern) = &params.frames_pattern {
            if !has_frame_directive(pattern) {
                return Err(EngineError::invalid_params(format!(
                    "frames pattern '{}' needs a frame number directive such as %06d",
                    pattern
                )));
            }
        }

        if source.media_type() != MediaType::Video {
            return Err(EngineError::InvalidCollectionType {
                collection: source.name().to_string(),
                found: source.media_type(),
            });
        }

        let logger = OperationLogger::new(source.name(), "build_frames");
        let span = logger.span();
        self.run_build(source, params, &logger).instrument(span).await
    }

    async fn run_build(
        &self,
        source: &dyn SourceCollection,
        params: &SamplingParams,
        logger: &OperationLogger,
    ) -> EngineResult<BuiltFrames> {
        logger.log_start("computing metadata");
        source.compute_metadata().await?;

        let collection = format!(
            "{}.{}",
            self.config.frames_collection_prefix,
            Uuid::new_v4().simple()
        );
        self.create_frames_collection(source, &collection).await?;

        match self.populate(source, params, &collection, logger).await {
            Ok(report) => {
                logger.log_completion(&format!(
                    "{} rows in {}, {} videos extracted",
                    report.rows_inserted, collection, report.videos_to_extract
                ));
                Ok(BuiltFrames { collection, report })
            }
            Err(e) => {
                if let Err(cleanup) = self.drop_frames_collection(&collection).await {
                    logger.log_warning(&format!("failed to drop partial collection {}: {}", collection, cleanup));
                }
                Err(e)
            }
        }
    }

    async fn create_frames_collection(&self, source: &dyn SourceCollection, collection: &str) -> EngineResult<()> {
        self.store.create_collection(collection).await?;

        let mut schema = default_frame_row_schema();
        schema.merge(&source.frame_field_schema().await?);
        self.catalog.add_fields(collection, &schema).await?;

        self.store
            .create_index(collection, IndexSpec::new(FRAME_KEY.iter().copied()).unique())
            .await?;
        self.store
            .create_index(collection, IndexSpec::new([SAMPLE_ID]))
            .await?;
        self.store
            .create_index(collection, IndexSpec::new([FILEPATH]))
            .await?;
        Ok(())
    }

    async fn populate(
        &self,
        source: &dyn SourceCollection,
        params: &SamplingParams,
        collection: &str,
        logger: &OperationLogger,
    ) -> EngineResult<BuildReport> {
        let pattern = params
            .frames_pattern
            .clone()
            .unwrap_or_else(|| self.config.frames_pattern.clone());

        let videos = source.videos().await?;
        let mut accumulator = PlanAccumulator::new(source.is_clips());
        let mut docs: Vec<Document> = Vec::new();

        for video in &videos {
            let plan = plan_frames(video, params, &pattern);
            if params.verbose && params.sample_frames {
                plan.log_summary(video);
            }

            for frame_number in accumulator.claim_rows(&video.filepath, &plan.doc_frames) {
                let id = video
                    .frames
                    .get(&frame_number)
                    .cloned()
                    .unwrap_or_else(RowId::new);
                let filepath = if params.sample_frames {
                    frame_path(&video.filepath, &pattern, frame_number)
                        .to_string_lossy()
                        .into_owned()
                } else {
                    video.filepath.clone()
                };
                let rand = rand_for_path(&filepath);
                let row = FrameRow::stub(
                    id,
                    video.owner_id().clone(),
                    frame_number,
                    filepath,
                    video.tags.clone(),
                    rand,
                );
                docs.push(row.to_document()?);
            }

            if params.sample_frames {
                accumulator.request(&video.filepath, plan.sample_frames, native_size(video));
            }
        }

        let rows_inserted = docs.len();
        logger.log_progress(&format!("inserting {} frame rows", rows_inserted));
        if !docs.is_empty() {
            self.store
                .insert_many(collection, docs)
                .await
                .map_err(|e| EngineError::from_insert(collection, e))?;
        }

        let mut pipeline = source.frame_rows_pipeline().await?;
        pipeline.push(Stage::Merge(MergeSpec::upsert_merge(
            collection,
            FRAME_KEY.iter().copied(),
        )));
        self.store.aggregate(source.frame_collection(), &pipeline).await?;

        let mut report = BuildReport {
            rows_inserted,
            videos_to_extract: 0,
            frames_requested: 0,
            all_frames_videos: 0,
            built_at: Utc::now(),
        };

        if params.sample_frames && !accumulator.is_empty() {
            let request = ExtractionRequest {
                plans: accumulator.into_plans(),
                frames_pattern: pattern,
                params: ExtractionParams {
                    force: true,
                    ..params.extraction.clone()
                },
            };
            let (frames_requested, all_frames_videos) = request.frame_counts();
            report.videos_to_extract = request.plans.len();
            report.frames_requested = frames_requested;
            report.all_frames_videos = all_frames_videos;

            logger.log_progress(&format!("extracting frames from {} videos", report.videos_to_extract));
            self.extractor.extract(&request).await?;
        }

        Ok(report)
    }

    /// Drop a frame collection and its field schema.
    pub async fn drop_frames_collection(&self, collection: &str) -> EngineResult<()> {
        self.store.drop_collection(collection).await?;
        self.catalog.drop(collection).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rand_is_deterministic_and_bounded() {
        let a = rand_for_path("/videos/a/000001.jpg");
        assert_eq!(a, rand_for_path("/videos/a/000001.jpg"));
        assert_ne!(a, rand_for_path("/videos/a/000002.jpg"));
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn test_native_size_requires_both_dimensions() {
        let mut video = VideoRecord::new("v".into(), "/v.mp4");
        assert_eq!(native_size(&video), None);

        video.metadata = Some(vframe_models::VideoMetadata {
            frame_width: Some(640),
            frame_height: Some(360),
            ..Default::default()
        });
        assert_eq!(native_size(&video), Some((640, 360)));
    }
}
