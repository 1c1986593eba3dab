//! Frame materialization and source synchronization.
//!
//! This crate provides:
//! - The frame selection planner and per-file plan accumulator
//! - `FrameCollectionBuilder`, which materializes frame collections
//! - Schema reconciliation and write-back of frame rows to the source
//! - `FramesView`, the build/mutate/reload lifecycle of a frame collection
//! - `VideoDataset`, a store-backed source collection
//! - Engine configuration, errors and logging setup

pub mod builder;
pub mod config;
pub mod dataset;
pub mod error;
pub mod labels;
pub mod logging;
pub mod planner;
pub mod schema_sync;
pub mod source;
pub mod source_sync;
pub mod view;

pub use builder::{rand_for_path, BuildReport, BuiltFrames, FrameCollectionBuilder};
pub use config::EngineConfig;
pub use dataset::VideoDataset;
pub use error::{EngineError, EngineResult};
pub use logging::{init_tracing, LogFormat, OperationLogger};
pub use planner::{plan_frames, plan_frames_with, FramePlan, PlanAccumulator};
pub use schema_sync::{reconcile, SchemaDiff};
pub use source::SourceCollection;
pub use source_sync::{sync_pipeline, SourceSync};
pub use view::FramesView;
