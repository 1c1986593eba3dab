//! FFmpeg CLI wrapper for video probing and frame extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeouts
//! - FFprobe metadata extraction, exposed through the `MetadataProbe` trait
//! - Uniform frame subsampling and output size computation
//! - The `FrameExtractor` delegate and its FFmpeg implementation

pub mod command;
pub mod error;
pub mod extract;
pub mod fs_utils;
pub mod probe;
pub mod sampling;
pub mod size;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use extract::{
    frame_path, frames_output_dir, ExtractionPlan, ExtractionRequest,
    FfmpegFrameExtractor, FrameExtractor,
};
pub use probe::{probe_video, FfprobeMetadata, MetadataProbe, VideoInfo};
pub use sampling::sample_frames_uniform;
pub use size::{compute_output_size, scale_filter};
