//! Engine configuration.

use std::time::Duration;

use vframe_models::{has_frame_directive, DEFAULT_FRAMES_PATTERN};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Image naming pattern used when sampling params leave it unset
    pub frames_pattern: String,
    /// Maximum videos extracted concurrently
    pub max_extract_parallel: usize,
    /// Timeout for a single FFmpeg process
    pub ffmpeg_timeout: Duration,
    /// Prefix of generated frame collection names
    pub frames_collection_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_pattern: DEFAULT_FRAMES_PATTERN.to_string(),
            max_extract_parallel: 4,
            ffmpeg_timeout: Duration::from_secs(3600), // 1 hour
            frames_collection_prefix: "frames".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            frames_pattern: std::env::var("VFRAME_FRAMES_PATTERN")
                .ok()
                .filter(|p| has_frame_directive(p))
                .unwrap_or(defaults.frames_pattern),
            max_extract_parallel: std::env::var("VFRAME_MAX_EXTRACT_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_extract_parallel),
            ffmpeg_timeout: std::env::var("VFRAME_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            frames_collection_prefix: std::env::var("VFRAME_FRAMES_COLLECTION_PREFIX")
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.frames_collection_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "VFRAME_FRAMES_PATTERN",
        "VFRAME_MAX_EXTRACT_PARALLEL",
        "VFRAME_FFMPEG_TIMEOUT_SECS",
        "VFRAME_FRAMES_COLLECTION_PREFIX",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        assert_eq!(EngineConfig::from_env(), EngineConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("VFRAME_FRAMES_PATTERN", "frame-%04d.png");
        std::env::set_var("VFRAME_MAX_EXTRACT_PARALLEL", "8");
        std::env::set_var("VFRAME_FFMPEG_TIMEOUT_SECS", "60");
        std::env::set_var("VFRAME_FRAMES_COLLECTION_PREFIX", "tmp_frames");

        let config = EngineConfig::from_env();
        assert_eq!(config.frames_pattern, "frame-%04d.png");
        assert_eq!(config.max_extract_parallel, 8);
        assert_eq!(config.ffmpeg_timeout, Duration::from_secs(60));
        assert_eq!(config.frames_collection_prefix, "tmp_frames");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_invalid_values() {
        clear_env();
        std::env::set_var("VFRAME_FRAMES_PATTERN", "frame.png");
        std::env::set_var("VFRAME_MAX_EXTRACT_PARALLEL", "0");

        let config = EngineConfig::from_env();
        assert_eq!(config.frames_pattern, DEFAULT_FRAMES_PATTERN);
        assert_eq!(config.max_extract_parallel, 4);
        clear_env();
    }
}
