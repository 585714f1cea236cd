use crate::core::catalog::ClassCatalog;
use crate::core::upload::UploadPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retention window for artifacts in the shared directory.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// 8K UHD; larger streams are refused before any frame buffer is allocated.
pub const DEFAULT_MAX_FRAME_PIXELS: u64 = 7680 * 4320;

const DEFAULT_ARTIFACT_DIR_NAME: &str = "object_extract_artifacts";

/// Extractor configuration. Built once and shared read-only by the
/// pipeline, writer, janitor and store.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Shared directory holding every artifact across runs.
    pub artifact_dir: PathBuf,
    /// Artifacts older than this are removed by the janitor.
    pub retention: Duration,
    /// JPEG quality (1-100) for cropped stills.
    pub jpeg_quality: u8,
    /// Wall-clock budget for a whole pipeline run.
    pub max_run_duration: Option<Duration>,
    /// Budget for a single detect call; overruns are recorded as frame failures.
    pub max_frame_detect_duration: Option<Duration>,
    /// Upper bound on `width * height` of a decoded stream.
    pub max_frame_pixels: u64,
    pub catalog: ClassCatalog,
    pub upload: UploadPolicy,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            artifact_dir: std::env::temp_dir().join(DEFAULT_ARTIFACT_DIR_NAME),
            retention: DEFAULT_RETENTION,
            jpeg_quality: 90,
            max_run_duration: Some(Duration::from_secs(30 * 60)),
            max_frame_detect_duration: Some(Duration::from_secs(10)),
            max_frame_pixels: DEFAULT_MAX_FRAME_PIXELS,
            catalog: ClassCatalog::default(),
            upload: UploadPolicy::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn with_artifact_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.artifact_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_catalog(mut self, catalog: ClassCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// No time budgets; used for deterministic runs over in-memory sources.
    pub fn for_testing(dir: impl AsRef<Path>) -> Self {
        Self {
            max_run_duration: None,
            max_frame_detect_duration: None,
            ..Self::default().with_artifact_dir(dir)
        }
    }

    /// Shorter budgets and smaller stills for constrained hosts.
    pub fn for_low_resource() -> Self {
        Self {
            jpeg_quality: 75,
            max_run_duration: Some(Duration::from_secs(5 * 60)),
            max_frame_detect_duration: Some(Duration::from_secs(3)),
            max_frame_pixels: 3840 * 2160,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.retention, Duration::from_secs(3600));
        assert!(config.artifact_dir.ends_with(DEFAULT_ARTIFACT_DIR_NAME));
        assert!(!config.catalog.is_empty());
        assert_eq!(config.max_frame_pixels, DEFAULT_MAX_FRAME_PIXELS);
    }

    #[test]
    fn test_low_resource_preset_caps_resolution() {
        let config = ExtractorConfig::for_low_resource();
        assert!(config.max_frame_pixels < DEFAULT_MAX_FRAME_PIXELS);
        assert!(config.jpeg_quality < ExtractorConfig::default().jpeg_quality);
    }

    #[test]
    fn test_testing_preset_has_no_budgets() {
        let config = ExtractorConfig::for_testing("/tmp/x");
        assert!(config.max_run_duration.is_none());
        assert!(config.max_frame_detect_duration.is_none());
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/x"));
    }
}
