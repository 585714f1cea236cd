//! 视频目标提取器 - 上传/下载边界调用的入口

use crate::api::models::ProcessResponse;
use crate::core::artifact::{janitor, ArtifactStore, RetrievedImage};
use crate::core::catalog::ClassId;
use crate::core::config::ExtractorConfig;
use crate::core::detect::SharedDetector;
use crate::core::error::Result;
use crate::core::pipeline::{CancelToken, Pipeline, RunReport};
use crate::core::upload::validate_upload;
use crate::core::video::VideoOpener;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Video object extractor: sweep, extract, serve.
///
/// Safe to share between threads; each call runs its own pipeline pass
/// while the detector model is loaded once and shared.
///
/// ```no_run
/// use object_extract::{ExtractorConfig, MockDetector, ObjectExtractor, SharedDetector};
///
/// let extractor = ObjectExtractor::create(
///     ExtractorConfig::default(),
///     SharedDetector::new(MockDetector::new()),
/// ).unwrap();
/// let response = extractor.process_upload(std::path::Path::new("upload.mp4"), Some(&[67]));
/// println!("{}", serde_json::to_string(&response).unwrap());
/// ```
pub struct ObjectExtractor {
    config: Arc<ExtractorConfig>,
    pipeline: Pipeline,
    store: ArtifactStore,
}

impl ObjectExtractor {
    pub fn create(config: ExtractorConfig, detector: SharedDetector) -> Result<Self> {
        let config = Arc::new(config);
        let pipeline = Pipeline::new(config.clone(), detector)?;
        Ok(Self::assemble(config, pipeline))
    }

    pub fn with_opener(
        config: ExtractorConfig,
        detector: SharedDetector,
        opener: Arc<dyn VideoOpener>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let pipeline = Pipeline::with_opener(config.clone(), detector, opener)?;
        Ok(Self::assemble(config, pipeline))
    }

    fn assemble(config: Arc<ExtractorConfig>, pipeline: Pipeline) -> Self {
        crate::init_logging();
        info!(
            "🎬 ObjectExtractor: created, artifacts in {}",
            config.artifact_dir.display()
        );
        let store = ArtifactStore::new(&config.artifact_dir, config.retention);
        Self {
            config,
            pipeline,
            store,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// class id -> class name for every supported class.
    pub fn supported_classes(&self) -> BTreeMap<ClassId, String> {
        self.config.catalog.to_map()
    }

    /// Sweep expired artifacts, then extract from `video`.
    pub fn process(&self, video: &Path, target_classes: Option<&[ClassId]>) -> Result<RunReport> {
        self.process_with_cancel(video, target_classes, &CancelToken::new())
    }

    pub fn process_with_cancel(
        &self,
        video: &Path,
        target_classes: Option<&[ClassId]>,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        self.sweep_expired();
        self.pipeline.run_with_cancel(video, target_classes, cancel)
    }

    /// Full upload handling: validate the file, extract, then delete the
    /// uploaded video. Always yields a response body.
    pub fn process_upload(&self, video: &Path, target_classes: Option<&[ClassId]>) -> ProcessResponse {
        if let Err(e) = validate_upload(video, &self.config.upload) {
            warn!("⚠️ Upload rejected: {}", e);
            return ProcessResponse::error(e);
        }

        let result = self.process(video, target_classes);
        if let Err(e) = std::fs::remove_file(video) {
            warn!("⚠️ Failed to remove upload {}: {}", video.display(), e);
        }

        match result {
            Ok(report) => ProcessResponse::from_report(report),
            Err(e) => {
                error!("❌ Processing {} failed: {}", video.display(), e);
                ProcessResponse::error(e)
            }
        }
    }

    /// Serve an artifact and remove it from the shared directory.
    pub fn download(&self, requested: &str) -> Result<RetrievedImage> {
        self.store.take(requested)
    }

    /// Serve an artifact without consuming it.
    pub fn peek(&self, requested: &str) -> Result<RetrievedImage> {
        self.store.open(requested)
    }

    fn sweep_expired(&self) {
        if let Err(e) = janitor::sweep(&self.config.artifact_dir, self.config.retention) {
            warn!("⚠️ Artifact sweep failed: {}", e);
        }
    }
}

impl Drop for ObjectExtractor {
    fn drop(&mut self) {
        info!("🗑️ ObjectExtractor: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detect::MockDetector;
    use crate::core::error::ExtractError;

    fn extractor(dir: &Path) -> ObjectExtractor {
        ObjectExtractor::create(
            ExtractorConfig::for_testing(dir),
            SharedDetector::new(MockDetector::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_supported_classes_stable() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path());
        let a = ex.supported_classes();
        assert!(!a.is_empty());
        assert_eq!(a, ex.supported_classes());
        assert_eq!(a.get(&67).map(String::as_str), Some("cell phone"));
    }

    #[test]
    fn test_process_upload_rejects_bad_extension() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(&dir.path().join("artifacts"));
        let upload = dir.path().join("clip.avi");
        std::fs::write(&upload, b"data").unwrap();

        let response = ex.process_upload(&upload, None);
        assert!(!response.is_success());
        // rejected uploads are left to the caller
        assert!(upload.exists());
    }

    #[test]
    fn test_process_upload_removes_video_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(&dir.path().join("artifacts"));
        let upload = dir.path().join("clip.mp4");
        std::fs::write(&upload, b"definitely not an mp4").unwrap();

        let response = ex.process_upload(&upload, Some(&[42]));
        match response {
            ProcessResponse::Error { error } => assert!(error.contains("unknown class ids")),
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(!upload.exists());
    }

    #[test]
    fn test_download_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path());
        assert!(matches!(ex.download("nope.jpg"), Err(ExtractError::NotFound(_))));
    }
}
