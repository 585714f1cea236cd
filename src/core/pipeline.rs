//! 提取流水线 - 解码 → 检测 → 类别过滤 → 裁剪保存

use crate::core::artifact::{Artifact, ArtifactWriter};
use crate::core::catalog::ClassId;
use crate::core::config::ExtractorConfig;
use crate::core::detect::{in_scope, resolve_targets, BoundingBox, SharedDetector, TargetClassSet};
use crate::core::error::{ExtractError, Result};
use crate::core::video::{FfmpegOpener, FrameSource, VideoOpener};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A frame or a single detection that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameFailure {
    pub frame_number: u64,
    /// Set when only one detection of the frame failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Frame order, then detection order within a frame.
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<FrameFailure>,
    pub frames_processed: u64,
    /// Why the run stopped before end of stream, if it did.
    pub aborted: Option<ExtractError>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

pub struct Pipeline {
    config: Arc<ExtractorConfig>,
    detector: SharedDetector,
    writer: ArtifactWriter,
    opener: Arc<dyn VideoOpener>,
}

impl Pipeline {
    pub fn new(config: Arc<ExtractorConfig>, detector: SharedDetector) -> Result<Self> {
        let opener = FfmpegOpener::default().with_max_frame_pixels(config.max_frame_pixels);
        Self::with_opener(config, detector, Arc::new(opener))
    }

    pub fn with_opener(
        config: Arc<ExtractorConfig>,
        detector: SharedDetector,
        opener: Arc<dyn VideoOpener>,
    ) -> Result<Self> {
        let writer = ArtifactWriter::new(&config.artifact_dir, config.jpeg_quality)?;
        Ok(Self {
            config,
            detector,
            writer,
            opener,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn run(&self, video: &Path, target_classes: Option<&[ClassId]>) -> Result<RunReport> {
        self.run_with_cancel(video, target_classes, &CancelToken::new())
    }

    /// Resolve targets, open the video and extract every in-scope detection.
    ///
    /// Invalid targets and unopenable videos fail the call. Anything after
    /// that is reported through [`RunReport`], partial output included.
    pub fn run_with_cancel(
        &self,
        video: &Path,
        target_classes: Option<&[ClassId]>,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        let targets = resolve_targets(&self.config.catalog, target_classes)?;
        info!(
            "🎬 Pipeline: {} with {} target classes via {}",
            video.display(),
            targets.len(),
            self.detector.name()
        );

        let mut source = self.opener.open(video)?;
        let report = self.run_source(&mut source, &targets, cancel);
        source.close();

        info!(
            "✅ Pipeline: {} frames, {} artifacts, {} failures{}",
            report.frames_processed,
            report.artifacts.len(),
            report.failures.len(),
            report
                .aborted
                .as_ref()
                .map(|e| format!(", aborted: {}", e))
                .unwrap_or_default()
        );
        Ok(report)
    }

    /// The decode loop over an already opened source. The caller keeps
    /// ownership of the source and is responsible for closing it.
    pub fn run_source(
        &self,
        source: &mut dyn FrameSource,
        targets: &TargetClassSet,
        cancel: &CancelToken,
    ) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::default();

        loop {
            if cancel.is_cancelled() {
                warn!("⏹️ Pipeline cancelled after {} frames", report.frames_processed);
                report.aborted = Some(ExtractError::Cancelled);
                break;
            }
            if let Some(budget) = self.config.max_run_duration {
                if started.elapsed() > budget {
                    warn!("⏱️ Pipeline exceeded {:?}", budget);
                    report.aborted = Some(ExtractError::Timeout(budget));
                    break;
                }
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    error!("❌ Decode failed after {} frames: {}", report.frames_processed, e);
                    report.aborted = Some(e);
                    break;
                }
            };
            report.frames_processed += 1;

            let detect_started = Instant::now();
            let detections = match self.detector.detect(&frame) {
                Ok(detections) => detections,
                Err(e) => {
                    warn!("⚠️ Detection failed on frame {}: {}", frame.frame_number, e);
                    report.failures.push(FrameFailure {
                        frame_number: frame.frame_number,
                        class: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if let Some(budget) = self.config.max_frame_detect_duration {
                let took = detect_started.elapsed();
                if took > budget {
                    warn!("⏱️ Detection on frame {} took {:?}", frame.frame_number, took);
                    report.failures.push(FrameFailure {
                        frame_number: frame.frame_number,
                        class: None,
                        error: ExtractError::DetectTimeout {
                            frame: frame.frame_number,
                            took,
                            budget,
                        }
                        .to_string(),
                    });
                    continue;
                }
            }

            let items: Vec<(BoundingBox, String)> = detections
                .iter()
                .filter(|d| in_scope(d, targets))
                .filter_map(|d| {
                    let name = self.config.catalog.name(d.class_id)?;
                    Some((d.bbox, name.to_string()))
                })
                .collect();
            if items.is_empty() {
                continue;
            }
            debug!(
                "frame {}: {} of {} detections in scope",
                frame.frame_number,
                items.len(),
                detections.len()
            );

            for ((_, class), result) in items.iter().zip(self.writer.write_all(&frame, &items)) {
                match result {
                    Ok(artifact) => report.artifacts.push(artifact),
                    Err(e) => {
                        warn!("⚠️ Failed to save '{}' from frame {}: {}", class, frame.frame_number, e);
                        report.failures.push(FrameFailure {
                            frame_number: frame.frame_number,
                            class: Some(class.clone()),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detect::{Detection, Detector, MockDetector};
    use crate::core::video::{Frame, MemoryFrameSource};
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn pipeline(dir: &Path, detector: MockDetector) -> Pipeline {
        let config = Arc::new(ExtractorConfig::for_testing(dir));
        Pipeline::new(config, SharedDetector::new(detector)).unwrap()
    }

    fn frames(n: u64) -> Vec<Frame> {
        (0..n).map(|i| Frame::filled(64, 64, [i as u8, 0, 0], i)).collect()
    }

    fn det(class_id: ClassId, x1: u32) -> Detection {
        Detection::new(class_id, BoundingBox::new(x1, 0, x1 + 8, 8), 0.9)
    }

    fn targets(p: &Pipeline, ids: &[ClassId]) -> TargetClassSet {
        resolve_targets(&p.config().catalog, Some(ids)).unwrap()
    }

    #[test]
    fn test_every_frame_pulled_once() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), MockDetector::new());
        let mut source = MemoryFrameSource::new(frames(7));

        let report = p.run_source(&mut source, &targets(&p, &[67]), &CancelToken::new());
        assert_eq!(report.frames_processed, 7);
        assert_eq!(source.yielded(), 7);
        assert!(report.is_complete());
        assert!(report.artifacts.is_empty());
    }

    #[test]
    fn test_filter_soundness_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let detector = MockDetector::new()
            .with_detections(0, vec![det(67, 0), det(39, 8), det(63, 16)])
            .with_detections(2, vec![det(39, 0), det(67, 8)]);
        let p = pipeline(dir.path(), detector);
        let mut source = MemoryFrameSource::new(frames(3));

        let report = p.run_source(&mut source, &targets(&p, &[67, 63]), &CancelToken::new());
        let classes: Vec<&str> = report.artifacts.iter().map(|a| a.class.as_str()).collect();
        assert_eq!(classes, vec!["cell phone", "laptop", "cell phone"]);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_detector_failure_isolated_to_frame() {
        let dir = tempfile::tempdir().unwrap();
        let detector = MockDetector::new()
            .failing_on(1)
            .with_detections(2, vec![det(67, 0)]);
        let p = pipeline(dir.path(), detector);
        let mut source = MemoryFrameSource::new(frames(3));

        let report = p.run_source(&mut source, &targets(&p, &[67]), &CancelToken::new());
        assert_eq!(report.frames_processed, 3);
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].frame_number, 1);
        assert!(report.failures[0].class.is_none());
    }

    #[test]
    fn test_write_failure_isolated_to_detection() {
        let dir = tempfile::tempdir().unwrap();
        let outside = Detection::new(67, BoundingBox::new(500, 500, 600, 600), 0.9);
        let detector = MockDetector::new().with_detections(0, vec![outside, det(67, 0)]);
        let p = pipeline(dir.path(), detector);
        let mut source = MemoryFrameSource::new(frames(1));

        let report = p.run_source(&mut source, &targets(&p, &[67]), &CancelToken::new());
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].class.as_deref(), Some("cell phone"));
    }

    struct FailingAfter {
        inner: MemoryFrameSource,
        fail_at: u64,
        closed: Arc<Mutex<bool>>,
    }

    impl FrameSource for FailingAfter {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.inner.yielded() == self.fail_at {
                return Err(ExtractError::Decode("corrupt packet".into()));
            }
            self.inner.next_frame()
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    struct FailingOpener {
        closed: Arc<Mutex<bool>>,
    }

    impl VideoOpener for FailingOpener {
        fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>> {
            Ok(Box::new(FailingAfter {
                inner: MemoryFrameSource::new(frames(5)),
                fail_at: 2,
                closed: self.closed.clone(),
            }))
        }
    }

    #[test]
    fn test_decode_error_keeps_partial_output_and_closes_source() {
        let dir = tempfile::tempdir().unwrap();
        let closed = Arc::new(Mutex::new(false));
        let detector = MockDetector::new().with_detections(0, vec![det(67, 0)]);
        let p = Pipeline::with_opener(
            Arc::new(ExtractorConfig::for_testing(dir.path())),
            SharedDetector::new(detector),
            Arc::new(FailingOpener { closed: closed.clone() }),
        )
        .unwrap();

        let report = p.run(Path::new("clip.mp4"), Some(&[67])).unwrap();
        assert_eq!(report.frames_processed, 2);
        assert_eq!(report.artifacts.len(), 1);
        assert!(matches!(report.aborted, Some(ExtractError::Decode(_))));
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_unknown_targets_fail_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), MockDetector::new());
        let err = p.run(Path::new("/no/such/video.mp4"), Some(&[12345])).unwrap_err();
        assert!(matches!(err, ExtractError::Validation(_)));
    }

    #[test]
    fn test_cancel_between_frames() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), MockDetector::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut source = MemoryFrameSource::new(frames(3));

        let report = p.run_source(&mut source, &targets(&p, &[67]), &cancel);
        assert_eq!(report.frames_processed, 0);
        assert!(matches!(report.aborted, Some(ExtractError::Cancelled)));
    }

    struct SlowSource(MemoryFrameSource);

    impl FrameSource for SlowSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.0.next_frame()
        }

        fn close(&mut self) {
            self.0.close()
        }
    }

    #[test]
    fn test_run_budget_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractorConfig {
            max_run_duration: Some(std::time::Duration::from_millis(1)),
            ..ExtractorConfig::for_testing(dir.path())
        };
        let p = Pipeline::new(Arc::new(config), SharedDetector::new(MockDetector::new())).unwrap();
        let mut source = SlowSource(MemoryFrameSource::new(frames(3)));

        let report = p.run_source(&mut source, &targets(&p, &[67]), &CancelToken::new());
        assert_eq!(report.frames_processed, 1);
        assert!(matches!(report.aborted, Some(ExtractError::Timeout(_))));
    }

    struct SleepyDetector(std::time::Duration);

    impl Detector for SleepyDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            std::thread::sleep(self.0);
            Ok(vec![det(67, 0)])
        }
    }

    #[test]
    fn test_detect_overrun_drops_frame_but_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractorConfig {
            max_frame_detect_duration: Some(std::time::Duration::from_millis(5)),
            ..ExtractorConfig::for_testing(dir.path())
        };
        let detector = SleepyDetector(std::time::Duration::from_millis(20));
        let p = Pipeline::new(Arc::new(config), SharedDetector::new(detector)).unwrap();
        let mut source = MemoryFrameSource::new(frames(2));

        let report = p.run_source(&mut source, &targets(&p, &[67]), &CancelToken::new());
        assert!(report.is_complete());
        assert_eq!(report.frames_processed, 2);
        assert!(report.artifacts.is_empty());
        let failed: Vec<u64> = report.failures.iter().map(|f| f.frame_number).collect();
        assert_eq!(failed, vec![0, 1]);
        for failure in &report.failures {
            assert!(failure.class.is_none());
            assert!(failure.error.contains("Detection on frame"));
        }
    }

    #[test]
    fn test_paths_unique_within_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = MockDetector::new();
        for i in 0..10 {
            detector = detector.with_detections(i, vec![det(67, 0), det(67, 8), det(39, 16)]);
        }
        let p = pipeline(dir.path(), detector);
        let mut source = MemoryFrameSource::new(frames(10));

        let report = p.run_source(&mut source, &targets(&p, &[67, 39]), &CancelToken::new());
        let unique: HashSet<_> = report.artifacts.iter().map(|a| a.path.clone()).collect();
        assert_eq!(report.artifacts.len(), 30);
        assert_eq!(unique.len(), 30);
    }
}
