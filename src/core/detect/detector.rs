use crate::core::catalog::ClassId;
use crate::core::error::{ExtractError, Result};
use crate::core::video::Frame;
use std::collections::HashMap;
use log::warn;
use std::sync::{Arc, Mutex};

/// Axis-aligned box in frame pixel coordinates, `x1 < x2`, `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Round float model output to pixels, clamped at zero.
    pub fn from_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let px = |v: f32| if v.is_finite() { v.max(0.0).round() as u32 } else { 0 };
        Self::new(px(x1), px(y1), px(x2), px(y2))
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Intersect with a `width`x`height` frame; `None` if nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let clamped = BoundingBox {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        };
        if clamped.is_empty() {
            None
        } else {
            Some(clamped)
        }
    }
}

/// One box + class + confidence for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: ClassId,
    pub bbox: BoundingBox,
    /// In [0, 1].
    pub score: f32,
}

impl Detection {
    pub fn new(class_id: ClassId, bbox: BoundingBox, score: f32) -> Self {
        Self {
            class_id,
            bbox,
            score: score.clamp(0.0, 1.0),
        }
    }
}

/// Object detector over a single frame.
///
/// Implementations must not keep a reference to the frame after returning.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// One loaded model shared by every pipeline run. Inference is serialized
/// behind a mutex; clones share the same model.
#[derive(Clone)]
pub struct SharedDetector {
    inner: Arc<Mutex<Box<dyn Detector>>>,
    name: Arc<str>,
}

impl SharedDetector {
    pub fn new<D: Detector + 'static>(detector: D) -> Self {
        let name: Arc<str> = Arc::from(detector.name());
        Self {
            inner: Arc::new(Mutex::new(Box::new(detector))),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        frame.validate()?;
        // a panicked detect call must not disable the model for later frames
        let mut detector = self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("⚠️ Detector {} recovered after a panicked call", self.name);
            poisoned.into_inner()
        });
        detector.detect(frame)
    }
}

impl std::fmt::Debug for SharedDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDetector").field("name", &self.name).finish()
    }
}

/// Scripted detector: detections per frame number, optional failing frames.
#[derive(Debug, Default, Clone)]
pub struct MockDetector {
    script: HashMap<u64, Vec<Detection>>,
    failing_frames: Vec<u64>,
    calls: u64,
}

impl MockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(mut self, frame_number: u64, detections: Vec<Detection>) -> Self {
        self.script.insert(frame_number, detections);
        self
    }

    pub fn failing_on(mut self, frame_number: u64) -> Self {
        self.failing_frames.push(frame_number);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Detector for MockDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.failing_frames.contains(&frame.frame_number) {
            return Err(ExtractError::Model(format!(
                "mock failure on frame {}",
                frame.frame_number
            )));
        }
        Ok(self
            .script
            .get(&frame.frame_number)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
