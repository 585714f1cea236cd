//! YOLOv8 ONNX 检测器
//!
//! Loads an exported `yolov8n.onnx`, runs it on a 640x640 resize of the
//! frame and decodes the `[1, 4 + classes, proposals]` output into
//! [`Detection`]s in original frame pixels, after per-class NMS.

use crate::core::catalog::ClassId;
use crate::core::detect::detector::{BoundingBox, Detection, Detector};
use crate::core::error::{ExtractError, Result};
use crate::core::video::Frame;
use log::{debug, info};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

const INPUT_SIZE: u32 = 640;

#[derive(Debug, Clone, Copy)]
pub struct YoloConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub num_classes: usize,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            num_classes: 80,
        }
    }
}

pub struct YoloOnnxDetector {
    session: Session,
    config: YoloConfig,
}

impl YoloOnnxDetector {
    pub fn load<P: AsRef<Path>>(model_path: P, config: YoloConfig) -> Result<Self> {
        let model_path = model_path.as_ref();
        info!("🔧 Loading YOLO model from: {}", model_path.display());

        let num_threads = num_cpus::get().min(4);
        debug!("Using {} threads for ONNX runtime", num_threads);

        let load_err = |e: &dyn std::fmt::Display| {
            ExtractError::Model(format!("failed to load {}: {}", model_path.display(), e))
        };
        let session = Session::builder()
            .map_err(|e| load_err(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(&e))?
            .with_intra_threads(num_threads)
            .map_err(|e| load_err(&e))?
            .commit_from_file(model_path)
            .map_err(|e| load_err(&e))?;

        info!("✅ YOLO model loaded successfully");
        Ok(Self { session, config })
    }

    fn preprocess(frame: &Frame) -> Result<Tensor<f32>> {
        let resized = frame.resize_to(INPUT_SIZE, INPUT_SIZE)?;
        let size = (INPUT_SIZE * INPUT_SIZE) as usize;
        let mut planes = vec![0f32; 3 * size];
        for (idx, rgb) in resized.data.chunks_exact(3).enumerate() {
            planes[idx] = rgb[0] as f32 / 255.0;
            planes[size + idx] = rgb[1] as f32 / 255.0;
            planes[2 * size + idx] = rgb[2] as f32 / 255.0;
        }

        let shape = [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
        Tensor::from_array((shape, planes.into_boxed_slice()))
            .map_err(|e| ExtractError::Model(format!("failed to build input tensor: {}", e)))
    }
}

impl Detector for YoloOnnxDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = Self::preprocess(frame)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => input])
            .map_err(|e| ExtractError::Model(format!("inference failed: {}", e)))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::Model(format!("failed to read output tensor: {}", e)))?;

        if shape.len() != 3 || shape[1] as usize != 4 + self.config.num_classes {
            return Err(ExtractError::Model(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
        let proposals = shape[2] as usize;
        if data.len() < (4 + self.config.num_classes) * proposals {
            return Err(ExtractError::Model(format!(
                "output tensor holds {} values, shape {:?}",
                data.len(),
                shape
            )));
        }

        let candidates = decode_output(
            data,
            proposals,
            &self.config,
            frame.width as f32 / INPUT_SIZE as f32,
            frame.height as f32 / INPUT_SIZE as f32,
        );
        let kept = nms(candidates, self.config.iou_threshold);

        Ok(kept
            .into_iter()
            .filter_map(|c| {
                let bbox = BoundingBox::from_f32(c.x1, c.y1, c.x2, c.y2)
                    .clamp_to(frame.width, frame.height)?;
                Some(Detection::new(c.class_id, bbox, c.score))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "yolov8-onnx"
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: ClassId,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

/// Output rows are laid out per feature: `[cx.., cy.., w.., h.., cls0.., cls1..]`.
fn decode_output(data: &[f32], proposals: usize, config: &YoloConfig, scale_x: f32, scale_y: f32) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for i in 0..proposals {
        let mut best_class = 0usize;
        let mut best_score = 0f32;
        for c in 0..config.num_classes {
            let s = data[(4 + c) * proposals + i];
            if s > best_score {
                best_score = s;
                best_class = c;
            }
        }
        if best_score < config.confidence_threshold {
            continue;
        }

        let cx = data[i];
        let cy = data[proposals + i];
        let w = data[2 * proposals + i];
        let h = data[3 * proposals + i];
        candidates.push(Candidate {
            class_id: best_class as ClassId,
            x1: (cx - w / 2.0) * scale_x,
            y1: (cy - h / 2.0) * scale_y,
            x2: (cx + w / 2.0) * scale_x,
            y2: (cy + h / 2.0) * scale_y,
            score: best_score,
        });
    }
    candidates
}

/// Greedy per-class NMS, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        for j in (i + 1)..candidates.len() {
            if candidates[j].class_id == candidates[i].class_id
                && candidates[i].iou(&candidates[j]) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    kept
}
