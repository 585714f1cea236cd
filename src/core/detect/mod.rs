pub mod detector;
pub mod filter;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use detector::{BoundingBox, Detection, Detector, MockDetector, SharedDetector};
pub use filter::{in_scope, resolve_targets, TargetClassSet};
#[cfg(feature = "onnx")]
pub use yolo::{YoloConfig, YoloOnnxDetector};
