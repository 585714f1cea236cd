//! Extract cropped stills of detected objects from video files.
//!
//! A video is decoded frame by frame, every frame goes through an object
//! detector, detections of the requested classes are cropped and saved as
//! JPEGs in a shared, self-expiring artifact directory.

pub mod api;
pub mod core;

pub use crate::api::{ExtractedImage, ObjectExtractor, ProcessResponse};
pub use crate::core::artifact::{Artifact, RetrievedImage, SweepReport};
pub use crate::core::catalog::{ClassCatalog, ClassId};
pub use crate::core::config::ExtractorConfig;
pub use crate::core::detect::{BoundingBox, Detection, Detector, MockDetector, SharedDetector};
pub use crate::core::error::{ExtractError, Result};
pub use crate::core::pipeline::{CancelToken, FrameFailure, Pipeline, RunReport};
pub use crate::core::video::{Frame, FrameSource, MemoryFrameSource, VideoOpener};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("object_extract"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // the host application installs its own `log` backend
    }
}
