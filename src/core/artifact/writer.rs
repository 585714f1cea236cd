//! 产物写入 - 裁剪检测框并以唯一文件名保存为 JPEG

use crate::core::detect::BoundingBox;
use crate::core::error::{ExtractError, Result};
use crate::core::video::Frame;
use image::{ImageOutputFormat, RgbImage};
use log::{debug, warn};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const ARTIFACT_EXTENSION: &str = "jpg";

/// Attempts before giving up on an id clash. A v4 clash is not expected;
/// the bound only keeps the loop finite.
const MAX_NAME_ATTEMPTS: usize = 4;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// A persisted crop and its class label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub class: String,
}

/// `"Cell Phone!"` -> `"cell_phone"`. Never empty.
pub fn sanitize_class_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let replaced = NON_ALNUM.replace_all(&lower, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "object".to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct ArtifactWriter {
    dir: PathBuf,
    jpeg_quality: u8,
}

impl ArtifactWriter {
    /// Creates the shared directory if it does not exist yet.
    pub fn new(dir: impl AsRef<Path>, jpeg_quality: u8) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ExtractError::Write(format!("cannot create artifact dir {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Crop `bbox` out of `frame` and persist it under a fresh unique name.
    pub fn write(&self, frame: &Frame, bbox: &BoundingBox, class_name: &str) -> Result<Artifact> {
        let crop = frame.crop(bbox).ok_or_else(|| {
            ExtractError::Write(format!(
                "box {:?} lies outside {}x{} frame {}",
                bbox, frame.width, frame.height, frame.frame_number
            ))
        })?;
        let jpeg = self.encode(&crop)?;
        let path = self.persist(&sanitize_class_name(class_name), &jpeg)?;
        debug!(
            "🖼️ Saved {}x{} crop of '{}' to {}",
            crop.width(),
            crop.height(),
            class_name,
            path.display()
        );

        Ok(Artifact {
            path,
            class: class_name.to_string(),
        })
    }

    /// Write every `(bbox, class)` of one frame. Crops are encoded in
    /// parallel; results keep the input order.
    pub fn write_all(&self, frame: &Frame, items: &[(BoundingBox, String)]) -> Vec<Result<Artifact>> {
        items
            .par_iter()
            .map(|(bbox, class)| self.write(frame, bbox, class))
            .collect()
    }

    fn encode(&self, crop: &RgbImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        crop.write_to(&mut buffer, ImageOutputFormat::Jpeg(self.jpeg_quality))
            .map_err(|e| ExtractError::Write(format!("JPEG encoding failed: {}", e)))?;
        Ok(buffer.into_inner())
    }

    /// Exclusive create: an existing file is never overwritten.
    fn persist(&self, stem: &str, bytes: &[u8]) -> Result<PathBuf> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .dir
                .join(format!("{}_{}.{}", stem, Uuid::new_v4(), ARTIFACT_EXTENSION));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!("⚠️ Artifact name clash at {}, drawing a new id", path.display());
                    continue;
                }
                Err(e) => {
                    return Err(ExtractError::Write(format!(
                        "cannot create {}: {}",
                        path.display(),
                        e
                    )))
                }
            };

            if let Err(e) = file.write_all(bytes).and_then(|_| file.flush()) {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(ExtractError::Write(format!(
                    "cannot write {}: {}",
                    path.display(),
                    e
                )));
            }
            return Ok(path);
        }

        Err(ExtractError::Write(format!(
            "no free artifact name after {} attempts",
            MAX_NAME_ATTEMPTS
        )))
    }
}
