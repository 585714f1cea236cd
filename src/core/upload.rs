//! 上传校验

use crate::core::error::{ExtractError, Result};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Lowercase, without the dot.
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["mp4".to_string()],
            max_upload_bytes: 500 * 1024 * 1024,
        }
    }
}

impl UploadPolicy {
    pub fn allows_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.allowed_extensions.iter().any(|a| *a == e))
    }
}

/// Check an uploaded video before it reaches the pipeline.
pub fn validate_upload(path: &Path, policy: &UploadPolicy) -> Result<()> {
    if !policy.allows_extension(path) {
        return Err(ExtractError::Validation(format!(
            "invalid file type: {} (allowed: {})",
            path.display(),
            policy.allowed_extensions.join(", ")
        )));
    }

    let meta = std::fs::metadata(path)
        .map_err(|e| ExtractError::Validation(format!("no video file at {}: {}", path.display(), e)))?;
    if !meta.is_file() {
        return Err(ExtractError::Validation(format!("{} is not a file", path.display())));
    }
    if meta.len() == 0 {
        return Err(ExtractError::Validation("uploaded video is empty".into()));
    }
    if meta.len() > policy.max_upload_bytes {
        return Err(ExtractError::Validation(format!(
            "uploaded video is {} bytes, limit is {}",
            meta.len(),
            policy.max_upload_bytes
        )));
    }
    Ok(())
}
