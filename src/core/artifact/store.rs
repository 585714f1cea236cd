//! 产物读取 - 下载接口背后的目录访问

use crate::core::error::{ExtractError, Result};
use image::ImageFormat;
use log::{debug, warn};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Bytes of one artifact ready to be served.
#[derive(Debug, Clone)]
pub struct RetrievedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Sniffed from the bytes, never taken from the file name.
    pub content_type: &'static str,
    pub cache_control: String,
}

pub struct ArtifactStore {
    dir: PathBuf,
    max_age: Duration,
}

impl ArtifactStore {
    pub fn new(dir: impl AsRef<Path>, max_age: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_age,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a requested artifact path to a file directly inside the shared
    /// directory. Only the basename of the request is used.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let not_found = || ExtractError::NotFound(requested.to_string());
        let requested_path = Path::new(requested);

        if requested_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            warn!("🚫 Rejected artifact request with parent traversal: {}", requested);
            return Err(not_found());
        }

        let name = requested_path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(not_found)?;
        let candidate = self.dir.join(name);

        // symlinks must not lead out of the directory
        let real = candidate.canonicalize().map_err(|_| not_found())?;
        let root = self.dir.canonicalize().map_err(|_| not_found())?;
        if real.parent() != Some(root.as_path()) || !real.is_file() {
            warn!("🚫 Rejected artifact request outside {}: {}", self.dir.display(), requested);
            return Err(not_found());
        }
        Ok(real)
    }

    pub fn open(&self, requested: &str) -> Result<RetrievedImage> {
        let path = self.resolve(requested)?;
        let bytes = std::fs::read(&path).map_err(|e| {
            debug!("read {} failed: {}", path.display(), e);
            ExtractError::NotFound(requested.to_string())
        })?;

        let format = image::guess_format(&bytes)
            .map_err(|_| ExtractError::NotFound(format!("{} is not an image", requested)))?;
        let content_type = mime_for(format)
            .ok_or_else(|| ExtractError::NotFound(format!("{} is not a servable image", requested)))?;

        Ok(RetrievedImage {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            bytes,
            content_type,
            cache_control: format!("private, max-age={}", self.max_age.as_secs()),
        })
    }

    /// Read the artifact, then delete it. Deletion failures are logged only.
    pub fn take(&self, requested: &str) -> Result<RetrievedImage> {
        let image = self.open(requested)?;
        let path = self.dir.join(&image.file_name);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("⚠️ Served {} but could not delete it: {}", path.display(), e);
        }
        Ok(image)
    }
}

fn mime_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::ArtifactWriter;
    use crate::core::detect::BoundingBox;
    use crate::core::video::Frame;

    fn store_with_artifact() -> (tempfile::TempDir, ArtifactStore, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path(), 90).unwrap();
        let artifact = writer
            .write(&Frame::filled(32, 32, [9, 9, 9], 0), &BoundingBox::new(0, 0, 16, 16), "book")
            .unwrap();
        let store = ArtifactStore::new(dir.path(), Duration::from_secs(3600));
        (dir, store, artifact.path)
    }

    #[test]
    fn test_open_by_full_path_and_basename() {
        let (_dir, store, path) = store_with_artifact();

        let by_path = store.open(path.to_str().unwrap()).unwrap();
        assert_eq!(by_path.content_type, "image/jpeg");
        assert_eq!(by_path.cache_control, "private, max-age=3600");

        let name = path.file_name().unwrap().to_str().unwrap();
        let by_name = store.open(name).unwrap();
        assert_eq!(by_name.bytes, by_path.bytes);
    }

    #[test]
    fn test_traversal_rejected() {
        let (dir, store, _path) = store_with_artifact();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.jpg"), b"top secret").unwrap();

        let sneaky = format!("{}/../secret.jpg", dir.path().display());
        assert!(matches!(store.open(&sneaky), Err(ExtractError::NotFound(_))));
        assert!(matches!(store.open("../../etc/passwd"), Err(ExtractError::NotFound(_))));

        let absolute = outside.path().join("secret.jpg");
        assert!(matches!(
            store.open(absolute.to_str().unwrap()),
            Err(ExtractError::NotFound(_))
        ));
    }

    #[test]
    fn test_non_image_rejected() {
        let (dir, store, _path) = store_with_artifact();
        std::fs::write(dir.path().join("fake_1.jpg"), b"not really a jpeg").unwrap();
        assert!(matches!(store.open("fake_1.jpg"), Err(ExtractError::NotFound(_))));
        assert!(matches!(store.open("missing.jpg"), Err(ExtractError::NotFound(_))));
        assert!(matches!(store.open(""), Err(ExtractError::NotFound(_))));
    }

    #[test]
    fn test_take_consumes() {
        let (_dir, store, path) = store_with_artifact();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();

        store.take(&name).unwrap();
        assert!(!path.exists());
        assert!(matches!(store.take(&name), Err(ExtractError::NotFound(_))));
    }
}
