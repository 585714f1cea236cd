use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Video decode error: {0}")]
    Decode(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Artifact write error: {0}")]
    Write(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Run cancelled")]
    Cancelled,
    #[error("Run exceeded time budget of {0:?}")]
    Timeout(Duration),
    /// A single detect call overran its budget; only that frame is dropped.
    #[error("Detection on frame {frame} took {took:?}, budget {budget:?}")]
    DetectTimeout {
        frame: u64,
        took: Duration,
        budget: Duration,
    },
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_timeout_names_the_frame() {
        let err = ExtractError::DetectTimeout {
            frame: 7,
            took: Duration::from_millis(20),
            budget: Duration::from_millis(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("frame 7"));
        assert!(!msg.contains("Run exceeded"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mp4");
        let err: ExtractError = io.into();
        assert!(err.to_string().contains("missing.mp4"));
    }
}
