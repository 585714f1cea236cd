use crate::core::artifact::Artifact;
use crate::core::pipeline::{FrameFailure, RunReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One extracted image as handed to the upload client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub path: PathBuf,
    pub class: String,
}

impl From<Artifact> for ExtractedImage {
    fn from(artifact: Artifact) -> Self {
        Self {
            path: artifact.path,
            class: artifact.class,
        }
    }
}

/// Upload outcome, serialised as the JSON body of the upload response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProcessResponse {
    Success {
        message: String,
        images: Vec<ExtractedImage>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failures: Vec<FrameFailure>,
    },
    Error {
        error: String,
    },
}

impl ProcessResponse {
    pub fn from_report(report: RunReport) -> Self {
        let message = match &report.aborted {
            None => "Video processed successfully".to_string(),
            Some(reason) => format!(
                "Video partially processed ({} frames): {}",
                report.frames_processed, reason
            ),
        };
        ProcessResponse::Success {
            message,
            images: report.artifacts.into_iter().map(ExtractedImage::from).collect(),
            failures: report.failures,
        }
    }

    pub fn error(error: impl ToString) -> Self {
        ProcessResponse::Error {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessResponse::Success { .. })
    }
}
