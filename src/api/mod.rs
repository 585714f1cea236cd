pub mod extractor;
pub mod models;

pub use extractor::ObjectExtractor;
pub use models::{ExtractedImage, ProcessResponse};
