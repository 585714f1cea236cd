pub mod janitor;
pub mod store;
pub mod writer;

pub use janitor::{sweep, sweep_at, SweepReport};
pub use store::{ArtifactStore, RetrievedImage};
pub use writer::{sanitize_class_name, Artifact, ArtifactWriter, ARTIFACT_EXTENSION};
