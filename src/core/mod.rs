pub mod artifact;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod pipeline;
pub mod upload;
pub mod video;
