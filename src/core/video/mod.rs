pub mod ffmpeg;
pub mod frame;
pub mod source;

pub use ffmpeg::{FfmpegFrameSource, FfmpegOpener, VideoProbe};
pub use frame::Frame;
pub use source::{FrameSource, MemoryFrameSource, VideoOpener};
