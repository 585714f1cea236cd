use crate::core::error::Result;
use crate::core::video::frame::Frame;
use std::collections::VecDeque;
use std::path::Path;

/// A finite, forward-only sequence of decoded frames in presentation order.
///
/// `Ok(None)` signals end of stream and keeps being returned afterwards.
/// Sources are not restartable; open a new one to read the video again.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release decoder resources early. Idempotent; dropping the source
    /// has the same effect.
    fn close(&mut self);
}

/// Opens a [`FrameSource`] for a video path.
pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

/// Frames already decoded in memory.
pub struct MemoryFrameSource {
    frames: VecDeque<Frame>,
    yielded: u64,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            yielded: 0,
        }
    }

    /// Number of frames handed out so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }
}

impl FrameSource for MemoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.yielded += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
