use std::time::Duration;

use thiserror::Error;

use super::frame::Frame;

/// What a source reports about its track once opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// False for file-backed sources, which never drop frames.
    pub live: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("capture device failed: {0}")]
    Device(String),
    #[error("no frame arrived within {0:?}")]
    Stalled(Duration),
}

/// Pull-based sequence of frames from one video track.
///
/// `read` takes `&mut self`, so a source has a single reader at a time.
/// A source is closed by dropping it.
pub trait FrameSource: Send {
    fn settings(&self) -> SourceSettings;

    /// Blocks until the next frame is available.
    ///
    /// Returns `Ok(None)` once the stream has ended, and keeps returning it
    /// on later calls.
    fn read(&mut self) -> Result<Option<Frame>, ReadError>;

    /// Frames the source discarded because the reader was busy.
    fn dropped_frames(&self) -> u64 {
        0
    }
}
