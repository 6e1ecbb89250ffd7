use thiserror::Error;

use crate::conversion::raw_buffer::RawBuffer;
use crate::surface::offscreen_surface::OffscreenSurface;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("processor initialization failed: {0}")]
    Init(String),
    #[error("buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("processing failed: {0}")]
    Failed(String),
}

/// Consumer of converted frames.
///
/// Runs synchronously on the worker thread. Implementations draw their
/// output onto `surface`; the pipeline presents it afterwards.
pub trait FrameProcessor: Send {
    fn process(
        &mut self,
        surface: &mut OffscreenSurface,
        buffer: &RawBuffer,
        width: u32,
        height: u32,
    ) -> Result<(), ProcessingError>;
}

/// Rejects buffers that are not exactly one 4:2:0 frame of `width` x `height`.
pub fn check_buffer(buffer: &RawBuffer, width: u32, height: u32) -> Result<(), ProcessingError> {
    let expected = RawBuffer::len_for(width, height);
    if buffer.len() != expected {
        return Err(ProcessingError::BufferSize {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}
