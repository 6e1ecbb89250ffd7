use thiserror::Error;

use crate::capture::domain::capture_device::DeviceError;
use crate::capture::domain::frame_source::ReadError;
use crate::processing::domain::frame_processor::ProcessingError;
use crate::surface::canvas::SurfaceError;
use crate::transfer::transfer_channel::TransferError;

/// Everything that can stop a pipeline from starting or finishing cleanly.
///
/// Per-frame conversion and processing failures are not here: the loop
/// recovers from those and reports them as events.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("reading frames failed: {0}")]
    Read(#[source] ReadError),
    #[error("frame processor unavailable: {0}")]
    ProcessorInit(#[source] ProcessingError),
    #[error("failed to start processor initialization: {0}")]
    ProcessorSpawn(#[source] std::io::Error),
    #[error("worker thread panicked")]
    WorkerPanicked,
    #[error("pipeline has already been started")]
    AlreadyStarted,
}
