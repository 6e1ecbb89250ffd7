use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::surface::canvas::Canvas;
use crate::transfer::transfer_channel::TransferToken;

use super::frame_pull_loop::{LoopReport, PipelineEvent};
use super::infrastructure::threaded_worker::WorkerHandle;
use super::pipeline_error::PipelineError;

/// Controller-side view of a running pipeline.
///
/// Dropping the handle requests cancellation but does not wait for the
/// worker; call [`join`](Self::join) for that.
pub struct PipelineHandle {
    canvas: Canvas,
    events: Receiver<PipelineEvent>,
    cancelled: Arc<AtomicBool>,
    worker: Option<WorkerHandle>,
    token: TransferToken,
}

impl PipelineHandle {
    pub(crate) fn new(
        canvas: Canvas,
        events: Receiver<PipelineEvent>,
        cancelled: Arc<AtomicBool>,
        worker: WorkerHandle,
        token: TransferToken,
    ) -> Self {
        Self {
            canvas,
            events,
            cancelled,
            worker: Some(worker),
            token,
        }
    }

    /// The visible canvas. Direct draws fail once the worker owns it.
    pub fn canvas(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    pub fn token(&self) -> TransferToken {
        self.token
    }

    /// Asks the worker to stop after the frame it is working on.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Waits for the worker and returns its report, or the error that
    /// stopped it.
    pub fn join(mut self) -> Result<LoopReport, PipelineError> {
        let worker = self.worker.take().ok_or(PipelineError::WorkerPanicked)?;
        worker.join().map_err(|_| PipelineError::WorkerPanicked)?
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel();
        }
    }
}
