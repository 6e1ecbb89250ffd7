use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::pipeline::frame_pull_loop::{FramePullLoop, LoopReport, PipelineEvent};
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::pipeline_state::{CloseReason, PipelineState};
use crate::processing::domain::processor_slot::ProcessorSlot;
use crate::shared::constants::WORKER_THREAD_NAME;
use crate::transfer::transfer_channel::{TransferEndpoint, TransferError};

pub type WorkerHandle = JoinHandle<Result<LoopReport, PipelineError>>;

/// Starts the worker thread. It waits for the surface/source handoff on
/// `endpoint` and then runs the pull loop until it closes.
pub fn spawn_worker(
    endpoint: TransferEndpoint,
    processor: ProcessorSlot,
    logger: Box<dyn PipelineLogger>,
    config: &PipelineConfig,
    events: Sender<PipelineEvent>,
) -> Result<WorkerHandle, TransferError> {
    let timeout = config.transfer_timeout;
    let cancelled = config.cancelled.clone();

    thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || {
            let init = match endpoint.receive(timeout) {
                Ok(init) => init,
                Err(e) => {
                    log::error!("Worker never received its surface and source: {e}");
                    let closed = PipelineState::Closed(CloseReason::StartupFailed);
                    let _ = events.send(PipelineEvent::StateChanged(closed));
                    return Err(PipelineError::from(e));
                }
            };

            FramePullLoop::new(init, processor)
                .with_logger(logger)
                .with_cancellation(cancelled)
                .with_events(events)
                .run()
                .into_result()
        })
        .map_err(TransferError::Spawn)
}
