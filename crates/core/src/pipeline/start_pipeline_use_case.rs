use crate::capture::domain::capture_device::{CaptureDevice, DeviceConstraints};
use crate::processing::domain::processor_slot::ProcessorSlot;
use crate::surface::canvas::Canvas;
use crate::transfer::transfer_channel::transfer_channel;

use super::infrastructure::threaded_worker::spawn_worker;
use super::pipeline_config::PipelineConfig;
use super::pipeline_error::PipelineError;
use super::pipeline_handle::PipelineHandle;
use super::pipeline_logger::PipelineLogger;

/// Opens the capture device, hands the surface and source to a worker
/// thread and returns a handle to the running pipeline.
///
/// This is a single-use struct: `execute` consumes the owned components,
/// so calling it twice fails with `PipelineError::AlreadyStarted`.
pub struct StartPipelineUseCase {
    device: Option<Box<dyn CaptureDevice>>,
    constraints: DeviceConstraints,
    processor: Option<ProcessorSlot>,
    logger: Option<Box<dyn PipelineLogger>>,
    config: PipelineConfig,
}

impl StartPipelineUseCase {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        constraints: DeviceConstraints,
        processor: ProcessorSlot,
        logger: Box<dyn PipelineLogger>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            device: Some(device),
            constraints,
            processor: Some(processor),
            logger: Some(logger),
            config,
        }
    }

    pub fn execute(&mut self) -> Result<PipelineHandle, PipelineError> {
        let (Some(device), Some(processor), Some(logger)) =
            (self.device.take(), self.processor.take(), self.logger.take())
        else {
            return Err(PipelineError::AlreadyStarted);
        };

        log::info!("Opening capture device {}", device.name());
        let source = device.open(&self.constraints)?;
        let settings = source.settings();
        log::info!(
            "Capturing {}x{} at {} fps{}",
            settings.width,
            settings.height,
            settings.frame_rate,
            if settings.live { "" } else { " (file-backed)" }
        );

        let mut canvas = Canvas::new(settings.width, settings.height)?;
        let surface = canvas.transfer_control_to_offscreen()?;

        let (port, endpoint) = transfer_channel();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let worker = spawn_worker(endpoint, processor, logger, &self.config, events_tx)?;

        let token = match port.transfer(surface, source) {
            Ok(token) => token,
            Err(e) => {
                let _ = worker.join();
                return Err(e.into());
            }
        };

        Ok(PipelineHandle::new(
            canvas,
            events_rx,
            self.config.cancelled.clone(),
            worker,
            token,
        ))
    }
}
