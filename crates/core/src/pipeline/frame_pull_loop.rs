use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;

use crate::capture::domain::frame::Frame;
use crate::capture::domain::frame_source::{FrameSource, ReadError};
use crate::conversion::raw_buffer::{convert, ConversionError};
use crate::processing::domain::frame_processor::ProcessingError;
use crate::processing::domain::processor_slot::{Invocation, ProcessorSlot};
use crate::surface::offscreen_surface::OffscreenSurface;
use crate::transfer::transfer_channel::WorkerInit;

use super::pipeline_error::PipelineError;
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use super::pipeline_state::{CloseReason, PipelineState, PipelineStateMachine};

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    EndOfStream,
    Cancelled,
    ReadFailed(ReadError),
    ProcessorFailed(ProcessingError),
}

impl LoopExit {
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Self::EndOfStream => CloseReason::EndOfStream,
            Self::Cancelled => CloseReason::Cancelled,
            Self::ReadFailed(_) => CloseReason::ReadFailed,
            Self::ProcessorFailed(_) => CloseReason::ProcessorFailed,
        }
    }
}

/// Counters for one run of the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopReport {
    pub frames_read: u64,
    pub frames_processed: u64,
    /// Frames read while the processor was still initializing.
    pub frames_skipped: u64,
    pub conversion_failures: u64,
    pub processing_failures: u64,
    /// Frames the source discarded before the loop saw them.
    pub dropped_by_source: u64,
    pub exit: LoopExit,
}

impl LoopReport {
    pub fn final_state(&self) -> PipelineState {
        PipelineState::Closed(self.exit.close_reason())
    }

    /// Turns a fatal exit into the matching `PipelineError`.
    pub fn into_result(self) -> Result<LoopReport, PipelineError> {
        match self.exit {
            LoopExit::ReadFailed(e) => Err(PipelineError::Read(e)),
            LoopExit::ProcessorFailed(e) => Err(PipelineError::ProcessorInit(e)),
            LoopExit::EndOfStream | LoopExit::Cancelled => Ok(self),
        }
    }
}

/// Notifications from the worker to whoever holds the pipeline handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    StateChanged(PipelineState),
    ConversionFailed { index: u64, error: ConversionError },
    ProcessingFailed { index: u64, error: ProcessingError },
    ReadFailed(ReadError),
    Finished(LoopReport),
}

#[derive(Default)]
struct Counters {
    frames_read: u64,
    frames_processed: u64,
    frames_skipped: u64,
    conversion_failures: u64,
    processing_failures: u64,
}

/// Pulls frames from the source one at a time and runs each through
/// convert → process → present on the worker thread.
///
/// At most one frame is alive at any moment: every frame is released before
/// the next read, on success and failure paths alike. Cancellation is only
/// observed between frames.
pub struct FramePullLoop {
    surface: OffscreenSurface,
    source: Box<dyn FrameSource>,
    processor: ProcessorSlot,
    logger: Box<dyn PipelineLogger>,
    cancelled: Arc<AtomicBool>,
    events: Option<Sender<PipelineEvent>>,
    state: PipelineStateMachine,
    counters: Counters,
}

impl FramePullLoop {
    pub fn new(init: WorkerInit, processor: ProcessorSlot) -> Self {
        let WorkerInit { surface, source } = init;
        Self {
            surface,
            source,
            processor,
            logger: Box::new(NullPipelineLogger),
            cancelled: Arc::new(AtomicBool::new(false)),
            events: None,
            state: PipelineStateMachine::new(),
            counters: Counters::default(),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Runs until the stream ends, a read fails, the processor fails to
    /// initialize, or cancellation is requested. Closes the source on return.
    pub fn run(mut self) -> LoopReport {
        self.enter(PipelineState::Initialized);
        let settings = self.source.settings();
        self.logger.info(&format!(
            "Pulling {}x{} frames at {} fps",
            settings.width, settings.height, settings.frame_rate
        ));

        let exit = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                break LoopExit::Cancelled;
            }

            let read_start = Instant::now();
            let frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break LoopExit::EndOfStream,
                Err(e) => {
                    log::error!("Frame source failed: {e}");
                    self.emit(PipelineEvent::ReadFailed(e.clone()));
                    break LoopExit::ReadFailed(e);
                }
            };
            self.logger.timing("read", elapsed_ms(read_start));

            if self.counters.frames_read == 0 {
                self.enter(PipelineState::Running);
            }
            self.counters.frames_read += 1;

            let fatal = self.handle_frame(&frame);
            frame.release();
            self.logger.progress(self.counters.frames_read);

            if let Some(exit) = fatal {
                break exit;
            }
        };

        self.finish(exit)
    }

    /// Converts, processes and presents one frame. Returns the exit reason
    /// when the pipeline cannot continue.
    fn handle_frame(&mut self, frame: &Frame) -> Option<LoopExit> {
        let index = frame.index();

        let started = Instant::now();
        let buffer = match convert(frame) {
            Ok(buffer) => buffer,
            Err(error) => {
                self.counters.conversion_failures += 1;
                log::warn!("Skipping frame {index}: {error}");
                self.emit(PipelineEvent::ConversionFailed { index, error });
                return None;
            }
        };
        self.logger.timing("convert", elapsed_ms(started));

        let started = Instant::now();
        match self.processor.invoke(&mut self.surface, &buffer) {
            Ok(Invocation::Processed) => self.counters.frames_processed += 1,
            Ok(Invocation::Skipped) => {
                self.counters.frames_skipped += 1;
                return None;
            }
            Ok(Invocation::InitFailed(error)) => {
                log::error!("Frame processor failed to initialize: {error}");
                return Some(LoopExit::ProcessorFailed(error));
            }
            Err(error) => {
                self.counters.processing_failures += 1;
                log::warn!("Processing frame {index} failed: {error}");
                self.emit(PipelineEvent::ProcessingFailed { index, error });
                return None;
            }
        }
        self.logger.timing("process", elapsed_ms(started));

        let started = Instant::now();
        self.surface.present();
        self.logger.timing("present", elapsed_ms(started));
        None
    }

    fn finish(mut self, exit: LoopExit) -> LoopReport {
        self.enter(PipelineState::Closed(exit.close_reason()));

        let dropped_by_source = self.source.dropped_frames();
        self.logger.metric("dropped_frames", dropped_by_source as f64);
        // Close the source before anyone sees the report
        drop(self.source);

        let report = LoopReport {
            frames_read: self.counters.frames_read,
            frames_processed: self.counters.frames_processed,
            frames_skipped: self.counters.frames_skipped,
            conversion_failures: self.counters.conversion_failures,
            processing_failures: self.counters.processing_failures,
            dropped_by_source,
            exit,
        };
        self.logger.info(&format!(
            "Pipeline closed ({:?}) after {} frames",
            report.exit.close_reason(),
            report.frames_read
        ));
        self.logger.summary();

        if let Some(events) = &self.events {
            let _ = events.send(PipelineEvent::Finished(report.clone()));
        }
        report
    }

    fn enter(&mut self, state: PipelineState) {
        match self.state.transition(state) {
            Ok(state) => self.emit(PipelineEvent::StateChanged(state)),
            Err(e) => log::error!("{e}"),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
