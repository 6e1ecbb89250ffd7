use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::frame_processor::{FrameProcessor, ProcessingError};
use crate::conversion::raw_buffer::RawBuffer;
use crate::surface::offscreen_surface::OffscreenSurface;

type InitResult = Result<Box<dyn FrameProcessor>, ProcessingError>;

/// Outcome of offering one frame to the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Processed,
    /// Initialization has not finished; the frame was not processed.
    Skipped,
    /// Initialization failed. The slot will never process a frame.
    InitFailed(ProcessingError),
}

enum SlotState {
    Pending(Receiver<InitResult>),
    Ready(Box<dyn FrameProcessor>),
    Failed(ProcessingError),
}

/// Holds a processor that may still be initializing.
///
/// The worker never waits on initialization: every call checks the slot
/// without blocking and skips the frame while the processor is pending.
/// Once initialized (or failed) the slot stays that way.
pub struct ProcessorSlot {
    state: SlotState,
}

/// Write end of a pending [`ProcessorSlot`]. Dropping it without signalling
/// counts as a failed initialization.
pub struct ProcessorReady {
    tx: Sender<InitResult>,
}

impl ProcessorReady {
    pub fn ready(self, processor: Box<dyn FrameProcessor>) {
        let _ = self.tx.send(Ok(processor));
    }

    pub fn fail(self, error: ProcessingError) {
        let _ = self.tx.send(Err(error));
    }
}

impl ProcessorSlot {
    pub fn pending() -> (ProcessorReady, ProcessorSlot) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (
            ProcessorReady { tx },
            ProcessorSlot {
                state: SlotState::Pending(rx),
            },
        )
    }

    pub fn ready(processor: Box<dyn FrameProcessor>) -> Self {
        Self {
            state: SlotState::Ready(processor),
        }
    }

    /// Runs `init` on a background thread and returns the pending slot.
    pub fn spawn_init<F>(init: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> InitResult + Send + 'static,
    {
        let (ready, slot) = Self::pending();
        thread::Builder::new()
            .name("processor-init".into())
            .spawn(move || match init() {
                Ok(processor) => ready.ready(processor),
                Err(e) => ready.fail(e),
            })?;
        Ok(slot)
    }

    pub fn is_ready(&mut self) -> bool {
        self.poll();
        matches!(self.state, SlotState::Ready(_))
    }

    /// Hands the frame to the processor if it is ready.
    ///
    /// `Err` means this frame failed to process; the processor stays usable.
    pub fn invoke(
        &mut self,
        surface: &mut OffscreenSurface,
        buffer: &RawBuffer,
    ) -> Result<Invocation, ProcessingError> {
        self.poll();
        match &mut self.state {
            SlotState::Pending(_) => Ok(Invocation::Skipped),
            SlotState::Failed(e) => Ok(Invocation::InitFailed(e.clone())),
            SlotState::Ready(processor) => {
                processor.process(surface, buffer, buffer.width(), buffer.height())?;
                Ok(Invocation::Processed)
            }
        }
    }

    fn poll(&mut self) {
        let SlotState::Pending(rx) = &self.state else {
            return;
        };
        let next = match rx.try_recv() {
            Ok(Ok(processor)) => SlotState::Ready(processor),
            Ok(Err(e)) => SlotState::Failed(e),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => SlotState::Failed(ProcessingError::Init(
                "initializer exited without signalling".into(),
            )),
        };
        self.state = next;
    }
}
