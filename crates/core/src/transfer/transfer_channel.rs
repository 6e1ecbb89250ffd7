use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::capture::domain::frame_source::{FrameSource, SourceSettings};
use crate::surface::offscreen_surface::OffscreenSurface;

/// Everything the worker needs to start pulling frames.
///
/// Surface and source travel together, so the worker receives both or
/// neither.
pub struct WorkerInit {
    pub surface: OffscreenSurface,
    pub source: Box<dyn FrameSource>,
}

impl fmt::Debug for WorkerInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInit")
            .field("surface", &self.surface)
            .field("source", &self.source.settings())
            .finish()
    }
}

/// Proof that the worker now owns the surface and the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferToken {
    settings: SourceSettings,
}

impl TransferToken {
    pub fn settings(&self) -> SourceSettings {
        self.settings
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("worker is not listening for the handoff")]
    WorkerUnavailable,
    #[error("no handoff arrived within {0:?}")]
    Timeout(Duration),
    #[error("controller went away before handing anything over")]
    ControllerGone,
    #[error(
        "surface is {surface_width}x{surface_height} but the source delivers {source_width}x{source_height}"
    )]
    SizeMismatch {
        surface_width: u32,
        surface_height: u32,
        source_width: u32,
        source_height: u32,
    },
    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Creates a one-shot channel for moving a surface and source to the worker.
pub fn transfer_channel() -> (TransferPort, TransferEndpoint) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (TransferPort { tx }, TransferEndpoint { rx })
}

/// Controller side. Consumed by [`transfer`](Self::transfer), so the same
/// surface and source cannot be handed over twice.
pub struct TransferPort {
    tx: Sender<WorkerInit>,
}

impl TransferPort {
    /// Moves `surface` and `source` to the worker.
    ///
    /// On failure both are dropped here: the source is closed without a
    /// single read.
    pub fn transfer(
        self,
        surface: OffscreenSurface,
        source: Box<dyn FrameSource>,
    ) -> Result<TransferToken, TransferError> {
        let settings = source.settings();
        if surface.width() != settings.width || surface.height() != settings.height {
            return Err(TransferError::SizeMismatch {
                surface_width: surface.width(),
                surface_height: surface.height(),
                source_width: settings.width,
                source_height: settings.height,
            });
        }

        self.tx
            .send(WorkerInit { surface, source })
            .map_err(|_| TransferError::WorkerUnavailable)?;
        log::debug!("Handed {}x{} surface and source to worker", settings.width, settings.height);
        Ok(TransferToken { settings })
    }
}

/// Worker side.
pub struct TransferEndpoint {
    rx: Receiver<WorkerInit>,
}

impl TransferEndpoint {
    /// Waits for the handoff.
    pub fn receive(self, timeout: Duration) -> Result<WorkerInit, TransferError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TransferError::Timeout(timeout),
            RecvTimeoutError::Disconnected => TransferError::ControllerGone,
        })
    }
}
