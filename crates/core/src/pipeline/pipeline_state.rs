use std::fmt;

use thiserror::Error;

/// Why a pipeline reached `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    EndOfStream,
    ReadFailed,
    ProcessorFailed,
    Cancelled,
    /// Setup failed before the worker owned a source.
    StartupFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    /// The worker holds the surface and the source, nothing read yet.
    Initialized,
    /// At least one frame has been read.
    Running,
    Closed(CloseReason),
}

impl PipelineState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Closed(reason) => write!(f, "closed ({reason:?})"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal pipeline transition from {from} to {to}")]
pub struct StateError {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// Tracks the lifecycle and rejects transitions that would skip a step or
/// leave `Closed`.
#[derive(Debug)]
pub struct PipelineStateMachine {
    current: PipelineState,
}

impl PipelineStateMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Uninitialized,
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn transition(&mut self, to: PipelineState) -> Result<PipelineState, StateError> {
        use PipelineState::*;
        let legal = matches!(
            (self.current, to),
            (Uninitialized, Initialized)
                | (Initialized, Running)
                | (Uninitialized | Initialized | Running, Closed(_))
        );
        if !legal {
            return Err(StateError {
                from: self.current,
                to,
            });
        }
        log::debug!("Pipeline {} -> {}", self.current, to);
        self.current = to;
        Ok(to)
    }
}

impl Default for PipelineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
