use std::time::Duration;

use thiserror::Error;

use super::frame_source::FrameSource;
use crate::shared::color::is_i420_compatible;
use crate::shared::constants::{DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Requested capture parameters. Unset fields fall back to defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConstraints {
    pub video: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    /// Turns a read that waits longer than this into `ReadError::Stalled`.
    pub stall_timeout: Option<Duration>,
}

impl DeviceConstraints {
    pub fn video() -> Self {
        Self {
            video: true,
            width: None,
            height: None,
            frame_rate: None,
            stall_timeout: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub fn frame_rate_or_default(&self) -> u32 {
        self.frame_rate.filter(|&r| r > 0).unwrap_or(DEFAULT_FRAME_RATE)
    }

    /// Checks the request and resolves the capture size.
    pub fn resolve_size(&self) -> Result<(u32, u32), DeviceError> {
        if !self.video {
            return Err(DeviceError::NoVideoRequested);
        }
        let width = self.width.unwrap_or(DEFAULT_WIDTH);
        let height = self.height.unwrap_or(DEFAULT_HEIGHT);
        if !is_i420_compatible(width, height) {
            return Err(DeviceError::UnsupportedSize { width, height });
        }
        Ok((width, height))
    }
}

impl Default for DeviceConstraints {
    fn default() -> Self {
        Self::video()
    }
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("constraints do not request a video track")]
    NoVideoRequested,
    #[error("permission to use {device} was denied")]
    PermissionDenied { device: String },
    #[error("capture device not found: {0}")]
    NotFound(String),
    #[error("unsupported capture size {width}x{height}: dimensions must be even and non-zero")]
    UnsupportedSize { width: u32, height: u32 },
    #[error("failed to open {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("failed to start capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Opens a video track as a [`FrameSource`].
///
/// Opening may ask the user for permission; a refusal comes back as
/// `DeviceError::PermissionDenied`.
pub trait CaptureDevice: Send {
    /// Name used in logs.
    fn name(&self) -> String;

    fn open(&self, constraints: &DeviceConstraints) -> Result<Box<dyn FrameSource>, DeviceError>;
}
