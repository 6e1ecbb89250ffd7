use std::time::Duration;

/// Canvas size used when the constraints leave the resolution open.
pub const DEFAULT_WIDTH: u32 = 400;
pub const DEFAULT_HEIGHT: u32 = 300;

pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Buffers a source can have in flight before the producer starts dropping.
pub const DEFAULT_POOL_SIZE: usize = 2;

/// How long the worker waits for the surface/source handoff.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

pub const WORKER_THREAD_NAME: &str = "frame-worker";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
