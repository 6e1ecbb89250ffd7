use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::shared::constants::DEFAULT_TRANSFER_TIMEOUT;

/// Configuration for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// How long the worker waits for the surface/source handoff.
    pub transfer_timeout: Duration,
    /// Set to stop the loop between frames.
    pub cancelled: Arc<AtomicBool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}
