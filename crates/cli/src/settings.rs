use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use frame_relay_core::shared::constants::{
    DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_POOL_SIZE, DEFAULT_WIDTH,
};

pub const TEST_PATTERN_DEVICE: &str = "test-pattern";

/// Defaults for the CLI flags, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub processor: String,
    /// Log progress every N frames.
    pub progress_every: u64,
    /// Capture buffers in flight before a live source starts dropping.
    pub pool_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: TEST_PATTERN_DEVICE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            processor: "passthrough".to_string(),
            progress_every: 30,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("frame-relay").join("settings.json"))
    }

    /// Reads settings from `path`. A missing or unreadable file yields the
    /// defaults; fields absent from the file keep their default values.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid settings file {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
