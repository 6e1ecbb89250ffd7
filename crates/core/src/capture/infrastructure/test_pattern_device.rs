use std::thread;

use crate::capture::domain::capture_device::{CaptureDevice, DeviceConstraints, DeviceError};
use crate::capture::domain::frame::Frame;
use crate::capture::domain::frame_pool::FramePool;
use crate::capture::domain::frame_source::{FrameSource, SourceSettings};
use crate::shared::color::{i420_len, rgb_to_yuv};
use crate::shared::constants::DEFAULT_POOL_SIZE;

use super::channel_source::{live_channel, Delivery, FramePacer, FrameProducer};

/// SMPTE-style bars: white, yellow, cyan, green, magenta, red, blue.
const BARS: [[u8; 3]; 7] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
];

/// Pixels the bars move per frame.
const SCROLL_STEP: usize = 2;

/// Synthetic camera that renders scrolling colour bars.
///
/// Runs on its own capture thread at the requested frame rate and behaves
/// like a live device: a busy reader causes frames to be dropped unless
/// `Delivery::WaitForReader` is selected.
pub struct TestPatternDevice {
    frame_limit: Option<u64>,
    pool_size: usize,
    delivery: Delivery,
}

impl TestPatternDevice {
    pub fn new() -> Self {
        Self {
            frame_limit: None,
            pool_size: DEFAULT_POOL_SIZE,
            delivery: Delivery::DropWhenBusy,
        }
    }

    /// Ends the stream after `limit` captured frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }
}

impl Default for TestPatternDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for TestPatternDevice {
    fn name(&self) -> String {
        "test-pattern".to_string()
    }

    fn open(&self, constraints: &DeviceConstraints) -> Result<Box<dyn FrameSource>, DeviceError> {
        let (width, height) = constraints.resolve_size()?;
        let frame_rate = constraints.frame_rate_or_default();
        let settings = SourceSettings {
            width,
            height,
            frame_rate,
            live: true,
        };

        let (producer, source) = live_channel(settings, self.delivery, constraints.stall_timeout);
        let pool = FramePool::new(self.pool_size, i420_len(width, height));
        let frame_limit = self.frame_limit;

        thread::Builder::new()
            .name("test-pattern".into())
            .spawn(move || produce(producer, pool, settings, frame_limit))
            .map_err(DeviceError::Spawn)?;

        Ok(Box::new(source))
    }
}

fn produce(producer: FrameProducer, pool: FramePool, settings: SourceSettings, limit: Option<u64>) {
    let mut pacer = FramePacer::new(settings.frame_rate);
    let mut index: u64 = 0;

    while limit.map_or(true, |l| index < l) {
        let timestamp = pacer.wait();
        if producer.reader_gone() {
            break;
        }
        if let Some(mut buffer) = producer.acquire(&pool) {
            fill_pattern(buffer.data_mut(), settings.width, settings.height, index);
            let frame = Frame::new(settings.width, settings.height, index, timestamp, Box::new(buffer));
            if !producer.offer(frame) {
                break;
            }
        }
        index += 1;
    }
    log::debug!("Test pattern stopped after {index} frames");
}

/// Renders frame `index` of the scrolling bars into a planar 4:2:0 buffer.
pub fn fill_pattern(dst: &mut [u8], width: u32, height: u32, index: u64) {
    let w = width as usize;
    let h = height as usize;
    let bar_width = (w / BARS.len()).max(1);
    let shift = (index as usize).wrapping_mul(SCROLL_STEP) % w;
    let yuv: Vec<(u8, u8, u8)> = BARS.iter().map(|c| rgb_to_yuv(c[0], c[1], c[2])).collect();
    let bar_at = |x: usize| yuv[((x + shift) % w / bar_width).min(BARS.len() - 1)];

    let (luma, chroma) = dst.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(w * h / 4);

    for x in 0..w {
        let y_value = bar_at(x).0;
        for row in 0..h {
            luma[row * w + x] = y_value;
        }
    }

    let cw = w / 2;
    for cx in 0..cw {
        let (_, u, v) = bar_at(cx * 2);
        for cy in 0..h / 2 {
            u_plane[cy * cw + cx] = u;
            v_plane[cy * cw + cx] = v;
        }
    }
}
