use std::fmt;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::RgbaImage;

/// Drawing surface detached from its [`Canvas`](super::canvas::Canvas).
///
/// Obtained once per canvas and moved to the worker. Draws land in a private
/// back buffer; [`present`](Self::present) publishes a copy to the canvas.
/// Only the newest presented image is kept, so a controller that looks at the
/// canvas less often than the worker presents never builds a backlog.
pub struct OffscreenSurface {
    pixels: RgbaImage,
    presented_tx: Sender<RgbaImage>,
    stale_rx: Receiver<RgbaImage>,
    presented: u64,
}

impl OffscreenSurface {
    pub(crate) fn new(
        pixels: RgbaImage,
        presented_tx: Sender<RgbaImage>,
        stale_rx: Receiver<RgbaImage>,
    ) -> Self {
        Self {
            pixels,
            presented_tx,
            stale_rx,
            presented: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Copies `image` into the back buffer at (`x`, `y`), clipping at the edges.
    pub fn draw_raw(&mut self, image: &RgbaImage, x: i64, y: i64) {
        image::imageops::replace(&mut self.pixels, image, x, y);
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Publishes the back buffer to the canvas, replacing anything the
    /// canvas has not picked up yet.
    pub fn present(&mut self) {
        let mut image = self.pixels.clone();
        loop {
            match self.presented_tx.try_send(image) {
                Ok(()) => break,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.stale_rx.try_recv();
                    image = rejected;
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        self.presented += 1;
    }

    /// Number of images presented so far.
    pub fn presented_count(&self) -> u64 {
        self.presented
    }
}

impl fmt::Debug for OffscreenSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffscreenSurface")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("presented", &self.presented)
            .finish_non_exhaustive()
    }
}
