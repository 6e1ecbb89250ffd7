use image::{Rgba, RgbaImage};

use crate::conversion::raw_buffer::RawBuffer;
use crate::processing::domain::frame_processor::{check_buffer, FrameProcessor, ProcessingError};
use crate::shared::color::yuv_to_rgb;
use crate::surface::offscreen_surface::OffscreenSurface;

/// Converts each frame back to RGBA and draws it at the surface origin.
pub struct PassthroughRenderer;

impl PassthroughRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PassthroughRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor for PassthroughRenderer {
    fn process(
        &mut self,
        surface: &mut OffscreenSurface,
        buffer: &RawBuffer,
        width: u32,
        height: u32,
    ) -> Result<(), ProcessingError> {
        check_buffer(buffer, width, height)?;
        surface.draw_raw(&i420_to_rgba(buffer), 0, 0);
        Ok(())
    }
}

/// Expands a planar 4:2:0 buffer to opaque RGBA.
pub fn i420_to_rgba(buffer: &RawBuffer) -> RgbaImage {
    let luma = buffer.luma();
    let u = buffer.chroma_u();
    let v = buffer.chroma_v();
    RgbaImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        let (row, col) = (y as usize, x as usize);
        let [r, g, b] = yuv_to_rgb(
            luma[[row, col]],
            u[[row / 2, col / 2]],
            v[[row / 2, col / 2]],
        );
        Rgba([r, g, b, 255])
    })
}
