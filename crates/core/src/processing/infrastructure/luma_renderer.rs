use image::{Rgba, RgbaImage};

use crate::conversion::raw_buffer::RawBuffer;
use crate::processing::domain::frame_processor::{check_buffer, FrameProcessor, ProcessingError};
use crate::surface::offscreen_surface::OffscreenSurface;

/// Draws only the luma plane, as grayscale expanded from studio range.
pub struct LumaRenderer {
    /// Studio-range Y (16..=235) to full-range gray.
    levels: [u8; 256],
}

impl LumaRenderer {
    pub fn new() -> Self {
        let mut levels = [0u8; 256];
        for (y, level) in levels.iter_mut().enumerate() {
            let scaled = (y as i32 - 16) * 255 / 219;
            *level = scaled.clamp(0, 255) as u8;
        }
        Self { levels }
    }
}

impl Default for LumaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor for LumaRenderer {
    fn process(
        &mut self,
        surface: &mut OffscreenSurface,
        buffer: &RawBuffer,
        width: u32,
        height: u32,
    ) -> Result<(), ProcessingError> {
        check_buffer(buffer, width, height)?;
        let luma = buffer.luma();
        let image = RgbaImage::from_fn(width, height, |x, y| {
            let gray = self.levels[luma[[y as usize, x as usize]] as usize];
            Rgba([gray, gray, gray, 255])
        });
        surface.draw_raw(&image, 0, 0);
        Ok(())
    }
}
