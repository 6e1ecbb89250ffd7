use crossbeam_channel::Receiver;
use image::RgbaImage;
use thiserror::Error;

use super::offscreen_surface::OffscreenSurface;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("canvas control was transferred to an offscreen surface")]
    Transferred,
    #[error("canvas control has already been transferred")]
    AlreadyTransferred,
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

enum Control {
    Owned(RgbaImage),
    Transferred {
        presented: Receiver<RgbaImage>,
        latest: Option<RgbaImage>,
    },
}

/// The visible drawing surface, owned by the controller.
///
/// Starts out drawable. After [`Canvas::transfer_control_to_offscreen`] the
/// worker's [`OffscreenSurface`] is the only thing that can change what the
/// canvas shows; direct draws fail with `SurfaceError::Transferred`.
pub struct Canvas {
    width: u32,
    height: u32,
    control: Control,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::InvalidSize { width, height });
        }
        Ok(Self {
            width,
            height,
            control: Control::Owned(RgbaImage::new(width, height)),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_transferred(&self) -> bool {
        matches!(self.control, Control::Transferred { .. })
    }

    /// Copies `image` onto the canvas with its top-left corner at (`x`, `y`).
    /// Pixels outside the canvas are clipped.
    pub fn draw_raw(&mut self, image: &RgbaImage, x: i64, y: i64) -> Result<(), SurfaceError> {
        match &mut self.control {
            Control::Owned(pixels) => {
                image::imageops::replace(pixels, image, x, y);
                Ok(())
            }
            Control::Transferred { .. } => Err(SurfaceError::Transferred),
        }
    }

    /// Hands drawing control to a surface that can move to another thread.
    ///
    /// The surface starts with the canvas's current pixels. Succeeds once.
    pub fn transfer_control_to_offscreen(&mut self) -> Result<OffscreenSurface, SurfaceError> {
        let Control::Owned(pixels) = &mut self.control else {
            return Err(SurfaceError::AlreadyTransferred);
        };
        let pixels = std::mem::take(pixels);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let latest = Some(pixels.clone());
        let surface = OffscreenSurface::new(pixels, tx, rx.clone());
        self.control = Control::Transferred {
            presented: rx,
            latest,
        };
        Ok(surface)
    }

    /// What the canvas currently shows. After a transfer this is the most
    /// recent image the offscreen surface presented.
    pub fn displayed(&mut self) -> Option<&RgbaImage> {
        match &mut self.control {
            Control::Owned(pixels) => Some(&*pixels),
            Control::Transferred { presented, latest } => {
                if let Some(newest) = presented.try_iter().last() {
                    *latest = Some(newest);
                }
                latest.as_ref()
            }
        }
    }
}
