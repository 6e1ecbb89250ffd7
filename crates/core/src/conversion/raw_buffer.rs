use ndarray::ArrayView2;
use thiserror::Error;

use crate::capture::domain::frame::{Frame, FrameCopyError};
use crate::shared::color::{i420_len, is_i420_compatible};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("frame size {width}x{height} cannot be stored as 4:2:0")]
    Dimensions { width: u32, height: u32 },
    #[error("failed to copy frame {index}")]
    Copy {
        index: u64,
        #[source]
        source: FrameCopyError,
    },
    #[error("raw buffer holds {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// Contiguous planar 4:2:0 copy of one frame: the Y plane, then U, then V.
///
/// Always exactly `3 * width * height / 2` bytes. Owned by the worker until
/// processing returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl RawBuffer {
    pub fn len_for(width: u32, height: u32) -> usize {
        i420_len(width, height)
    }

    /// Wraps bytes that are already laid out as planar 4:2:0.
    pub fn from_bytes(data: Vec<u8>, width: u32, height: u32) -> Result<Self, ConversionError> {
        if !is_i420_compatible(width, height) {
            return Err(ConversionError::Dimensions { width, height });
        }
        let expected = Self::len_for(width, height);
        if data.len() != expected {
            return Err(ConversionError::Length {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Full-resolution luma plane as `(height, width)`.
    pub fn luma(&self) -> ArrayView2<'_, u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        ArrayView2::from_shape((h, w), &self.data[..w * h])
            .expect("RawBuffer length must match dimensions")
    }

    /// Quarter-resolution U plane as `(height / 2, width / 2)`.
    pub fn chroma_u(&self) -> ArrayView2<'_, u8> {
        self.chroma_plane(0)
    }

    /// Quarter-resolution V plane as `(height / 2, width / 2)`.
    pub fn chroma_v(&self) -> ArrayView2<'_, u8> {
        self.chroma_plane(1)
    }

    fn chroma_plane(&self, plane: usize) -> ArrayView2<'_, u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let plane_len = w * h / 4;
        let start = w * h + plane * plane_len;
        ArrayView2::from_shape((h / 2, w / 2), &self.data[start..start + plane_len])
            .expect("RawBuffer length must match dimensions")
    }
}

/// Copies the frame's pixels into a freshly allocated [`RawBuffer`].
///
/// The frame is only borrowed; releasing it stays with the caller.
pub fn convert(frame: &Frame) -> Result<RawBuffer, ConversionError> {
    let (width, height) = (frame.width(), frame.height());
    if !is_i420_compatible(width, height) {
        return Err(ConversionError::Dimensions { width, height });
    }

    let mut data = vec![0u8; RawBuffer::len_for(width, height)];
    frame.copy_to(&mut data).map_err(|source| ConversionError::Copy {
        index: frame.index(),
        source,
    })?;

    Ok(RawBuffer {
        data,
        width,
        height,
    })
}
