use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameCopyError {
    #[error("frame storage was reclaimed by its source")]
    Detached,
    #[error("frame storage holds {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Storage behind a captured frame.
///
/// The pixels may live in memory the capture backend owns (a pooled buffer,
/// a driver mapping), so the pipeline never borrows them directly: it copies
/// them out and then hands the storage back through `release`.
pub trait FrameBacking: Send {
    /// Copies the planar 4:2:0 bytes into `dst`.
    fn copy_to(&self, dst: &mut [u8]) -> Result<(), FrameCopyError>;

    /// Returns the storage to its owner. `Frame` calls this exactly once.
    fn release(self: Box<Self>);
}

/// One decoded video sample with resource-backed pixel storage.
///
/// A frame releases its backing exactly once: either through
/// [`Frame::release`] or when it is dropped, whichever comes first. Because
/// release consumes the frame, it cannot be copied afterwards.
pub struct Frame {
    width: u32,
    height: u32,
    index: u64,
    timestamp: Duration,
    backing: Option<Box<dyn FrameBacking>>,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        index: u64,
        timestamp: Duration,
        backing: Box<dyn FrameBacking>,
    ) -> Self {
        Self {
            width,
            height,
            index,
            timestamp,
            backing: Some(backing),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Position of the frame in the source's capture order.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Capture time relative to when the source started.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn copy_to(&self, dst: &mut [u8]) -> Result<(), FrameCopyError> {
        match &self.backing {
            Some(backing) => backing.copy_to(dst),
            None => Err(FrameCopyError::Detached),
        }
    }

    /// Hands the storage back to the source so it can produce the next frame.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(backing) = self.backing.take() {
            backing.release();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Heap-allocated backing for frames that do not come from a pool.
pub struct HeapBacking {
    data: Vec<u8>,
}

impl HeapBacking {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl FrameBacking for HeapBacking {
    fn copy_to(&self, dst: &mut [u8]) -> Result<(), FrameCopyError> {
        copy_exact(&self.data, dst)
    }

    fn release(self: Box<Self>) {}
}

/// Copies `src` into `dst`, refusing partial copies.
pub fn copy_exact(src: &[u8], dst: &mut [u8]) -> Result<(), FrameCopyError> {
    if src.len() != dst.len() {
        return Err(FrameCopyError::LengthMismatch {
            expected: dst.len(),
            actual: src.len(),
        });
    }
    dst.copy_from_slice(src);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBacking {
        releases: Arc<AtomicUsize>,
    }

    impl FrameBacking for CountingBacking {
        fn copy_to(&self, dst: &mut [u8]) -> Result<(), FrameCopyError> {
            dst.fill(7);
            Ok(())
        }

        fn release(self: Box<Self>) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_frame(releases: &Arc<AtomicUsize>) -> Frame {
        let backing = CountingBacking {
            releases: releases.clone(),
        };
        Frame::new(4, 2, 0, Duration::ZERO, Box::new(backing))
    }

    #[test]
    fn test_accessors() {
        let frame = Frame::new(
            4,
            2,
            9,
            Duration::from_millis(300),
            Box::new(HeapBacking::new(vec![0; 12])),
        );
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index(), 9);
        assert_eq!(frame.timestamp(), Duration::from_millis(300));
    }

    #[test]
    fn test_explicit_release_runs_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        counting_frame(&releases).release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let _frame = counting_frame(&releases);
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_early_return_path() {
        fn bail(frame: Frame) -> Result<(), &'static str> {
            let _held = frame;
            Err("conversion failed")
        }

        let releases = Arc::new(AtomicUsize::new(0));
        assert!(bail(counting_frame(&releases)).is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_copy_to_reads_backing() {
        let frame = Frame::new(
            4,
            2,
            0,
            Duration::ZERO,
            Box::new(HeapBacking::new((0..12).collect())),
        );
        let mut dst = vec![0u8; 12];
        frame.copy_to(&mut dst).unwrap();
        assert_eq!(dst, (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_copy_exact_rejects_short_destination() {
        let mut dst = vec![0u8; 10];
        let err = copy_exact(&[1u8; 12], &mut dst).unwrap_err();
        assert_eq!(
            err,
            FrameCopyError::LengthMismatch {
                expected: 10,
                actual: 12
            }
        );
        assert!(dst.iter().all(|&b| b == 0));
    }
}
