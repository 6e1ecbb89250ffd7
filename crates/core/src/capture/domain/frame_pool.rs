use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::frame::{copy_exact, FrameBacking, FrameCopyError};

/// Fixed set of reusable frame buffers shared between a producer and the
/// frames it hands out.
///
/// A frame pins its buffer until it is released. Once every buffer is pinned
/// the producer cannot build another frame, which is what bounds memory on a
/// live source: the new capture is dropped instead of queued.
pub struct FramePool {
    free_tx: Sender<Vec<u8>>,
    free_rx: Receiver<Vec<u8>>,
    attached: Arc<AtomicBool>,
    capacity: usize,
    frame_len: usize,
}

impl FramePool {
    pub fn new(capacity: usize, frame_len: usize) -> Self {
        let capacity = capacity.max(1);
        let (free_tx, free_rx) = crossbeam_channel::bounded(capacity);
        for _ in 0..capacity {
            let _ = free_tx.send(vec![0u8; frame_len]);
        }
        Self {
            free_tx,
            free_rx,
            attached: Arc::new(AtomicBool::new(true)),
            capacity,
            frame_len,
        }
    }

    /// Takes a free buffer, or `None` when all of them are pinned.
    pub fn acquire(&self) -> Option<PooledBuffer> {
        let data = self.free_rx.try_recv().ok()?;
        Some(self.wrap(data))
    }

    /// Like `acquire`, but waits up to `timeout` for a frame to be released.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<PooledBuffer> {
        let data = self.free_rx.recv_timeout(timeout).ok()?;
        Some(self.wrap(data))
    }

    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Invalidates the storage of every outstanding frame, as happens when
    /// the device behind the pool goes away. Copies from those frames fail.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    fn wrap(&self, data: Vec<u8>) -> PooledBuffer {
        PooledBuffer {
            data,
            recycle: self.free_tx.clone(),
            attached: self.attached.clone(),
        }
    }
}

/// A buffer borrowed from a [`FramePool`]; goes back to the pool when
/// dropped, whether or not it was ever wrapped in a frame.
pub struct PooledBuffer {
    data: Vec<u8>,
    recycle: Sender<Vec<u8>>,
    attached: Arc<AtomicBool>,
}

impl PooledBuffer {
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl FrameBacking for PooledBuffer {
    fn copy_to(&self, dst: &mut [u8]) -> Result<(), FrameCopyError> {
        if !self.attached.load(Ordering::Acquire) {
            return Err(FrameCopyError::Detached);
        }
        copy_exact(&self.data, dst)
    }

    fn release(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // Fails only when the pool itself is gone; the buffer is freed then.
        let _ = self.recycle.try_send(std::mem::take(&mut self.data));
    }
}
