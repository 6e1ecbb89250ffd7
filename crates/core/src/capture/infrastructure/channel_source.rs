use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::capture::domain::frame::Frame;
use crate::capture::domain::frame_pool::{FramePool, PooledBuffer};
use crate::capture::domain::frame_source::{FrameSource, ReadError, SourceSettings};

const POOL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a producer does when the reader has not collected the previous frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Discard the new frame. Live cameras behave this way.
    #[default]
    DropWhenBusy,
    /// Block the producer until the reader catches up. Used for file-backed
    /// sources, where every frame should be seen.
    WaitForReader,
}

/// Creates the two ends of a capture thread → pipeline handoff.
///
/// At most one frame waits in the channel; together with the frame pool this
/// keeps a slow reader from building a backlog.
pub fn live_channel(
    settings: SourceSettings,
    delivery: Delivery,
    stall_timeout: Option<Duration>,
) -> (FrameProducer, ChannelFrameSource) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let dropped = Arc::new(AtomicU64::new(0));
    let reader_gone = Arc::new(AtomicBool::new(false));

    let producer = FrameProducer {
        tx,
        delivery,
        dropped: dropped.clone(),
        reader_gone: reader_gone.clone(),
    };
    let source = ChannelFrameSource {
        rx,
        settings,
        stall_timeout,
        dropped,
        reader_gone,
        ended: false,
    };
    (producer, source)
}

/// Capture-thread end of [`live_channel`]. Dropping it ends the stream.
pub struct FrameProducer {
    tx: Sender<Result<Frame, ReadError>>,
    delivery: Delivery,
    dropped: Arc<AtomicU64>,
    reader_gone: Arc<AtomicBool>,
}

impl FrameProducer {
    /// Hands a frame to the reader. Returns false once the reader is gone,
    /// which is the producer's signal to stop capturing.
    pub fn offer(&self, frame: Frame) -> bool {
        if self.reader_gone() {
            return false;
        }
        match self.delivery {
            Delivery::WaitForReader => self.tx.send(Ok(frame)).is_ok(),
            Delivery::DropWhenBusy => match self.tx.try_send(Ok(frame)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.record_drop();
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }

    /// Takes a pool buffer for the next frame, honouring the delivery mode.
    ///
    /// Returns `None` when the frame has to be skipped: every buffer is
    /// pinned on a dropping source, or the reader went away while waiting.
    pub fn acquire(&self, pool: &FramePool) -> Option<PooledBuffer> {
        match self.delivery {
            Delivery::DropWhenBusy => {
                let buffer = pool.acquire();
                if buffer.is_none() {
                    self.record_drop();
                }
                buffer
            }
            Delivery::WaitForReader => loop {
                if self.reader_gone() {
                    return None;
                }
                if let Some(buffer) = pool.acquire_timeout(POOL_POLL_INTERVAL) {
                    return Some(buffer);
                }
            },
        }
    }

    /// Reports a failure. The reader sees it after any frame already queued.
    pub fn fail(self, error: ReadError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reader_gone(&self) -> bool {
        self.reader_gone.load(Ordering::Acquire)
    }
}

/// Pipeline end of [`live_channel`].
pub struct ChannelFrameSource {
    rx: Receiver<Result<Frame, ReadError>>,
    settings: SourceSettings,
    stall_timeout: Option<Duration>,
    dropped: Arc<AtomicU64>,
    reader_gone: Arc<AtomicBool>,
    ended: bool,
}

impl FrameSource for ChannelFrameSource {
    fn settings(&self) -> SourceSettings {
        self.settings
    }

    fn read(&mut self) -> Result<Option<Frame>, ReadError> {
        if self.ended {
            return Ok(None);
        }

        let received = match self.stall_timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(item) => Some(item),
                Err(RecvTimeoutError::Timeout) => return Err(ReadError::Stalled(timeout)),
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.rx.recv().ok(),
        };

        match received {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => {
                self.ended = true;
                Err(e)
            }
            None => {
                self.ended = true;
                Ok(None)
            }
        }
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for ChannelFrameSource {
    fn drop(&mut self) {
        self.reader_gone.store(true, Ordering::Release);
        // Frames still queued give their storage back before the reader goes
        while self.rx.try_recv().is_ok() {}
    }
}

/// Sleeps a capture thread to a fixed frame rate.
pub(crate) struct FramePacer {
    interval: Duration,
    started: Instant,
    next: Instant,
}

impl FramePacer {
    pub(crate) fn new(frame_rate: u32) -> Self {
        let now = Instant::now();
        Self {
            interval: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            started: now,
            next: now,
        }
    }

    /// Waits for the next frame slot and returns its offset from the start.
    pub(crate) fn wait(&mut self) -> Duration {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
        } else if now - self.next > self.interval {
            // Fell behind; restart the cadence instead of bursting
            self.next = now;
        }
        let timestamp = self.next - self.started;
        self.next += self.interval;
        timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::frame::HeapBacking;

    fn settings() -> SourceSettings {
        SourceSettings {
            width: 4,
            height: 2,
            frame_rate: 30,
            live: true,
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::new(4, 2, index, Duration::ZERO, Box::new(HeapBacking::new(vec![0; 12])))
    }

    #[test]
    fn test_frames_arrive_then_end_of_stream() {
        let (producer, mut source) = live_channel(settings(), Delivery::WaitForReader, None);
        let handle = std::thread::spawn(move || {
            for i in 0..3 {
                assert!(producer.offer(frame(i)));
            }
        });

        let mut indices = Vec::new();
        while let Some(f) = source.read().unwrap() {
            indices.push(f.index());
        }
        handle.join().unwrap();

        assert_eq!(indices, vec![0, 1, 2]);
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_busy_reader_causes_drops() {
        let (producer, mut source) = live_channel(settings(), Delivery::DropWhenBusy, None);
        assert!(producer.offer(frame(0)));
        assert!(producer.offer(frame(1)));
        assert!(producer.offer(frame(2)));
        drop(producer);

        assert_eq!(source.read().unwrap().unwrap().index(), 0);
        assert!(source.read().unwrap().is_none());
        assert_eq!(source.dropped_frames(), 2);
    }

    #[test]
    fn test_failure_is_reported_once_then_stream_ends() {
        let (producer, mut source) = live_channel(settings(), Delivery::DropWhenBusy, None);
        producer.fail(ReadError::Device("unplugged".into()));

        assert_eq!(
            source.read().unwrap_err(),
            ReadError::Device("unplugged".into())
        );
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_stall_timeout() {
        let (_producer, mut source) = live_channel(
            settings(),
            Delivery::DropWhenBusy,
            Some(Duration::from_millis(20)),
        );
        assert_eq!(
            source.read().unwrap_err(),
            ReadError::Stalled(Duration::from_millis(20))
        );
    }

    #[test]
    fn test_dropping_source_stops_producer() {
        let (producer, source) = live_channel(settings(), Delivery::WaitForReader, None);
        drop(source);
        assert!(producer.reader_gone());
        assert!(!producer.offer(frame(0)));
    }

    #[test]
    fn test_acquire_records_drop_when_pool_exhausted() {
        let (producer, source) = live_channel(settings(), Delivery::DropWhenBusy, None);
        let pool = FramePool::new(1, 12);
        let _held = producer.acquire(&pool).unwrap();
        assert!(producer.acquire(&pool).is_none());
        assert_eq!(source.dropped_frames(), 1);
    }

    #[test]
    fn test_dropping_source_releases_queued_frame() {
        let (producer, source) = live_channel(settings(), Delivery::DropWhenBusy, None);
        let pool = FramePool::new(2, 12);
        let buffer = producer.acquire(&pool).unwrap();
        assert!(producer.offer(Frame::new(4, 2, 0, Duration::ZERO, Box::new(buffer))));
        assert_eq!(pool.available(), 1);

        drop(source);
        assert_eq!(pool.available(), pool.capacity());
        assert!(!producer.offer(frame(1)));
    }

    #[test]
    fn test_stalled_source_releases_late_frame_on_drop() {
        let (producer, mut source) = live_channel(
            settings(),
            Delivery::DropWhenBusy,
            Some(Duration::from_millis(20)),
        );
        let pool = FramePool::new(1, 12);
        assert!(matches!(source.read(), Err(ReadError::Stalled(_))));

        let buffer = producer.acquire(&pool).unwrap();
        assert!(producer.offer(Frame::new(4, 2, 0, Duration::ZERO, Box::new(buffer))));
        assert_eq!(pool.available(), 0);

        drop(source);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_pacer_timestamps_advance() {
        let mut pacer = FramePacer::new(1000);
        let first = pacer.wait();
        let second = pacer.wait();
        assert!(second > first);
    }
}
