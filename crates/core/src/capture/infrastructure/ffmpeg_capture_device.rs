use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::capture::domain::capture_device::{CaptureDevice, DeviceConstraints, DeviceError};
use crate::capture::domain::frame::Frame;
use crate::capture::domain::frame_pool::FramePool;
use crate::capture::domain::frame_source::{FrameSource, ReadError, SourceSettings};
use crate::shared::color::i420_len;
use crate::shared::constants::DEFAULT_POOL_SIZE;

use super::channel_source::{live_channel, Delivery, FrameProducer};

const EACCES: i32 = 13;
const ENOENT: i32 = 2;
const EAGAIN: i32 = ffmpeg_next::util::error::EAGAIN;
const ENODEV: i32 = 19;
const RETRY_INTERVAL: Duration = Duration::from_millis(2);

/// Camera capture through libavdevice (`ffmpeg-next`).
///
/// The device is opened on its own capture thread, which decodes each packet,
/// scales it to YUV420P at the requested size and copies the planes into a
/// pooled buffer. libav contexts never leave that thread.
pub struct FfmpegCaptureDevice {
    device: String,
    input_format: String,
    pool_size: usize,
}

impl FfmpegCaptureDevice {
    /// `device` is what the platform's input format expects: `/dev/video0`
    /// for v4l2, `"0"` for avfoundation, `video=<name>` for dshow.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            input_format: default_input_format().to_string(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    pub fn with_input_format(mut self, input_format: impl Into<String>) -> Self {
        self.input_format = input_format.into();
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Surfaces permission and existence problems for path-like devices
    /// before libav gets involved.
    fn probe_device_node(&self) -> Result<(), DeviceError> {
        if !self.device.starts_with('/') {
            return Ok(());
        }
        match std::fs::File::open(&self.device) {
            Ok(_) => Ok(()),
            Err(e) => match e.kind() {
                std::io::ErrorKind::PermissionDenied => Err(DeviceError::PermissionDenied {
                    device: self.device.clone(),
                }),
                std::io::ErrorKind::NotFound => Err(DeviceError::NotFound(self.device.clone())),
                _ => Err(DeviceError::Open {
                    device: self.device.clone(),
                    reason: e.to_string(),
                }),
            },
        }
    }
}

impl CaptureDevice for FfmpegCaptureDevice {
    fn name(&self) -> String {
        format!("{} ({})", self.device, self.input_format)
    }

    fn open(&self, constraints: &DeviceConstraints) -> Result<Box<dyn FrameSource>, DeviceError> {
        let (width, height) = constraints.resolve_size()?;
        self.probe_device_node()?;

        let settings = SourceSettings {
            width,
            height,
            frame_rate: constraints.frame_rate_or_default(),
            live: true,
        };
        let (producer, source) =
            live_channel(settings, Delivery::DropWhenBusy, constraints.stall_timeout);
        let pool = FramePool::new(self.pool_size, i420_len(width, height));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let request = CaptureRequest {
            device: self.device.clone(),
            input_format: self.input_format.clone(),
            settings,
        };

        thread::Builder::new()
            .name("ffmpeg-capture".into())
            .spawn(move || capture(request, producer, pool, ready_tx))
            .map_err(DeviceError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(source)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Open {
                device: self.device.clone(),
                reason: "capture thread exited during setup".into(),
            }),
        }
    }
}

struct CaptureRequest {
    device: String,
    input_format: String,
    settings: SourceSettings,
}

fn capture(
    request: CaptureRequest,
    producer: FrameProducer,
    pool: FramePool,
    ready_tx: Sender<Result<(), DeviceError>>,
) {
    let mut stream = match CaptureStream::open(&request) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let width = request.settings.width;
    let height = request.settings.height;
    let mut index: u64 = 0;

    while let Some(next) = stream.next_frame() {
        if producer.reader_gone() {
            break;
        }
        let scaled = match next {
            Ok(scaled) => scaled,
            Err(e) => {
                // The device is gone: frames still in flight lose their storage
                pool.detach();
                producer.fail(ReadError::Device(e.to_string()));
                return;
            }
        };

        let Some(mut buffer) = producer.acquire(&pool) else {
            index += 1;
            continue;
        };
        copy_planes(&scaled, width, height, buffer.data_mut());
        let frame = Frame::new(width, height, index, stream.elapsed(), Box::new(buffer));
        if !producer.offer(frame) {
            break;
        }
        index += 1;
    }
    log::info!("Capture from {} ended after {index} frames", request.device);
}

/// Open input, decoder and scaler for one capture session.
struct CaptureStream {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    started: std::time::Instant,
}

impl CaptureStream {
    fn open(request: &CaptureRequest) -> Result<Self, DeviceError> {
        let device = &request.device;
        let open_err = |reason: String| DeviceError::Open {
            device: device.clone(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_err(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == request.input_format)
            .ok_or_else(|| open_err(format!("input format '{}' is not available", request.input_format)))?;

        let mut options = ffmpeg_next::Dictionary::new();
        options.set("framerate", &request.settings.frame_rate.to_string());
        options.set(
            "video_size",
            &format!("{}x{}", request.settings.width, request.settings.height),
        );

        let input = match ffmpeg_next::format::open_with(device, &format, options) {
            Ok(ffmpeg_next::format::context::Context::Input(input)) => input,
            Ok(_) => return Err(open_err("device opened as an output".into())),
            Err(e) => return Err(map_open_error(device, e)),
        };

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| open_err("no video stream".into()))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_err(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| open_err(e.to_string()))?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::YUV420P,
            request.settings.width,
            request.settings.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| open_err(e.to_string()))?;

        log::info!(
            "Opened {device}: native {}x{} {:?}, scaling to {}x{}",
            decoder.width(),
            decoder.height(),
            decoder.format(),
            request.settings.width,
            request.settings.height
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            started: std::time::Instant::now(),
        })
    }

    fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Blocks for the next decoded, scaled frame. `None` when the device
    /// signals end of input.
    fn next_frame(
        &mut self,
    ) -> Option<Result<ffmpeg_next::util::frame::video::Video, ffmpeg_next::Error>> {
        loop {
            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut scaled = ffmpeg_next::util::frame::video::Video::empty();
                return Some(self.scaler.run(&decoded, &mut scaled).map(|_| scaled));
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match classify_read(packet.read(&mut self.input)) {
                PacketRead::Packet => {}
                PacketRead::Retry => {
                    thread::sleep(RETRY_INTERVAL);
                    continue;
                }
                PacketRead::End => return None,
                PacketRead::Failed(e) => return Some(Err(e)),
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            // Corrupt packets from a camera are skipped, not fatal
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Dropping undecodable packet: {e}");
            }
        }
    }
}

/// Outcome of one `av_read_frame` on a capture input.
#[derive(Debug, PartialEq)]
enum PacketRead {
    Packet,
    /// Nothing buffered yet; ask again.
    Retry,
    End,
    /// The device stopped delivering, e.g. it was unplugged.
    Failed(ffmpeg_next::Error),
}

fn classify_read(result: Result<(), ffmpeg_next::Error>) -> PacketRead {
    match result {
        Ok(()) => PacketRead::Packet,
        Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => PacketRead::Retry,
        Err(ffmpeg_next::Error::Eof) => PacketRead::End,
        Err(e) => PacketRead::Failed(e),
    }
}

/// Copies the three YUV420P planes into `dst`, stripping row padding.
fn copy_planes(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
    dst: &mut [u8],
) {
    let w = width as usize;
    let h = height as usize;
    let mut offset = 0;
    for (plane, (pw, ph)) in [(w, h), (w / 2, h / 2), (w / 2, h / 2)].into_iter().enumerate() {
        let stride = frame.stride(plane);
        let data = frame.data(plane);
        for row in 0..ph {
            let start = row * stride;
            dst[offset..offset + pw].copy_from_slice(&data[start..start + pw]);
            offset += pw;
        }
    }
}

fn map_open_error(device: &str, error: ffmpeg_next::Error) -> DeviceError {
    match error {
        ffmpeg_next::Error::Other { errno } if errno == EACCES => DeviceError::PermissionDenied {
            device: device.to_string(),
        },
        ffmpeg_next::Error::Other { errno } if errno == ENOENT => {
            DeviceError::NotFound(device.to_string())
        }
        other => DeviceError::Open {
            device: device.to_string(),
            reason: other.to_string(),
        },
    }
}

/// libavdevice input format for the current platform.
pub fn default_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}
