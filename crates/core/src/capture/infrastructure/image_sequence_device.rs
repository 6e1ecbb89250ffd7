use std::path::{Path, PathBuf};
use std::thread;

use image::imageops::FilterType;

use crate::capture::domain::capture_device::{CaptureDevice, DeviceConstraints, DeviceError};
use crate::capture::domain::frame::Frame;
use crate::capture::domain::frame_pool::FramePool;
use crate::capture::domain::frame_source::{FrameSource, ReadError, SourceSettings};
use crate::shared::color::{i420_len, rgb_to_i420};
use crate::shared::constants::{DEFAULT_POOL_SIZE, IMAGE_EXTENSIONS};

use super::channel_source::{live_channel, Delivery, FramePacer, FrameProducer};

/// Plays a directory of still images back as a video track.
///
/// Files are ordered by name. Without an explicit size in the constraints
/// the first image decides the resolution (rounded down to even); other
/// images are resized to match. The source is file-backed, so it waits for
/// the reader instead of dropping frames.
pub struct ImageSequenceDevice {
    dir: PathBuf,
    looping: bool,
    pool_size: usize,
}

impl ImageSequenceDevice {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            looping: false,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Restart from the first image instead of ending the stream.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    fn list_images(&self) -> Result<Vec<PathBuf>, DeviceError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied {
                device: self.dir.display().to_string(),
            },
            _ => DeviceError::NotFound(self.dir.display().to_string()),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(DeviceError::NotFound(format!(
                "no images in {}",
                self.dir.display()
            )));
        }
        Ok(paths)
    }
}

impl CaptureDevice for ImageSequenceDevice {
    fn name(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }

    fn open(&self, constraints: &DeviceConstraints) -> Result<Box<dyn FrameSource>, DeviceError> {
        let paths = self.list_images()?;

        let (width, height) = match (constraints.width, constraints.height) {
            (Some(_), Some(_)) => constraints.resolve_size()?,
            _ => {
                let (w, h) = image::image_dimensions(&paths[0]).map_err(|e| DeviceError::Open {
                    device: paths[0].display().to_string(),
                    reason: e.to_string(),
                })?;
                DeviceConstraints {
                    width: Some(w & !1),
                    height: Some(h & !1),
                    ..constraints.clone()
                }
                .resolve_size()?
            }
        };

        let settings = SourceSettings {
            width,
            height,
            frame_rate: constraints.frame_rate_or_default(),
            live: false,
        };
        let (producer, source) =
            live_channel(settings, Delivery::WaitForReader, constraints.stall_timeout);
        let pool = FramePool::new(self.pool_size, i420_len(width, height));
        let looping = self.looping;

        thread::Builder::new()
            .name("image-sequence".into())
            .spawn(move || produce(producer, pool, settings, paths, looping))
            .map_err(DeviceError::Spawn)?;

        Ok(Box::new(source))
    }
}

fn produce(
    producer: FrameProducer,
    pool: FramePool,
    settings: SourceSettings,
    paths: Vec<PathBuf>,
    looping: bool,
) {
    let mut pacer = FramePacer::new(settings.frame_rate);
    let mut index: u64 = 0;

    loop {
        for path in &paths {
            let rgb = match load_rgb(path, settings.width, settings.height) {
                Ok(rgb) => rgb,
                Err(e) => {
                    producer.fail(ReadError::Device(format!(
                        "failed to decode {}: {e}",
                        path.display()
                    )));
                    return;
                }
            };

            let timestamp = pacer.wait();
            let Some(mut buffer) = producer.acquire(&pool) else {
                return;
            };
            rgb_to_i420(&rgb, settings.width, settings.height, buffer.data_mut());
            let frame = Frame::new(settings.width, settings.height, index, timestamp, Box::new(buffer));
            if !producer.offer(frame) {
                return;
            }
            index += 1;
        }
        if !looping {
            break;
        }
    }
    log::debug!("Image sequence finished after {index} frames");
}

fn load_rgb(path: &Path, width: u32, height: u32) -> Result<Vec<u8>, image::ImageError> {
    let mut img = image::open(path)?.to_rgb8();
    if img.dimensions() != (width, height) {
        img = image::imageops::resize(&img, width, height, FilterType::Triangle);
    }
    Ok(img.into_raw())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, name: &str, w: u32, h: u32, value: u8) {
        RgbImage::from_pixel(w, h, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    fn read_all(source: &mut Box<dyn FrameSource>) -> Vec<Vec<u8>> {
        let settings = source.settings();
        let mut out = Vec::new();
        while let Some(frame) = source.read().unwrap() {
            let mut buf = vec![0u8; i420_len(settings.width, settings.height)];
            frame.copy_to(&mut buf).unwrap();
            out.push(buf);
        }
        out
    }

    #[test]
    fn test_plays_images_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", 4, 2, 0);
        write_image(dir.path(), "a.png", 4, 2, 255);
        write_image(dir.path(), "c.png", 4, 2, 255);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceDevice::new(dir.path())
            .open(&DeviceConstraints::video().with_frame_rate(500))
            .unwrap();
        let frames = read_all(&mut source);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0][0], 235);
        assert_eq!(frames[1][0], 16);
        assert_eq!(frames[2][0], 235);
        assert!(frames.iter().all(|f| f.len() == 12));
    }

    #[test]
    fn test_size_comes_from_first_image_rounded_to_even() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "0.png", 7, 5, 10);

        let source = ImageSequenceDevice::new(dir.path())
            .open(&DeviceConstraints::video())
            .unwrap();
        let settings = source.settings();
        assert_eq!((settings.width, settings.height), (6, 4));
        assert!(!settings.live);
    }

    #[test]
    fn test_constraint_size_resizes_images() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "0.png", 20, 10, 255);

        let mut source = ImageSequenceDevice::new(dir.path())
            .open(&DeviceConstraints::video().with_size(4, 2).with_frame_rate(500))
            .unwrap();
        let frames = read_all(&mut source);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 12);
    }

    #[test]
    fn test_looping_restarts_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "0.png", 4, 2, 0);

        let mut source = ImageSequenceDevice::new(dir.path())
            .with_looping(true)
            .open(&DeviceConstraints::video().with_frame_rate(500))
            .unwrap();
        for expected in 0..3 {
            assert_eq!(source.read().unwrap().unwrap().index(), expected);
        }
    }

    #[test]
    fn test_empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageSequenceDevice::new(dir.path())
            .open(&DeviceConstraints::video())
            .err()
            .unwrap();
        assert!(matches!(err, DeviceError::NotFound(_)));
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let err = ImageSequenceDevice::new("/definitely/not/here")
            .open(&DeviceConstraints::video())
            .err()
            .unwrap();
        assert!(matches!(err, DeviceError::NotFound(_)));
    }
}
