mod settings;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use clap::Parser;

use frame_relay_core::capture::domain::capture_device::{CaptureDevice, DeviceConstraints};
use frame_relay_core::capture::infrastructure::ffmpeg_capture_device::FfmpegCaptureDevice;
use frame_relay_core::capture::infrastructure::image_sequence_device::ImageSequenceDevice;
use frame_relay_core::capture::infrastructure::test_pattern_device::TestPatternDevice;
use frame_relay_core::pipeline::frame_pull_loop::{LoopReport, PipelineEvent};
use frame_relay_core::pipeline::pipeline_config::PipelineConfig;
use frame_relay_core::pipeline::pipeline_error::PipelineError;
use frame_relay_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use frame_relay_core::pipeline::start_pipeline_use_case::StartPipelineUseCase;
use frame_relay_core::processing::infrastructure::processor_factory::{
    spawn_processor, ProcessorKind,
};

use settings::{Settings, TEST_PATTERN_DEVICE};

/// Pulls frames from a capture device through a worker-thread pipeline.
#[derive(Parser)]
#[command(name = "frame-relay")]
struct Cli {
    /// Capture device: "test-pattern", a directory of images, or a camera
    /// (e.g. /dev/video0).
    #[arg(long)]
    device: Option<String>,

    /// Capture width (must be even).
    #[arg(long)]
    width: Option<u32>,

    /// Capture height (must be even).
    #[arg(long)]
    height: Option<u32>,

    /// Requested frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// End the test pattern after N frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Frame processor: passthrough or luma.
    #[arg(long)]
    processor: Option<String>,

    /// Simulated processor initialization time in milliseconds.
    #[arg(long, default_value = "0")]
    init_delay_ms: u64,

    /// Replay an image directory from the start when it runs out.
    #[arg(long)]
    loop_images: bool,

    /// Treat a read that waits longer than this many milliseconds as failed.
    #[arg(long)]
    stall_timeout_ms: Option<u64>,

    /// Settings file (default: <config dir>/frame-relay/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings_path = cli.config.clone().or_else(Settings::default_path);
    let stored = settings_path
        .as_deref()
        .map(Settings::load_from)
        .unwrap_or_default();
    let settings = apply_flags(stored, &cli);

    if cli.save_settings {
        let path = settings_path.ok_or("no config directory available for --save-settings")?;
        settings.save_to(&path)?;
        log::info!("Saved settings to {}", path.display());
    }

    let kind: ProcessorKind = settings.processor.parse()?;
    let device = build_device(&settings, &cli)?;
    let constraints = build_constraints(&settings, &cli);

    let config = PipelineConfig::default();
    let cancelled = config.cancelled.clone();
    let processor = spawn_processor(kind, Duration::from_millis(cli.init_delay_ms))
        .map_err(PipelineError::ProcessorSpawn)?;
    let logger = Box::new(StdoutPipelineLogger::new(settings.progress_every));

    let handle =
        StartPipelineUseCase::new(device, constraints, processor, logger, config).execute()?;

    if let Some(secs) = cli.duration {
        let stop_after = Duration::from_secs_f64(secs);
        thread::Builder::new()
            .name("duration-timer".into())
            .spawn(move || {
                thread::sleep(stop_after);
                log::info!("Duration of {secs}s reached, stopping");
                cancelled.store(true, Ordering::Relaxed);
            })?;
    }

    for event in handle.events().iter() {
        match event {
            PipelineEvent::StateChanged(state) => log::info!("Pipeline {state}"),
            PipelineEvent::ConversionFailed { index, error } => {
                log::debug!("Frame {index} not converted: {error}")
            }
            PipelineEvent::ProcessingFailed { index, error } => {
                log::debug!("Frame {index} not processed: {error}")
            }
            PipelineEvent::ReadFailed(error) => log::debug!("Read failed: {error}"),
            PipelineEvent::Finished(_) => break,
        }
    }

    let report = handle.join()?;
    print_report(&report);
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(secs) = cli.duration {
        if !secs.is_finite() || secs <= 0.0 {
            return Err("--duration must be a positive number of seconds".into());
        }
    }
    if cli.frames == Some(0) {
        return Err("--frames must be at least 1".into());
    }
    Ok(())
}

/// Flags override whatever the settings file holds.
fn apply_flags(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(device) = &cli.device {
        settings.device = device.clone();
    }
    if let Some(width) = cli.width {
        settings.width = width;
    }
    if let Some(height) = cli.height {
        settings.height = height;
    }
    if let Some(fps) = cli.fps {
        settings.frame_rate = fps;
    }
    if let Some(processor) = &cli.processor {
        settings.processor = processor.clone();
    }
    settings
}

fn build_device(
    settings: &Settings,
    cli: &Cli,
) -> Result<Box<dyn CaptureDevice>, Box<dyn std::error::Error>> {
    if settings.device == TEST_PATTERN_DEVICE {
        let mut device = TestPatternDevice::new().with_pool_size(settings.pool_size);
        if let Some(frames) = cli.frames {
            device = device.with_frame_limit(frames);
        }
        return Ok(Box::new(device));
    }

    if cli.frames.is_some() {
        return Err("--frames only applies to the test-pattern device".into());
    }
    let path = Path::new(&settings.device);
    if path.is_dir() {
        Ok(Box::new(ImageSequenceDevice::new(path).with_looping(cli.loop_images)))
    } else {
        Ok(Box::new(
            FfmpegCaptureDevice::new(settings.device.clone()).with_pool_size(settings.pool_size),
        ))
    }
}

/// An image directory takes its size from the first image unless a size
/// was asked for on the command line.
fn build_constraints(settings: &Settings, cli: &Cli) -> DeviceConstraints {
    let mut constraints = DeviceConstraints::video().with_frame_rate(settings.frame_rate);
    let size_requested = cli.width.is_some() || cli.height.is_some();
    if size_requested || !Path::new(&settings.device).is_dir() {
        constraints = constraints.with_size(settings.width, settings.height);
    }
    if let Some(ms) = cli.stall_timeout_ms {
        constraints = constraints.with_stall_timeout(Duration::from_millis(ms));
    }
    constraints
}

fn print_report(report: &LoopReport) {
    println!("Stopped: {:?}", report.exit.close_reason());
    println!(
        "  frames read {}, processed {}, skipped while initializing {}",
        report.frames_read, report.frames_processed, report.frames_skipped
    );
    if report.conversion_failures + report.processing_failures > 0 {
        println!(
            "  conversion failures {}, processing failures {}",
            report.conversion_failures, report.processing_failures
        );
    }
    if report.dropped_by_source > 0 {
        println!("  dropped by source {}", report.dropped_by_source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("frame-relay").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = parse(&["--width", "640", "--processor", "luma"]);
        let settings = apply_flags(Settings::default(), &cli);
        assert_eq!(settings.width, 640);
        assert_eq!(settings.height, Settings::default().height);
        assert_eq!(settings.processor, "luma");
    }

    #[test]
    fn test_unset_flags_keep_stored_values() {
        let stored = Settings {
            device: "/dev/video1".into(),
            frame_rate: 15,
            ..Settings::default()
        };
        let settings = apply_flags(stored.clone(), &parse(&[]));
        assert_eq!(settings, stored);
    }

    #[test]
    fn test_validate_rejects_bad_duration() {
        assert!(validate(&parse(&["--duration", "0"])).is_err());
        assert!(validate(&parse(&["--duration", "1.5"])).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_frames() {
        assert!(validate(&parse(&["--frames", "0"])).is_err());
    }

    #[test]
    fn test_device_selection() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&[]);
        let mut settings = Settings::default();
        assert_eq!(build_device(&settings, &cli).unwrap().name(), "test-pattern");

        settings.device = dir.path().display().to_string();
        assert!(build_device(&settings, &cli)
            .unwrap()
            .name()
            .starts_with("image sequence"));

        settings.device = "/dev/video0".into();
        assert!(build_device(&settings, &cli)
            .unwrap()
            .name()
            .starts_with("/dev/video0"));
    }

    #[test]
    fn test_frames_rejected_for_other_devices() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["--frames", "10"]);
        let settings = Settings {
            device: dir.path().display().to_string(),
            ..Settings::default()
        };
        assert!(build_device(&settings, &cli).is_err());
        assert!(build_device(&Settings::default(), &cli).is_ok());
    }

    #[test]
    fn test_image_directory_keeps_native_size_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            device: dir.path().display().to_string(),
            ..Settings::default()
        };
        let constraints = build_constraints(&settings, &parse(&[]));
        assert_eq!((constraints.width, constraints.height), (None, None));
        assert_eq!(constraints.frame_rate, Some(settings.frame_rate));
    }

    #[test]
    fn test_requested_size_applies_to_image_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["--device", dir.path().to_str().unwrap(), "--width", "64"]);
        let settings = apply_flags(Settings::default(), &cli);
        let constraints = build_constraints(&settings, &cli);
        assert_eq!(
            (constraints.width, constraints.height),
            (Some(64), Some(settings.height))
        );
    }

    #[test]
    fn test_cameras_always_get_a_size() {
        let constraints = build_constraints(&Settings::default(), &parse(&["--stall-timeout-ms", "250"]));
        assert_eq!(
            (constraints.width, constraints.height),
            (Some(Settings::default().width), Some(Settings::default().height))
        );
        assert_eq!(constraints.stall_timeout, Some(Duration::from_millis(250)));
    }
}
