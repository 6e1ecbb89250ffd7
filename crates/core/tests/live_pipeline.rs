use std::time::Duration;

use frame_relay_core::capture::domain::capture_device::{
    CaptureDevice, DeviceConstraints, DeviceError,
};
use frame_relay_core::capture::infrastructure::channel_source::Delivery;
use frame_relay_core::capture::infrastructure::image_sequence_device::ImageSequenceDevice;
use frame_relay_core::capture::infrastructure::test_pattern_device::TestPatternDevice;
use frame_relay_core::pipeline::frame_pull_loop::{LoopExit, LoopReport, PipelineEvent};
use frame_relay_core::pipeline::pipeline_config::PipelineConfig;
use frame_relay_core::pipeline::pipeline_error::PipelineError;
use frame_relay_core::pipeline::pipeline_handle::PipelineHandle;
use frame_relay_core::pipeline::pipeline_logger::NullPipelineLogger;
use frame_relay_core::pipeline::pipeline_state::{CloseReason, PipelineState};
use frame_relay_core::pipeline::start_pipeline_use_case::StartPipelineUseCase;
use frame_relay_core::processing::domain::processor_slot::ProcessorSlot;
use frame_relay_core::processing::infrastructure::processor_factory::{
    create_processor, spawn_processor, ProcessorKind,
};
use frame_relay_core::surface::canvas::SurfaceError;
use image::{Rgb, RgbImage, RgbaImage};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn start(
    device: Box<dyn CaptureDevice>,
    constraints: DeviceConstraints,
    processor: ProcessorSlot,
) -> Result<PipelineHandle, PipelineError> {
    StartPipelineUseCase::new(
        device,
        constraints,
        processor,
        Box::new(NullPipelineLogger),
        PipelineConfig::default(),
    )
    .execute()
}

fn bounded_pattern(frames: u64) -> Box<dyn CaptureDevice> {
    Box::new(
        TestPatternDevice::new()
            .with_frame_limit(frames)
            .with_delivery(Delivery::WaitForReader),
    )
}

fn small() -> DeviceConstraints {
    DeviceConstraints::video().with_size(16, 8).with_frame_rate(500)
}

/// Collects events until the worker reports it has finished.
fn wait_for_finish(handle: &PipelineHandle) -> (Vec<PipelineEvent>, LoopReport) {
    let mut seen = Vec::new();
    loop {
        let event = handle
            .events()
            .recv_timeout(EVENT_TIMEOUT)
            .expect("worker stopped sending events");
        if let PipelineEvent::Finished(report) = event {
            return (seen, report);
        }
        seen.push(event);
    }
}

#[test]
fn test_test_pattern_runs_to_end_of_stream() {
    let processor = ProcessorSlot::ready(create_processor(ProcessorKind::Passthrough));
    let mut handle = start(bounded_pattern(5), small(), processor).unwrap();
    assert_eq!(handle.token().settings().width, 16);

    let (events, report) = wait_for_finish(&handle);
    assert_eq!(
        events,
        vec![
            PipelineEvent::StateChanged(PipelineState::Initialized),
            PipelineEvent::StateChanged(PipelineState::Running),
            PipelineEvent::StateChanged(PipelineState::Closed(CloseReason::EndOfStream)),
        ]
    );

    // Passthrough paints every pixel opaque
    let shown = handle.canvas().displayed().unwrap();
    assert!(shown.pixels().all(|px| px[3] == 255));

    let joined = handle.join().unwrap();
    assert_eq!(joined, report);
    assert_eq!(report.frames_read, 5);
    assert_eq!(report.frames_processed, 5);
    assert_eq!(report.exit, LoopExit::EndOfStream);
}

#[test]
fn test_canvas_rejects_direct_draws_while_worker_owns_it() {
    let processor = ProcessorSlot::ready(create_processor(ProcessorKind::Luma));
    let mut handle = start(bounded_pattern(2), small(), processor).unwrap();

    let err = handle
        .canvas()
        .draw_raw(&RgbaImage::new(1, 1), 0, 0)
        .unwrap_err();
    assert_eq!(err, SurfaceError::Transferred);
    assert!(handle.join().is_ok());
}

#[test]
fn test_video_not_requested_fails_startup() {
    let constraints = DeviceConstraints {
        video: false,
        ..DeviceConstraints::video()
    };
    let processor = ProcessorSlot::ready(create_processor(ProcessorKind::Passthrough));
    let err = start(bounded_pattern(1), constraints, processor).err().unwrap();
    assert!(matches!(
        err,
        PipelineError::Device(DeviceError::NoVideoRequested)
    ));
}

#[test]
fn test_frames_are_skipped_while_processor_initializes() {
    let processor = spawn_processor(ProcessorKind::Passthrough, Duration::from_secs(30)).unwrap();
    let handle = start(bounded_pattern(4), small(), processor).unwrap();

    let report = handle.join().unwrap();
    assert_eq!(report.frames_read, 4);
    assert_eq!(report.frames_skipped, 4);
    assert_eq!(report.frames_processed, 0);
}

#[test]
fn test_cancel_stops_unbounded_source() {
    let device = Box::new(TestPatternDevice::new());
    let processor = ProcessorSlot::ready(create_processor(ProcessorKind::Passthrough));
    let handle = start(device, small(), processor).unwrap();

    loop {
        let event = handle.events().recv_timeout(EVENT_TIMEOUT).unwrap();
        if event == PipelineEvent::StateChanged(PipelineState::Running) {
            break;
        }
    }
    handle.cancel();

    let report = handle.join().unwrap();
    assert_eq!(report.exit, LoopExit::Cancelled);
    assert!(report.frames_read >= 1);
}

#[test]
fn test_image_sequence_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    for (i, value) in [0u8, 128, 255].into_iter().enumerate() {
        RgbImage::from_pixel(8, 4, Rgb([value, value, value]))
            .save(dir.path().join(format!("frame_{i:03}.png")))
            .unwrap();
    }

    let device = Box::new(ImageSequenceDevice::new(dir.path()));
    let processor = ProcessorSlot::ready(create_processor(ProcessorKind::Luma));
    let mut handle = start(
        device,
        DeviceConstraints::video().with_frame_rate(500),
        processor,
    )
    .unwrap();

    let (_, report) = wait_for_finish(&handle);
    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.dropped_by_source, 0);

    let shown = handle.canvas().displayed().unwrap();
    assert_eq!(shown.dimensions(), (8, 4));
    assert_eq!(shown.get_pixel(3, 2)[0], 255);
}
