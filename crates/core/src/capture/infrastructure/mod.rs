pub mod channel_source;
pub mod ffmpeg_capture_device;
pub mod image_sequence_device;
pub mod test_pattern_device;
