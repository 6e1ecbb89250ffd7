use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::processing::domain::frame_processor::FrameProcessor;
use crate::processing::domain::processor_slot::ProcessorSlot;

use super::luma_renderer::LumaRenderer;
use super::passthrough_renderer::PassthroughRenderer;

/// Available built-in processors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessorKind {
    #[default]
    Passthrough,
    Luma,
}

impl FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "luma" => Ok(Self::Luma),
            other => Err(format!(
                "unknown processor '{other}' (expected passthrough or luma)"
            )),
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough => write!(f, "passthrough"),
            Self::Luma => write!(f, "luma"),
        }
    }
}

pub fn create_processor(kind: ProcessorKind) -> Box<dyn FrameProcessor> {
    log::info!("Using {kind} processor");
    match kind {
        ProcessorKind::Passthrough => Box::new(PassthroughRenderer::new()),
        ProcessorKind::Luma => Box::new(LumaRenderer::new()),
    }
}

/// Initializes the processor in the background. `init_delay` stands in for
/// slow setup (model loading, shader compilation) so the pending path can
/// be observed.
pub fn spawn_processor(kind: ProcessorKind, init_delay: Duration) -> std::io::Result<ProcessorSlot> {
    ProcessorSlot::spawn_init(move || {
        if !init_delay.is_zero() {
            std::thread::sleep(init_delay);
        }
        Ok(create_processor(kind))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Instant;

    #[rstest]
    #[case::passthrough("passthrough", ProcessorKind::Passthrough)]
    #[case::luma("luma", ProcessorKind::Luma)]
    #[case::mixed_case("Luma", ProcessorKind::Luma)]
    fn test_parse_kind(#[case] input: &str, #[case] expected: ProcessorKind) {
        assert_eq!(input.parse::<ProcessorKind>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "sepia".parse::<ProcessorKind>().unwrap_err();
        assert!(err.contains("sepia"));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for kind in [ProcessorKind::Passthrough, ProcessorKind::Luma] {
            assert_eq!(kind.to_string().parse::<ProcessorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_delayed_processor_starts_pending() {
        let mut slot = spawn_processor(ProcessorKind::Passthrough, Duration::from_secs(2)).unwrap();
        assert!(!slot.is_ready());
    }

    #[test]
    fn test_undelayed_processor_becomes_ready() {
        let mut slot = spawn_processor(ProcessorKind::Luma, Duration::ZERO).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !slot.is_ready() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
