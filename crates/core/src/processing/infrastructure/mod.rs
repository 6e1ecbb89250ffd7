pub mod luma_renderer;
pub mod passthrough_renderer;
pub mod processor_factory;
