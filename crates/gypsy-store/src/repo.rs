//! Repository traits and their redb implementations.

pub mod artifact;
pub mod pipeline;
pub mod run;
pub mod watermark;

pub use artifact::ArtifactRepo;
pub use pipeline::PipelineRepo;
pub use run::RunRepo;
pub use watermark::WatermarkRepo;
