//! wgpu compute implementation of the erosion passes.

mod context;
mod pipelines;

pub use context::{ErosionGpuContext, ErosionGpuError};
pub use pipelines::GpuSolver;
