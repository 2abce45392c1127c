//! Backend abstraction for the erosion passes.

use thiserror::Error;

use super::config::ErosionBackend;
use super::cpu::CpuSolver;
use super::params::PassParams;
use super::wgpu::{ErosionGpuContext, ErosionGpuError, GpuSolver};
use crate::terrain::{GridLayout, SimulationGrid};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("GPU backend failed: {0}")]
    Gpu(#[from] ErosionGpuError),
    #[error("solver was built for {expected:?} but the grid is {actual:?}")]
    LayoutMismatch { expected: GridLayout, actual: GridLayout },
}

/// Runs whole erosion iterations over a [`SimulationGrid`].
///
/// One iteration is: rain, intra-layer flow, velocity, suspend/deposit,
/// evaporation, sediment advection, repose slippage (when horizontal erosion
/// is enabled) and inter-layer redistribution. `rain` is called once per
/// iteration with a zeroed per-column field to fill.
///
/// Implementations must leave `grid` untouched when they return an error.
pub trait ErosionSolver: Send {
    fn name(&self) -> &'static str;

    fn simulate(
        &mut self,
        grid: &mut SimulationGrid,
        params: &PassParams,
        iterations: u32,
        rain: &mut dyn FnMut(&mut [f32]),
    ) -> Result<(), SolverError>;
}

/// Builds the solver for `backend`. `Auto` falls back to the CPU when no GPU
/// device can be created.
pub fn create_solver(backend: ErosionBackend, layout: GridLayout) -> Result<Box<dyn ErosionSolver>, SolverError> {
    match backend {
        ErosionBackend::CpuOnly => Ok(Box::new(CpuSolver::new(layout))),
        ErosionBackend::GpuOnly => {
            let ctx = pollster::block_on(ErosionGpuContext::new())?;
            Ok(Box::new(GpuSolver::new(ctx, layout)?))
        }
        ErosionBackend::Auto => {
            let gpu = pollster::block_on(ErosionGpuContext::new()).and_then(|ctx| GpuSolver::new(ctx, layout));
            match gpu {
                Ok(solver) => Ok(Box::new(solver)),
                Err(e) => {
                    log::warn!("GPU erosion unavailable ({e}); falling back to CPU");
                    Ok(Box::new(CpuSolver::new(layout)))
                }
            }
        }
    }
}
