//! Layered hydraulic erosion.
//!
//! The passes exist twice: as rayon loops in [`cpu`] and as WGSL kernels in
//! [`wgpu`]. Both sit behind [`ErosionSolver`]; [`create_solver`] picks one
//! from the configured [`ErosionBackend`].

mod config;
pub mod cpu;
pub mod params;
mod rain;
mod solver;
pub mod wgpu;

pub use config::{
    ConfigError, ErosionBackend, ErosionConfig, GridConfig, RockType, SimulationConfig, SpringSource, MAX_ROCK_TYPES,
};
pub use params::{PassParams, RockParams};
pub use rain::RainSource;
pub use solver::{create_solver, ErosionSolver, SolverError};
