//! Layered grid-based hydraulic erosion.
//!
//! Water flows across a stack of rock layers on a square grid, picks up and
//! deposits sediment, and moves rock between layers when they collapse or
//! overflow. The passes run either on the CPU (rayon) or on the GPU (wgpu
//! compute) behind a common solver trait, orchestrated by
//! [`simulation::ErosionEngine`].

pub mod erosion;
pub mod export;
pub mod geometry;
pub mod simulation;
pub mod terrain;

pub use erosion::{ErosionBackend, ErosionConfig, GridConfig, RockType, SimulationConfig};
pub use simulation::{EngineError, EngineState, ErosionEngine};
pub use terrain::{GridLayout, SimulationGrid, TerrainSnapshot, TerrainVolume};
