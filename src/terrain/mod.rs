//! Terrain data model.
//!
//! Provides the grid layout and index formulas, the stacked rock volume, the
//! per-layer hydraulic cells and the engine-owned state that bundles them.

mod cells;
mod grid;
mod heightmap;
mod layout;
mod volume;

pub use cells::{HydraulicCell, HydraulicGrid};
pub use grid::{SimulationGrid, TerrainSnapshot};
pub use heightmap::{dome_heightmap, stratify};
pub use layout::GridLayout;
pub use volume::TerrainVolume;
