//! The engine-owned simulation state and the read-only snapshots handed out.

use super::cells::{HydraulicCell, HydraulicGrid};
use super::layout::GridLayout;
use super::volume::TerrainVolume;

/// Terrain volume plus hydraulic cells for one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationGrid {
    pub terrain: TerrainVolume,
    pub hydraulics: HydraulicGrid,
}

impl SimulationGrid {
    /// Allocates an empty grid for `layout`.
    pub fn new(layout: GridLayout) -> Self {
        Self {
            terrain: TerrainVolume::new(layout),
            hydraulics: HydraulicGrid::new(layout),
        }
    }

    /// Pairs an existing volume with fresh, dry hydraulic cells.
    pub fn with_terrain(terrain: TerrainVolume) -> Self {
        let hydraulics = HydraulicGrid::new(terrain.layout());
        Self { terrain, hydraulics }
    }

    pub fn layout(&self) -> GridLayout {
        self.terrain.layout()
    }

    /// Adds water to the surface layer of a column.
    pub fn add_water(&mut self, column: usize, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        let layer = self.terrain.surface_layer(column);
        self.hydraulics.cell_mut(column, layer).water_height += amount;
    }

    /// Adds a per-column water field (row-major, one value per column).
    pub fn apply_rain(&mut self, rain: &[f32]) {
        debug_assert_eq!(rain.len(), self.layout().plane_size());
        for (column, &amount) in rain.iter().enumerate() {
            self.add_water(column, amount);
        }
    }

    /// Removes all water. Suspended sediment settles into its layer's top slot.
    pub fn remove_all_water(&mut self) {
        let layout = self.layout();
        let top_slot = layout.rock_type_count() - 1;
        for layer in 0..layout.layer_count() {
            for column in 0..layout.plane_size() {
                let cell = self.hydraulics.cell_mut(column, layer);
                let settled = cell.suspended_sediment;
                *cell = HydraulicCell::default();
                if settled > 0.0 {
                    self.terrain.add_thickness(column, layer, top_slot, settled);
                }
            }
        }
    }

    pub fn snapshot(&self) -> TerrainSnapshot {
        TerrainSnapshot {
            layout: self.layout(),
            terrain: self.terrain.as_slice().to_vec(),
            cells: self.hydraulics.as_slice().to_vec(),
        }
    }
}

/// Owned copy of the engine state for renderers and exporters.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSnapshot {
    layout: GridLayout,
    terrain: Vec<f32>,
    cells: Vec<HydraulicCell>,
}

impl TerrainSnapshot {
    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    /// Flattened terrain array, addressed by [`GridLayout::terrain_index`].
    pub fn terrain(&self) -> &[f32] {
        &self.terrain
    }

    /// Flattened cell array, addressed by [`GridLayout::cell_index`].
    pub fn cells(&self) -> &[HydraulicCell] {
        &self.cells
    }

    /// Rebuilds a volume view over the copied terrain array.
    pub fn to_volume(&self) -> TerrainVolume {
        TerrainVolume::from_values(self.layout, self.terrain.clone())
            .unwrap_or_else(|| TerrainVolume::new(self.layout))
    }

    /// Per-column stacked surface elevation.
    pub fn surface_elevations(&self) -> Vec<f32> {
        self.to_volume().surface_elevations()
    }

    /// Per-column water depth summed over layers.
    pub fn water_depths(&self) -> Vec<f32> {
        let plane = self.layout.plane_size();
        let mut out = vec![0.0f32; plane];
        for (i, cell) in self.cells.iter().enumerate() {
            out[i % plane] += cell.water_height;
        }
        out
    }
}
