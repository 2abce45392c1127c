//! Per-layer hydraulic state.

use bytemuck::{Pod, Zeroable};

use super::layout::GridLayout;
use crate::geometry::Direction;

/// Water and sediment state of one (layer, column) cell.
///
/// `#[repr(C)]`, 48 bytes, no implicit padding. The WGSL `Cell` struct uses the
/// same field order and offsets; flow arrays are indexed by [`Direction`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct HydraulicCell {
    pub water_height: f32,
    pub suspended_sediment: f32,
    /// Water leaving this cell toward each neighbour.
    pub water_flow: [f32; 4],
    /// Suspended sediment carried by each outflow.
    pub sediment_flow: [f32; 4],
    pub velocity: [f32; 2],
}

impl HydraulicCell {
    pub fn outflow(&self, dir: Direction) -> f32 {
        self.water_flow[dir.index()]
    }

    pub fn total_outflow(&self) -> f32 {
        self.water_flow.iter().sum()
    }

    pub fn speed(&self) -> f32 {
        let [vx, vy] = self.velocity;
        (vx * vx + vy * vy).sqrt()
    }

    /// Adds another cell's water and suspended load to this one.
    pub fn absorb(&mut self, other: &HydraulicCell) {
        self.water_height += other.water_height;
        self.suspended_sediment += other.suspended_sediment;
    }

    pub fn holds_mass(&self) -> bool {
        self.water_height > 0.0 || self.suspended_sediment > 0.0
    }
}

/// All hydraulic cells, one plane per layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HydraulicGrid {
    layout: GridLayout,
    cells: Vec<HydraulicCell>,
}

impl HydraulicGrid {
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            cells: vec![HydraulicCell::default(); layout.cell_len()],
        }
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn cell(&self, column: usize, layer: usize) -> &HydraulicCell {
        &self.cells[self.layout.cell_index(column, layer)]
    }

    pub fn cell_mut(&mut self, column: usize, layer: usize) -> &mut HydraulicCell {
        let i = self.layout.cell_index(column, layer);
        &mut self.cells[i]
    }

    pub fn as_slice(&self) -> &[HydraulicCell] {
        &self.cells
    }

    pub fn as_mut_slice(&mut self) -> &mut [HydraulicCell] {
        &mut self.cells
    }

    pub fn total_water(&self) -> f64 {
        self.cells.iter().map(|c| c.water_height as f64).sum()
    }

    pub fn total_sediment(&self) -> f64 {
        self.cells.iter().map(|c| c.suspended_sediment as f64).sum()
    }

    /// Water summed over all layers of a column.
    pub fn column_water(&self, column: usize) -> f32 {
        (0..self.layout.layer_count())
            .map(|layer| self.cell(column, layer).water_height)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_binary_layout() {
        assert_eq!(std::mem::size_of::<HydraulicCell>(), 48);
        let mut cell = HydraulicCell::default();
        cell.water_height = 1.0;
        cell.water_flow[Direction::Up.index()] = 2.0;
        cell.velocity = [3.0, 4.0];
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&cell));
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[2 + 3], 2.0);
        assert_eq!(&floats[10..12], &[3.0, 4.0]);
    }

    #[test]
    fn test_speed_and_absorb() {
        let mut a = HydraulicCell {
            water_height: 0.5,
            suspended_sediment: 0.1,
            velocity: [0.3, 0.4],
            ..Default::default()
        };
        assert!((a.speed() - 0.5).abs() < 1e-6);
        let b = HydraulicCell {
            water_height: 0.25,
            suspended_sediment: 0.05,
            ..Default::default()
        };
        a.absorb(&b);
        assert!((a.water_height - 0.75).abs() < 1e-6);
        assert!((a.suspended_sediment - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_grid_planes_per_layer() {
        let layout = GridLayout::new(2, 2, 1);
        let mut grid = HydraulicGrid::new(layout);
        grid.cell_mut(3, 1).water_height = 0.7;
        assert_eq!(grid.as_slice()[7].water_height, 0.7);
        assert!((grid.column_water(3) - 0.7).abs() < 1e-6);
        assert!((grid.total_water() - 0.7).abs() < 1e-6);
    }
}
