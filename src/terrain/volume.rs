//! Stacked rock columns.

use rayon::prelude::*;

use super::layout::GridLayout;

/// Flattened rock thicknesses and floors for every column and layer.
///
/// The backing array follows [`GridLayout::thickness_index`]; it is the
/// read-only terrain array handed to renderers through snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainVolume {
    layout: GridLayout,
    values: Vec<f32>,
}

impl TerrainVolume {
    /// Creates an empty (all zero) volume.
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            values: vec![0.0; layout.terrain_len()],
        }
    }

    /// Wraps an existing flattened array; returns `None` on a length mismatch.
    pub fn from_values(layout: GridLayout, values: Vec<f32>) -> Option<Self> {
        (values.len() == layout.terrain_len()).then_some(Self { layout, values })
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn thickness(&self, column: usize, layer: usize, rock: usize) -> f32 {
        self.values[self.layout.thickness_index(column, layer, rock)]
    }

    pub fn set_thickness(&mut self, column: usize, layer: usize, rock: usize, value: f32) {
        let i = self.layout.thickness_index(column, layer, rock);
        self.values[i] = value.max(0.0);
    }

    pub fn add_thickness(&mut self, column: usize, layer: usize, rock: usize, delta: f32) {
        let i = self.layout.thickness_index(column, layer, rock);
        self.values[i] = (self.values[i] + delta).max(0.0);
    }

    /// Gap below the layer; always 0 for layer 0.
    pub fn floor(&self, column: usize, layer: usize) -> f32 {
        if layer == 0 {
            return 0.0;
        }
        self.values[self.layout.floor_index(column, layer)]
    }

    pub fn set_floor(&mut self, column: usize, layer: usize, value: f32) {
        if layer == 0 {
            return;
        }
        let i = self.layout.floor_index(column, layer);
        self.values[i] = value.max(0.0);
    }

    /// Summed rock thickness of one layer.
    pub fn layer_thickness(&self, column: usize, layer: usize) -> f32 {
        (0..self.layout.rock_type_count())
            .map(|rock| self.thickness(column, layer, rock))
            .sum()
    }

    /// Layer 0 always exists; upper layers exist while they hold rock.
    pub fn is_present(&self, column: usize, layer: usize) -> bool {
        layer == 0 || self.layer_thickness(column, layer) > 0.0
    }

    /// Topmost rock type with material in this layer.
    pub fn top_rock(&self, column: usize, layer: usize) -> Option<usize> {
        (0..self.layout.rock_type_count())
            .rev()
            .find(|&rock| self.thickness(column, layer, rock) > 0.0)
    }

    /// Highest present layer of a column, where rain lands.
    pub fn surface_layer(&self, column: usize) -> usize {
        (0..self.layout.layer_count())
            .rev()
            .find(|&layer| self.is_present(column, layer))
            .unwrap_or(0)
    }

    /// Total rock in a column across all layers.
    pub fn column_volume(&self, column: usize) -> f32 {
        (0..self.layout.layer_count())
            .map(|layer| self.layer_thickness(column, layer))
            .sum()
    }

    pub fn total_volume(&self) -> f64 {
        (0..self.layout.plane_size())
            .into_par_iter()
            .map(|column| self.column_volume(column) as f64)
            .sum()
    }

    /// Stacked top elevation of a column: floors plus thicknesses of present layers.
    pub fn surface_elevation(&self, column: usize) -> f32 {
        (0..self.layout.layer_count())
            .filter(|&layer| self.is_present(column, layer))
            .map(|layer| self.floor(column, layer) + self.layer_thickness(column, layer))
            .sum()
    }

    /// Per-column surface elevation in row-major order.
    pub fn surface_elevations(&self) -> Vec<f32> {
        (0..self.layout.plane_size())
            .into_par_iter()
            .map(|column| self.surface_elevation(column))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> GridLayout {
        GridLayout::new(3, 3, 2)
    }

    #[test]
    fn test_new_volume_is_empty() {
        let volume = TerrainVolume::new(layout());
        assert_eq!(volume.as_slice().len(), layout().terrain_len());
        assert_eq!(volume.total_volume(), 0.0);
        assert_eq!(volume.surface_layer(4), 0);
    }

    #[test]
    fn test_thickness_is_never_negative() {
        let mut volume = TerrainVolume::new(layout());
        volume.set_thickness(0, 0, 1, 0.5);
        volume.add_thickness(0, 0, 1, -2.0);
        assert_eq!(volume.thickness(0, 0, 1), 0.0);
    }

    #[test]
    fn test_layer_zero_has_no_floor() {
        let mut volume = TerrainVolume::new(layout());
        volume.set_floor(2, 0, 5.0);
        assert_eq!(volume.floor(2, 0), 0.0);
        volume.set_floor(2, 1, 0.3);
        assert_eq!(volume.floor(2, 1), 0.3);
    }

    #[test]
    fn test_surface_layer_and_top_rock() {
        let mut volume = TerrainVolume::new(layout());
        volume.set_thickness(1, 0, 0, 0.6);
        volume.set_thickness(1, 2, 0, 0.1);
        volume.set_floor(1, 2, 0.2);
        assert_eq!(volume.surface_layer(1), 2);
        assert!(!volume.is_present(1, 1));
        assert_eq!(volume.top_rock(1, 0), Some(0));
        assert_eq!(volume.top_rock(1, 1), None);

        volume.set_thickness(1, 0, 1, 0.05);
        assert_eq!(volume.top_rock(1, 0), Some(1));
    }

    #[test]
    fn test_surface_elevation_stacks_floors() {
        let mut volume = TerrainVolume::new(layout());
        volume.set_thickness(0, 0, 0, 0.5);
        volume.set_thickness(0, 1, 1, 0.25);
        volume.set_floor(0, 1, 0.1);
        assert!((volume.surface_elevation(0) - 0.85).abs() < 1e-6);
        assert!((volume.column_volume(0) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_from_values_checks_length() {
        assert!(TerrainVolume::from_values(layout(), vec![0.0; 3]).is_none());
        assert!(TerrainVolume::from_values(layout(), vec![0.0; layout().terrain_len()]).is_some());
    }
}
