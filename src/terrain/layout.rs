//! Index formulas shared by the terrain volume, the hydraulic grid and the
//! compute shaders.
//!
//! Terrain scalars are stored plane-major. Every layer owns
//! `rock_type_count + 1` planes of `side_length²` values: one thickness plane
//! per rock type followed by the layer's floor plane, so
//!
//! ```text
//! index(x, y, layer, rock) = y*side + x + rock*plane + (layer*rock_types + layer)*plane
//! ```
//!
//! and the floor of a layer sits at `rock = rock_type_count`. Hydraulic cells
//! are stored one plane per layer: `layer*plane + y*side + x`.

use crate::erosion::GridConfig;

/// Allocation shape of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridLayout {
    side_length: u32,
    layer_count: u32,
    rock_type_count: u32,
}

impl GridLayout {
    pub fn new(side_length: u32, layer_count: u32, rock_type_count: u32) -> Self {
        debug_assert!(side_length > 0 && layer_count > 0 && rock_type_count > 0);
        Self {
            side_length,
            layer_count,
            rock_type_count,
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.side_length, config.layer_count, config.rock_type_count() as u32)
    }

    pub fn side_length(&self) -> u32 {
        self.side_length
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count as usize
    }

    pub fn rock_type_count(&self) -> usize {
        self.rock_type_count as usize
    }

    /// Number of columns (`side_length²`).
    pub fn plane_size(&self) -> usize {
        self.side_length as usize * self.side_length as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.side_length && y < self.side_length
    }

    /// Row-major column index, `y*side + x`.
    pub fn column_index(&self, x: u32, y: u32) -> usize {
        debug_assert!(self.contains(x, y));
        y as usize * self.side_length as usize + x as usize
    }

    pub fn column_coords(&self, column: usize) -> (u32, u32) {
        let side = self.side_length as usize;
        ((column % side) as u32, (column / side) as u32)
    }

    /// Terrain index of a rock thickness, following the documented formula.
    pub fn terrain_index(&self, x: u32, y: u32, layer: usize, rock: usize) -> usize {
        self.thickness_index(self.column_index(x, y), layer, rock)
    }

    pub fn thickness_index(&self, column: usize, layer: usize, rock: usize) -> usize {
        debug_assert!(layer < self.layer_count() && rock <= self.rock_type_count());
        let plane = self.plane_size();
        let rocks = self.rock_type_count();
        column + rock * plane + (layer * rocks + layer) * plane
    }

    /// Terrain index of a layer's floor (the plane after its rock planes).
    pub fn floor_index(&self, column: usize, layer: usize) -> usize {
        self.thickness_index(column, layer, self.rock_type_count())
    }

    /// Planes per layer block (rock planes + floor plane).
    pub fn planes_per_layer(&self) -> usize {
        self.rock_type_count() + 1
    }

    /// Length of the flattened terrain array.
    pub fn terrain_len(&self) -> usize {
        self.plane_size() * self.planes_per_layer() * self.layer_count()
    }

    pub fn cell_index(&self, column: usize, layer: usize) -> usize {
        debug_assert!(layer < self.layer_count());
        layer * self.plane_size() + column
    }

    /// Length of the flattened hydraulic-cell array.
    pub fn cell_len(&self) -> usize {
        self.plane_size() * self.layer_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_index_formula() {
        let layout = GridLayout::new(4, 3, 2);
        let plane = 16;
        // index = GetIndex(x,y) + rock*plane + (layer*rocks + layer)*plane
        assert_eq!(layout.terrain_index(0, 0, 0, 0), 0);
        assert_eq!(layout.terrain_index(1, 2, 0, 1), 9 + plane);
        assert_eq!(layout.terrain_index(1, 2, 1, 0), 9 + 3 * plane);
        assert_eq!(layout.terrain_index(3, 3, 2, 1), 15 + plane + 6 * plane);
    }

    #[test]
    fn test_floor_plane_follows_rock_planes() {
        let layout = GridLayout::new(4, 2, 3);
        let column = layout.column_index(2, 1);
        assert_eq!(layout.floor_index(column, 0), column + 3 * 16);
        assert_eq!(layout.floor_index(column, 1), layout.thickness_index(column, 1, 0) + 3 * 16);
        assert_eq!(layout.terrain_len(), 16 * 4 * 2);
    }

    #[test]
    fn test_indices_are_unique_and_dense() {
        let layout = GridLayout::new(3, 2, 2);
        let mut seen = vec![false; layout.terrain_len()];
        for column in 0..layout.plane_size() {
            for layer in 0..layout.layer_count() {
                for rock in 0..=layout.rock_type_count() {
                    let i = layout.thickness_index(column, layer, rock);
                    assert!(!seen[i], "index {i} produced twice");
                    seen[i] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_column_coords_round_trip() {
        let layout = GridLayout::new(7, 1, 1);
        for y in 0..7 {
            for x in 0..7 {
                let column = layout.column_index(x, y);
                assert_eq!(column, (y * 7 + x) as usize);
                assert_eq!(layout.column_coords(column), (x, y));
            }
        }
    }

    #[test]
    fn test_cell_index() {
        let layout = GridLayout::new(4, 3, 1);
        assert_eq!(layout.cell_index(5, 0), 5);
        assert_eq!(layout.cell_index(5, 2), 37);
        assert_eq!(layout.cell_len(), 48);
    }
}
