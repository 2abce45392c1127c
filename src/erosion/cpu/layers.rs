//! Inter-layer redistribution: collapse of unsupported layers and overflow of
//! over-full layers into the layer above.
//!
//! Columns are independent, so the pass gathers each column into a
//! [`ColumnStack`], resolves it, and scatters the result back.

use rayon::prelude::*;

use crate::erosion::params::OVERFLOW_EPSILON;
use crate::erosion::PassParams;
use crate::terrain::{HydraulicCell, SimulationGrid};

/// Thresholds used while resolving a column.
#[derive(Debug, Clone, PartialEq)]
pub struct RedistributionRules {
    /// Maximal layer thickness before overflow, `1 - sea_level`.
    pub layer_cap: f32,
    /// Per rock type, the floor at or below which a layer resting on it falls.
    pub collapse_thresholds: Vec<f32>,
}

impl RedistributionRules {
    pub fn from_params(params: &PassParams) -> Self {
        Self {
            layer_cap: params.layer_cap,
            collapse_thresholds: params.rocks.iter().map(|r| r.collapse_threshold).collect(),
        }
    }
}

/// One column gathered out of the flattened grids.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStack {
    /// Floor per layer; index 0 is always 0.
    pub floors: Vec<f32>,
    /// Thickness per layer, per rock type.
    pub rocks: Vec<Vec<f32>>,
    pub cells: Vec<HydraulicCell>,
}

impl ColumnStack {
    pub fn read(grid: &SimulationGrid, column: usize) -> Self {
        let layout = grid.layout();
        let layers = layout.layer_count();
        Self {
            floors: (0..layers).map(|l| grid.terrain.floor(column, l)).collect(),
            rocks: (0..layers)
                .map(|l| {
                    (0..layout.rock_type_count())
                        .map(|r| grid.terrain.thickness(column, l, r))
                        .collect()
                })
                .collect(),
            cells: (0..layers).map(|l| *grid.hydraulics.cell(column, l)).collect(),
        }
    }

    pub fn write(&self, grid: &mut SimulationGrid, column: usize) {
        for (layer, rocks) in self.rocks.iter().enumerate() {
            grid.terrain.set_floor(column, layer, self.floors[layer]);
            for (rock, &t) in rocks.iter().enumerate() {
                grid.terrain.set_thickness(column, layer, rock, t);
            }
            *grid.hydraulics.cell_mut(column, layer) = self.cells[layer];
        }
    }

    pub fn thickness(&self, layer: usize) -> f32 {
        self.rocks[layer].iter().sum()
    }

    pub fn volume(&self) -> f32 {
        self.rocks.iter().flatten().sum()
    }

    fn drop_cell(&mut self, layer: usize) {
        let cell = std::mem::take(&mut self.cells[layer]);
        if cell.holds_mass() {
            self.cells[layer - 1].absorb(&cell);
        }
    }

    fn is_unsupported(&self, layer: usize, rules: &RedistributionRules) -> bool {
        let Some(lowest) = self.rocks[layer].iter().position(|&t| t > 0.0) else {
            return false;
        };
        self.floors[layer] <= rules.collapse_thresholds[lowest]
    }

    /// Moves everything in `layer` into the layer beneath. The floor gap closes.
    fn collapse(&mut self, layer: usize) {
        let fallen = std::mem::take(&mut self.rocks[layer]);
        for (rock, t) in fallen.iter().enumerate() {
            self.rocks[layer - 1][rock] += t;
        }
        self.rocks[layer] = vec![0.0; fallen.len()];
        self.floors[layer] = 0.0;
        self.drop_cell(layer);
    }

    /// Caps `layer` at `cap`, pushing the excess (top rock type first) upward.
    fn overflow(&mut self, layer: usize, cap: f32) {
        let mut excess = self.thickness(layer) - cap;
        let mut last = None;
        for rock in (0..self.rocks[layer].len()).rev() {
            if excess <= 0.0 {
                break;
            }
            let take = self.rocks[layer][rock].min(excess);
            self.rocks[layer][rock] -= take;
            self.rocks[layer + 1][rock] += take;
            excess -= take;
            last = Some(rock);
        }

        // Subtracting from tall columns loses precision; pin the layer to the cap.
        if let Some(rock) = last {
            let others: f32 = self.rocks[layer]
                .iter()
                .enumerate()
                .filter(|&(r, _)| r != rock)
                .map(|(_, t)| t)
                .sum();
            let exact = (cap - others).max(0.0);
            let surplus = self.rocks[layer][rock] - exact;
            self.rocks[layer][rock] = exact;
            self.rocks[layer + 1][rock] += surplus;
        }
        self.floors[layer + 1] = cap;

        let cell = std::mem::take(&mut self.cells[layer]);
        self.cells[layer + 1].absorb(&cell);
    }
}

/// Resolves one column: collapse top-down, then overflow bottom-up.
pub fn redistribute_column(stack: &mut ColumnStack, rules: &RedistributionRules) {
    let layers = stack.rocks.len();

    for layer in 1..layers {
        if stack.thickness(layer) <= 0.0 {
            stack.floors[layer] = 0.0;
        }
    }

    for layer in (1..layers).rev() {
        if stack.thickness(layer) <= 0.0 {
            stack.drop_cell(layer);
        } else if stack.is_unsupported(layer, rules) {
            stack.collapse(layer);
        }
    }

    for layer in 0..layers.saturating_sub(1) {
        if stack.thickness(layer) > rules.layer_cap + OVERFLOW_EPSILON {
            stack.overflow(layer, rules.layer_cap);
        }
    }
}

pub fn redistribution_pass(grid: &mut SimulationGrid, params: &PassParams) {
    let layout = grid.layout();
    if layout.layer_count() < 2 {
        return;
    }
    let rules = RedistributionRules::from_params(params);

    let stacks: Vec<(usize, ColumnStack)> = {
        let view = &*grid;
        (0..layout.plane_size())
            .into_par_iter()
            .filter_map(|column| {
                let mut stack = ColumnStack::read(view, column);
                let before = stack.clone();
                redistribute_column(&mut stack, &rules);
                (stack != before).then_some((column, stack))
            })
            .collect()
    };

    for (column, stack) in &stacks {
        stack.write(grid, *column);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erosion::{ErosionConfig, GridConfig, RockType};
    use crate::terrain::GridLayout;

    fn rules() -> RedistributionRules {
        RedistributionRules {
            layer_cap: 0.8,
            collapse_thresholds: vec![0.01, 0.02, 0.03],
        }
    }

    fn wet(water: f32, sediment: f32) -> HydraulicCell {
        HydraulicCell {
            water_height: water,
            suspended_sediment: sediment,
            ..Default::default()
        }
    }

    fn stack(floors: Vec<f32>, rocks: Vec<Vec<f32>>, cells: Vec<HydraulicCell>) -> ColumnStack {
        ColumnStack { floors, rocks, cells }
    }

    fn totals(s: &ColumnStack) -> (f32, f32) {
        (
            s.cells.iter().map(|c| c.water_height).sum(),
            s.cells.iter().map(|c| c.suspended_sediment).sum(),
        )
    }

    #[test]
    fn floating_layer_collapses_with_its_water() {
        let mut s = stack(
            vec![0.0, 0.0],
            vec![vec![0.3, 0.0, 0.0], vec![0.1, 0.0, 0.05]],
            vec![wet(0.1, 0.0), wet(0.2, 0.04)],
        );
        redistribute_column(&mut s, &rules());
        assert!((s.rocks[0][0] - 0.4).abs() < 1e-6);
        assert!((s.rocks[0][2] - 0.05).abs() < 1e-6);
        assert_eq!(s.thickness(1), 0.0);
        assert_eq!(s.floors[1], 0.0);
        assert!((s.cells[0].water_height - 0.3).abs() < 1e-6);
        assert!((s.cells[0].suspended_sediment - 0.04).abs() < 1e-6);
        assert_eq!(s.cells[1], HydraulicCell::default());
    }

    #[test]
    fn supported_overhang_stays() {
        let mut s = stack(
            vec![0.0, 0.2],
            vec![vec![0.5, 0.0, 0.0], vec![0.1, 0.0, 0.0]],
            vec![wet(0.0, 0.0), wet(0.1, 0.0)],
        );
        let before = s.clone();
        redistribute_column(&mut s, &rules());
        assert_eq!(s, before);
    }

    #[test]
    fn floor_below_collapse_threshold_falls() {
        // Lowest non-empty rock is coarse sediment (threshold 0.02).
        let mut s = stack(
            vec![0.0, 0.015],
            vec![vec![0.5, 0.0, 0.0], vec![0.0, 0.1, 0.0]],
            vec![HydraulicCell::default(); 2],
        );
        redistribute_column(&mut s, &rules());
        assert!((s.rocks[0][1] - 0.1).abs() < 1e-6);
        assert_eq!(s.thickness(1), 0.0);
    }

    #[test]
    fn vacant_layer_resets_floor_and_drops_water() {
        let mut s = stack(
            vec![0.0, 0.4],
            vec![vec![0.2, 0.0, 0.0], vec![0.0, 0.0, 0.0]],
            vec![wet(0.1, 0.0), wet(0.3, 0.02)],
        );
        redistribute_column(&mut s, &rules());
        assert_eq!(s.floors[1], 0.0);
        assert!((s.cells[0].water_height - 0.4).abs() < 1e-6);
        assert!((s.cells[0].suspended_sediment - 0.02).abs() < 1e-6);
        assert_eq!(s.cells[1], HydraulicCell::default());
    }

    #[test]
    fn overflow_moves_top_rock_and_cell_upward() {
        let mut s = stack(
            vec![0.0, 0.0],
            vec![vec![0.7, 0.1, 0.2], vec![0.0, 0.0, 0.0]],
            vec![wet(0.5, 0.1), HydraulicCell::default()],
        );
        redistribute_column(&mut s, &rules());
        assert!((s.thickness(0) - 0.8).abs() < 1e-6);
        // Excess 0.2 comes out of the fine slot first.
        assert!(s.rocks[0][2].abs() < 1e-6);
        assert!((s.rocks[1][2] - 0.2).abs() < 1e-6);
        assert!((s.rocks[0][1] - 0.1).abs() < 1e-6);
        assert!((s.floors[1] - 0.8).abs() < 1e-6);
        assert_eq!(s.cells[0], HydraulicCell::default());
        assert!((s.cells[1].water_height - 0.5).abs() < 1e-6);
        assert!((s.cells[1].suspended_sediment - 0.1).abs() < 1e-6);
    }

    #[test]
    fn top_layer_is_never_capped() {
        let mut s = stack(
            vec![0.0, 0.5],
            vec![vec![0.3, 0.0, 0.0], vec![2.0, 0.0, 0.0]],
            vec![HydraulicCell::default(); 2],
        );
        let before = s.clone();
        redistribute_column(&mut s, &rules());
        assert_eq!(s, before);
    }

    #[test]
    fn overflow_is_idempotent() {
        let mut s = stack(
            vec![0.0, 0.0, 0.0],
            vec![vec![1.5, 0.3, 0.4], vec![0.0; 3], vec![0.0; 3]],
            vec![wet(0.2, 0.01), HydraulicCell::default(), HydraulicCell::default()],
        );
        redistribute_column(&mut s, &rules());
        let once = s.clone();
        redistribute_column(&mut s, &rules());
        assert_eq!(s, once);
    }

    #[test]
    fn tall_column_is_capped_exactly() {
        let mut s = stack(
            vec![0.0, 0.0],
            vec![vec![100.0, 0.0, 0.0], vec![0.0; 3]],
            vec![HydraulicCell::default(); 2],
        );
        redistribute_column(&mut s, &rules());
        assert_eq!(s.thickness(0), 0.8);
        assert!((s.volume() - 100.0).abs() < 1e-4);

        let once = s.clone();
        redistribute_column(&mut s, &rules());
        assert_eq!(s, once);

        // Same with the excess spread over several rock types.
        let mut s = stack(
            vec![0.0, 0.0],
            vec![vec![60.0, 25.0, 15.0], vec![0.0; 3]],
            vec![HydraulicCell::default(); 2],
        );
        redistribute_column(&mut s, &rules());
        assert!(s.thickness(0) <= 0.8 + OVERFLOW_EPSILON);
        let once = s.clone();
        redistribute_column(&mut s, &rules());
        assert_eq!(s, once);
    }

    #[test]
    fn collapse_then_overflow_conserves_everything() {
        // Layer 2 floats, falls onto layer 1, which then floats onto layer 0;
        // layer 0 ends up over the cap and pushes the excess back up.
        let mut s = stack(
            vec![0.0, 0.0, 0.0],
            vec![vec![0.6, 0.0, 0.1], vec![0.0, 0.2, 0.0], vec![0.3, 0.0, 0.1]],
            vec![wet(0.1, 0.01), wet(0.2, 0.02), wet(0.3, 0.03)],
        );
        let volume = s.volume();
        let (water, sediment) = totals(&s);

        redistribute_column(&mut s, &rules());

        assert!((s.volume() - volume).abs() < 1e-5);
        let (w, sd) = totals(&s);
        assert!((w - water).abs() < 1e-6);
        assert!((sd - sediment).abs() < 1e-6);

        // 1.3 total: 0.8 capped in layer 0, 0.5 in layer 1, nothing in layer 2.
        assert!((s.thickness(0) - 0.8).abs() < 1e-5);
        assert!((s.thickness(1) - 0.5).abs() < 1e-5);
        assert_eq!(s.thickness(2), 0.0);
        assert!((s.floors[1] - 0.8).abs() < 1e-6);
        assert!((s.cells[1].water_height - water).abs() < 1e-6);

        let once = s.clone();
        redistribute_column(&mut s, &rules());
        assert_eq!(s, once);
    }

    #[test]
    fn pass_round_trips_through_the_grid() {
        let layout = GridLayout::new(2, 2, 2);
        let mut grid = SimulationGrid::new(layout);
        grid.terrain.set_thickness(3, 0, 0, 1.2);
        grid.hydraulics.cell_mut(3, 0).water_height = 0.25;
        grid.terrain.set_thickness(0, 1, 1, 0.1);

        let config = GridConfig {
            side_length: 2,
            layer_count: 2,
            rock_types: vec![RockType::bedrock(), RockType::coarse_sediment()],
            sea_level: 0.2,
            height_multiplier: 1.0,
        };
        let params = PassParams::new(&config, &ErosionConfig::default());
        let volume = grid.terrain.total_volume();
        redistribution_pass(&mut grid, &params);

        assert!((grid.terrain.total_volume() - volume).abs() < 1e-5);
        assert!((grid.terrain.layer_thickness(3, 0) - 0.8).abs() < 1e-5);
        assert!((grid.terrain.floor(3, 1) - 0.8).abs() < 1e-6);
        assert!((grid.hydraulics.cell(3, 1).water_height - 0.25).abs() < 1e-6);
        // Floating sediment in column 0 fell to layer 0.
        assert!((grid.terrain.thickness(0, 0, 1) - 0.1).abs() < 1e-6);
        assert_eq!(grid.terrain.surface_layer(0), 0);
    }
}
