//! Sediment passes of the CPU backend: suspend/deposit and advection.

use rayon::prelude::*;

use crate::erosion::PassParams;
use crate::geometry::neighbors::offset_within;
use crate::terrain::SimulationGrid;

/// Mass moved between a cell's layer and its suspended load.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Exchange {
    rock: usize,
    /// Added to the rock slot (negative when eroding).
    terrain_delta: f32,
}

/// Rounds half away from zero; the shaders use the same rule.
#[inline]
pub fn round_away(v: f32) -> i32 {
    (v.signum() * (v.abs() + 0.5).floor()) as i32
}

/// Erodes below capacity, deposits above it.
pub fn suspend_deposit_pass(grid: &mut SimulationGrid, params: &PassParams) {
    let layout = grid.layout();
    let plane = layout.plane_size();
    let fine_slot = layout.rock_type_count() - 1;

    let exchanges: Vec<Option<Exchange>> = {
        let terrain = &grid.terrain;
        let cells = grid.hydraulics.as_slice();
        (0..cells.len())
            .into_par_iter()
            .map(|i| {
                let layer = i / plane;
                let column = i % plane;
                let cell = &cells[i];
                let capacity = params.sediment_capacity * cell.speed();
                let suspended = cell.suspended_sediment;

                if suspended < capacity {
                    let rock = terrain.top_rock(column, layer)?;
                    let hardness = params.rocks[rock].hardness;
                    let mut delta = (capacity - suspended) * params.suspension_rate * (1.0 - hardness);
                    delta = delta.min(terrain.thickness(column, layer, rock));
                    if params.maximal_erosion_depth > 0.0 {
                        delta = delta.min(params.maximal_erosion_depth);
                    }
                    (delta > 0.0).then_some(Exchange {
                        rock,
                        terrain_delta: -delta,
                    })
                } else {
                    let delta = (suspended - capacity) * params.deposition_rate;
                    (delta > 0.0).then_some(Exchange {
                        rock: fine_slot,
                        terrain_delta: delta,
                    })
                }
            })
            .collect()
    };

    for (i, exchange) in exchanges.into_iter().enumerate() {
        let Some(ex) = exchange else { continue };
        let layer = i / plane;
        let column = i % plane;
        grid.terrain.add_thickness(column, layer, ex.rock, ex.terrain_delta);
        let cell = grid.hydraulics.cell_mut(column, layer);
        cell.suspended_sediment = (cell.suspended_sediment - ex.terrain_delta).max(0.0);
    }
}

/// Semi-Lagrangian back-trace of one cell along the rounded velocity.
pub fn advection_pass(grid: &mut SimulationGrid) {
    let layout = grid.layout();
    let plane = layout.plane_size();
    let side = layout.side_length();

    let sediment: Vec<f32> = {
        let cells = grid.hydraulics.as_slice();
        (0..cells.len())
            .into_par_iter()
            .map(|i| {
                let layer = i / plane;
                let (x, y) = layout.column_coords(i % plane);
                let [vx, vy] = cells[i].velocity;
                match offset_within(side, x, y, -round_away(vx), -round_away(vy)) {
                    Some((sx, sy)) => cells[layer * plane + layout.column_index(sx, sy)].suspended_sediment,
                    None => cells[i].suspended_sediment,
                }
            })
            .collect()
    };

    grid.hydraulics
        .as_mut_slice()
        .par_iter_mut()
        .zip(sediment.par_iter())
        .for_each(|(cell, &s)| cell.suspended_sediment = s);
}
