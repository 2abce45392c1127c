//! Angle-of-repose slippage of loose rock between neighbouring columns.

use rayon::prelude::*;

use crate::erosion::PassParams;
use crate::geometry::neighbors::neighbor_columns;
use crate::geometry::Direction;
use crate::terrain::SimulationGrid;

/// Rock leaving one cell, per direction, all of one rock type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Slip {
    amounts: [f32; 4],
    rock: usize,
}

pub fn slippage_pass(grid: &mut SimulationGrid, params: &PassParams) {
    let layout = grid.layout();
    let plane = layout.plane_size();
    let side = layout.side_length();
    let rate = params.slip_rate();
    if rate <= 0.0 {
        return;
    }

    let slips: Vec<Option<Slip>> = {
        let terrain = &grid.terrain;
        (0..layout.cell_len())
            .into_par_iter()
            .map(|i| {
                let layer = i / plane;
                let column = i % plane;
                let rock = terrain.top_rock(column, layer)?;
                let talus = params.talus(rock);
                let here = terrain.layer_thickness(column, layer);
                let neighbors = neighbor_columns(side, column);

                let mut excess = [0.0f32; 4];
                let mut steep = 0u32;
                for dir in Direction::all() {
                    let Some(n) = neighbors[dir.index()] else { continue };
                    let d = here - terrain.layer_thickness(n, layer);
                    if d > talus {
                        excess[dir.index()] = d - talus;
                        steep += 1;
                    }
                }
                if steep == 0 {
                    return None;
                }

                let wanted = 0.5 * rate * excess.iter().sum::<f32>();
                let moved = wanted.min(terrain.thickness(column, layer, rock));
                let share = moved / steep as f32;
                let amounts = excess.map(|e| if e > 0.0 { share } else { 0.0 });
                (moved > 0.0).then_some(Slip { amounts, rock })
            })
            .collect()
    };

    for (i, slip) in slips.into_iter().enumerate() {
        let Some(slip) = slip else { continue };
        let layer = i / plane;
        let column = i % plane;
        let neighbors = neighbor_columns(side, column);
        for dir in Direction::all() {
            let amount = slip.amounts[dir.index()];
            let Some(n) = neighbors[dir.index()] else { continue };
            if amount <= 0.0 {
                continue;
            }
            grid.terrain.add_thickness(column, layer, slip.rock, -amount);
            grid.terrain.add_thickness(n, layer, slip.rock, amount);
        }
    }
}
