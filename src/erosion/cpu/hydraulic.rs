//! Water passes of the CPU backend: intra-layer flow, velocity, evaporation.
//!
//! Every pass first computes its results for the whole grid from an immutable
//! view of the previous state and only then commits them, so no cell observes
//! a neighbour updated in the same pass. The WGSL kernels in
//! `erosion/wgpu/shaders/layered.wgsl` implement the same formulas.

use rayon::prelude::*;

use crate::erosion::PassParams;
use crate::geometry::neighbors::neighbor_columns;
use crate::geometry::Direction;
use crate::terrain::{HydraulicCell, SimulationGrid, TerrainVolume};

#[inline]
fn head(terrain: &TerrainVolume, cells: &[HydraulicCell], plane: usize, column: usize, layer: usize) -> f32 {
    terrain.layer_thickness(column, layer) + cells[layer * plane + column].water_height
}

/// Outflow of one cell toward its four neighbours, already limited to the
/// water the cell holds.
fn cell_outflow(
    terrain: &TerrainVolume,
    cells: &[HydraulicCell],
    params: &PassParams,
    index: usize,
) -> [f32; 4] {
    let layout = terrain.layout();
    let plane = layout.plane_size();
    let layer = index / plane;
    let column = index % plane;
    let water = cells[index].water_height;
    if water <= 0.0 {
        return [0.0; 4];
    }

    let h = head(terrain, cells, plane, column, layer);
    let neighbors = neighbor_columns(layout.side_length(), column);

    let mut out = [0.0f32; 4];
    let mut downhill = 0u32;
    for dir in Direction::all() {
        let dh = match neighbors[dir.index()] {
            Some(n) => h - head(terrain, cells, plane, n, layer),
            // Open edge: the outside is a dry sink at height 0.
            None if !params.keep_water_in_boundaries => h,
            None => 0.0,
        };
        if dh > 0.0 {
            out[dir.index()] = dh;
            downhill += 1;
        }
    }
    if downhill == 0 {
        return [0.0; 4];
    }

    let scale = (1.0 - params.dampening) / (params.time_delta * downhill as f32);
    let mut total = 0.0;
    for f in &mut out {
        *f *= scale;
        total += *f;
    }

    // Never ship more water than the cell holds.
    if total > water {
        let k = water / total;
        for f in &mut out {
            *f *= k;
        }
    }
    out
}

/// Intra-layer flow: compute outflows grid-wide, then apply the net exchange.
pub fn flow_pass(grid: &mut SimulationGrid, params: &PassParams) {
    let layout = grid.layout();
    let plane = layout.plane_size();
    let side = layout.side_length();

    let outflows: Vec<[f32; 4]> = {
        let terrain = &grid.terrain;
        let cells = grid.hydraulics.as_slice();
        (0..cells.len())
            .into_par_iter()
            .map(|i| cell_outflow(terrain, cells, params, i))
            .collect()
    };

    grid.hydraulics
        .as_mut_slice()
        .par_iter_mut()
        .zip(outflows.par_iter())
        .for_each(|(cell, out)| {
            cell.water_flow = *out;
            cell.sediment_flow = if cell.water_height > 0.0 {
                (*out).map(|f| cell.suspended_sediment * f / cell.water_height)
            } else {
                [0.0; 4]
            };
        });

    let water: Vec<f32> = {
        let cells = grid.hydraulics.as_slice();
        (0..cells.len())
            .into_par_iter()
            .map(|i| {
                let layer = i / plane;
                let column = i % plane;
                let cell = &cells[i];
                let neighbors = neighbor_columns(side, column);
                let inflow: f32 = Direction::all()
                    .iter()
                    .filter_map(|&dir| {
                        neighbors[dir.index()]
                            .map(|n| cells[layer * plane + n].water_flow[dir.opposite().index()])
                    })
                    .sum();
                (cell.water_height + inflow - cell.total_outflow()).max(0.0)
            })
            .collect()
    };

    grid.hydraulics
        .as_mut_slice()
        .par_iter_mut()
        .zip(water.par_iter())
        .for_each(|(cell, &w)| cell.water_height = w);
}

/// Clamps a velocity to magnitude 1; non-finite input collapses to zero.
pub fn clamp_velocity(v: [f32; 2]) -> [f32; 2] {
    let [vx, vy] = v;
    if !vx.is_finite() || !vy.is_finite() {
        return [0.0, 0.0];
    }
    let len = (vx * vx + vy * vy).sqrt();
    if len > 1.0 {
        [vx / len, vy / len]
    } else {
        [vx, vy]
    }
}

/// Velocity from the net flow imbalance across each axis.
pub fn velocity_pass(grid: &mut SimulationGrid, params: &PassParams) {
    let layout = grid.layout();
    let plane = layout.plane_size();
    let side = layout.side_length();
    let half = params.height_multiplier * 0.5;

    let velocities: Vec<[f32; 2]> = {
        let cells = grid.hydraulics.as_slice();
        (0..cells.len())
            .into_par_iter()
            .map(|i| {
                let layer = i / plane;
                let column = i % plane;
                let cell = &cells[i];
                let neighbors = neighbor_columns(side, column);
                // Flow arriving at this cell from the neighbour in `dir`.
                let inflow = |dir: Direction| {
                    neighbors[dir.index()]
                        .map(|n| cells[layer * plane + n].outflow(dir.opposite()))
                        .unwrap_or(0.0)
                };

                let vx = inflow(Direction::Left) - cell.outflow(Direction::Left)
                    + cell.outflow(Direction::Right)
                    - inflow(Direction::Right);
                let vy = inflow(Direction::Down) - cell.outflow(Direction::Down)
                    + cell.outflow(Direction::Up)
                    - inflow(Direction::Up);
                clamp_velocity([half * vx, half * vy])
            })
            .collect()
    };

    grid.hydraulics
        .as_mut_slice()
        .par_iter_mut()
        .zip(velocities.par_iter())
        .for_each(|(cell, v)| cell.velocity = *v);
}

pub fn evaporation_pass(grid: &mut SimulationGrid, params: &PassParams) {
    let keep = (1.0 - params.evaporation_rate).clamp(0.0, 1.0);
    grid.hydraulics.as_mut_slice().par_iter_mut().for_each(|cell| {
        cell.water_height = (cell.water_height * keep).max(0.0);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erosion::{ErosionConfig, GridConfig, RockType};
    use crate::terrain::GridLayout;

    fn params(dampening: f32, keep: bool) -> PassParams {
        let grid = GridConfig {
            side_length: 3,
            layer_count: 1,
            rock_types: vec![RockType::bedrock()],
            sea_level: 0.0,
            height_multiplier: 1.0,
        };
        let erosion = ErosionConfig {
            dampening,
            time_delta: 1.0,
            is_water_kept_in_boundaries: keep,
            ..ErosionConfig::default()
        };
        PassParams::new(&grid, &erosion)
    }

    fn flat(side: u32) -> SimulationGrid {
        let mut grid = SimulationGrid::new(GridLayout::new(side, 1, 1));
        for column in 0..(side * side) as usize {
            grid.terrain.set_thickness(column, 0, 0, 0.5);
        }
        grid
    }

    #[test]
    fn flat_dry_grid_is_still() {
        let mut grid = flat(4);
        let before = grid.clone();
        let p = params(0.5, true);
        flow_pass(&mut grid, &p);
        velocity_pass(&mut grid, &p);
        assert_eq!(grid, before);
    }

    #[test]
    fn center_water_spreads_symmetrically() {
        let mut grid = flat(3);
        let dw = 0.8;
        let center = 4;
        grid.hydraulics.cell_mut(center, 0).water_height = dw;
        let p = params(0.5, true);

        flow_pass(&mut grid, &p);
        let c = *grid.hydraulics.cell(center, 0);
        for dir in Direction::all() {
            assert!((c.outflow(dir) - dw / 8.0).abs() < 1e-6);
        }
        for n in [1, 3, 5, 7] {
            assert!((grid.hydraulics.cell(n, 0).water_height - dw / 8.0).abs() < 1e-6);
        }
        assert!((grid.hydraulics.cell(center, 0).water_height - dw / 2.0).abs() < 1e-6);
        assert!((grid.hydraulics.total_water() - dw as f64).abs() < 1e-6);

        velocity_pass(&mut grid, &p);
        assert_eq!(grid.hydraulics.cell(center, 0).velocity, [0.0, 0.0]);
        let left = grid.hydraulics.cell(3, 0).velocity;
        let right = grid.hydraulics.cell(5, 0).velocity;
        let down = grid.hydraulics.cell(1, 0).velocity;
        let up = grid.hydraulics.cell(7, 0).velocity;
        assert!(left[0] < 0.0 && right[0] > 0.0);
        assert!(down[1] < 0.0 && up[1] > 0.0);
        let speed = right[0];
        for v in [left, right, down, up] {
            assert!(((v[0] * v[0] + v[1] * v[1]).sqrt() - speed).abs() < 1e-6);
        }
    }

    #[test]
    fn single_downhill_direction_takes_everything() {
        // 2x2 grid; the top row is a wall so (0,0)->(1,0) is a 1x2 channel.
        let mut grid = flat(2);
        grid.terrain.set_thickness(2, 0, 0, 10.0);
        grid.terrain.set_thickness(3, 0, 0, 10.0);
        let dw = 0.4;
        grid.hydraulics.cell_mut(0, 0).water_height = dw;
        let p = params(0.25, true);

        flow_pass(&mut grid, &p);
        let c = grid.hydraulics.cell(0, 0);
        assert!((c.outflow(Direction::Right) - dw * 0.75).abs() < 1e-6);
        assert_eq!(c.outflow(Direction::Up), 0.0);
        assert_eq!(c.outflow(Direction::Left), 0.0);
        assert_eq!(c.outflow(Direction::Down), 0.0);
        assert!((grid.hydraulics.cell(1, 0).water_height - dw * 0.75).abs() < 1e-6);
    }

    #[test]
    fn slope_biases_outflow_downhill() {
        // Middle row of a 3x3 grid is the strip; other rows are walls.
        let mut grid = SimulationGrid::new(GridLayout::new(3, 1, 1));
        for column in 0..9 {
            grid.terrain.set_thickness(column, 0, 0, 10.0);
        }
        grid.terrain.set_thickness(3, 0, 0, 0.6);
        grid.terrain.set_thickness(4, 0, 0, 0.4);
        grid.terrain.set_thickness(5, 0, 0, 0.2);
        grid.hydraulics.cell_mut(4, 0).water_height = 0.5;
        let p = params(0.5, true);

        flow_pass(&mut grid, &p);
        let c = grid.hydraulics.cell(4, 0);
        assert!(c.outflow(Direction::Right) > c.outflow(Direction::Left));
        assert!(c.outflow(Direction::Left) > 0.0);
    }

    #[test]
    fn outflow_never_exceeds_water() {
        let mut grid = flat(3);
        grid.terrain.set_thickness(4, 0, 0, 5.0);
        grid.hydraulics.cell_mut(4, 0).water_height = 0.1;
        let p = params(0.0, true);

        flow_pass(&mut grid, &p);
        let c = grid.hydraulics.cell(4, 0);
        assert!((c.total_outflow() - 0.1).abs() < 1e-6);
        assert!(c.water_height.abs() < 1e-6);
        assert!(grid.hydraulics.as_slice().iter().all(|c| c.water_height >= 0.0));
    }

    #[test]
    fn closed_boundary_keeps_water_and_open_boundary_drains() {
        let mut closed = flat(3);
        closed.hydraulics.cell_mut(0, 0).water_height = 0.3;
        flow_pass(&mut closed, &params(0.5, true));
        assert!((closed.hydraulics.total_water() - 0.3).abs() < 1e-6);

        let mut open = flat(3);
        open.hydraulics.cell_mut(0, 0).water_height = 0.3;
        flow_pass(&mut open, &params(0.5, false));
        assert!(open.hydraulics.total_water() < 0.3 - 1e-4);
        let c = open.hydraulics.cell(0, 0);
        assert!(c.outflow(Direction::Left) > 0.0 && c.outflow(Direction::Down) > 0.0);
    }

    #[test]
    fn sediment_flow_follows_water_share() {
        let mut grid = flat(3);
        {
            let c = grid.hydraulics.cell_mut(4, 0);
            c.water_height = 0.8;
            c.suspended_sediment = 0.2;
        }
        flow_pass(&mut grid, &params(0.5, true));
        let c = grid.hydraulics.cell(4, 0);
        for dir in Direction::all() {
            assert!((c.sediment_flow[dir.index()] - 0.2 * 0.1 / 0.8).abs() < 1e-6);
        }
    }

    #[test]
    fn velocity_is_bounded() {
        let mut grid = flat(3);
        grid.hydraulics.cell_mut(4, 0).water_height = 1.0e6;
        let mut p = params(0.0, true);
        p.height_multiplier = 1.0e4;
        flow_pass(&mut grid, &p);
        velocity_pass(&mut grid, &p);
        for cell in grid.hydraulics.as_slice() {
            assert!(cell.speed() <= 1.0 + 1e-6);
        }
        assert_eq!(clamp_velocity([f32::NAN, 1.0]), [0.0, 0.0]);
    }

    #[test]
    fn evaporation_shrinks_water() {
        let mut grid = flat(2);
        grid.hydraulics.cell_mut(0, 0).water_height = 1.0;
        let mut p = params(0.5, true);
        p.evaporation_rate = 0.25;
        evaporation_pass(&mut grid, &p);
        assert!((grid.hydraulics.cell(0, 0).water_height - 0.75).abs() < 1e-6);
        p.evaporation_rate = 1.0;
        evaporation_pass(&mut grid, &p);
        assert_eq!(grid.hydraulics.cell(0, 0).water_height, 0.0);
    }
}
