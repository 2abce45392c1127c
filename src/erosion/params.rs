//! Flattened per-run parameters consumed by both solver backends.

use super::config::{ErosionConfig, GridConfig};

/// Threshold margin for layer overflow so a freshly capped layer stays put.
pub const OVERFLOW_EPSILON: f32 = 1e-6;

/// Rock-table entry as used inside the passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RockParams {
    pub hardness: f32,
    pub repose_tangent: f32,
    pub collapse_threshold: f32,
}

/// Everything a pass needs, resolved once from the two config halves.
#[derive(Debug, Clone, PartialEq)]
pub struct PassParams {
    pub dampening: f32,
    pub time_delta: f32,
    pub height_multiplier: f32,
    pub sediment_capacity: f32,
    pub suspension_rate: f32,
    pub deposition_rate: f32,
    pub evaporation_rate: f32,
    pub maximal_erosion_depth: f32,
    pub gravity: f32,
    /// `1 - sea_level`.
    pub layer_cap: f32,
    pub keep_water_in_boundaries: bool,
    pub horizontal_erosion: bool,
    pub rocks: Vec<RockParams>,
}

impl PassParams {
    pub fn new(grid: &GridConfig, erosion: &ErosionConfig) -> Self {
        Self {
            dampening: erosion.dampening,
            time_delta: erosion.time_delta,
            height_multiplier: grid.height_multiplier,
            sediment_capacity: erosion.sediment_capacity,
            suspension_rate: erosion.suspension_rate,
            deposition_rate: erosion.deposition_rate,
            evaporation_rate: erosion.evaporation_rate,
            maximal_erosion_depth: erosion.maximal_erosion_depth,
            gravity: erosion.gravity,
            layer_cap: grid.layer_cap(),
            keep_water_in_boundaries: erosion.is_water_kept_in_boundaries,
            horizontal_erosion: erosion.is_horizontal_erosion_enabled,
            rocks: grid
                .rock_types
                .iter()
                .map(|rock| RockParams {
                    hardness: rock.hardness,
                    repose_tangent: rock.repose_tangent(),
                    collapse_threshold: rock.collapse_threshold,
                })
                .collect(),
        }
    }

    /// Fraction of the repose excess relaxed per step: `g·dt / (1 + g·dt)`.
    pub fn slip_rate(&self) -> f32 {
        let gdt = self.gravity * self.time_delta;
        gdt / (1.0 + gdt)
    }

    /// Steepest stable thickness difference between neighbours for a rock type.
    pub fn talus(&self, rock: usize) -> f32 {
        self.rocks[rock].repose_tangent / self.height_multiplier
    }
}
