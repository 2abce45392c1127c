//! Turning plain heightmaps into layered terrain volumes.
//!
//! Height synthesis itself lives outside this crate; these helpers accept any
//! row-major `side_length²` heightmap (e.g. one imported from a RAW file) and
//! provide a small deterministic dome for headless runs and tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::layout::GridLayout;
use super::volume::TerrainVolume;

/// Splits each column height into layer-0 rock: the bottom `1 - cover_fraction`
/// becomes bedrock, the remainder is shared evenly by the sediment types.
///
/// With a single rock type the whole height is bedrock. Heights above the
/// layer cap are left for the first redistribution pass to overflow upward.
///
/// # Panics
///
/// Panics if `heights.len()` is not `layout.plane_size()`.
/// `ErosionEngine::initialize_from_heights` checks this and returns an error instead.
pub fn stratify(layout: GridLayout, heights: &[f32], cover_fraction: f32) -> TerrainVolume {
    assert_eq!(heights.len(), layout.plane_size(), "heightmap does not match the grid");
    let mut volume = TerrainVolume::new(layout);
    let rocks = layout.rock_type_count();
    let cover = if rocks > 1 { cover_fraction.clamp(0.0, 1.0) } else { 0.0 };

    for (column, &height) in heights.iter().enumerate() {
        let h = if height.is_finite() { height.max(0.0) } else { 0.0 };
        volume.set_thickness(column, 0, 0, h * (1.0 - cover));
        if rocks > 1 {
            let share = h * cover / (rocks - 1) as f32;
            for rock in 1..rocks {
                volume.set_thickness(column, 0, rock, share);
            }
        }
    }
    volume
}

/// Radial dome with seeded jitter, heights in roughly `[0, peak]`.
pub fn dome_heightmap(side_length: u32, peak: f32, seed: u64) -> Vec<f32> {
    let side = side_length as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let jitter: Vec<f32> = (0..side * side).map(|_| rng.random::<f32>()).collect();
    let center = (side_length as f32 - 1.0) * 0.5;
    let radius = (side_length as f32 * 0.5).max(1.0);

    let mut heights = vec![0.0f32; side * side];
    heights.par_iter_mut().enumerate().for_each(|(i, height)| {
        let x = (i % side) as f32;
        let y = (i / side) as f32;
        let d = ((x - center).powi(2) + (y - center).powi(2)).sqrt() / radius;
        let base = (1.0 - d * d).max(0.0);
        *height = peak * (0.9 * base + 0.1 * jitter[i] * base.sqrt());
    });
    heights
}
