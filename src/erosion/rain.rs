//! Per-iteration rain fields.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::config::ErosionConfig;
use crate::terrain::GridLayout;

/// Seeded generator of rain fields, one value per column.
///
/// With a spring configured every column within its radius receives
/// `water_increase`; otherwise `rain_drops` random columns do (a column may be
/// hit more than once).
#[derive(Debug, Clone)]
pub struct RainSource {
    rng: ChaCha8Rng,
}

impl RainSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn fill(&mut self, field: &mut [f32], layout: GridLayout, config: &ErosionConfig) {
        field.fill(0.0);
        if config.water_increase <= 0.0 {
            return;
        }

        match config.spring {
            Some(spring) => {
                let r2 = spring.radius * spring.radius;
                for (column, value) in field.iter_mut().enumerate() {
                    let (x, y) = layout.column_coords(column);
                    let dx = x as f32 - spring.x as f32;
                    let dy = y as f32 - spring.y as f32;
                    if dx * dx + dy * dy <= r2 {
                        *value += config.water_increase;
                    }
                }
            }
            None => {
                let plane = field.len();
                if plane == 0 {
                    return;
                }
                for _ in 0..config.rain_drops {
                    let column = self.rng.random_range(0..plane);
                    field[column] += config.water_increase;
                }
            }
        }
    }
}
