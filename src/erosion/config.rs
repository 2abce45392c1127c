//! Erosion configuration.
//!
//! Configuration is split into the grid-shaping part ([`GridConfig`], changing
//! it forces a full reallocation) and per-step tunables ([`ErosionConfig`]).
//! Both are plain serde value objects; [`SimulationConfig`] bundles them for
//! loading from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of rock types per simulation (bedrock, coarse, fine).
pub const MAX_ROCK_TYPES: usize = 3;

/// Errors raised while validating or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("side_length must be at least 1")]
    ZeroSideLength,
    #[error("layer_count must be at least 1")]
    ZeroLayerCount,
    #[error("rock type count must be between 1 and {MAX_ROCK_TYPES}, got {0}")]
    RockTypeCount(usize),
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("{name} must be finite and > 0, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("rock type {index}: collapse_threshold {threshold} must be below the layer cap {cap}")]
    CollapseThreshold { index: usize, threshold: f32, cap: f32 },
    #[error("spring source ({x}, {y}) lies outside a {side_length}x{side_length} grid")]
    SpringOutOfBounds { x: u32, y: u32, side_length: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which backend runs the erosion passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErosionBackend {
    /// Prefer GPU; if GPU init fails, fall back to CPU.
    Auto,
    /// Require GPU (engine construction fails if unavailable).
    GpuOnly,
    /// Force the rayon CPU implementation.
    CpuOnly,
}

impl Default for ErosionBackend {
    fn default() -> Self {
        Self::CpuOnly
    }
}

/// Material class of one slot in a terrain layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RockType {
    /// Resistance to erosion in [0, 1]; 1 never erodes.
    pub hardness: f32,
    /// Steepest stable slope, in degrees.
    pub angle_of_repose_deg: f32,
    /// Floor gap at or below which an overhang resting on this material falls.
    pub collapse_threshold: f32,
}

impl RockType {
    pub fn bedrock() -> Self {
        Self {
            hardness: 0.8,
            angle_of_repose_deg: 60.0,
            collapse_threshold: 0.01,
        }
    }

    pub fn coarse_sediment() -> Self {
        Self {
            hardness: 0.4,
            angle_of_repose_deg: 40.0,
            collapse_threshold: 0.02,
        }
    }

    pub fn fine_sediment() -> Self {
        Self {
            hardness: 0.1,
            angle_of_repose_deg: 30.0,
            collapse_threshold: 0.03,
        }
    }

    /// Tangent of the angle of repose (rise over one cell).
    pub fn repose_tangent(&self) -> f32 {
        self.angle_of_repose_deg.to_radians().tan()
    }
}

impl Default for RockType {
    fn default() -> Self {
        Self::bedrock()
    }
}

/// Grid-shaping parameters. Any change here requires a fresh engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Columns per side; the grid is `side_length²` columns.
    pub side_length: u32,
    /// Stacked layers per column (1 = plain heightfield).
    pub layer_count: u32,
    /// Rock table, bottom to top. Its length is the rock type count.
    pub rock_types: Vec<RockType>,
    /// Normalized sea level; a layer holds at most `1 - sea_level` of rock.
    pub sea_level: f32,
    /// Converts normalized heights into rendered world units.
    pub height_multiplier: f32,
}

impl GridConfig {
    pub fn rock_type_count(&self) -> usize {
        self.rock_types.len()
    }

    /// Thickness above which a layer overflows into the one above.
    pub fn layer_cap(&self) -> f32 {
        1.0 - self.sea_level
    }

    /// True when both configs produce the same allocation shape.
    pub fn same_shape(&self, other: &GridConfig) -> bool {
        self.side_length == other.side_length
            && self.layer_count == other.layer_count
            && self.rock_types.len() == other.rock_types.len()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.side_length == 0 {
            return Err(ConfigError::ZeroSideLength);
        }
        if self.layer_count == 0 {
            return Err(ConfigError::ZeroLayerCount);
        }
        let count = self.rock_types.len();
        if count == 0 || count > MAX_ROCK_TYPES {
            return Err(ConfigError::RockTypeCount(count));
        }
        check_range("sea_level", self.sea_level, 0.0, 0.999)?;
        check_positive("height_multiplier", self.height_multiplier)?;

        let cap = self.layer_cap();
        for (index, rock) in self.rock_types.iter().enumerate() {
            check_range("hardness", rock.hardness, 0.0, 1.0)?;
            check_range("angle_of_repose_deg", rock.angle_of_repose_deg, 0.0, 89.9)?;
            if !rock.collapse_threshold.is_finite() || rock.collapse_threshold < 0.0 || rock.collapse_threshold >= cap {
                return Err(ConfigError::CollapseThreshold {
                    index,
                    threshold: rock.collapse_threshold,
                    cap,
                });
            }
        }
        Ok(())
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            side_length: 256,
            layer_count: 2,
            rock_types: vec![
                RockType::bedrock(),
                RockType::coarse_sediment(),
                RockType::fine_sediment(),
            ],
            sea_level: 0.2,
            height_multiplier: 32.0,
        }
    }
}

/// Fixed water source injecting `water_increase` into every column within `radius`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringSource {
    pub x: u32,
    pub y: u32,
    pub radius: f32,
}

/// Per-step tunables. These can change between steps without reallocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErosionConfig {
    /// Which backend runs the passes.
    pub backend: ErosionBackend,
    /// Random columns receiving rain each step (ignored when `spring` is set).
    pub rain_drops: u32,
    /// Water added per rain drop / spring column per step.
    pub water_increase: f32,
    /// Optional fixed water source replacing random rain.
    pub spring: Option<SpringSource>,
    /// Drives repose slippage speed.
    pub gravity: f32,
    /// Fraction of the head difference withheld from outflow (0-1).
    pub dampening: f32,
    /// Per-step cap on eroded thickness per cell; 0 disables the cap.
    pub maximal_erosion_depth: f32,
    /// Sediment capacity factor (Kc).
    pub sediment_capacity: f32,
    /// Erosion rate (Ks).
    pub suspension_rate: f32,
    /// Deposition rate (Kd).
    pub deposition_rate: f32,
    /// Evaporation factor per step (0-1).
    pub evaporation_rate: f32,
    /// Simulation time step.
    pub time_delta: f32,
    /// Enables angle-of-repose slippage between neighbouring columns.
    pub is_horizontal_erosion_enabled: bool,
    /// Closed boundary when true; otherwise water drains off the grid edge.
    pub is_water_kept_in_boundaries: bool,
    /// Seed for rain placement.
    pub seed: u64,
}

impl ErosionConfig {
    pub fn validate(&self, grid: &GridConfig) -> Result<(), ConfigError> {
        check_range("dampening", self.dampening, 0.0, 1.0)?;
        check_range("evaporation_rate", self.evaporation_rate, 0.0, 1.0)?;
        check_positive("time_delta", self.time_delta)?;
        check_non_negative("water_increase", self.water_increase)?;
        check_non_negative("gravity", self.gravity)?;
        check_non_negative("maximal_erosion_depth", self.maximal_erosion_depth)?;
        check_non_negative("sediment_capacity", self.sediment_capacity)?;
        check_range("suspension_rate", self.suspension_rate, 0.0, 1.0)?;
        check_range("deposition_rate", self.deposition_rate, 0.0, 1.0)?;

        if let Some(spring) = self.spring {
            if spring.x >= grid.side_length || spring.y >= grid.side_length {
                return Err(ConfigError::SpringOutOfBounds {
                    x: spring.x,
                    y: spring.y,
                    side_length: grid.side_length,
                });
            }
            check_non_negative("spring.radius", spring.radius)?;
        }
        Ok(())
    }
}

impl Default for ErosionConfig {
    fn default() -> Self {
        Self {
            backend: ErosionBackend::default(),
            rain_drops: 64,
            water_increase: 0.01,
            spring: None,
            gravity: 9.81,
            dampening: 0.25,
            maximal_erosion_depth: 0.0,
            sediment_capacity: 0.05,
            suspension_rate: 0.02,
            deposition_rate: 0.02,
            evaporation_rate: 0.02,
            time_delta: 1.0,
            is_horizontal_erosion_enabled: true,
            is_water_kept_in_boundaries: true,
            seed: 42,
        }
    }
}

/// Complete engine configuration as loaded from disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub erosion: ErosionConfig,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.erosion.validate(&self.grid)
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, min, max })
    }
}

fn check_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn check_non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    check_range(name, value, 0.0, f32::MAX)
}
