//! The erosion engine: owns the grids, sequences solver runs, and guards the
//! command surface with a small state machine.

use std::fmt;

use thiserror::Error;

use crate::erosion::{
    create_solver, ConfigError, ErosionConfig, ErosionSolver, PassParams, RainSource, SimulationConfig, SolverError,
};
use crate::terrain::{stratify, GridLayout, SimulationGrid, TerrainSnapshot, TerrainVolume};

/// Lifecycle of an [`ErosionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Configured, no storage allocated yet.
    Uninitialized,
    /// Grids allocated, ready for commands.
    Idle,
    /// A run is in progress.
    Stepping,
    /// Storage released; every command fails.
    Disposed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Idle => "idle",
            EngineState::Stepping => "stepping",
            EngineState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot {operation} while the engine is {state}")]
    InvalidState { operation: &'static str, state: EngineState },
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("column ({x}, {y}) lies outside a {side_length}x{side_length} grid")]
    OutOfBounds { x: u32, y: u32, side_length: u32 },
    #[error("heightmap has {actual} values, expected {expected}")]
    HeightmapSize { expected: usize, actual: usize },
    #[error("terrain volume is shaped {actual:?}, engine expects {expected:?}")]
    VolumeLayout { expected: GridLayout, actual: GridLayout },
}

/// Layered hydraulic erosion engine.
///
/// ```no_run
/// use strata::erosion::SimulationConfig;
/// use strata::simulation::ErosionEngine;
/// use strata::terrain::dome_heightmap;
///
/// let config = SimulationConfig::default();
/// let side = config.grid.side_length;
/// let mut engine = ErosionEngine::new(config)?;
/// engine.initialize_from_heights(&dome_heightmap(side, 1.5, 7), 0.3)?;
/// engine.run(100)?;
/// let snapshot = engine.snapshot()?;
/// # Ok::<(), strata::simulation::EngineError>(())
/// ```
pub struct ErosionEngine {
    config: SimulationConfig,
    layout: GridLayout,
    params: PassParams,
    state: EngineState,
    grid: Option<SimulationGrid>,
    solver: Option<Box<dyn ErosionSolver>>,
    rain: RainSource,
    iterations: u64,
}

impl ErosionEngine {
    /// Validates `config`; nothing is allocated until [`initialize`](Self::initialize).
    pub fn new(config: SimulationConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let layout = GridLayout::from_config(&config.grid);
        let params = PassParams::new(&config.grid, &config.erosion);
        let rain = RainSource::new(config.erosion.seed);
        Ok(Self {
            config,
            layout,
            params,
            state: EngineState::Uninitialized,
            grid: None,
            solver: None,
            rain,
            iterations: 0,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    /// Iterations completed since initialization.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Name of the active solver backend, once initialized.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.solver.as_ref().map(|s| s.name())
    }

    fn guard(&self, operation: &'static str, allowed: &[EngineState]) -> Result<(), EngineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Takes ownership of a terrain volume and allocates the hydraulic grid and
    /// solver. May be called again while idle to start over.
    pub fn initialize(&mut self, terrain: TerrainVolume) -> Result<(), EngineError> {
        self.guard("initialize", &[EngineState::Uninitialized, EngineState::Idle])?;
        if terrain.layout() != self.layout {
            return Err(EngineError::VolumeLayout {
                expected: self.layout,
                actual: terrain.layout(),
            });
        }

        if self.solver.is_none() {
            let solver = create_solver(self.config.erosion.backend, self.layout)?;
            log::info!(
                "erosion engine: {}x{} grid, {} layers, {} rock types on the {} backend",
                self.layout.side_length(),
                self.layout.side_length(),
                self.layout.layer_count(),
                self.layout.rock_type_count(),
                solver.name()
            );
            self.solver = Some(solver);
        }
        self.grid = Some(SimulationGrid::with_terrain(terrain));
        self.rain = RainSource::new(self.config.erosion.seed);
        self.iterations = 0;
        self.state = EngineState::Idle;
        Ok(())
    }

    /// Builds layer-0 terrain from a row-major heightmap and initializes.
    pub fn initialize_from_heights(&mut self, heights: &[f32], cover_fraction: f32) -> Result<(), EngineError> {
        self.guard("initialize", &[EngineState::Uninitialized, EngineState::Idle])?;
        let expected = self.layout.plane_size();
        if heights.len() != expected {
            return Err(EngineError::HeightmapSize {
                expected,
                actual: heights.len(),
            });
        }
        self.initialize(stratify(self.layout, heights, cover_fraction))
    }

    /// Runs a single iteration.
    pub fn step(&mut self) -> Result<(), EngineError> {
        self.run(1)
    }

    /// Runs `iterations` iterations. On error the grids are left as they were.
    pub fn run(&mut self, iterations: u32) -> Result<(), EngineError> {
        self.guard("step", &[EngineState::Idle])?;
        let (Some(grid), Some(solver)) = (self.grid.as_mut(), self.solver.as_mut()) else {
            return Err(EngineError::InvalidState {
                operation: "step",
                state: self.state,
            });
        };

        self.state = EngineState::Stepping;
        let layout = self.layout;
        let erosion = &self.config.erosion;
        let rain = &mut self.rain;
        let result = solver.simulate(grid, &self.params, iterations, &mut |field| rain.fill(field, layout, erosion));
        self.state = EngineState::Idle;

        result?;
        self.iterations += iterations as u64;
        log::debug!(
            "ran {iterations} erosion iterations ({} total), water {:.4}",
            self.iterations,
            grid.hydraulics.total_water()
        );
        Ok(())
    }

    /// Adds `amount` of water to the surface layer of every column.
    pub fn add_rain(&mut self, amount: f32) -> Result<(), EngineError> {
        self.guard("add rain", &[EngineState::Idle])?;
        let grid = self.grid_mut("add rain")?;
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        for column in 0..grid.layout().plane_size() {
            grid.add_water(column, amount);
        }
        Ok(())
    }

    /// Adds water to the surface layer of one column.
    pub fn add_water_at(&mut self, x: u32, y: u32, amount: f32) -> Result<(), EngineError> {
        self.guard("add water", &[EngineState::Idle])?;
        if !self.layout.contains(x, y) {
            return Err(EngineError::OutOfBounds {
                x,
                y,
                side_length: self.layout.side_length(),
            });
        }
        let column = self.layout.column_index(x, y);
        let grid = self.grid_mut("add water")?;
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        grid.add_water(column, amount);
        Ok(())
    }

    /// Drops all water; suspended sediment settles where it is.
    pub fn remove_all_water(&mut self) -> Result<(), EngineError> {
        self.guard("remove water", &[EngineState::Idle])?;
        self.grid_mut("remove water")?.remove_all_water();
        Ok(())
    }

    /// Detached copy of the current terrain and hydraulic arrays.
    pub fn snapshot(&self) -> Result<TerrainSnapshot, EngineError> {
        self.guard("snapshot", &[EngineState::Idle])?;
        self.grid
            .as_ref()
            .map(SimulationGrid::snapshot)
            .ok_or(EngineError::InvalidState {
                operation: "snapshot",
                state: self.state,
            })
    }

    /// Releases all storage. Later commands fail with an invalid-state error.
    pub fn dispose(&mut self) {
        if self.state != EngineState::Disposed {
            log::info!("erosion engine disposed after {} iterations", self.iterations);
        }
        self.grid = None;
        self.solver = None;
        self.state = EngineState::Disposed;
    }

    /// Applies a new configuration.
    ///
    /// A different grid shape (side length, layer count or number of rock
    /// types) drops the grids and returns a fresh, uninitialized engine. Any
    /// other change, including rock properties, sea level and height
    /// multiplier, keeps the grids and applies from the next step.
    pub fn reconfigure(mut self, config: SimulationConfig) -> Result<Self, EngineError> {
        self.guard("reconfigure", &[EngineState::Uninitialized, EngineState::Idle])?;
        config.validate()?;

        if !self.config.grid.same_shape(&config.grid) {
            log::info!("grid shape changed, reallocating erosion engine");
            return Self::new(config);
        }

        if config.erosion.backend != self.config.erosion.backend && self.solver.is_some() {
            let solver = create_solver(config.erosion.backend, self.layout)?;
            log::info!("erosion backend switched to {}", solver.name());
            self.solver = Some(solver);
        }
        if config.erosion.seed != self.config.erosion.seed {
            self.rain = RainSource::new(config.erosion.seed);
        }
        self.params = PassParams::new(&config.grid, &config.erosion);
        self.config = config;
        Ok(self)
    }

    /// Replaces only the per-step tunables.
    pub fn set_erosion(self, erosion: ErosionConfig) -> Result<Self, EngineError> {
        let config = SimulationConfig {
            grid: self.config.grid.clone(),
            erosion,
        };
        self.reconfigure(config)
    }

    fn grid_mut(&mut self, operation: &'static str) -> Result<&mut SimulationGrid, EngineError> {
        let state = self.state;
        self.grid
            .as_mut()
            .ok_or(EngineError::InvalidState { operation, state })
    }
}
