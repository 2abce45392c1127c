//! Simulation orchestration.

mod engine;

pub use engine::{EngineError, EngineState, ErosionEngine};
