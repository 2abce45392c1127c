//! Planar grid geometry: directions and bounded neighbour lookup.

mod direction;
pub mod neighbors;

pub use direction::Direction;
