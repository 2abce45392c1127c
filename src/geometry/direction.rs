//! Cardinal directions on the planar column grid.

use serde::{Deserialize, Serialize};

/// One of the four von Neumann neighbours of a column.
///
/// The discriminant is the slot used in the per-cell flow arrays, so the order
/// here is part of the binary layout shared with the compute shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// -X
    Left = 0,
    /// +X
    Right = 1,
    /// -Y
    Down = 2,
    /// +Y
    Up = 3,
}

impl Direction {
    /// Returns all four directions in slot order.
    pub const fn all() -> [Direction; 4] {
        [Direction::Left, Direction::Right, Direction::Down, Direction::Up]
    }

    /// Returns the flow-array slot (0-3).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Creates a direction from a slot index (0-3).
    pub const fn from_index(index: usize) -> Option<Direction> {
        match index {
            0 => Some(Direction::Left),
            1 => Some(Direction::Right),
            2 => Some(Direction::Down),
            3 => Some(Direction::Up),
            _ => None,
        }
    }

    /// The direction pointing back at the origin cell.
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
        }
    }

    /// Grid step `(dx, dy)` for this direction.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::Down => (0, -1),
            Direction::Up => (0, 1),
        }
    }
}
