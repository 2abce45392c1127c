//! Bounded 4-neighbour lookup on a square column grid.
//!
//! The grid does not wrap: steps that leave the grid return `None`, and each
//! pass decides what the outside means (closed wall or open sink). The WGSL
//! kernels use the same convention.

use super::Direction;

/// Returns the neighbour of `(x, y)` in `dir`, or `None` outside the grid.
pub fn neighbor_4(side_length: u32, x: u32, y: u32, dir: Direction) -> Option<(u32, u32)> {
    debug_assert!(x < side_length && y < side_length);
    let (dx, dy) = dir.offset();
    offset_within(side_length, x, y, dx, dy)
}

/// Applies an arbitrary `(dx, dy)` step, returning `None` if it leaves the grid.
pub fn offset_within(side_length: u32, x: u32, y: u32, dx: i32, dy: i32) -> Option<(u32, u32)> {
    let nx = x as i64 + dx as i64;
    let ny = y as i64 + dy as i64;
    let side = side_length as i64;
    if (0..side).contains(&nx) && (0..side).contains(&ny) {
        Some((nx as u32, ny as u32))
    } else {
        None
    }
}

/// Neighbour column indices of a column index, in [`Direction`] slot order.
pub fn neighbor_columns(side_length: u32, column: usize) -> [Option<usize>; 4] {
    let x = (column % side_length as usize) as u32;
    let y = (column / side_length as usize) as u32;
    Direction::all().map(|dir| {
        neighbor_4(side_length, x, y, dir).map(|(nx, ny)| ny as usize * side_length as usize + nx as usize)
    })
}
