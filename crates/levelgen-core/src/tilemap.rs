//! SemanticToTilemap - pure mapping from a SemanticGrid to a 32x32 array
//! of tile IDs, with optional 4-neighbor autotile variants for SOLID cells.

use crate::grid::{CellFlags, SemanticGrid};

/// Bit positions for the 4-neighbor autotile mask. Off-grid neighbours
/// count as SOLID, so border tiles look sealed rather than carved open.
pub const NEIGHBOR_NORTH: u8 = 1;
pub const NEIGHBOR_EAST: u8 = 2;
pub const NEIGHBOR_SOUTH: u8 = 4;
pub const NEIGHBOR_WEST: u8 = 8;

/// Tile IDs consumed by the rendering layer. All fields are opaque
/// integers the core never interprets beyond the precedence rule below.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileIds {
    pub solid_base: u32,
    /// Maps a 4-bit neighbor mask (0..=15) to a variant tile ID. Empty
    /// means "no autotiling" — every SOLID cell renders as `solid_base`.
    pub solid_variants: std::collections::HashMap<u8, u32>,
    pub hazard: u32,
    pub oneway: u32,
    pub ladder: u32,
    /// `0` means "skip this marker, render as empty" — used when the
    /// editor draws markers itself rather than baking them into tiles.
    pub goal_marker: u32,
    pub start_marker: u32,
    pub empty: u32,
}

/// Resolve the tile ID for a single cell's flags under the ordered
/// precedence: SOLID, HAZARD, ONEWAY, LADDER, GOAL, START, empty.
fn resolve_tile(flags: CellFlags, mask: u8, ids: &TileIds) -> u32 {
    if flags.contains(CellFlags::SOLID) {
        return autotile_variant(mask, ids);
    }
    if flags.contains(CellFlags::HAZARD) {
        return ids.hazard;
    }
    if flags.contains(CellFlags::ONEWAY) {
        return ids.oneway;
    }
    if flags.contains(CellFlags::LADDER) {
        return ids.ladder;
    }
    if flags.contains(CellFlags::GOAL) && ids.goal_marker != 0 {
        return ids.goal_marker;
    }
    if flags.contains(CellFlags::START) && ids.start_marker != 0 {
        return ids.start_marker;
    }
    ids.empty
}

/// Look up the neighbor-mask variant for a SOLID cell, falling back to
/// `solid_base` when `solid_variants` is empty or the mask has no entry.
fn autotile_variant(mask: u8, ids: &TileIds) -> u32 {
    if ids.solid_variants.is_empty() {
        return ids.solid_base;
    }
    *ids.solid_variants.get(&mask).unwrap_or(&ids.solid_base)
}

/// Compute the 4-neighbor SOLID bitmask for `(x, y)`. Off-grid neighbours
/// count as SOLID.
fn neighbor_mask(grid: &SemanticGrid, x: i32, y: i32) -> u8 {
    let is_solid = |nx: i32, ny: i32| -> bool {
        grid.get(nx, ny)
            .map(|f| f.contains(CellFlags::SOLID))
            .unwrap_or(true)
    };
    let mut mask = 0u8;
    if is_solid(x, y - 1) {
        mask |= NEIGHBOR_NORTH;
    }
    if is_solid(x + 1, y) {
        mask |= NEIGHBOR_EAST;
    }
    if is_solid(x, y + 1) {
        mask |= NEIGHBOR_SOUTH;
    }
    if is_solid(x - 1, y) {
        mask |= NEIGHBOR_WEST;
    }
    mask
}

/// Produce a 32x32 row-major tile-ID array from `grid`.
pub fn to_tilemap(grid: &SemanticGrid, ids: &TileIds) -> Vec<Vec<u32>> {
    let width = SemanticGrid::WIDTH as i32;
    let height = SemanticGrid::HEIGHT as i32;
    let mut out = vec![vec![0u32; width as usize]; height as usize];

    for y in 0..height {
        for x in 0..width {
            let flags = grid.get(x, y).unwrap_or(CellFlags::empty());
            let mask = neighbor_mask(grid, x, y);
            out[y as usize][x as usize] = resolve_tile(flags, mask, ids);
        }
    }

    out
}
