//! SemanticGrid - the authoritative bit-packed level representation.
//!
//! A fixed 32x32 row-major field of per-cell bitflags. The grid owns its
//! storage; `copy()` yields an independent deep copy. The grid is not
//! toroidal — point access outside `[0, width) x [0, height)` is an error,
//! while `apply_rect` silently clips at the edges so callers can paint
//! without manual bounds math.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::constants::{GRID_HEIGHT, GRID_WIDTH};
use crate::error::{LevelGenError, Result};

bitflags! {
    /// Per-cell semantic flags. Bit values are normative for serialisation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u8 {
        /// Fully blocking terrain (walls, floor surfaces).
        const SOLID = 0x01;
        /// Passable from below; solid landing from above.
        const ONEWAY = 0x02;
        /// Kills the player on contact.
        const HAZARD = 0x04;
        /// Climbable vertical surface.
        const LADDER = 0x08;
        /// Level exit marker.
        const GOAL = 0x10;
        /// Player spawn marker.
        const START = 0x20;
    }
}

/// How `SemanticGrid::apply_rect` combines new flags with existing ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RectMode {
    /// Replace the cell's flags outright.
    Overwrite,
    /// OR the new flags into the cell.
    Add,
    /// AND-NOT the new flags out of the cell.
    Remove,
}

/// The fixed 32x32 semantic level grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SemanticGrid {
    cells: Vec<CellFlags>,
}

/// On-the-wire representation used by `to_json`/`from_json`.
/// `deny_unknown_fields` rejects additional properties per the grid
/// serialisation contract.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GridJson {
    width: usize,
    height: usize,
    cells: String,
}

impl SemanticGrid {
    /// Width of every grid, in tiles.
    pub const WIDTH: usize = GRID_WIDTH;
    /// Height of every grid, in tiles.
    pub const HEIGHT: usize = GRID_HEIGHT;

    /// Create an empty (all-zero) grid.
    pub fn new() -> Self {
        Self {
            cells: vec![CellFlags::empty(); Self::WIDTH * Self::HEIGHT],
        }
    }

    #[inline]
    fn in_bounds(x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < Self::WIDTH && (y as usize) < Self::HEIGHT
    }

    #[inline]
    fn index(x: i32, y: i32) -> usize {
        y as usize * Self::WIDTH + x as usize
    }

    fn bounds_error(x: i32, y: i32) -> LevelGenError {
        LevelGenError::OutOfBounds {
            x,
            y,
            width: Self::WIDTH,
            height: Self::HEIGHT,
        }
    }

    /// Read the flags at `(x, y)`.
    pub fn get(&self, x: i32, y: i32) -> Result<CellFlags> {
        if !Self::in_bounds(x, y) {
            return Err(Self::bounds_error(x, y));
        }
        Ok(self.cells[Self::index(x, y)])
    }

    /// Overwrite the flags at `(x, y)`.
    pub fn set(&mut self, x: i32, y: i32, flags: CellFlags) -> Result<()> {
        if !Self::in_bounds(x, y) {
            return Err(Self::bounds_error(x, y));
        }
        self.cells[Self::index(x, y)] = flags;
        Ok(())
    }

    /// OR `flags` into the cell at `(x, y)`.
    pub fn add_flags(&mut self, x: i32, y: i32, flags: CellFlags) -> Result<()> {
        if !Self::in_bounds(x, y) {
            return Err(Self::bounds_error(x, y));
        }
        let idx = Self::index(x, y);
        self.cells[idx] |= flags;
        Ok(())
    }

    /// AND-NOT `flags` out of the cell at `(x, y)`.
    pub fn remove_flags(&mut self, x: i32, y: i32, flags: CellFlags) -> Result<()> {
        if !Self::in_bounds(x, y) {
            return Err(Self::bounds_error(x, y));
        }
        let idx = Self::index(x, y);
        self.cells[idx].remove(flags);
        Ok(())
    }

    /// Set every cell in the grid to `flags`.
    pub fn fill(&mut self, flags: CellFlags) {
        for cell in self.cells.iter_mut() {
            *cell = flags;
        }
    }

    /// Reset every cell in the grid to empty.
    pub fn clear(&mut self) {
        self.fill(CellFlags::empty());
    }

    /// Deep, independent copy of the grid.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Cell-wise equality check.
    pub fn equals(&self, other: &Self) -> bool {
        self.cells == other.cells
    }

    /// Apply `flags` to every cell in the inclusive rect `(x, y, w, h)`
    /// under `mode`. Cells outside the grid are silently skipped — this is
    /// deliberately asymmetric with the point-access methods so callers can
    /// clip at the edges without manual bounds math.
    pub fn apply_rect(&mut self, x: i32, y: i32, w: i32, h: i32, flags: CellFlags, mode: RectMode) {
        for dy in 0..h {
            for dx in 0..w {
                let (cx, cy) = (x + dx, y + dy);
                if !Self::in_bounds(cx, cy) {
                    continue;
                }
                let idx = Self::index(cx, cy);
                match mode {
                    RectMode::Overwrite => self.cells[idx] = flags,
                    RectMode::Add => self.cells[idx] |= flags,
                    RectMode::Remove => self.cells[idx].remove(flags),
                }
            }
        }
    }

    /// Serialise to the normative `{width, height, cells}` JSON shape,
    /// where `cells` is the base64 encoding of 1024 row-major flag bytes.
    pub fn to_json(&self) -> serde_json::Value {
        let bytes: Vec<u8> = self.cells.iter().map(|c| c.bits()).collect();
        let encoded = STANDARD.encode(bytes);
        serde_json::json!({
            "width": Self::WIDTH,
            "height": Self::HEIGHT,
            "cells": encoded,
        })
    }

    /// Deserialise from the shape produced by `to_json`.
    ///
    /// Rejects unknown top-level fields, non-32x32 declared dimensions
    /// (`SizeMismatch`), and any payload whose decoded byte count isn't
    /// exactly `width * height` (`CorruptData`).
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let parsed: GridJson = serde_json::from_value(value.clone()).map_err(|e| {
            LevelGenError::CorruptData {
                reason: format!("malformed grid payload: {}", e),
            }
        })?;

        if parsed.width != Self::WIDTH || parsed.height != Self::HEIGHT {
            return Err(LevelGenError::SizeMismatch {
                expected_width: Self::WIDTH,
                expected_height: Self::HEIGHT,
                got_width: parsed.width,
                got_height: parsed.height,
            });
        }

        let bytes = STANDARD.decode(&parsed.cells).map_err(|e| LevelGenError::CorruptData {
            reason: format!("invalid base64: {}", e),
        })?;

        if bytes.len() != Self::WIDTH * Self::HEIGHT {
            return Err(LevelGenError::CorruptData {
                reason: format!(
                    "expected {} cell bytes, got {}",
                    Self::WIDTH * Self::HEIGHT,
                    bytes.len()
                ),
            });
        }

        let cells = bytes
            .into_iter()
            .map(CellFlags::from_bits_truncate)
            .collect();

        Ok(Self { cells })
    }

    /// Find the single cell carrying `marker` (START or GOAL), if any.
    pub fn find_marker(&self, marker: CellFlags) -> Option<(i32, i32)> {
        for y in 0..Self::HEIGHT as i32 {
            for x in 0..Self::WIDTH as i32 {
                if self.cells[Self::index(x, y)].contains(marker) {
                    return Some((x, y));
                }
            }
        }
        None
    }

    /// Count cells carrying `marker`.
    pub fn count_marker(&self, marker: CellFlags) -> usize {
        self.cells.iter().filter(|c| c.contains(marker)).count()
    }
}

impl Default for SemanticGrid {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid_is_empty() {
        let grid = SemanticGrid::new();
        assert_eq!(grid.get(0, 0).unwrap(), CellFlags::empty());
        assert_eq!(grid.get(31, 31).unwrap(), CellFlags::empty());
    }

    #[test]
    fn test_out_of_bounds() {
        let grid = SemanticGrid::new();
        assert!(grid.get(32, 0).is_err());
        assert!(grid.get(-1, 0).is_err());
        assert!(grid.get(0, 32).is_err());
    }

    #[test]
    fn test_set_and_get() {
        let mut grid = SemanticGrid::new();
        grid.set(5, 5, CellFlags::SOLID).unwrap();
        assert_eq!(grid.get(5, 5).unwrap(), CellFlags::SOLID);
    }

    #[test]
    fn test_add_and_remove_flags() {
        let mut grid = SemanticGrid::new();
        grid.add_flags(3, 3, CellFlags::SOLID).unwrap();
        grid.add_flags(3, 3, CellFlags::HAZARD).unwrap();
        assert_eq!(grid.get(3, 3).unwrap(), CellFlags::SOLID | CellFlags::HAZARD);

        grid.remove_flags(3, 3, CellFlags::HAZARD).unwrap();
        assert_eq!(grid.get(3, 3).unwrap(), CellFlags::SOLID);
    }

    #[test]
    fn test_fill_and_clear() {
        let mut grid = SemanticGrid::new();
        grid.fill(CellFlags::SOLID);
        assert_eq!(grid.get(0, 0).unwrap(), CellFlags::SOLID);
        assert_eq!(grid.get(31, 31).unwrap(), CellFlags::SOLID);

        grid.clear();
        assert_eq!(grid.get(0, 0).unwrap(), CellFlags::empty());
    }

    #[test]
    fn test_copy_is_independent() {
        let mut grid = SemanticGrid::new();
        grid.set(1, 1, CellFlags::SOLID).unwrap();
        let mut copy = grid.copy();
        copy.set(1, 1, CellFlags::HAZARD).unwrap();

        assert_eq!(grid.get(1, 1).unwrap(), CellFlags::SOLID);
        assert_eq!(copy.get(1, 1).unwrap(), CellFlags::HAZARD);
    }

    #[test]
    fn test_equals() {
        let a = SemanticGrid::new();
        let mut b = SemanticGrid::new();
        assert!(a.equals(&b));
        b.set(0, 0, CellFlags::SOLID).unwrap();
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_apply_rect_clips_silently() {
        let mut grid = SemanticGrid::new();
        // (30,30) + 10x10 runs off the bottom-right edge; must not raise.
        grid.apply_rect(30, 30, 10, 10, CellFlags::GOAL, RectMode::Overwrite);
        assert_eq!(grid.get(31, 31).unwrap(), CellFlags::GOAL);
    }

    #[test]
    fn test_apply_rect_modes() {
        let mut grid = SemanticGrid::new();
        grid.apply_rect(0, 0, 4, 4, CellFlags::SOLID, RectMode::Overwrite);
        grid.apply_rect(0, 0, 2, 2, CellFlags::HAZARD, RectMode::Add);
        assert_eq!(grid.get(0, 0).unwrap(), CellFlags::SOLID | CellFlags::HAZARD);
        assert_eq!(grid.get(3, 3).unwrap(), CellFlags::SOLID);

        grid.apply_rect(0, 0, 2, 2, CellFlags::SOLID, RectMode::Remove);
        assert_eq!(grid.get(0, 0).unwrap(), CellFlags::HAZARD);
    }

    #[test]
    fn test_json_round_trip() {
        let mut grid = SemanticGrid::new();
        grid.set(0, 0, CellFlags::START).unwrap();
        grid.set(31, 31, CellFlags::GOAL).unwrap();
        grid.set(15, 15, CellFlags::SOLID | CellFlags::HAZARD).unwrap();

        let json = grid.to_json();
        let restored = SemanticGrid::from_json(&json).unwrap();
        assert!(grid.equals(&restored));
    }

    #[test]
    fn test_to_json_shape() {
        let grid = SemanticGrid::new();
        let json = grid.to_json();
        assert_eq!(json["width"], 32);
        assert_eq!(json["height"], 32);
        assert!(json["cells"].is_string());
    }

    #[test]
    fn test_from_json_rejects_size_mismatch() {
        let bad = serde_json::json!({
            "width": 16,
            "height": 16,
            "cells": STANDARD.encode(vec![0u8; 256]),
        });
        let err = SemanticGrid::from_json(&bad).unwrap_err();
        assert!(matches!(err, LevelGenError::SizeMismatch { .. }));
    }

    #[test]
    fn test_from_json_rejects_corrupt_payload() {
        let bad = serde_json::json!({
            "width": 32,
            "height": 32,
            "cells": STANDARD.encode(vec![0u8; 100]),
        });
        let err = SemanticGrid::from_json(&bad).unwrap_err();
        assert!(matches!(err, LevelGenError::CorruptData { .. }));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let bad = serde_json::json!({
            "width": 32,
            "height": 32,
            "cells": STANDARD.encode(vec![0u8; 1024]),
            "extra": true,
        });
        assert!(SemanticGrid::from_json(&bad).is_err());
    }

    #[test]
    fn test_find_marker() {
        let mut grid = SemanticGrid::new();
        grid.set(4, 4, CellFlags::START).unwrap();
        grid.set(20, 20, CellFlags::GOAL).unwrap();
        assert_eq!(grid.find_marker(CellFlags::START), Some((4, 4)));
        assert_eq!(grid.find_marker(CellFlags::GOAL), Some((20, 20)));
        assert_eq!(grid.count_marker(CellFlags::START), 1);
    }
}
