//! ReachabilityValidator - proves a grid traversable under a coarse
//! platformer movement model.
//!
//! The validator never fails: an unreachable grid is a result, not an
//! error. Callers inspect `ReachabilityReport::reachable` and `reasons`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::grid::{CellFlags, SemanticGrid};
use crate::types::Pos;

/// Integer parameters bounding the coarse platformer physics model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovementSpec {
    /// Maximum upward delta-y in a single move.
    pub max_jump_height: i32,
    /// Maximum horizontal delta in a single move.
    pub max_jump_distance: i32,
    /// Maximum downward delta-y considered a safe drop.
    pub max_safe_drop: i32,
}

impl Default for MovementSpec {
    fn default() -> Self {
        Self {
            max_jump_height: 4,
            max_jump_distance: 5,
            max_safe_drop: 6,
        }
    }
}

/// Extends `MovementSpec` with body dimensions used for clearance checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerConfig {
    pub movement: MovementSpec,
    pub player_height: i32,
    pub player_width: i32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            movement: MovementSpec::default(),
            player_height: 2,
            player_width: 1,
        }
    }
}

/// Diagnostics produced by `validate`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ReachabilityReport {
    pub reachable: bool,
    pub path_length: usize,
    pub jump_count: u32,
    pub min_landing_width: u32,
    pub reasons: Vec<String>,
}

/// Standable / clearance / valid masks derived from a grid, shared by the
/// generator and refiner's clearance checks as well as the validator's BFS.
pub struct Masks {
    width: usize,
    height: usize,
    standable: Vec<bool>,
    clearance: Vec<bool>,
    valid: Vec<bool>,
}

impl Masks {
    fn index(&self, x: i32, y: i32) -> usize {
        y as usize * self.width + x as usize
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn is_standable(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.standable[self.index(x, y)]
    }

    pub fn is_clear(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.clearance[self.index(x, y)]
    }

    pub fn is_valid(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.valid[self.index(x, y)]
    }

    /// Build standable/clearance/valid masks for `grid` under `player`.
    pub fn compute(grid: &SemanticGrid, player: &PlayerConfig) -> Self {
        let width = SemanticGrid::WIDTH;
        let height = SemanticGrid::HEIGHT;
        let mut standable = vec![false; width * height];
        let mut clearance = vec![false; width * height];
        let mut valid = vec![false; width * height];

        let get = |x: i32, y: i32| -> CellFlags {
            grid.get(x, y).unwrap_or(CellFlags::empty())
        };

        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let idx = y as usize * width + x as usize;

                // Standable: solid/oneway surface beneath, non-blocking feet tile.
                let below = get(x, y + 1);
                let here = get(x, y);
                let has_surface =
                    below.contains(CellFlags::SOLID) || below.contains(CellFlags::ONEWAY);
                let feet_blocked =
                    here.contains(CellFlags::SOLID) || here.contains(CellFlags::HAZARD);
                let row_has_surface_below = y < height as i32 - 1;
                standable[idx] = row_has_surface_below && has_surface && !feet_blocked;

                // Clearance: body cells from feet up to head are all non-solid and on-grid.
                let mut clear = true;
                for dh in 0..player.player_height {
                    let hy = y - dh;
                    if hy < 0 {
                        clear = false;
                        break;
                    }
                    if get(x, hy).contains(CellFlags::SOLID) {
                        clear = false;
                        break;
                    }
                }
                clearance[idx] = clear;

                valid[idx] = standable[idx] && clearance[idx];
            }
        }

        Self {
            width,
            height,
            standable,
            clearance,
            valid,
        }
    }
}

/// A single BFS edge, used to classify `jumpCount` and landing width.
struct Edge {
    dx: i32,
    dy: i32,
}

/// Candidate moves from `(x, y)` per the coarse platformer movement model,
/// restricted to cells the linear-trajectory corridor check clears.
fn reachable_moves(
    grid: &SemanticGrid,
    masks: &Masks,
    movement: &MovementSpec,
    player_height: i32,
    x: i32,
    y: i32,
) -> Vec<(Pos, Edge)> {
    let mut out = Vec::new();
    for dy in -movement.max_jump_height..=movement.max_safe_drop {
        for dx in -movement.max_jump_distance..=movement.max_jump_distance {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (x + dx, y + dy);
            if !masks.is_valid(nx, ny) {
                continue;
            }
            if !corridor_clear(grid, player_height, x, y, nx, ny) {
                continue;
            }
            out.push((Pos::new(nx, ny), Edge { dx, dy }));
        }
    }
    out
}

/// Linear body trajectory check: samples the straight line from `(x1,y1)`
/// to `(x2,y2)` and requires every sampled body column to be clear of
/// SOLID. Off-grid samples are treated as blocked.
pub fn corridor_clear(
    grid: &SemanticGrid,
    player_height: i32,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
) -> bool {
    let get = |x: i32, y: i32| -> CellFlags { grid.get(x, y).unwrap_or(CellFlags::SOLID) };

    let body_clear_at = |ix: i32, iy: i32| -> bool {
        for dh in 0..player_height {
            if get(ix, iy - dh).contains(CellFlags::SOLID) {
                return false;
            }
        }
        true
    };

    let dx = x2 - x1;
    if dx == 0 {
        let (lo, hi) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        for y in lo..=hi {
            if !body_clear_at(x1, y) {
                return false;
            }
        }
        return true;
    }

    let step = if dx > 0 { 1 } else { -1 };
    let mut ix = x1;
    loop {
        let t = (ix - x1) as f64 / dx as f64;
        let iy = (y1 as f64 + t * (y2 - y1) as f64).round() as i32;
        if !body_clear_at(ix, iy) {
            return false;
        }
        if ix == x2 {
            break;
        }
        ix += step;
    }
    true
}

/// Minimum contiguous run of valid cells in `node`'s row that contains it,
/// used as `minLandingWidth` — a measure of platform tightness along the
/// reconstructed path.
fn landing_width_at(masks: &Masks, node: Pos) -> u32 {
    let y = node.y;
    let mut left = node.x;
    while masks.is_valid(left - 1, y) {
        left -= 1;
    }
    let mut right = node.x;
    while masks.is_valid(right + 1, y) {
        right += 1;
    }
    (right - left + 1) as u32
}

/// Flood-fill the set of valid cells reachable from `start` under the move
/// graph, used by the refiner's seam detection to find boundary cells the
/// player can actually stand on from inside the existing level.
pub fn reachable_set(
    grid: &SemanticGrid,
    player: &PlayerConfig,
    start: Pos,
) -> HashSet<Pos> {
    let masks = Masks::compute(grid, player);
    let mut visited = HashSet::new();
    if !masks.is_valid(start.x, start.y) {
        return visited;
    }
    visited.insert(start);
    let mut queue = VecDeque::new();
    queue.push_back(start);
    while let Some(cur) = queue.pop_front() {
        for (next, _edge) in
            reachable_moves(grid, &masks, &player.movement, player.player_height, cur.x, cur.y)
        {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    visited
}

/// Run reachability validation on `grid`, proving a path exists from START
/// to GOAL under `player`'s movement model. `start_override`/`goal_override`
/// allow probing hypothetical routes without mutating the grid.
pub fn validate(
    grid: &SemanticGrid,
    player: &PlayerConfig,
    start_override: Option<Pos>,
    goal_override: Option<Pos>,
) -> ReachabilityReport {
    let start = start_override.or_else(|| {
        grid.find_marker(CellFlags::START).map(|(x, y)| Pos::new(x, y))
    });
    let goal = goal_override.or_else(|| {
        grid.find_marker(CellFlags::GOAL).map(|(x, y)| Pos::new(x, y))
    });

    let mut reasons = Vec::new();
    if start.is_none() {
        reasons.push("START marker is missing".to_string());
    }
    if goal.is_none() {
        reasons.push("GOAL marker is missing".to_string());
    }
    let (start, goal) = match (start, goal) {
        (Some(s), Some(g)) => (s, g),
        _ => {
            return ReachabilityReport {
                reachable: false,
                reasons,
                ..Default::default()
            }
        }
    };

    let masks = Masks::compute(grid, player);
    if !masks.is_valid(start.x, start.y) {
        reasons.push("START position is not a valid standing cell".to_string());
    }
    if !masks.is_valid(goal.x, goal.y) {
        reasons.push("GOAL position is not a valid standing cell".to_string());
    }
    if !reasons.is_empty() {
        return ReachabilityReport {
            reachable: false,
            reasons,
            ..Default::default()
        };
    }

    let mut visited: HashMap<Pos, (Pos, Edge)> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(start);
    visited.insert(start, (start, Edge { dx: 0, dy: 0 }));

    let mut found = false;
    while let Some(cur) = queue.pop_front() {
        if cur == goal {
            found = true;
            break;
        }
        for (next, edge) in
            reachable_moves(grid, &masks, &player.movement, player.player_height, cur.x, cur.y)
        {
            if visited.contains_key(&next) {
                continue;
            }
            visited.insert(next, (cur, edge));
            queue.push_back(next);
        }
    }

    if !found {
        let dx = (goal.x - start.x).abs();
        let dy = goal.y - start.y;
        let mut constraint_reasons = Vec::new();
        if dx > player.movement.max_jump_distance {
            constraint_reasons.push(format!(
                "horizontal gap {} exceeds maxJumpDistance {}",
                dx, player.movement.max_jump_distance
            ));
        }
        if -dy > player.movement.max_jump_height {
            constraint_reasons.push(format!(
                "height gain {} exceeds maxJumpHeight {}",
                -dy, player.movement.max_jump_height
            ));
        }
        if dy > player.movement.max_safe_drop {
            constraint_reasons.push(format!(
                "drop {} exceeds maxSafeDrop {}",
                dy, player.movement.max_safe_drop
            ));
        }
        reasons.push(format!(
            "GOAL unreachable: {} positions explored from START",
            visited.len()
        ));
        reasons.extend(constraint_reasons);
        return ReachabilityReport {
            reachable: false,
            reasons,
            ..Default::default()
        };
    }

    // Reconstruct path and compute jumpCount / minLandingWidth.
    let mut path = vec![goal];
    let mut jump_count = 0u32;
    let mut cur = goal;
    while cur != start {
        let (prev, edge) = visited[&cur];
        if edge.dy != 0 || edge.dx.abs() > 1 {
            jump_count += 1;
        }
        path.push(prev);
        cur = prev;
    }
    path.reverse();

    let min_landing_width = path
        .iter()
        .map(|&node| landing_width_at(&masks, node))
        .min()
        .unwrap_or(0);

    ReachabilityReport {
        reachable: true,
        path_length: path.len(),
        jump_count,
        min_landing_width,
        reasons: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paint_border(grid: &mut SemanticGrid) {
        grid.apply_rect(0, 0, 32, 1, CellFlags::SOLID, crate::grid::RectMode::Overwrite);
        grid.apply_rect(0, 31, 32, 1, CellFlags::SOLID, crate::grid::RectMode::Overwrite);
        grid.apply_rect(0, 0, 1, 32, CellFlags::SOLID, crate::grid::RectMode::Overwrite);
        grid.apply_rect(31, 0, 1, 32, CellFlags::SOLID, crate::grid::RectMode::Overwrite);
    }

    #[test]
    fn test_missing_start_and_goal() {
        let grid = SemanticGrid::new();
        let report = validate(&grid, &PlayerConfig::default(), None, None);
        assert!(!report.reachable);
        assert!(report.reasons.iter().any(|r| r.contains("START")));
        assert!(report.reasons.iter().any(|r| r.contains("GOAL")));
    }

    #[test]
    fn test_s1_flat_floor_hazard_gap() {
        let mut grid = SemanticGrid::new();
        paint_border(&mut grid);
        for x in 14..17 {
            grid.add_flags(x, 30, CellFlags::HAZARD).unwrap();
        }
        grid.add_flags(2, 30, CellFlags::START).unwrap();
        grid.add_flags(28, 30, CellFlags::GOAL).unwrap();

        let report = validate(&grid, &PlayerConfig::default(), None, None);
        assert!(report.reachable, "reasons: {:?}", report.reasons);
        assert!(report.jump_count >= 1);
        assert!(report.path_length >= 2);
    }

    #[test]
    fn test_s2_sealed_wall() {
        let mut grid = SemanticGrid::new();
        paint_border(&mut grid);
        for x in 14..17 {
            grid.add_flags(x, 30, CellFlags::HAZARD).unwrap();
        }
        for y in 1..31 {
            grid.add_flags(15, y, CellFlags::SOLID).unwrap();
        }
        grid.add_flags(2, 30, CellFlags::START).unwrap();
        grid.add_flags(28, 30, CellFlags::GOAL).unwrap();

        let report = validate(&grid, &PlayerConfig::default(), None, None);
        assert!(!report.reachable);
        assert!(report.reasons.iter().any(|r| r.contains("positions explored")));
    }

    #[test]
    fn test_s3_stepped_chain() {
        let mut grid = SemanticGrid::new();
        paint_border(&mut grid);
        for x in 5..10 {
            grid.add_flags(x, 27, CellFlags::SOLID).unwrap();
        }
        for x in 13..18 {
            grid.add_flags(x, 23, CellFlags::SOLID).unwrap();
        }
        for x in 21..26 {
            grid.add_flags(x, 19, CellFlags::SOLID).unwrap();
        }
        grid.add_flags(2, 30, CellFlags::START).unwrap();
        grid.add_flags(25, 18, CellFlags::GOAL).unwrap();

        let report = validate(&grid, &PlayerConfig::default(), None, None);
        assert!(report.reachable, "reasons: {:?}", report.reasons);
        assert!(report.jump_count >= 3);
    }

    #[test]
    fn test_corridor_check_blocks_through_wall() {
        let mut grid = SemanticGrid::new();
        grid.add_flags(5, 10, CellFlags::SOLID).unwrap();
        assert!(!corridor_clear(&grid, 2, 0, 10, 10, 10));
    }
}
