//! RegionRefiner - regenerates a rectangular sub-region of an existing
//! grid while preserving everything outside it and re-establishing
//! reachability.
//!
//! Refinement never raises: callers always get back a grid (either the
//! refined one or a copy of the input) plus a `RefineReport` describing
//! what happened. Only malformed requests fail fast via `SchemaViolation`.

use crate::constants::REFINER;
use crate::error::{LevelGenError, Result};
use crate::generator::{self, derive_step_params, Foothold, GenRng, GeneratorKnobs};
use crate::grid::{CellFlags, RectMode, SemanticGrid};
use crate::types::GridRect;
use crate::validator::{self, PlayerConfig, ReachabilityReport};
use serde::{Deserialize, Serialize};

/// Inclusive rectangle naming the sub-region to regenerate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefineRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// On-the-wire representation used by `RefineRect::to_json`/`from_json`.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RefineRectJson {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl RefineRect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    fn to_grid_rect(self) -> GridRect {
        GridRect::new(self.x, self.y, self.w, self.h)
    }

    /// Deserialise from the shape produced by `to_json`, rejecting unknown
    /// fields. Range enforcement is left to `validate_schema`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let parsed: RefineRectJson =
            serde_json::from_value(value.clone()).map_err(|e| LevelGenError::SchemaViolation {
                field: "rect".to_string(),
                reason: format!("malformed rect payload: {}", e),
            })?;
        Ok(Self::new(parsed.x, parsed.y, parsed.w, parsed.h))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "x": self.x, "y": self.y, "w": self.w, "h": self.h })
    }

    pub fn validate_schema(&self) -> Result<()> {
        let w = SemanticGrid::WIDTH as i32;
        let h = SemanticGrid::HEIGHT as i32;
        if !(0..w).contains(&self.x) || !(0..h).contains(&self.y) {
            return Err(LevelGenError::SchemaViolation {
                field: "rect".to_string(),
                reason: "x/y must be within the grid".to_string(),
            });
        }
        if !(1..=w).contains(&self.w) || !(1..=h).contains(&self.h) {
            return Err(LevelGenError::SchemaViolation {
                field: "rect".to_string(),
                reason: "w/h must be at least 1 and at most the grid size".to_string(),
            });
        }
        if self.x + self.w > w || self.y + self.h > h {
            return Err(LevelGenError::SchemaViolation {
                field: "rect".to_string(),
                reason: "rect must fit entirely within the grid".to_string(),
            });
        }
        Ok(())
    }
}

/// A refinement request: a target rect plus knob deltas and optional
/// cosmetic/structural effects.
#[derive(Clone, Debug, PartialEq)]
pub struct RefineRequest {
    pub rect: RefineRect,
    pub difficulty_delta: f32,
    pub verticality_delta: f32,
    pub add_secret: bool,
    pub smooth_silhouette: bool,
    /// Declared but always a no-op: the reference refiner locks seam
    /// entry/exit by construction regardless of this flag (open question #3).
    pub keep_main_path_stable: bool,
}

/// On-the-wire representation used by `RefineRequest::to_json`/`from_json`.
/// `deny_unknown_fields` rejects additional properties per the refine
/// request ingestion contract.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RefineRequestJson {
    rect: RefineRectJson,
    difficulty_delta: f32,
    verticality_delta: f32,
    add_secret: bool,
    smooth_silhouette: bool,
    keep_main_path_stable: bool,
}

impl RefineRequest {
    /// Deserialise from the shape produced by `to_json`, rejecting unknown
    /// top-level *and* nested `rect` fields, then enforcing the numeric
    /// ranges via `validate_schema`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let parsed: RefineRequestJson =
            serde_json::from_value(value.clone()).map_err(|e| LevelGenError::SchemaViolation {
                field: "refineRequest".to_string(),
                reason: format!("malformed request payload: {}", e),
            })?;

        let request = Self {
            rect: RefineRect::new(parsed.rect.x, parsed.rect.y, parsed.rect.w, parsed.rect.h),
            difficulty_delta: parsed.difficulty_delta,
            verticality_delta: parsed.verticality_delta,
            add_secret: parsed.add_secret,
            smooth_silhouette: parsed.smooth_silhouette,
            keep_main_path_stable: parsed.keep_main_path_stable,
        };
        request.validate_schema()?;
        Ok(request)
    }

    /// Serialise to the normative camelCase JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "rect": self.rect.to_json(),
            "difficultyDelta": self.difficulty_delta,
            "verticalityDelta": self.verticality_delta,
            "addSecret": self.add_secret,
            "smoothSilhouette": self.smooth_silhouette,
            "keepMainPathStable": self.keep_main_path_stable,
        })
    }

    pub fn validate_schema(&self) -> Result<()> {
        self.rect.validate_schema()?;
        if !(-1.0..=1.0).contains(&self.difficulty_delta) {
            return Err(LevelGenError::SchemaViolation {
                field: "difficultyDelta".to_string(),
                reason: "must be in [-1, 1]".to_string(),
            });
        }
        if !(-1.0..=1.0).contains(&self.verticality_delta) {
            return Err(LevelGenError::SchemaViolation {
                field: "verticalityDelta".to_string(),
                reason: "must be in [-1, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of a refinement attempt. Never an error: `success = false`
/// covers both an unreachable base grid and exhausted retry attempts.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RefineReport {
    pub success: bool,
    pub reasons: Vec<String>,
    pub seam_entry: Option<(i32, i32)>,
    pub seam_exit: Option<(i32, i32)>,
    pub inner_foothold_count: usize,
    pub validation: ReachabilityReport,
}

/// Regenerate the interior of `rect` within `base`, re-stitching the
/// traversable seam and re-validating globally. Schema violations in
/// `request` surface immediately; all other failures are non-raising and
/// returned as a failed `RefineReport` alongside a copy of `base`.
pub fn refine_region(
    base: &SemanticGrid,
    request: &RefineRequest,
    seed: u32,
    base_knobs: &GeneratorKnobs,
    player: &PlayerConfig,
) -> Result<(SemanticGrid, RefineReport)> {
    request.validate_schema()?;
    let rect = request.rect;

    let base_report = validator::validate(base, player, None, None);
    if !base_report.reachable {
        log::warn!("refine_region called on an unreachable base grid");
        return Ok((
            base.copy(),
            RefineReport {
                success: false,
                reasons: vec!["Original grid is not reachable".to_string()],
                validation: base_report,
                ..Default::default()
            },
        ));
    }

    let Some(start_pos) = base
        .find_marker(CellFlags::START)
        .map(|(x, y)| crate::types::Pos::new(x, y))
    else {
        return Ok((
            base.copy(),
            RefineReport {
                success: false,
                reasons: vec!["Original grid is not reachable".to_string()],
                ..Default::default()
            },
        ));
    };

    let reachable = validator::reachable_set(base, player, start_pos);
    let seam = detect_seam(base, &reachable, rect.to_grid_rect());
    let Some((entry, exit)) = seam else {
        return Ok((
            base.copy(),
            RefineReport {
                success: false,
                reasons: vec!["Could not detect seam points on rect boundary".to_string()],
                ..Default::default()
            },
        ));
    };

    let inner_knobs = GeneratorKnobs {
        difficulty: (base_knobs.difficulty + request.difficulty_delta).clamp(0.0, 1.0),
        verticality: (base_knobs.verticality + request.verticality_delta).clamp(0.0, 1.0),
        ..*base_knobs
    };

    let start_in_rect = base
        .find_marker(CellFlags::START)
        .map(|(x, y)| rect.to_grid_rect().contains(x, y))
        .unwrap_or(false);
    let goal_in_rect = base
        .find_marker(CellFlags::GOAL)
        .map(|(x, y)| rect.to_grid_rect().contains(x, y))
        .unwrap_or(false);

    let mut last_reasons = Vec::new();
    for attempt in 0..REFINER.max_refine_attempts {
        let attempt_seed = seed.wrapping_add(attempt);
        let mut rng = GenRng::new(attempt_seed);

        let inner = match place_inner_footholds(entry, exit, rect.to_grid_rect(), &inner_knobs, player, &mut rng) {
            Some(fhs) => fhs,
            None => {
                last_reasons = vec!["could not bridge entry to exit within rect".to_string()];
                continue;
            }
        };

        let mut grid = base.copy();
        paint_inner(&mut grid, &inner, rect.to_grid_rect(), player.player_height);

        if start_in_rect {
            let first = inner.first().unwrap();
            if let Some((x, y)) = base.find_marker(CellFlags::START) {
                grid.remove_flags(x, y, CellFlags::START).ok();
            }
            grid.add_flags(first.center_x(), first.y, CellFlags::START).ok();
        }
        if goal_in_rect {
            let last = inner.last().unwrap();
            if let Some((x, y)) = base.find_marker(CellFlags::GOAL) {
                grid.remove_flags(x, y, CellFlags::GOAL).ok();
            }
            grid.add_flags(last.center_x(), last.y, CellFlags::GOAL).ok();
        }

        if request.add_secret {
            try_add_secret(&mut grid, &inner, rect.to_grid_rect(), player, &mut rng);
        }
        if request.smooth_silhouette {
            smooth_silhouette(&mut grid, rect.to_grid_rect());
        }

        let report = validator::validate(&grid, player, None, None);
        if report.reachable {
            log::info!("refined rect after {} attempt(s)", attempt + 1);
            return Ok((
                grid,
                RefineReport {
                    success: true,
                    reasons: Vec::new(),
                    seam_entry: Some((entry.0, entry.1)),
                    seam_exit: Some((exit.0, exit.1)),
                    inner_foothold_count: inner.len(),
                    validation: report,
                },
            ));
        }
        last_reasons = report.reasons;
    }

    log::warn!("refinement exhausted after {} attempts", REFINER.max_refine_attempts);
    Ok((
        base.copy(),
        RefineReport {
            success: false,
            reasons: vec!["All 30 refinement attempts failed".to_string()]
                .into_iter()
                .chain(last_reasons)
                .collect(),
            ..Default::default()
        },
    ))
}

type SeamPoint = (i32, i32);

/// Find reachable entry/exit cells on the rect's left/right boundary
/// columns, preferring the row closest to the rect's vertical midpoint;
/// falling back to top/bottom edge cells if a side column has none.
fn detect_seam(
    grid: &SemanticGrid,
    reachable: &std::collections::HashSet<crate::types::Pos>,
    rect: GridRect,
) -> Option<(SeamPoint, SeamPoint)> {
    let mid_y = (rect.y + rect.bottom()) / 2;
    let is_reachable_valid = |x: i32, y: i32| -> bool {
        grid.get(x, y).is_ok() && reachable.contains(&crate::types::Pos::new(x, y))
    };

    let pick_closest = |x: i32| -> Option<i32> {
        (rect.y..=rect.bottom())
            .filter(|&y| is_reachable_valid(x, y))
            .min_by_key(|&y| (y - mid_y).abs())
    };

    let entry_y = pick_closest(rect.x);
    let exit_y = pick_closest(rect.right());

    if let (Some(ey), Some(xy)) = (entry_y, exit_y) {
        return Some(((rect.x, ey), (rect.right(), xy)));
    }

    // Fallback: any reachable cell on the rect's top or bottom edge.
    let mut edge_cells: Vec<(i32, i32)> = Vec::new();
    for x in rect.x..=rect.right() {
        if is_reachable_valid(x, rect.y) {
            edge_cells.push((x, rect.y));
        }
        if is_reachable_valid(x, rect.bottom()) {
            edge_cells.push((x, rect.bottom()));
        }
    }
    if edge_cells.is_empty() {
        return None;
    }
    edge_cells.sort_by_key(|&(x, _)| x);
    let entry = *edge_cells.first().unwrap();
    let exit = *edge_cells.last().unwrap();
    Some((entry, exit))
}

/// Build the chain of footholds bridging `entry` to `exit` inside `rect`,
/// mirroring the generator's step rules but constrained to the rect and
/// anchored at both ends.
fn place_inner_footholds(
    entry: SeamPoint,
    exit: SeamPoint,
    rect: GridRect,
    knobs: &GeneratorKnobs,
    player: &PlayerConfig,
    rng: &mut GenRng,
) -> Option<Vec<Foothold>> {
    let first_w = rng
        .rand_int(knobs.min_foothold_width, knobs.max_foothold_width)
        .min(rect.right() - entry.0 + 1)
        .max(1);
    let first = Foothold::new(entry.0, entry.1, first_w);
    let mut footholds = vec![first];

    let dx_total = (exit.0 - entry.0).abs();
    let avg_hop = 1.max((player.movement.max_jump_distance + 1) / 2);
    let intermediate_count = ((dx_total / avg_hop) - 1).clamp(0, REFINER.max_intermediate_footholds);

    for step_idx in 0..intermediate_count {
        let prev = *footholds.last().unwrap();
        let steps_remaining = intermediate_count - step_idx + 1;
        let step = derive_step_params(prev.x, exit.0, steps_remaining, knobs, player);
        let mut placed = None;

        for _ in 0..REFINER.candidates_per_step {
            let dx = rng.rand_int(step.min_dx, player.movement.max_jump_distance);
            let dy = if step.max_down >= -step.max_up {
                rng.rand_int(-step.max_up, step.max_down)
            } else {
                0
            };
            let w = rng.rand_int(knobs.min_foothold_width, step.eff_max_w);

            let candidate = Foothold::new(prev.x + dx, prev.y + dy, w);
            if candidate.x < rect.x || candidate.right() > rect.right() {
                continue;
            }
            if candidate.y < rect.y + player.player_height || candidate.surface_y() > rect.bottom() - 1 {
                continue;
            }
            if !generator::clears_all(&candidate, &footholds, player.player_height) {
                continue;
            }
            placed = Some(candidate);
            break;
        }

        footholds.push(placed?);
    }

    let prev = *footholds.last().unwrap();
    let w = rng
        .rand_int(knobs.min_foothold_width, knobs.max_foothold_width)
        .min(exit.0 - rect.x + 1)
        .max(1);
    let exit_x = exit.0 - w + 1;
    let last = Foothold::new(exit_x, exit.1, w);

    let dx = (last.x - prev.x).abs();
    let dy = last.y - prev.y;
    if dx > player.movement.max_jump_distance
        || dy > player.movement.max_safe_drop
        || -dy > player.movement.max_jump_height
    {
        return None;
    }
    if !generator::clears_all(&last, &footholds, player.player_height) {
        return None;
    }

    footholds.push(last);
    Some(footholds)
}

/// Clear `rect` to empty, then paint inner footholds' surfaces and
/// clearances. All writes are confined to `rect` regardless of a
/// foothold's nominal extent, since inner footholds are already
/// constructed to lie inside it.
fn paint_inner(grid: &mut SemanticGrid, footholds: &[Foothold], rect: GridRect, player_height: i32) {
    grid.apply_rect(rect.x, rect.y, rect.w, rect.h, CellFlags::empty(), RectMode::Overwrite);

    for fh in footholds {
        for x in fh.x.max(rect.x)..=fh.right().min(rect.right()) {
            grid.add_flags(x, fh.surface_y(), CellFlags::SOLID).ok();
        }
    }
    for fh in footholds {
        let (lo, hi) = fh.clearance_rows(player_height);
        for x in fh.x.max(rect.x)..=fh.right().min(rect.right()) {
            for y in lo.max(rect.y)..=hi.min(rect.bottom()) {
                let is_claimed_surface = footholds
                    .iter()
                    .any(|other| y == other.surface_y() && x >= other.x && x <= other.right());
                if !is_claimed_surface {
                    grid.remove_flags(x, y, CellFlags::SOLID).ok();
                }
            }
        }
    }
}

/// Try up to `secret_attempts` candidate secret alcoves above a randomly
/// chosen existing foothold. Off the critical path: BFS is never asked to
/// prefer it. Gives up silently on no fit.
fn try_add_secret(
    grid: &mut SemanticGrid,
    footholds: &[Foothold],
    rect: GridRect,
    player: &PlayerConfig,
    rng: &mut GenRng,
) {
    if footholds.is_empty() {
        return;
    }
    let base_idx = rng.rand_int(0, footholds.len() as i32 - 1) as usize;
    let base = footholds[base_idx];

    for _ in 0..REFINER.secret_attempts {
        let sx = base.x + rng.rand_int(-1, 1);
        let sy = base.y - rng.rand_int(3, 5);
        let sw = rng.rand_int(2, 3);
        let candidate = Foothold::new(sx, sy, sw);

        if candidate.x < rect.x || candidate.right() > rect.right() {
            continue;
        }
        if candidate.y < rect.y || candidate.surface_y() > rect.bottom() {
            continue;
        }
        if !generator::clears_all(&candidate, footholds, player.player_height) {
            continue;
        }

        for x in candidate.x..=candidate.right() {
            grid.add_flags(x, candidate.surface_y(), CellFlags::SOLID).ok();
        }
        let (lo, hi) = candidate.clearance_rows(player.player_height);
        for x in candidate.x..=candidate.right() {
            for y in lo..=hi {
                grid.remove_flags(x, y, CellFlags::SOLID).ok();
            }
        }
        return;
    }
}

/// Cosmetic pass: clear isolated one-cell SOLID spikes along the rect's
/// top row (a spike with no SOLID neighbour on either side).
fn smooth_silhouette(grid: &mut SemanticGrid, rect: GridRect) {
    let y = rect.y;
    for x in rect.x..=rect.right() {
        let here = grid.get(x, y).unwrap_or(CellFlags::empty());
        if !here.contains(CellFlags::SOLID) {
            continue;
        }
        let left_solid = grid.get(x - 1, y).map(|f| f.contains(CellFlags::SOLID)).unwrap_or(true);
        let right_solid = grid.get(x + 1, y).map(|f| f.contains(CellFlags::SOLID)).unwrap_or(true);
        let left_in_rect = x - 1 >= rect.x;
        let right_in_rect = x + 1 <= rect.right();
        let left_clear = !left_in_rect || !left_solid;
        let right_clear = !right_in_rect || !right_solid;
        if left_clear && right_clear {
            grid.remove_flags(x, y, CellFlags::SOLID).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate_with_knobs;

    fn s4_knobs() -> GeneratorKnobs {
        GeneratorKnobs {
            target_foothold_count: 8,
            min_foothold_width: 3,
            max_foothold_width: 6,
            verticality: 0.2,
            difficulty: 0.1,
        }
    }

    #[test]
    fn test_refine_rect_schema() {
        let good = RefineRect::new(7, 4, 16, 24);
        assert!(good.validate_schema().is_ok());

        let bad = RefineRect::new(30, 30, 10, 10);
        assert!(bad.validate_schema().is_err());
    }

    fn sample_request() -> RefineRequest {
        RefineRequest {
            rect: RefineRect::new(7, 4, 16, 24),
            difficulty_delta: 0.1,
            verticality_delta: -0.2,
            add_secret: true,
            smooth_silhouette: false,
            keep_main_path_stable: true,
        }
    }

    #[test]
    fn test_refine_request_json_round_trip() {
        let request = sample_request();
        let json = request.to_json();
        let restored = RefineRequest::from_json(&json).unwrap();
        assert_eq!(request, restored);
    }

    #[test]
    fn test_refine_request_from_json_rejects_unknown_top_level_field() {
        let mut json = sample_request().to_json();
        json.as_object_mut()
            .unwrap()
            .insert("extra".to_string(), serde_json::json!(1));
        assert!(RefineRequest::from_json(&json).is_err());
    }

    #[test]
    fn test_refine_request_from_json_rejects_unknown_rect_field() {
        let mut json = sample_request().to_json();
        json["rect"]
            .as_object_mut()
            .unwrap()
            .insert("z".to_string(), serde_json::json!(0));
        assert!(RefineRequest::from_json(&json).is_err());
    }

    #[test]
    fn test_refine_request_from_json_rejects_out_of_range_delta() {
        let mut json = sample_request().to_json();
        json["difficultyDelta"] = serde_json::json!(5.0);
        let err = RefineRequest::from_json(&json).unwrap_err();
        assert!(matches!(err, LevelGenError::SchemaViolation { .. }));
    }

    #[test]
    fn test_s5_refine_basic() {
        let player = PlayerConfig::default();
        let knobs = s4_knobs();
        let base = generate_with_knobs(55, &knobs, &player).unwrap();

        let request = RefineRequest {
            rect: RefineRect::new(7, 4, 16, 24),
            difficulty_delta: 0.0,
            verticality_delta: 0.0,
            add_secret: false,
            smooth_silhouette: false,
            keep_main_path_stable: true,
        };

        let (refined, report) = refine_region(&base.grid, &request, 9001, &knobs, &player).unwrap();

        assert!(report.success, "reasons: {:?}", report.reasons);
        assert!(report.inner_foothold_count >= 2);

        let rect = request.rect.to_grid_rect();
        for y in 0..32i32 {
            for x in 0..32i32 {
                if !rect.contains(x, y) {
                    assert_eq!(
                        refined.get(x, y).unwrap(),
                        base.grid.get(x, y).unwrap(),
                        "outside-rect cell ({}, {}) changed",
                        x,
                        y
                    );
                }
            }
        }

        let final_report = validator::validate(&refined, &player, None, None);
        assert!(final_report.reachable);
    }

    #[test]
    fn test_unreachable_base_returns_failure_report() {
        let grid = SemanticGrid::new();
        let player = PlayerConfig::default();
        let knobs = GeneratorKnobs::default();
        let request = RefineRequest {
            rect: RefineRect::new(7, 4, 16, 24),
            difficulty_delta: 0.0,
            verticality_delta: 0.0,
            add_secret: false,
            smooth_silhouette: false,
            keep_main_path_stable: false,
        };

        let (copy, report) = refine_region(&grid, &request, 1, &knobs, &player).unwrap();
        assert!(!report.success);
        assert!(copy.equals(&grid));
    }

    #[test]
    fn test_invalid_request_rejected() {
        let grid = SemanticGrid::new();
        let player = PlayerConfig::default();
        let knobs = GeneratorKnobs::default();
        let request = RefineRequest {
            rect: RefineRect::new(7, 4, 16, 24),
            difficulty_delta: 2.0,
            verticality_delta: 0.0,
            add_secret: false,
            smooth_silhouette: false,
            keep_main_path_stable: false,
        };
        assert!(refine_region(&grid, &request, 1, &knobs, &player).is_err());
    }
}
