//! LevelGenerator - synthesises valid SemanticGrids from a seed and
//! high-level knobs via foothold placement with bounded retry.
//!
//! Uses a dedicated deterministic stepping PRNG (`GenRng`): the generator's
//! reproducibility contract requires a specific, normative warm-up
//! sequence (two throwaway outputs) before first use, seeded from
//! `seed + attempt` on every retry.

use crate::constants::GENERATOR;
use crate::error::{LevelGenError, Result};
use crate::grid::{CellFlags, RectMode, SemanticGrid};
use crate::validator::{self, Masks, PlayerConfig, ReachabilityReport};
use serde::{Deserialize, Serialize};

/// Deterministic 32-bit stepping PRNG (mulberry32-style) used only by the
/// generator and refiner, where a normative, cross-call-reproducible
/// sequence matters more than statistical quality.
///
/// Warmed up by two throwaway outputs before first use, per the
/// generator's PRNG contract.
pub struct GenRng {
    state: u32,
}

impl GenRng {
    pub fn new(seed: u32) -> Self {
        let mut rng = Self { state: seed };
        rng.next_u32();
        rng.next_u32();
        rng
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u32() as f64) / (u32::MAX as f64 + 1.0)
    }

    /// Uniform integer in the inclusive range `[lo, hi]`.
    pub fn rand_int(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        let span = (hi - lo + 1) as f64;
        lo + (self.next_f64() * span) as i32
    }
}

/// Tunables influencing generated level shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneratorKnobs {
    pub target_foothold_count: u32,
    pub min_foothold_width: i32,
    pub max_foothold_width: i32,
    pub verticality: f32,
    pub difficulty: f32,
}

impl Default for GeneratorKnobs {
    fn default() -> Self {
        Self {
            target_foothold_count: 8,
            min_foothold_width: 3,
            max_foothold_width: 6,
            verticality: 0.5,
            difficulty: 0.3,
        }
    }
}

impl GeneratorKnobs {
    /// Reject values outside the contracted ranges.
    pub fn validate_schema(&self) -> Result<()> {
        if !(4..=16).contains(&self.target_foothold_count) {
            return Err(LevelGenError::SchemaViolation {
                field: "targetFootholdCount".to_string(),
                reason: "must be in [4, 16]".to_string(),
            });
        }
        if self.min_foothold_width < 1 || self.min_foothold_width > self.max_foothold_width {
            return Err(LevelGenError::SchemaViolation {
                field: "minFootholdWidth".to_string(),
                reason: "must be >= 1 and <= maxFootholdWidth".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.verticality) {
            return Err(LevelGenError::SchemaViolation {
                field: "verticality".to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.difficulty) {
            return Err(LevelGenError::SchemaViolation {
                field: "difficulty".to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// The externally-facing level generation request. `hazardDensity`,
/// `allowLadders`, and `styleTags` are advisory inputs for surrounding
/// systems; the core generator does not act on them (open question #2).
#[derive(Clone, Debug, PartialEq)]
pub struct LevelPlan {
    pub seed: u32,
    pub difficulty: f32,
    pub verticality: f32,
    pub hazard_density: f32,
    pub target_foothold_count: u32,
    pub allow_ladders: bool,
    pub style_tags: Vec<String>,
}

/// On-the-wire representation used by `LevelPlan::to_json`/`from_json`.
/// `deny_unknown_fields` rejects additional properties per the plan
/// ingestion contract.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LevelPlanJson {
    seed: u32,
    difficulty: f32,
    verticality: f32,
    hazard_density: f32,
    target_foothold_count: u32,
    allow_ladders: bool,
    style_tags: Vec<String>,
}

impl LevelPlan {
    /// Deserialise from the shape produced by `to_json`, rejecting unknown
    /// top-level fields and malformed value shapes (`SchemaViolation`), then
    /// enforcing the numeric ranges via `validate_schema`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let parsed: LevelPlanJson =
            serde_json::from_value(value.clone()).map_err(|e| LevelGenError::SchemaViolation {
                field: "levelPlan".to_string(),
                reason: format!("malformed plan payload: {}", e),
            })?;

        let plan = Self {
            seed: parsed.seed,
            difficulty: parsed.difficulty,
            verticality: parsed.verticality,
            hazard_density: parsed.hazard_density,
            target_foothold_count: parsed.target_foothold_count,
            allow_ladders: parsed.allow_ladders,
            style_tags: parsed.style_tags,
        };
        plan.validate_schema()?;
        Ok(plan)
    }

    /// Serialise to the normative camelCase JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "seed": self.seed,
            "difficulty": self.difficulty,
            "verticality": self.verticality,
            "hazardDensity": self.hazard_density,
            "targetFootholdCount": self.target_foothold_count,
            "allowLadders": self.allow_ladders,
            "styleTags": self.style_tags,
        })
    }

    pub fn validate_schema(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.difficulty) {
            return Err(LevelGenError::SchemaViolation {
                field: "difficulty".to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.verticality) {
            return Err(LevelGenError::SchemaViolation {
                field: "verticality".to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.hazard_density) {
            return Err(LevelGenError::SchemaViolation {
                field: "hazardDensity".to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if !(4..=16).contains(&self.target_foothold_count) {
            return Err(LevelGenError::SchemaViolation {
                field: "targetFootholdCount".to_string(),
                reason: "must be in [4, 16]".to_string(),
            });
        }
        Ok(())
    }

    /// Derive the generator's internal knobs from this plan, keeping
    /// `minFootholdWidth`/`maxFootholdWidth` at their defaults since the
    /// plan does not carry them directly.
    pub fn to_knobs(&self) -> GeneratorKnobs {
        let defaults = GeneratorKnobs::default();
        GeneratorKnobs {
            target_foothold_count: self.target_foothold_count,
            min_foothold_width: defaults.min_foothold_width,
            max_foothold_width: defaults.max_foothold_width,
            verticality: self.verticality,
            difficulty: self.difficulty,
        }
    }
}

/// A logical horizontal platform segment, used only during generation and
/// refinement. Discarded once painted into the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Foothold {
    pub x: i32,
    pub y: i32,
    pub w: i32,
}

impl Foothold {
    pub fn new(x: i32, y: i32, w: i32) -> Self {
        Self { x, y, w }
    }

    /// The SOLID row this foothold paints.
    pub fn surface_y(&self) -> i32 {
        self.y + 1
    }

    /// Rightmost column covered by this foothold.
    pub fn right(&self) -> i32 {
        self.x + self.w - 1
    }

    /// Inclusive clearance rows `[y - (playerHeight-1), y]` that must
    /// remain non-SOLID for the foothold to be standable.
    pub fn clearance_rows(&self, player_height: i32) -> (i32, i32) {
        (self.y - (player_height - 1), self.y)
    }

    /// Horizontal center column, used for START/GOAL placement.
    pub fn center_x(&self) -> i32 {
        self.x + self.w / 2
    }

    /// True if two footholds' clearance ranges would overlap in a shared
    /// column and neither's surface escapes the other's clearance band.
    fn clears(&self, other: &Foothold, player_height: i32) -> bool {
        let overlap = self.x.max(other.x) <= self.right().min(other.right());
        if !overlap {
            return true;
        }
        let (a_lo, a_hi) = self.clearance_rows(player_height);
        let (b_lo, b_hi) = other.clearance_rows(player_height);
        let self_in_other = self.surface_y() >= b_lo && self.surface_y() <= b_hi;
        let other_in_self = other.surface_y() >= a_lo && other.surface_y() <= a_hi;
        !self_in_other && !other_in_self
    }
}

/// Result of a successful `generate_level` call.
pub struct GeneratedLevel {
    pub grid: SemanticGrid,
    pub footholds: Vec<Foothold>,
    pub report: ReachabilityReport,
    pub seed_used: u32,
    pub attempts: u32,
}

fn place_footholds(
    knobs: &GeneratorKnobs,
    player: &PlayerConfig,
    rng: &mut GenRng,
) -> Option<Vec<Foothold>> {
    let w = SemanticGrid::WIDTH as i32;
    let h = SemanticGrid::HEIGHT as i32;
    let mid_y = GENERATOR.mid_y;

    let first_y_lo = (player.player_height).max(mid_y - GENERATOR.first_foothold_y_spread);
    let first_y_hi = (h - 3).min(mid_y + GENERATOR.first_foothold_y_spread);
    let first_y = rng.rand_int(first_y_lo, first_y_hi);
    let first_x = rng.rand_int(
        GENERATOR.first_foothold_x_min,
        GENERATOR.first_foothold_x_max,
    );
    let first_w_raw = rng.rand_int(knobs.min_foothold_width, knobs.max_foothold_width);
    let first_w = first_w_raw
        .min(w - 2 - first_x)
        .max(knobs.min_foothold_width);

    let mut footholds = vec![Foothold::new(first_x, first_y, first_w)];

    let n = knobs.target_foothold_count as i32;
    for i in 1..n {
        let steps_remaining = n - i;
        let prev = *footholds.last().unwrap();

        let step = derive_step_params(prev.x, GENERATOR.goal_x_min, steps_remaining, knobs, player);

        let is_last = i == n - 1;
        let mut placed = None;

        for _ in 0..GENERATOR.candidates_per_step {
            let dx = rng.rand_int(step.min_dx, player.movement.max_jump_distance);
            let dy = if step.max_down >= -step.max_up {
                rng.rand_int(-step.max_up, step.max_down)
            } else {
                0
            };
            let cand_w = rng.rand_int(knobs.min_foothold_width, step.eff_max_w);

            let new_x = prev.x + dx;
            let new_y = prev.y + dy;
            let candidate = Foothold::new(new_x, new_y, cand_w);

            if candidate.x < 1 || candidate.right() > w - 2 {
                continue;
            }
            if candidate.y < player.player_height || candidate.surface_y() > h - 2 {
                continue;
            }
            if is_last && candidate.x < GENERATOR.goal_x_min {
                continue;
            }
            if !footholds
                .iter()
                .all(|fh| candidate.clears(fh, player.player_height))
            {
                continue;
            }

            placed = Some(candidate);
            break;
        }

        let fh = placed?;
        footholds.push(fh);
    }

    Some(footholds)
}

fn div_ceil(a: i32, b: i32) -> i32 {
    if b <= 0 {
        return a;
    }
    (a + b - 1) / b
}

/// Per-step derivations shared by the generator's own placement loop and
/// the refiner's inner-foothold bridging, which follows "the same step
/// rules" per spec: `maxUp`/`maxDown` scaled by verticality, `effMaxW`
/// narrowed by difficulty, and `minDx` combining steady progress toward
/// `target_x` with a difficulty-driven minimum hop length.
pub struct StepParams {
    pub max_up: i32,
    pub max_down: i32,
    pub eff_max_w: i32,
    pub min_dx: i32,
}

pub fn derive_step_params(
    prev_x: i32,
    target_x: i32,
    steps_remaining: i32,
    knobs: &GeneratorKnobs,
    player: &PlayerConfig,
) -> StepParams {
    let max_up = (player.movement.max_jump_height as f32 * knobs.verticality).round() as i32;
    let max_down = (player.movement.max_safe_drop as f32 * knobs.verticality).round() as i32;

    let eff_max_w = (knobs.max_foothold_width as f32
        - (knobs.difficulty * (knobs.max_foothold_width - knobs.min_foothold_width) as f32).round())
    .max(knobs.min_foothold_width as f32) as i32;

    let progress_min = 1.max(
        player
            .movement
            .max_jump_distance
            .min(div_ceil(target_x - prev_x, steps_remaining)),
    );
    let difficulty_min = (player.movement.max_jump_distance as f32
        * GENERATOR.difficulty_min_dx_factor
        * knobs.difficulty)
        .round() as i32;
    let min_dx = progress_min
        .max(difficulty_min)
        .max(1)
        .clamp(1, player.movement.max_jump_distance);

    StepParams {
        max_up,
        max_down,
        eff_max_w,
        min_dx,
    }
}

/// Paint `footholds` into a fresh grid: safety floor, surfaces, clearances,
/// then START/GOAL markers on the first/last foothold centres.
fn paint_grid(footholds: &[Foothold], player: &PlayerConfig) -> SemanticGrid {
    let mut grid = SemanticGrid::new();
    let w = SemanticGrid::WIDTH as i32;
    let h = SemanticGrid::HEIGHT as i32;

    grid.apply_rect(0, h - 1, w, 1, CellFlags::SOLID, RectMode::Overwrite);

    for fh in footholds {
        for x in fh.x..=fh.right() {
            grid.add_flags(x, fh.surface_y(), CellFlags::SOLID).ok();
        }
    }

    for fh in footholds {
        let (lo, hi) = fh.clearance_rows(player.player_height);
        for x in fh.x..=fh.right() {
            for y in lo..=hi {
                let is_claimed_surface = footholds.iter().any(|other| {
                    y == other.surface_y() && x >= other.x && x <= other.right()
                });
                if !is_claimed_surface {
                    grid.remove_flags(x, y, CellFlags::SOLID).ok();
                }
            }
        }
    }

    let first = footholds.first().unwrap();
    let last = footholds.last().unwrap();
    grid.add_flags(first.center_x(), first.y, CellFlags::START).ok();
    grid.add_flags(last.center_x(), last.y, CellFlags::GOAL).ok();

    grid
}

/// Synthesise a valid level for `plan`, retrying up to
/// [`GeneratorConstants::max_generation_attempts`](crate::constants::GeneratorConstants)
/// times with a reseeded PRNG before failing with `GenerationExhausted`.
pub fn generate_level(plan: &LevelPlan, player: &PlayerConfig) -> Result<GeneratedLevel> {
    plan.validate_schema()?;
    let knobs = plan.to_knobs();
    generate_with_knobs(plan.seed, &knobs, player)
}

/// Same as [`generate_level`] but takes already-derived knobs directly,
/// used by callers (and the refiner) that bypass the `LevelPlan` envelope.
pub fn generate_with_knobs(
    seed: u32,
    knobs: &GeneratorKnobs,
    player: &PlayerConfig,
) -> Result<GeneratedLevel> {
    knobs.validate_schema()?;

    let mut last_reasons = Vec::new();
    for attempt in 0..GENERATOR.max_generation_attempts {
        let attempt_seed = seed.wrapping_add(attempt);
        let mut rng = GenRng::new(attempt_seed);

        let footholds = match place_footholds(knobs, player, &mut rng) {
            Some(fhs) => fhs,
            None => {
                last_reasons = vec!["foothold placement exhausted candidates".to_string()];
                log::debug!("generation attempt {} failed: foothold placement exhausted", attempt);
                continue;
            }
        };

        let grid = paint_grid(&footholds, player);
        let report = validator::validate(&grid, player, None, None);
        if report.reachable {
            log::info!(
                "generated level after {} attempt(s), seed {}",
                attempt + 1,
                attempt_seed
            );
            return Ok(GeneratedLevel {
                grid,
                footholds,
                report,
                seed_used: attempt_seed,
                attempts: attempt + 1,
            });
        }
        log::debug!("generation attempt {} failed validation: {:?}", attempt, report.reasons);
        last_reasons = report.reasons;
    }

    log::warn!("generation exhausted after {} attempts", GENERATOR.max_generation_attempts);
    Err(LevelGenError::GenerationExhausted {
        attempts: GENERATOR.max_generation_attempts,
        last_reasons,
    })
}

/// Clearance rule check shared with the refiner: `candidate` must not
/// violate any placed foothold's clearance band, and vice versa.
pub fn clears_all(candidate: &Foothold, placed: &[Foothold], player_height: i32) -> bool {
    placed.iter().all(|fh| candidate.clears(fh, player_height))
}

/// Expose masks computation for the refiner's seam detection, which reuses
/// the validator's standable/clearance views directly.
pub fn compute_masks(grid: &SemanticGrid, player: &PlayerConfig) -> Masks {
    Masks::compute(grid, player)
}
