//! Integration tests for LevelGenerator

use levelgen_core::{generate_with_knobs, validate, GeneratorKnobs, LevelGenError, PlayerConfig};

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
fn test_s4_generator_invariants() {
    let player = PlayerConfig::default();
    let knobs = s4_knobs();
    let result = generate_with_knobs(2024, &knobs, &player).expect("should generate");

    assert_eq!(result.footholds.len(), knobs.target_foothold_count as usize);
    let first = result.footholds.first().unwrap();
    let last = result.footholds.last().unwrap();
    assert!((2..=5).contains(&first.x));
    assert!(last.x >= 26);
    for fh in &result.footholds {
        assert!(fh.x >= 0 && fh.right() <= 30);
        assert!(fh.y >= 2 && fh.y <= 29);
    }

    let report = validate(&result.grid, &player, None, None);
    assert!(report.reachable);
    assert_eq!(result.grid.count_marker(levelgen_core::CellFlags::START), 1);
    assert_eq!(result.grid.count_marker(levelgen_core::CellFlags::GOAL), 1);
}

#[test]
fn test_generation_is_deterministic_per_seed() {
    let player = PlayerConfig::default();
    let knobs = s4_knobs();

    let a = generate_with_knobs(777, &knobs, &player).unwrap();
    let b = generate_with_knobs(777, &knobs, &player).unwrap();
    assert!(a.grid.equals(&b.grid));
    assert_eq!(a.seed_used, b.seed_used);
    assert_eq!(a.attempts, b.attempts);
}

#[test]
fn test_different_seeds_usually_differ() {
    let player = PlayerConfig::default();
    let knobs = s4_knobs();

    let a = generate_with_knobs(1, &knobs, &player).unwrap();
    let b = generate_with_knobs(2, &knobs, &player).unwrap();
    assert!(!a.grid.equals(&b.grid));
}

#[test]
fn test_schema_violation_on_bad_knobs() {
    let mut knobs = s4_knobs();
    knobs.target_foothold_count = 1;
    let player = PlayerConfig::default();
    let err = generate_with_knobs(1, &knobs, &player).unwrap_err();
    assert!(matches!(err, LevelGenError::SchemaViolation { .. }));
}

#[test]
fn test_no_hazards_painted_without_request() {
    let player = PlayerConfig::default();
    let knobs = s4_knobs();
    let result = generate_with_knobs(42, &knobs, &player).unwrap();
    assert_eq!(result.grid.count_marker(levelgen_core::CellFlags::HAZARD), 0);
}
