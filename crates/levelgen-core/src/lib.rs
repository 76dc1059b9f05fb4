//! levelgen-core - procedural level generation, reachability validation,
//! and region refinement for tile-based platformer levels.
//!
//! This crate contains platform-independent logic for:
//! - The bit-packed semantic grid (the authoritative level representation)
//! - Reachability validation under a coarse platformer movement model
//! - Procedural level generation via foothold placement with retry
//! - Region refinement: regenerating part of a grid in place
//! - Semantic-to-tile-ID mapping with 4-neighbor autotiling
pub mod constants;
pub mod error;
pub mod generator;
pub mod grid;
pub mod refine;
pub mod tilemap;
pub mod types;
pub mod validator;

pub use error::{LevelGenError, Result};
pub use grid::{CellFlags, RectMode, SemanticGrid};
pub use types::{GridRect, Pos};

pub use generator::{
    generate_level, generate_with_knobs, Foothold, GenRng, GeneratedLevel, GeneratorKnobs,
    LevelPlan,
};
pub use refine::{refine_region, RefineRect, RefineReport, RefineRequest};
pub use tilemap::{to_tilemap, TileIds};
pub use validator::{validate, Masks, MovementSpec, PlayerConfig, ReachabilityReport};
