//! Error types for levelgen-core operations.
//!
//! Provides structured error types for grid access, serialisation,
//! schema validation, and generation. These replace ad-hoc
//! `Result<T, String>` returns. Refinement never raises: a failed
//! refinement is reported as data (`RefineReport { success: false, .. }`),
//! not as one of these variants.

use std::fmt;

/// Core error type for levelgen-core operations
#[derive(Debug, Clone, PartialEq)]
pub enum LevelGenError {
    /// Point access outside the grid's `[0, width) x [0, height)` bounds.
    OutOfBounds {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },

    /// A serialised grid declared dimensions other than the fixed grid size.
    SizeMismatch {
        expected_width: usize,
        expected_height: usize,
        got_width: usize,
        got_height: usize,
    },

    /// A serialised grid's cell payload was not decodable or the wrong length.
    CorruptData {
        reason: String,
    },

    /// A `LevelPlan` or `RefineRequest` failed range or required-field checks.
    SchemaViolation {
        field: String,
        reason: String,
    },

    /// All generation attempts failed; carries the last attempt's diagnostics.
    GenerationExhausted {
        attempts: u32,
        last_reasons: Vec<String>,
    },
}

impl fmt::Display for LevelGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { x, y, width, height } => {
                write!(
                    f,
                    "position ({}, {}) is out of bounds for a {}x{} grid",
                    x, y, width, height
                )
            }
            Self::SizeMismatch {
                expected_width,
                expected_height,
                got_width,
                got_height,
            } => {
                write!(
                    f,
                    "grid size mismatch: expected {}x{}, got {}x{}",
                    expected_width, expected_height, got_width, got_height
                )
            }
            Self::CorruptData { reason } => write!(f, "corrupt grid payload: {}", reason),
            Self::SchemaViolation { field, reason } => {
                write!(f, "schema violation in '{}': {}", field, reason)
            }
            Self::GenerationExhausted { attempts, last_reasons } => {
                write!(
                    f,
                    "generation exhausted after {} attempts: {}",
                    attempts,
                    last_reasons.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for LevelGenError {}

/// For backwards compatibility with callers that thread `Result<T, String>`.
impl From<LevelGenError> for String {
    fn from(e: LevelGenError) -> Self {
        e.to_string()
    }
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, LevelGenError>;
