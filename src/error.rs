//! Error types for the IR.
//!
//! Every failure mode named by the design (shape/rank mismatches, invalid
//! transformations, unknown arena numbers, array/buffer mismatches) is a
//! distinct variant so callers can match on *what* went wrong instead of
//! parsing a message. Nothing in this crate panics on a condition a caller
//! can trigger; `assert!`/`debug_assert!` are reserved for violations of
//! invariants this crate itself is responsible for upholding.

use crate::shape::Shape;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, IrError>;

/// Failures arising from the affine transformation algebra (`compose`,
/// `invert`, `apply_to_shape`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("cannot compose transformation of output rank {outer_rank_in} with one of output rank {inner_rank_out}")]
    ComposeRankMismatch {
        outer_rank_in: usize,
        inner_rank_out: usize,
    },

    #[error("transformation is not invertible: axis {axis} is a fixed input (input_mask demands a constant)")]
    NotInvertibleFixedInput { axis: usize },

    #[error("transformation is not invertible: rank_in ({rank_in}) != rank_out ({rank_out})")]
    NotInvertibleRankMismatch { rank_in: usize, rank_out: usize },

    #[error("transformation is not invertible: output_mask is not a bijection on input axes (input axis {axis} is used {count} times)")]
    NotInvertibleNotBijective { axis: usize, count: usize },

    #[error("transformation is not invertible: scaling {scaling} on output axis {axis} is not +-1")]
    NotInvertibleBadScaling { axis: usize, scaling: i64 },

    #[error("apply_to_shape: shape has rank {shape_rank} but transformation expects input rank {expected_rank}")]
    ApplyRankMismatch {
        shape_rank: usize,
        expected_rank: usize,
    },

    #[error("apply_to_shape: input_mask on axis {axis} demands fixed value {value}, which is not a member of the shape's range at that axis")]
    FixedValueNotInShape { axis: usize, value: i64 },
}

/// Top-level IR error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("shape mismatch: observed {observed:?}, expected {expected:?}")]
    ShapeMismatch { observed: Shape, expected: Shape },

    #[error("invalid transformation: {0}")]
    InvalidTransformation(#[from] TransformError),

    #[error("no {kind} with number {number} in this program")]
    NumberNotFound { kind: &'static str, number: u32 },

    #[error("array/buffer mismatch: {reason}")]
    ArrayBufferMismatch { reason: String },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}
