//! Stencils: clusters of loads on one buffer that share an access pattern
//! and whose offsets lie within a bounded radius of each other.
//!
//! See [`crate::kernel::Kernel::insert_load`] for the clustering algorithm
//! that builds and maintains these; this module only holds the
//! [`Stencil`] value and the small pieces of arithmetic (center, radius
//! predicate) that algorithm needs.

use crate::ids::InstructionId;

/// The default radius: a load may join a stencil only if its
/// offset lies within `STENCIL_MAX_RADIUS` buffer-steps of the stencil's
/// (recomputed) center, on every axis.
pub const STENCIL_MAX_RADIUS: i64 = 7;

/// A cluster of loads on the same buffer, sharing `output_mask` and
/// `scalings` on their transformation, whose offsets are all within
/// [`STENCIL_MAX_RADIUS`] buffer-steps of `center`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stencil {
    /// Componentwise floored integer mean of the member loads' offsets.
    center: Vec<i64>,
    /// Non-empty; every element also appears in the owning kernel's
    /// `instruction_vector`.
    load_instructions: Vec<InstructionId>,
}

impl Stencil {
    /// Builds a brand-new, single-member stencil.
    pub(crate) fn singleton(load: InstructionId, offsets: &[i64]) -> Self {
        Self { center: offsets.to_vec(), load_instructions: vec![load] }
    }

    pub fn center(&self) -> &[i64] {
        &self.center
    }

    pub fn load_instructions(&self) -> &[InstructionId] {
        &self.load_instructions
    }

    pub(crate) fn push(&mut self, load: InstructionId, new_center: Vec<i64>) {
        self.load_instructions.push(load);
        self.center = new_center;
    }

    pub(crate) fn set_center(&mut self, center: Vec<i64>) {
        self.center = center;
    }
}

/// Floored componentwise mean of a set of offset vectors. All vectors must
/// have the same length; asserts otherwise (an internal-consistency
/// invariant, not a caller-triggerable error — every offset vector here
/// comes from transformations already checked to share `output_mask`).
pub(crate) fn floored_mean(offsets: &[&[i64]]) -> Vec<i64> {
    assert!(!offsets.is_empty());
    let rank = offsets[0].len();
    for o in offsets {
        assert_eq!(o.len(), rank);
    }
    let n = offsets.len() as i64;
    (0..rank)
        .map(|axis| {
            let sum: i64 = offsets.iter().map(|o| o[axis]).sum();
            sum.div_euclid(n)
        })
        .collect()
}

/// `true` iff every offset in `offsets` lies within `radius * step(axis)`
/// of `center` on every axis, where `step(axis)` is given by `steps`.
pub(crate) fn within_radius(center: &[i64], offsets: &[&[i64]], steps: &[i64], radius: i64) -> bool {
    offsets.iter().all(|offset| {
        offset.iter().zip(center).zip(steps).all(|((&o, &c), &step)| (o - c).abs() <= radius * step)
    })
}
