//! Element-type contract.
//!
//! `Ntype` is supplied by the type system that sits upstream of this IR:
//! it only needs to answer "how many bits"
//! and "which of the host type system's distinct numeric types is this" —
//! everything else (numeric promotion rules, literal parsing, ...) lives in
//! that upstream type system, not here.

use std::fmt;

/// An opaque element-type descriptor.
pub trait Ntype: Copy + Eq + fmt::Debug {
    /// A stable small index distinguishing this type from others in the
    /// host type system — used by [`crate::analysis::map_program_buffer_groups`]
    /// to sort buffers deterministically without needing `Ord` on `Self`.
    fn index(&self) -> u32;

    /// Width in bits of one element of this type.
    fn bits(&self) -> u32;
}

/// `ntype_eq` from the frontend contract. `Ntype: Eq` already gives us
/// this, but the free function documents the upstream contract's name
/// for it explicitly.
pub fn ntype_eq<N: Ntype>(a: &N, b: &N) -> bool {
    a == b
}

/// `upgraded_array_element_ntype` from the frontend contract: given two
/// element types appearing together (e.g. on either side of a binary op
/// staged upstream), returns the type values of both types upgrade to. The
/// default here just widens to the larger bit width, breaking ties by
/// index; a host type system with richer promotion rules (signed/unsigned,
/// float/int) should not rely on this default and should instead consult
/// its own promotion table before lowering into this IR.
pub fn upgraded_array_element_ntype<N: Ntype>(a: N, b: N) -> N {
    if a.bits() >= b.bits() {
        a
    } else {
        b
    }
}

/// A minimal concrete `Ntype` covering the common scalar element types,
/// provided so this crate is directly usable without a full external type
/// system wired up (tests, examples, and small standalone tools).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarNtype {
    I32,
    I64,
    F32,
    F64,
}

impl Ntype for ScalarNtype {
    fn index(&self) -> u32 {
        match self {
            ScalarNtype::I32 => 0,
            ScalarNtype::I64 => 1,
            ScalarNtype::F32 => 2,
            ScalarNtype::F64 => 3,
        }
    }

    fn bits(&self) -> u32 {
        match self {
            ScalarNtype::I32 => 32,
            ScalarNtype::I64 => 64,
            ScalarNtype::F32 => 32,
            ScalarNtype::F64 => 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_picks_wider_type() {
        assert_eq!(upgraded_array_element_ntype(ScalarNtype::I32, ScalarNtype::F64), ScalarNtype::F64);
    }

    #[test]
    fn ntype_eq_matches_partial_eq() {
        assert!(ntype_eq(&ScalarNtype::I32, &ScalarNtype::I32));
        assert!(!ntype_eq(&ScalarNtype::I32, &ScalarNtype::I64));
    }
}
