//! Affine index transformations.
//!
//! A [`Transformation`] maps an input space of rank `rank_in` to an output
//! space of rank `rank_out`. Each output axis `k` is either a constant
//! (`output_mask[k] == None`) or an affine function of one input axis:
//! `output[k] = offsets[k] + scalings[k] * input[output_mask[k]]`. Input
//! axes may themselves be pinned to a required constant via `input_mask`,
//! used when a load/store/iref transformation only reads a slice of its
//! nominal iteration space.
//!
//! These are used both as the per-instruction access pattern (iteration
//! index -> buffer index) and as the rewrite applied by
//! [`crate::rewrite::transform_kernel`] / [`crate::rewrite::transform_buffer`].

use crate::error::TransformError;
use crate::shape::{Range, Shape};

/// An affine map `input space (rank_in)` -> `output space (rank_out)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transformation {
    rank_in: usize,
    rank_out: usize,
    /// Per input axis: `Some(v)` if that axis is required to equal the
    /// fixed value `v`, `None` if it is free.
    input_mask: Vec<Option<i64>>,
    /// Per output axis: the input axis it is derived from, or `None` if
    /// the output axis is an unconditional constant.
    output_mask: Vec<Option<usize>>,
    scalings: Vec<i64>,
    offsets: Vec<i64>,
}

impl Transformation {
    /// Builds a transformation from its raw fields. Panics on
    /// internally-inconsistent lengths (programmer error, not a runtime
    /// condition callers can trigger from data) — assertions guard internal
    /// invariants here, not caller-triggerable failure modes.
    pub fn new(
        rank_in: usize,
        rank_out: usize,
        input_mask: Vec<Option<i64>>,
        output_mask: Vec<Option<usize>>,
        scalings: Vec<i64>,
        offsets: Vec<i64>,
    ) -> Self {
        assert_eq!(input_mask.len(), rank_in);
        assert_eq!(output_mask.len(), rank_out);
        assert_eq!(scalings.len(), rank_out);
        assert_eq!(offsets.len(), rank_out);
        for &m in &output_mask {
            if let Some(axis) = m {
                assert!(axis < rank_in, "output_mask references out-of-range input axis {axis}");
            }
        }
        Self { rank_in, rank_out, input_mask, output_mask, scalings, offsets }
    }

    /// The identity map of the given rank: every output axis `k` equals
    /// input axis `k`, with unit scaling and zero offset.
    pub fn identity(rank: usize) -> Self {
        Self {
            rank_in: rank,
            rank_out: rank,
            input_mask: vec![None; rank],
            output_mask: (0..rank).map(Some).collect(),
            scalings: vec![1; rank],
            offsets: vec![0; rank],
        }
    }

    pub fn rank_in(&self) -> usize {
        self.rank_in
    }

    pub fn rank_out(&self) -> usize {
        self.rank_out
    }

    pub fn input_mask(&self) -> &[Option<i64>] {
        &self.input_mask
    }

    pub fn output_mask(&self) -> &[Option<usize>] {
        &self.output_mask
    }

    pub fn scalings(&self) -> &[i64] {
        &self.scalings
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    /// `true` iff this is exactly the identity map.
    pub fn is_identity(&self) -> bool {
        self.rank_in == self.rank_out
            && self.input_mask.iter().all(Option::is_none)
            && self.output_mask.iter().enumerate().all(|(k, m)| *m == Some(k))
            && self.scalings.iter().all(|&s| s == 1)
            && self.offsets.iter().all(|&o| o == 0)
    }

    /// Evaluates this transformation at a concrete input point. Panics if
    /// `input.len() != rank_in` or a fixed input axis disagrees with
    /// `input` — this is for testing and diagnostics, not hot-path code.
    pub fn apply_to_point(&self, input: &[i64]) -> Vec<i64> {
        assert_eq!(input.len(), self.rank_in);
        for (axis, fixed) in self.input_mask.iter().enumerate() {
            if let Some(v) = fixed {
                assert_eq!(input[axis], *v, "input axis {axis} violates fixed value");
            }
        }
        (0..self.rank_out)
            .map(|k| match self.output_mask[k] {
                None => self.offsets[k],
                Some(j) => self.offsets[k] + self.scalings[k] * input[j],
            })
            .collect()
    }

    /// Composes `outer ∘ inner`: applying the result to a point `x` yields
    /// `outer.apply_to_point(inner.apply_to_point(x))`. Requires
    /// `outer.rank_in == inner.rank_out`.
    pub fn compose(outer: &Transformation, inner: &Transformation) -> Result<Transformation, TransformError> {
        if outer.rank_in != inner.rank_out {
            return Err(TransformError::ComposeRankMismatch {
                outer_rank_in: outer.rank_in,
                inner_rank_out: inner.rank_out,
            });
        }

        let rank_in = inner.rank_in;
        let rank_out = outer.rank_out;
        let mut output_mask = Vec::with_capacity(rank_out);
        let mut scalings = Vec::with_capacity(rank_out);
        let mut offsets = Vec::with_capacity(rank_out);

        for k in 0..rank_out {
            match outer.output_mask[k] {
                None => {
                    output_mask.push(None);
                    scalings.push(0);
                    offsets.push(outer.offsets[k]);
                }
                Some(j) => {
                    // outer_out[k] = outer.offsets[k] + outer.scalings[k] * inner_out[j]
                    // inner_out[j] = inner.offsets[j] + inner.scalings[j] * input[inner.output_mask[j]]
                    let inner_mask_j = inner.output_mask[j];
                    let combined_scaling = outer.scalings[k] * inner.scalings[j];
                    let combined_offset = outer.offsets[k] + outer.scalings[k] * inner.offsets[j];
                    output_mask.push(inner_mask_j);
                    scalings.push(combined_scaling);
                    offsets.push(combined_offset);
                }
            }
        }

        // `outer.input_mask` pins axes of outer's input space, which is
        // `inner`'s *output* space (that's exactly what `outer.rank_in ==
        // inner.rank_out` means) — not `inner`'s input space directly. A
        // pin on outer input axis `m` only becomes a pin on the composed
        // transformation's own input space (`inner`'s input space) when
        // `inner_out[m]` is itself driven by one free input axis `j`;
        // solving `inner.offsets[m] + inner.scalings[m] * input[j] ==
        // outer.input_mask[m]` for `input[j]` carries the constraint back.
        // When `inner.output_mask[m]` is `None`, that axis is already a
        // constant on the inner side, so there is no input axis left to
        // pin and the constraint is dropped (it was already load-bearing
        // only as a consistency check, not a degree of freedom).
        let mut input_mask = inner.input_mask.clone();
        for (m, fixed) in outer.input_mask.iter().enumerate() {
            let Some(required) = fixed else { continue };
            let Some(j) = inner.output_mask[m] else { continue };
            let scaling = inner.scalings[m];
            let diff = required - inner.offsets[m];
            if scaling != 0 && diff % scaling == 0 {
                input_mask[j] = Some(diff / scaling);
            }
        }

        Ok(Transformation {
            rank_in,
            rank_out,
            input_mask,
            output_mask,
            scalings,
            offsets,
        })
    }

    /// Inverts this transformation, if it is a bijection on its
    /// unconstrained axes: `rank_in == rank_out`, no input axis is fixed,
    /// `output_mask` is a permutation of `0..rank_in`, and every scaling is
    /// `+-1` (so the inverse scaling is itself an integer).
    pub fn invert(&self) -> Result<Transformation, TransformError> {
        if self.rank_in != self.rank_out {
            return Err(TransformError::NotInvertibleRankMismatch {
                rank_in: self.rank_in,
                rank_out: self.rank_out,
            });
        }
        for (axis, fixed) in self.input_mask.iter().enumerate() {
            if fixed.is_some() {
                return Err(TransformError::NotInvertibleFixedInput { axis });
            }
        }

        let n = self.rank_in;
        let mut inv_output_mask: Vec<Option<usize>> = vec![None; n];
        let mut inv_scalings = vec![0i64; n];
        let mut inv_offsets = vec![0i64; n];
        let mut uses = vec![0usize; n];

        for k in 0..n {
            let j = match self.output_mask[k] {
                Some(j) => j,
                None => {
                    return Err(TransformError::NotInvertibleNotBijective { axis: k, count: 0 });
                }
            };
            uses[j] += 1;
            let scaling = self.scalings[k];
            if scaling != 1 && scaling != -1 {
                return Err(TransformError::NotInvertibleBadScaling { axis: k, scaling });
            }
            inv_output_mask[j] = Some(k);
            inv_scalings[j] = scaling; // self-inverse for +-1
            inv_offsets[j] = -self.offsets[k] * scaling;
        }

        if let Some((axis, &count)) = uses.iter().enumerate().find(|&(_, &c)| c != 1) {
            return Err(TransformError::NotInvertibleNotBijective { axis, count });
        }

        Ok(Transformation {
            rank_in: n,
            rank_out: n,
            input_mask: vec![None; n],
            output_mask: inv_output_mask,
            scalings: inv_scalings,
            offsets: inv_offsets,
        })
    }
}

/// Rebuilds a shape by pushing it through a transformation: the result has
/// rank `t.rank_out()`, and axis `k` is the image of `shape`'s axis
/// `t.output_mask()[k]` under that axis's scaling/offset (or a size-one
/// constant axis if `output_mask()[k]` is `None`).
pub fn apply_to_shape(t: &Transformation, shape: &Shape) -> Result<Shape, TransformError> {
    if shape.rank() != t.rank_in() {
        return Err(TransformError::ApplyRankMismatch {
            shape_rank: shape.rank(),
            expected_rank: t.rank_in(),
        });
    }

    for (axis, fixed) in t.input_mask().iter().enumerate() {
        if let Some(value) = fixed {
            if !shape.range(axis).contains(*value) {
                return Err(TransformError::FixedValueNotInShape { axis, value: *value });
            }
        }
    }

    let mut ranges = Vec::with_capacity(t.rank_out());
    for k in 0..t.rank_out() {
        let range = match t.output_mask()[k] {
            None => Range::singleton(t.offsets()[k]),
            Some(j) => {
                let src = shape.range(j);
                let scaling = t.scalings()[k];
                let offset = t.offsets()[k];
                let raw_start = offset + scaling * src.start();
                let raw_step = scaling * src.step();
                match raw_step.cmp(&0) {
                    std::cmp::Ordering::Greater => Range::new(raw_start, raw_step, src.size()),
                    std::cmp::Ordering::Less => {
                        let span = raw_step * (src.size() as i64 - 1).max(0);
                        Range::new(raw_start + span, -raw_step, src.size())
                    }
                    std::cmp::Ordering::Equal => Range::new(raw_start, 1, src.size()),
                }
            }
        };
        ranges.push(range);
    }
    Ok(Shape::new(ranges))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_identity() {
        assert!(Transformation::identity(3).is_identity());
    }

    #[test]
    fn compose_identity_is_noop() {
        let t = Transformation::new(
            2,
            2,
            vec![None, None],
            vec![Some(1), Some(0)],
            vec![1, 1],
            vec![0, 0],
        );
        let id = Transformation::identity(2);
        let composed = Transformation::compose(&id, &t).unwrap();
        assert_eq!(composed, t);
        let composed2 = Transformation::compose(&t, &id).unwrap();
        assert_eq!(composed2, t);
    }

    #[test]
    fn compose_rank_mismatch_errors() {
        let a = Transformation::identity(2);
        let b = Transformation::identity(3);
        assert!(Transformation::compose(&a, &b).is_err());
    }

    #[test]
    fn invert_roundtrips_axis_swap() {
        let swap = Transformation::new(
            2,
            2,
            vec![None, None],
            vec![Some(1), Some(0)],
            vec![1, 1],
            vec![0, 0],
        );
        let inv = swap.invert().unwrap();
        let point = [3, 7];
        let forward = swap.apply_to_point(&point);
        let back = inv.apply_to_point(&forward);
        assert_eq!(back, point);
    }

    #[test]
    fn invert_rejects_non_bijective() {
        let collapse = Transformation::new(2, 2, vec![None, None], vec![Some(0), Some(0)], vec![1, 1], vec![0, 0]);
        assert!(collapse.invert().is_err());
    }

    #[test]
    fn invert_rejects_bad_scaling() {
        let scale_by_two =
            Transformation::new(1, 1, vec![None], vec![Some(0)], vec![2], vec![0]);
        assert!(scale_by_two.invert().is_err());
    }

    #[test]
    fn apply_to_shape_swaps_ranges() {
        let shape = Shape::new(vec![Range::new(0, 1, 3), Range::new(0, 2, 5)]);
        let swap = Transformation::new(
            2,
            2,
            vec![None, None],
            vec![Some(1), Some(0)],
            vec![1, 1],
            vec![0, 0],
        );
        let new_shape = apply_to_shape(&swap, &shape).unwrap();
        assert_eq!(new_shape.range(0), Range::new(0, 2, 5));
        assert_eq!(new_shape.range(1), Range::new(0, 1, 3));
    }

    #[test]
    fn apply_to_shape_negative_scaling_renormalizes_start() {
        let shape = Shape::new(vec![Range::new(0, 1, 4)]); // 0,1,2,3
        let flip = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![-1], vec![0]);
        let new_shape = apply_to_shape(&flip, &shape).unwrap();
        // image is {0,-1,-2,-3} -> normalized range start=-3 step=1 size=4
        assert_eq!(new_shape.range(0), Range::new(-3, 1, 4));
    }

    #[test]
    fn apply_to_shape_rejects_fixed_value_outside_shape() {
        let shape = Shape::new(vec![Range::new(0, 1, 4)]);
        let t = Transformation::new(1, 1, vec![Some(9)], vec![Some(0)], vec![1], vec![0]);
        assert!(apply_to_shape(&t, &shape).is_err());
    }

    #[test]
    fn compose_carries_outer_input_mask_back_through_inner() {
        // outer reads the old iteration space with axis 0 pinned to 5.
        let outer = Transformation::new(2, 2, vec![Some(5), None], vec![Some(0), Some(1)], vec![1, 1], vec![0, 0]);
        // inner swaps axes: new axis 1 feeds old axis 0, new axis 0 feeds old axis 1.
        let inner = Transformation::new(
            2,
            2,
            vec![None, None],
            vec![Some(1), Some(0)],
            vec![1, 1],
            vec![0, 0],
        );
        let composed = Transformation::compose(&outer, &inner).unwrap();
        // the pin on old axis 0 now lands on new axis 1, the axis that drives it.
        assert_eq!(composed.input_mask(), &[None, Some(5)]);
    }

    #[test]
    fn compose_with_unpinned_input_mask_is_unaffected() {
        let outer = Transformation::new(2, 2, vec![None, None], vec![Some(0), Some(1)], vec![1, 1], vec![0, 0]);
        let inner = Transformation::new(2, 2, vec![None, None], vec![Some(1), Some(0)], vec![1, 1], vec![0, 0]);
        let composed = Transformation::compose(&outer, &inner).unwrap();
        assert_eq!(composed.input_mask(), &[None, None]);
    }
}
