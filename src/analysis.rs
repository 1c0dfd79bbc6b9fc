//! Reuse-potential analysis and buffer grouping.
//!
//! Both reuse-potential functions share one shape: partition a stencil's
//! member loads by "agree everywhere except axis `o`", and count how many
//! pairs within each class would share a cache line if `o` were the
//! innermost loop axis. [`kernel_reuse_potential`] counts raw pairs per
//! kernel axis; [`buffer_reuse_potential`] weights them by trip count and
//! reports per buffer axis instead.

use crate::buffer::Buffer;
use crate::ids::BufferId;
use crate::kernel::Kernel;
use crate::ntype::Ntype;
use crate::program::Program;
use crate::transform::Transformation;
use std::collections::HashMap;

/// For each stencil in `kernel`, for each output axis `o` with a
/// corresponding input (iteration) axis `a`, counts reuse pairs among the
/// stencil's loads and adds them to `result[a]`. Returns a vector of rank
/// `kernel.iteration_space().rank()`.
pub fn kernel_reuse_potential(kernel: &Kernel) -> Vec<i64> {
    let mut result = vec![0i64; kernel.iteration_space().rank()];
    for stencil in kernel.stencils_all() {
        accumulate_reuse_pairs(kernel, stencil.load_instructions(), |_o, axis, pairs| result[axis] += pairs);
    }
    result
}

/// For each kernel writing `buffer`, for each of that kernel's stencils
/// reading `buffer` — ordinarily empty unless a
/// kernel both writes and reads the same buffer — counts reuse pairs
/// weighted by the trip count of the contributing iteration axis. Returns
/// a vector of rank `buffer.shape().rank()`.
pub fn buffer_reuse_potential<N: Ntype, L>(program: &Program<N, L>, buffer: BufferId) -> Vec<i64> {
    let mut result = vec![0i64; program.buffer(buffer).shape().rank()];
    for (kernel_id, _) in program.buffer(buffer).writers() {
        let kernel = program.kernel(*kernel_id);
        let iteration_space = kernel.iteration_space();
        for stencil in kernel.stencils(buffer) {
            accumulate_reuse_pairs(kernel, stencil.load_instructions(), |o, axis, pairs| {
                result[o] += pairs * iteration_space.range(axis).size() as i64;
            });
        }
    }
    result
}

/// Shared partition-and-count step: for every output axis `o` of the
/// stencil members' shared transformation with a corresponding input
/// (kernel iteration) axis `a = output_mask[o]`, groups `loads`' offset
/// vectors by "equal at every position except `o`" and reports `(n - 1)`
/// per class through `record(o, a, pairs)`. `kernel_reuse_potential` keys
/// its result by `a`; `buffer_reuse_potential` keys by `o` but still needs
/// `a` to look up the iteration axis's trip count.
fn accumulate_reuse_pairs(kernel: &Kernel, loads: &[crate::ids::InstructionId], mut record: impl FnMut(usize, usize, i64)) {
    if loads.is_empty() {
        return;
    }
    let representative = kernel.instruction(loads[0]).transformation().expect("stencil member must be a load");
    let rank_out = representative.rank_out();

    let offsets: Vec<&[i64]> = loads
        .iter()
        .map(|&id| kernel.instruction(id).transformation().expect("stencil member must be a load").offsets())
        .collect();

    for o in 0..rank_out {
        let Some(axis) = representative.output_mask()[o] else {
            continue;
        };
        let mut classes: HashMap<Vec<i64>, i64> = HashMap::new();
        for offset in &offsets {
            let key: Vec<i64> = offset.iter().enumerate().filter(|(i, _)| *i != o).map(|(_, &v)| v).collect();
            *classes.entry(key).or_insert(0) += 1;
        }
        let pairs: i64 = classes.values().map(|&n| n - 1).sum();
        record(o, axis, pairs);
    }
}

/// Builds the reuse-optimizing transformation for a reuse-potential vector
/// `r`: `output_mask` is `[0..r.len())` stably sorted by ascending `r`,
/// every scaling is `1`, every offset `0`, no input axis fixed. Feeding this
/// into [`crate::rewrite::transform_kernel`] / [`crate::rewrite::transform_buffer`]
/// moves high-reuse axes innermost.
pub fn reuse_optimizing_transformation(r: &[i64]) -> Transformation {
    let n = r.len();
    let mut axes: Vec<usize> = (0..n).collect();
    axes.sort_by_key(|&a| r[a]);
    Transformation::new(
        n,
        n,
        vec![None; n],
        axes.into_iter().map(Some).collect(),
        vec![1; n],
        vec![0; n],
    )
}

/// Stably groups every non-leaf buffer of `program` by `(ntype.index(),
/// shape)`, emitting each maximal run sharing both to `f`.
pub fn map_program_buffer_groups<N: Ntype, L>(program: &Program<N, L>, mut f: impl FnMut(&[&Buffer<N>])) {
    let mut candidates: Vec<&Buffer<N>> = program.buffers().iter().filter(|b| !b.is_leaf()).collect();
    // Stable sort by shape first, then by ntype — the second (stable) sort
    // keeps same-ntype buffers in shape order, giving the combined
    // (ntype, shape) ordering without needing a tuple key.
    candidates.sort_by(|a, b| a.shape().cmp(b.shape()));
    candidates.sort_by_key(|b| b.ntype().index());

    let mut start = 0;
    while start < candidates.len() {
        let mut end = start + 1;
        while end < candidates.len()
            && candidates[end].ntype().index() == candidates[start].ntype().index()
            && candidates[end].shape() == candidates[start].shape()
        {
            end += 1;
        }
        f(&candidates[start..end]);
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TaskId;
    use crate::ntype::ScalarNtype;
    use crate::shape::{Range, Shape};

    fn rank1(size: u64) -> Shape {
        Shape::new(vec![Range::new(0, 1, size)])
    }

    #[test]
    fn kernel_reuse_potential_counts_three_point_stencil_pairs() {
        let mut k = Kernel::new(0, rank1(10), TaskId(0));
        let buf = BufferId(1);
        let steps = [1i64];
        for offset in [-1i64, 0, 1] {
            let t = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![offset]);
            k.insert_load(buf, t, &steps, 7);
        }
        let r = kernel_reuse_potential(&k);
        // three loads differing only on axis 0: one class of size 3, contributing 2 pairs.
        assert_eq!(r, vec![2]);
    }

    #[test]
    fn kernel_reuse_potential_is_zero_with_no_stencils() {
        let k = Kernel::new(0, rank1(10), TaskId(0));
        assert_eq!(kernel_reuse_potential(&k), vec![0]);
    }

    #[test]
    fn reuse_optimizing_transformation_sorts_axes_by_ascending_reuse() {
        let t = reuse_optimizing_transformation(&[5, 1, 3]);
        assert_eq!(t.output_mask(), &[Some(1), Some(2), Some(0)]);
        assert!(t.scalings().iter().all(|&s| s == 1));
        assert!(t.offsets().iter().all(|&o| o == 0));
    }

    #[test]
    fn buffer_groups_emit_maximal_runs_of_equal_shape_and_ntype() {
        let mut p: Program<ScalarNtype> = Program::new();
        let a = p.add_buffer(rank1(4), ScalarNtype::F32, 0);
        let b = p.add_buffer(rank1(4), ScalarNtype::F32, 0);
        let c = p.add_buffer(rank1(8), ScalarNtype::F32, 0);
        let _leaf = p.add_leaf_buffer(rank1(4), ScalarNtype::F32, 0, ());

        for buf in [a, b, c] {
            let size = p.buffer(buf).shape().size();
            let kk = p.add_kernel(p.initial_task(), rank1(size));
            let src = p.add_leaf_buffer(rank1(size), ScalarNtype::F32, 0, ());
            let load = p.insert_load(kk, src, Transformation::identity(1)).unwrap();
            p.insert_store(kk, (0, load), buf, Transformation::identity(1)).unwrap();
        }

        let mut groups = Vec::new();
        map_program_buffer_groups(&p, |group| groups.push(group.len()));
        assert_eq!(groups.iter().sum::<usize>(), 3); // the leaf is excluded
        assert!(groups.contains(&2)); // a and b share shape+ntype
        assert!(groups.contains(&1)); // c stands alone
    }
}
