//! Integration tests for the numbered scenarios of the IR's testable
//! properties: each builds a small program purely through the public API
//! and checks one end-to-end behavior spanning several modules at once.

use array_ir::analysis::{kernel_reuse_potential, map_program_buffer_groups};
use array_ir::rewrite::transform_buffer;
use array_ir::{Program, Range, ScalarNtype, Shape, Transformation};

fn rank1(size: u64) -> Shape {
    Shape::new(vec![Range::new(0, 1, size)])
}

fn rank2(a: u64, b: u64) -> Shape {
    Shape::new(vec![Range::new(0, 1, a), Range::new(0, 1, b)])
}

/// Scenario 1: a single kernel copying a rank-1 buffer via the identity
/// transformation has zero reuse potential and `cost = size * highest_number`.
#[test]
fn identity_copy_has_no_reuse_and_expected_cost() {
    let mut p: Program<ScalarNtype> = Program::new();
    let src = p.add_leaf_buffer(rank1(10), ScalarNtype::F32, 0, ());
    let dst = p.add_buffer(rank1(10), ScalarNtype::F32, 1);
    p.add_root_buffer(dst);
    let k = p.add_kernel(p.initial_task(), rank1(10));
    p.assign_buffer_to_task(dst, p.initial_task());

    let id_t = Transformation::identity(1);
    let load = p.insert_load(k, src, id_t.clone()).unwrap();
    p.insert_store(k, (0, load), dst, id_t).unwrap();

    assert_eq!(kernel_reuse_potential(p.kernel(k)), vec![0]);
    assert_eq!(p.kernel(k).cost(), 10 * p.kernel(k).highest_instruction_number() as u64);
    assert!(p.check_invariants().is_ok());
}

/// Scenario 2: three loads at offsets `{-1, 0, +1}` on the same axis
/// collapse into one stencil centered at `0`, contributing two reuse pairs.
#[test]
fn three_point_stencil_collapses_and_reports_reuse() {
    let mut p: Program<ScalarNtype> = Program::new();
    let src = p.add_leaf_buffer(rank1(100), ScalarNtype::F32, 0, ());
    let k = p.add_kernel(p.initial_task(), rank1(100));

    for offset in [-1i64, 0, 1] {
        let t = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![offset]);
        p.insert_load(k, src, t).unwrap();
    }

    assert_eq!(p.kernel(k).stencils(src).len(), 1);
    assert_eq!(p.kernel(k).stencils(src)[0].center(), &[0]);
    assert_eq!(kernel_reuse_potential(p.kernel(k)), vec![2]);
    assert!(p.check_invariants().is_ok());
}

/// Scenario 3 (boundary behavior): loads join a growing stencil as long as
/// every member, including the new one, stays within radius of the
/// recomputed center; once a candidate would push a member outside that
/// radius, it starts a fresh stencil instead.
#[test]
fn stencil_rejects_once_candidate_center_pushes_a_member_past_radius() {
    let mut p: Program<ScalarNtype> = Program::new();
    let src = p.add_leaf_buffer(rank1(1000), ScalarNtype::F32, 0, ());
    let k = p.add_kernel(p.initial_task(), rank1(1000));

    let load_at = |p: &mut Program<ScalarNtype>, offset: i64| {
        let t = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![offset]);
        p.insert_load(k, src, t).unwrap()
    };

    load_at(&mut p, 0); // center 0
    load_at(&mut p, 7); // candidate center floor(7/2)=3, |0-3|=3 and |7-3|=4: both within 7 -> joins
    load_at(&mut p, 14); // candidate center floor(21/3)=7, max |offset-7|=7: exactly at the boundary -> joins
    assert_eq!(p.kernel(k).stencils(src).len(), 1);
    assert_eq!(p.kernel(k).stencils(src)[0].center(), &[7]);

    load_at(&mut p, 22); // candidate center floor(43/4)=10, |0-10|=10 > 7 -> rejected, new stencil
    assert_eq!(p.kernel(k).stencils(src).len(), 2);
    assert_eq!(p.kernel(k).stencils(src)[0].load_instructions().len(), 3);
    assert_eq!(p.kernel(k).stencils(src)[1].load_instructions().len(), 1);
    assert!(p.check_invariants().is_ok());
}

/// Scenario 4: two loads with identical transformations produce one stencil
/// with a two-member `load_instructions` and `center == offsets`.
#[test]
fn identical_loads_share_one_two_member_stencil() {
    let mut p: Program<ScalarNtype> = Program::new();
    let src = p.add_leaf_buffer(rank1(10), ScalarNtype::F32, 0, ());
    let k = p.add_kernel(p.initial_task(), rank1(10));

    let t = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![3]);
    p.insert_load(k, src, t.clone()).unwrap();
    p.insert_load(k, src, t).unwrap();

    assert_eq!(p.kernel(k).stencils(src).len(), 1);
    assert_eq!(p.kernel(k).stencils(src)[0].load_instructions().len(), 2);
    assert_eq!(p.kernel(k).stencils(src)[0].center(), &[3]);
}

/// Scenario 5: `transform_buffer` with an axis swap on a rank-2 buffer
/// keeps every referencing load pointed at the same physical element.
#[test]
fn transform_buffer_axis_swap_preserves_physical_element_access() {
    let mut p: Program<ScalarNtype> = Program::new();
    let src = p.add_leaf_buffer(rank2(3, 5), ScalarNtype::F32, 0, ());
    let k = p.add_kernel(p.initial_task(), rank2(3, 5));
    let load = p.insert_load(k, src, Transformation::identity(2)).unwrap();

    let swap = Transformation::new(2, 2, vec![None, None], vec![Some(1), Some(0)], vec![1, 1], vec![0, 0]);
    transform_buffer(&mut p, src, &swap).unwrap();

    assert_eq!(p.buffer(src).shape().dimensions(), vec![5, 3]);
    let updated = p.kernel(k).instruction(load).transformation().unwrap();
    for point in [[0i64, 0], [1, 2], [2, 4]] {
        assert_eq!(updated.apply_to_point(&point), Transformation::identity(2).apply_to_point(&point).into_iter().rev().collect::<Vec<_>>());
    }
}

/// Scenario 6: grouping buffers `{S1 T1, S1 T1, S1 T2, S2 T1}` by
/// `(ntype.index, shape)` yields exactly three groups.
#[test]
fn buffer_groups_match_spec_example() {
    let mut p: Program<ScalarNtype> = Program::new();
    let s1t1_a = p.add_buffer(rank1(4), ScalarNtype::F32, 0);
    let s1t1_b = p.add_buffer(rank1(4), ScalarNtype::F32, 0);
    let s1t2 = p.add_buffer(rank1(4), ScalarNtype::I32, 0);
    let s2t1 = p.add_buffer(rank1(8), ScalarNtype::F32, 0);

    for buf in [s1t1_a, s1t1_b, s1t2, s2t1] {
        let size = p.buffer(buf).shape().size();
        let kk = p.add_kernel(p.initial_task(), rank1(size));
        let src = p.add_leaf_buffer(rank1(size), p.buffer(buf).ntype(), 0, ());
        let load = p.insert_load(kk, src, Transformation::identity(1)).unwrap();
        p.insert_store(kk, (0, load), buf, Transformation::identity(1)).unwrap();
    }

    let mut group_sizes = Vec::new();
    map_program_buffer_groups(&p, |group| group_sizes.push(group.len()));
    // ntype ascending (I32 before F32), shape ascending within each ntype:
    // {s1t2} (I32, shape4), {s1t1_a, s1t1_b} (F32, shape4), {s2t1} (F32, shape8).
    assert_eq!(group_sizes, vec![1, 2, 1]);
}
