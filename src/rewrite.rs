//! Semantics-preserving rewrites of a kernel's iteration space or a
//! buffer's shape.
//!
//! Both operations replace a shape with its image under an affine
//! transformation and then patch every instruction whose transformation
//! pointed at the old shape so it points at the same physical elements of
//! the new one. They differ in which side of the instruction's
//! transformation gets the rewrite applied, and why (see each function's
//! doc comment) — that asymmetry is the crux of the whole component.

use crate::error::Result;
use crate::ids::{BufferId, KernelId};
use crate::ntype::Ntype;
use crate::program::Program;
use crate::stencil::floored_mean;
use crate::transform::{apply_to_shape, Transformation};

/// Replaces `buffer`'s shape with its image under `t`, then re-points every
/// load and store referencing it so the same physical element is read or
/// written as before.
///
/// The instruction's transformation maps *iteration index -> buffer
/// index*; since the buffer's index space just changed, that transformation
/// needs to end with a trip through `t`, i.e. `compose(t, old)`. This is
/// the "outputs" half of a rewrite: the buffer moved, so every arrow
/// pointing *into* it is adjusted on its target side.
pub fn transform_buffer<N: Ntype, L>(program: &mut Program<N, L>, buffer: BufferId, t: &Transformation) -> Result<()> {
    let old_shape = program.buffer(buffer).shape().clone();
    let new_shape = apply_to_shape(t, &old_shape)?;
    program.buffer_mut(buffer).set_shape(new_shape);

    let readers: Vec<_> = program.buffer(buffer).readers().to_vec();
    let writers: Vec<_> = program.buffer(buffer).writers().to_vec();

    for (kernel, loads) in readers {
        for load in loads {
            let kernel_mut = program.kernel_mut(kernel);
            let instr = kernel_mut.instruction_mut(load);
            let old_t = instr.transformation().expect("load must carry a transformation").clone();
            let composed = Transformation::compose(t, &old_t)?;
            *instr.transformation_mut().unwrap() = composed;
        }
    }
    for (kernel, stores) in writers {
        for store in stores {
            let kernel_mut = program.kernel_mut(kernel);
            let instr = kernel_mut.instruction_mut(store);
            let old_t = instr.transformation().expect("store must carry a transformation").clone();
            let composed = Transformation::compose(t, &old_t)?;
            *instr.transformation_mut().unwrap() = composed;
        }
    }

    Ok(())
}

/// Replaces `kernel`'s iteration space with its image under `t`, and
/// re-points every iterating instruction inside it so each still reads or
/// writes the same physical element as before.
///
/// Here the transformation maps *iteration index -> buffer index*, and it
/// is the *iteration* space (the transformation's input side) that moved —
/// so composing needs to undo `t` first: `compose(old, invert(t))`. This is
/// the "inputs" half: reindex the loop, then cancel that reindexing before
/// the instruction's own access pattern runs, so
/// `instr.transformation ∘ invert(t) ∘ t == instr.transformation` holds.
///
/// Stencil centers are recomputed afterward regardless of whether `t` was
/// the identity, since floating every load's offset around can still shift
/// centers even when the iteration space itself didn't move (idempotent:
/// recomputing twice in a row gives the same answer both times).
pub fn transform_kernel<N: Ntype, L>(program: &mut Program<N, L>, kernel: KernelId, t: &Transformation) -> Result<()> {
    if !t.is_identity() {
        let old_space = program.kernel(kernel).iteration_space().clone();
        let new_space = apply_to_shape(t, &old_space)?;
        program.kernel_mut(kernel).set_iteration_space(new_space);

        let inverse = t.invert()?;
        let instruction_ids: Vec<_> = program
            .kernel(kernel)
            .instruction_vector()
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_iterating())
            .map(|(idx, _)| crate::ids::InstructionId(idx as u32))
            .collect();

        for id in instruction_ids {
            let kernel_mut = program.kernel_mut(kernel);
            let instr = kernel_mut.instruction_mut(id);
            let old_t = instr.transformation().unwrap().clone();
            let composed = Transformation::compose(&old_t, &inverse)?;
            *instr.transformation_mut().unwrap() = composed;
        }
    }

    recompute_all_stencil_centers(program, kernel);
    Ok(())
}

/// Recomputes every stencil's center from its current members' offsets —
/// needed after a rewrite may have shifted them.
fn recompute_all_stencil_centers<N: Ntype, L>(program: &mut Program<N, L>, kernel: KernelId) {
    let buffers: Vec<BufferId> = program.kernel(kernel).inputs().collect();
    for buffer in buffers {
        let stencil_count = program.kernel(kernel).stencils(buffer).len();
        for stencil_idx in 0..stencil_count {
            let offsets: Vec<Vec<i64>> = program.kernel(kernel).stencils(buffer)[stencil_idx]
                .load_instructions()
                .iter()
                .map(|&id| program.kernel(kernel).instruction(id).transformation().unwrap().offsets().to_vec())
                .collect();
            let refs: Vec<&[i64]> = offsets.iter().map(Vec::as_slice).collect();
            let new_center = floored_mean(&refs);
            program.kernel_mut(kernel).set_stencil_center(buffer, stencil_idx, new_center);
        }
    }
}
