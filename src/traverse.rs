//! The uniform traversal API.
//!
//! Every `map_*` primitive is exposed here as a free function
//! returning an iterator, preferring iterator-returning methods over a
//! visitor-callback/macro layer. Order
//! is always the order recorded in the underlying container — insertion
//! order for associations, `number` order for `task_vector`/
//! `instruction_vector` — and is deterministic across calls.
//!
//! These functions snapshot nothing themselves: they borrow the program (or
//! kernel) for the lifetime of the returned iterator. A caller that wants
//! to mutate the same container while iterating it must collect into a
//! `Vec` first — that's the caller's responsibility once mutation
//! enters the picture, since a shared borrow already prevents mutating
//! through the same handle for free.

use crate::ids::{BufferId, InstructionId, KernelId, TaskId};
use crate::instruction::Instruction;
use crate::kernel::Kernel;
use crate::ntype::Ntype;
use crate::program::Program;
use crate::stencil::Stencil;

pub fn map_program_tasks<N: Ntype, L>(p: &Program<N, L>) -> impl Iterator<Item = TaskId> + '_ {
    p.tasks().iter().map(|t| t.id())
}

pub fn map_program_kernels<N: Ntype, L>(p: &Program<N, L>) -> impl Iterator<Item = KernelId> + '_ {
    p.kernels().iter().map(|k| k.id())
}

pub fn map_program_buffers<N: Ntype, L>(p: &Program<N, L>) -> impl Iterator<Item = BufferId> + '_ {
    p.buffers().iter().map(|b| b.id())
}

pub fn map_task_predecessors<N: Ntype, L>(p: &Program<N, L>, t: TaskId) -> impl Iterator<Item = TaskId> + '_ {
    p.task(t).predecessors().iter().copied()
}

pub fn map_task_successors<N: Ntype, L>(p: &Program<N, L>, t: TaskId) -> impl Iterator<Item = TaskId> + '_ {
    p.task(t).successors().iter().copied()
}

pub fn map_task_kernels<N: Ntype, L>(p: &Program<N, L>, t: TaskId) -> impl Iterator<Item = KernelId> + '_ {
    p.task(t).kernels().iter().copied()
}

pub fn map_task_defined_buffers<N: Ntype, L>(p: &Program<N, L>, t: TaskId) -> impl Iterator<Item = BufferId> + '_ {
    p.task(t).defined_buffers().iter().copied()
}

/// Kernels that write into `b` (a buffer's "inputs" are the kernels that
/// feed data *into* it).
pub fn map_buffer_inputs<N: Ntype, L>(p: &Program<N, L>, b: BufferId) -> impl Iterator<Item = KernelId> + '_ {
    p.buffer(b).writers().iter().map(|(k, _)| *k)
}

/// Kernels that read from `b` ("outputs": data flows *out* of the buffer
/// to these kernels).
pub fn map_buffer_outputs<N: Ntype, L>(p: &Program<N, L>, b: BufferId) -> impl Iterator<Item = KernelId> + '_ {
    p.buffer(b).readers().iter().map(|(k, _)| *k)
}

/// All load instructions reading `b`, across every reading kernel, as
/// `(kernel, instruction)` pairs.
pub fn map_buffer_load_instructions<N: Ntype, L>(
    p: &Program<N, L>,
    b: BufferId,
) -> impl Iterator<Item = (KernelId, InstructionId)> + '_ {
    p.buffer(b).readers().iter().flat_map(|(k, loads)| loads.iter().map(move |&id| (*k, id)))
}

/// All store instructions writing `b`, across every writing kernel.
pub fn map_buffer_store_instructions<N: Ntype, L>(
    p: &Program<N, L>,
    b: BufferId,
) -> impl Iterator<Item = (KernelId, InstructionId)> + '_ {
    p.buffer(b).writers().iter().flat_map(|(k, stores)| stores.iter().map(move |&id| (*k, id)))
}

pub fn map_kernel_inputs(k: &Kernel) -> impl Iterator<Item = BufferId> + '_ {
    k.inputs()
}

pub fn map_kernel_outputs(k: &Kernel) -> impl Iterator<Item = BufferId> + '_ {
    k.outputs()
}

pub fn map_kernel_stencils(k: &Kernel) -> impl Iterator<Item = &Stencil> {
    k.stencils_all()
}

/// Stencils of `k` reading specifically `b` — the filtered view
/// `buffer_reuse_potential` needs.
pub fn map_kernel_stencils_for_buffer(k: &Kernel, b: BufferId) -> impl Iterator<Item = &Stencil> {
    k.stencils(b).iter()
}

pub fn map_kernel_load_instructions(k: &Kernel) -> impl Iterator<Item = InstructionId> + '_ {
    k.load_instructions()
}

pub fn map_kernel_store_instructions(k: &Kernel) -> impl Iterator<Item = InstructionId> + '_ {
    k.store_instructions()
}

pub fn map_kernel_instructions(k: &Kernel) -> impl Iterator<Item = &Instruction> {
    k.instruction_vector().iter()
}

pub fn map_stencil_load_instructions(s: &Stencil) -> impl Iterator<Item = InstructionId> + '_ {
    s.load_instructions().iter().copied()
}

pub fn map_instruction_inputs(i: &Instruction) -> impl Iterator<Item = (u32, InstructionId)> + '_ {
    i.inputs().iter().copied()
}
