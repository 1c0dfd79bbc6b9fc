//! Kernels: a parametric loop nest over an iteration space, reading source
//! buffers and writing target buffers through an embedded instruction DAG.
//!
//! The stencil-clustering algorithm and store insertion
//! live here since they only ever need this kernel's own state; buffer-side
//! bookkeeping (`Buffer::record_read`/`record_write`) is applied separately
//! by [`crate::program::Program`], which is the only place that can see
//! both the kernel and the buffer arenas at once.

use crate::ids::{BufferId, InstructionId, TaskId};
use crate::instruction::{FnRecord, Instruction, InstructionKind};
use crate::shape::Shape;
use crate::stencil::{floored_mean, within_radius, Stencil};
use crate::transform::Transformation;
use std::any::Any;

/// A loop nest reading zero or more source buffers (through stencils of
/// loads) and writing zero or more target buffers (through stores), via an
/// instruction DAG kept in bottom-up topological order.
#[derive(Debug)]
pub struct Kernel {
    number: u32,
    iteration_space: Shape,
    sources: Vec<(BufferId, Vec<Stencil>)>,
    targets: Vec<(BufferId, Vec<InstructionId>)>,
    /// Leaves first, stores last. An instruction's `number`
    /// is defined to equal its position here: the construction API can
    /// only reference an already-created instruction as an input, so
    /// append order is already a valid topological order, and assigning
    /// `number = position` at push time keeps that invariant for free —
    /// see `DESIGN.md` for why this replaces a separate renumbering pass.
    instruction_vector: Vec<Instruction>,
    task: TaskId,
    /// Backend scratch slot.
    data: Option<Box<dyn Any>>,
}

impl Kernel {
    pub(crate) fn new(number: u32, iteration_space: Shape, task: TaskId) -> Self {
        Self {
            number,
            iteration_space,
            sources: Vec::new(),
            targets: Vec::new(),
            instruction_vector: Vec::new(),
            task,
            data: None,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn id(&self) -> crate::ids::KernelId {
        crate::ids::KernelId(self.number)
    }

    pub fn iteration_space(&self) -> &Shape {
        &self.iteration_space
    }

    pub(crate) fn set_iteration_space(&mut self, shape: Shape) {
        self.iteration_space = shape;
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn sources(&self) -> &[(BufferId, Vec<Stencil>)] {
        &self.sources
    }

    pub fn targets(&self) -> &[(BufferId, Vec<InstructionId>)] {
        &self.targets
    }

    pub fn instruction_vector(&self) -> &[Instruction] {
        &self.instruction_vector
    }

    pub fn instruction_vector_mut(&mut self) -> &mut [Instruction] {
        &mut self.instruction_vector
    }

    pub fn instruction(&self, id: InstructionId) -> &Instruction {
        &self.instruction_vector[id.index()]
    }

    pub fn instruction_mut(&mut self, id: InstructionId) -> &mut Instruction {
        &mut self.instruction_vector[id.index()]
    }

    pub fn data(&self) -> Option<&(dyn Any)> {
        self.data.as_deref()
    }

    pub fn set_data(&mut self, data: Box<dyn Any>) {
        self.data = Some(data);
    }

    /// Appends an instruction, assigning its `number` to its position.
    fn push_instruction(&mut self, mut instruction: Instruction) -> InstructionId {
        let id = InstructionId(self.instruction_vector.len() as u32);
        instruction.set_number(id.number());
        self.instruction_vector.push(instruction);
        id
    }

    /// Inserts a `call` instruction invoking `fnrecord` on `inputs`.
    pub(crate) fn insert_call(
        &mut self,
        inputs: Vec<(u32, InstructionId)>,
        fnrecord: FnRecord,
        number_of_values: u32,
    ) -> InstructionId {
        self.push_instruction(Instruction::new(0, inputs, InstructionKind::Call { fnrecord, number_of_values }))
    }

    /// Inserts an `iref` instruction.
    pub(crate) fn insert_iref(&mut self, inputs: Vec<(u32, InstructionId)>, transformation: Transformation) -> InstructionId {
        self.push_instruction(Instruction::new(0, inputs, InstructionKind::Iref { transformation }))
    }

    /// Inserts a `load` of `buffer`, clustering it into an existing stencil
    /// when one accepts it:
    ///
    /// 1. Only stencils recorded under `buffer` whose member loads share
    ///    `output_mask` and `scalings` with `transformation` are considered.
    /// 2. For each, in insertion order, compute the tentative new center as
    ///    the floored mean of the candidate stencil's offsets plus this
    ///    load's.
    /// 3. Accept the first stencil where every member (including the new
    ///    load) stays within `radius * buffer_steps[axis]` of that center,
    ///    on every axis.
    /// 4. Otherwise, start a new singleton stencil.
    pub(crate) fn insert_load(
        &mut self,
        buffer: BufferId,
        transformation: Transformation,
        buffer_steps: &[i64],
        radius: i64,
    ) -> InstructionId {
        let offsets = transformation.offsets().to_vec();
        let output_mask = transformation.output_mask().to_vec();
        let scalings = transformation.scalings().to_vec();

        let load_id = self.push_instruction(Instruction::new(
            0,
            Vec::new(),
            InstructionKind::Load { buffer, transformation },
        ));

        if self.sources.iter().all(|(b, _)| *b != buffer) {
            self.sources.push((buffer, Vec::new()));
        }
        let group_idx = self.sources.iter().position(|(b, _)| *b == buffer).unwrap();

        let mut accepted: Option<(usize, Vec<i64>)> = None;
        {
            let stencils = &self.sources[group_idx].1;
            for (stencil_idx, stencil) in stencils.iter().enumerate() {
                let representative = stencil.load_instructions()[0];
                let rep_transform = self.instruction(representative).transformation().unwrap();
                if rep_transform.output_mask() != output_mask.as_slice() || rep_transform.scalings() != scalings.as_slice() {
                    continue;
                }

                let mut member_offsets: Vec<Vec<i64>> = stencil
                    .load_instructions()
                    .iter()
                    .map(|&id| self.instruction(id).transformation().unwrap().offsets().to_vec())
                    .collect();
                member_offsets.push(offsets.clone());
                let refs: Vec<&[i64]> = member_offsets.iter().map(Vec::as_slice).collect();

                let new_center = floored_mean(&refs);
                if within_radius(&new_center, &refs, buffer_steps, radius) {
                    accepted = Some((stencil_idx, new_center));
                    break;
                }
            }
        }

        match accepted {
            Some((stencil_idx, new_center)) => {
                self.sources[group_idx].1[stencil_idx].push(load_id, new_center);
            }
            None => {
                self.sources[group_idx].1.push(Stencil::singleton(load_id, &offsets));
            }
        }

        load_id
    }

    /// Inserts a `store` of `input` to `buffer`. Stores never group (§4.2).
    pub(crate) fn insert_store(&mut self, input: (u32, InstructionId), buffer: BufferId, transformation: Transformation) -> InstructionId {
        let store_id = self.push_instruction(Instruction::new(
            0,
            vec![input],
            InstructionKind::Store { buffer, transformation },
        ));
        if self.targets.iter().all(|(b, _)| *b != buffer) {
            self.targets.push((buffer, Vec::new()));
        }
        self.targets.iter_mut().find(|(b, _)| *b == buffer).unwrap().1.push(store_id);
        store_id
    }

    pub fn stencils(&self, buffer: BufferId) -> &[Stencil] {
        self.sources.iter().find(|(b, _)| *b == buffer).map(|(_, s)| s.as_slice()).unwrap_or(&[])
    }

    /// Overwrites one stencil's center directly — used by
    /// [`crate::rewrite::transform_kernel`] after a rewrite has shifted the
    /// offsets of that stencil's member loads.
    pub(crate) fn set_stencil_center(&mut self, buffer: BufferId, stencil_idx: usize, center: Vec<i64>) {
        let (_, stencils) = self.sources.iter_mut().find(|(b, _)| *b == buffer).expect("buffer must be a source of this kernel");
        stencils[stencil_idx].set_center(center);
    }

    pub fn stores(&self, buffer: BufferId) -> &[InstructionId] {
        self.targets.iter().find(|(b, _)| *b == buffer).map(|(_, s)| s.as_slice()).unwrap_or(&[])
    }

    /// All loads across every source buffer's stencils, in (buffer,
    /// stencil) insertion order.
    pub fn load_instructions(&self) -> impl Iterator<Item = InstructionId> + '_ {
        self.sources.iter().flat_map(|(_, stencils)| stencils.iter().flat_map(|s| s.load_instructions().iter().copied()))
    }

    /// All stores across every target buffer, in insertion order.
    pub fn store_instructions(&self) -> impl Iterator<Item = InstructionId> + '_ {
        self.targets.iter().flat_map(|(_, stores)| stores.iter().copied())
    }

    pub fn stencils_all(&self) -> impl Iterator<Item = &Stencil> {
        self.sources.iter().flat_map(|(_, s)| s.iter())
    }

    /// The source buffers this kernel reads, in insertion order.
    pub fn inputs(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.sources.iter().map(|(b, _)| *b)
    }

    /// The target buffers this kernel writes, in insertion order.
    pub fn outputs(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.targets.iter().map(|(b, _)| *b)
    }

    /// The highest `number` among this kernel's store instructions — valid
    /// only under the numbering discipline that stores always
    /// receive the highest numbers, so this scans only stores rather than
    /// the whole vector.
    pub fn highest_instruction_number(&self) -> u32 {
        self.store_instructions()
            .map(|id| self.instruction(id).number())
            .max()
            .unwrap_or_else(|| self.instruction_vector.iter().map(Instruction::number).max().unwrap_or(0))
    }

    /// `max(1, iteration_space.size() * highest_instruction_number())` — a
    /// cheap scheduling proxy.
    pub fn cost(&self) -> u64 {
        (self.iteration_space.size() * self.highest_instruction_number() as u64).max(1)
    }

    pub(crate) fn clear(&mut self) {
        self.sources.clear();
        self.targets.clear();
        self.instruction_vector.clear();
    }
}

impl std::fmt::Display for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Kernel#{} iteration_space={:?}", self.number, self.iteration_space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BufferId;
    use crate::shape::Range;

    fn test_kernel() -> Kernel {
        Kernel::new(0, Shape::new(vec![Range::new(0, 1, 10)]), TaskId(0))
    }

    #[test]
    fn cost_is_at_least_one() {
        let k = test_kernel();
        assert_eq!(k.cost(), 1);
    }

    #[test]
    fn three_point_stencil_offsets_collapse_to_one_group() {
        let mut k = test_kernel();
        let buf = BufferId(1);
        let steps = [1i64];
        for offset in [-1i64, 0, 1] {
            let t = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![offset]);
            k.insert_load(buf, t, &steps, 7);
        }
        assert_eq!(k.stencils(buf).len(), 1);
        assert_eq!(k.stencils(buf)[0].center(), &[0]);
        assert_eq!(k.stencils(buf)[0].load_instructions().len(), 3);
    }

    #[test]
    fn offset_past_radius_starts_new_stencil_group() {
        let mut k = test_kernel();
        let buf = BufferId(1);
        let steps = [1i64];
        let t0 = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![0]);
        k.insert_load(buf, t0, &steps, 7);
        let t_far = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![20]);
        k.insert_load(buf, t_far, &steps, 7);
        assert_eq!(k.stencils(buf).len(), 2);
    }

    #[test]
    fn reinserting_identical_load_does_not_duplicate_stencils() {
        let mut k = test_kernel();
        let buf = BufferId(1);
        let steps = [1i64];
        let t = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![0]);
        k.insert_load(buf, t.clone(), &steps, 7);
        k.insert_load(buf, t, &steps, 7);
        assert_eq!(k.stencils(buf).len(), 1);
        assert_eq!(k.stencils(buf)[0].load_instructions().len(), 2);
        assert_eq!(k.stencils(buf)[0].center(), &[0]);
    }

    #[test]
    fn instruction_numbers_equal_position() {
        let mut k = test_kernel();
        let buf = BufferId(1);
        let steps = [1i64];
        let t = Transformation::new(1, 1, vec![None], vec![Some(0)], vec![1], vec![0]);
        let load_id = k.insert_load(buf, t.clone(), &steps, 7);
        let store_id = k.insert_store((0, load_id), buf, t);
        assert_eq!(k.instruction(load_id).number(), load_id.number());
        assert_eq!(k.instruction(store_id).number(), store_id.number());
        assert!(k.instruction(load_id).number() < k.instruction(store_id).number());
    }
}
