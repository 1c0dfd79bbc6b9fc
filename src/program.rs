//! Programs: the top-level IR container for one compilation.
//!
//! Owns flat arenas of tasks, kernels, and buffers;
//! every cross-reference elsewhere in this crate is an index into one of
//! these three vectors. This is also where the construction API lives
//! (`add_*`, `insert_*`) since building the graph is the one place that
//! needs simultaneous mutable access to more than one arena at a time.

use crate::buffer::Buffer;
use crate::error::{IrError, Result};
use crate::ids::{BufferId, InstructionId, KernelId, TaskId};
use crate::instruction::FnRecord;
use crate::kernel::Kernel;
use crate::ntype::Ntype;
use crate::shape::Shape;
use crate::stencil::STENCIL_MAX_RADIUS;
use crate::task::Task;
use crate::transform::Transformation;

/// A lowered dataflow graph: tasks owning kernels owning instruction DAGs,
/// plus the buffers they read and write.
///
/// `L` is the type of the original lazy-array handle the frontend pairs
/// with each leaf buffer (the `leaf_alist`); it defaults to `()` for
/// callers that don't need to round-trip back to a frontend-side handle.
pub struct Program<N: Ntype, L = ()> {
    tasks: Vec<Task>,
    kernels: Vec<Kernel>,
    buffers: Vec<Buffer<N>>,
    initial_task: TaskId,
    final_task: TaskId,
    leaf_alist: Vec<(BufferId, L)>,
    root_buffers: Vec<BufferId>,
    stencil_radius: i64,
}

impl<N: Ntype, L> Program<N, L> {
    /// A fresh program with one task, which is both the initial and final
    /// task until [`Program::add_task`]/[`Program::connect_tasks`] grow the
    /// task DAG.
    pub fn new() -> Self {
        Self {
            tasks: vec![Task::new(0)],
            kernels: Vec::new(),
            buffers: Vec::new(),
            initial_task: TaskId(0),
            final_task: TaskId(0),
            leaf_alist: Vec::new(),
            root_buffers: Vec::new(),
            stencil_radius: STENCIL_MAX_RADIUS,
        }
    }

    /// Overrides the per-program stencil acceptance radius (`STENCIL_MAX_RADIUS`
    /// by default, tunable per-program).
    pub fn with_stencil_radius(mut self, radius: i64) -> Self {
        self.stencil_radius = radius;
        self
    }

    pub fn stencil_radius(&self) -> i64 {
        self.stencil_radius
    }

    pub fn initial_task(&self) -> TaskId {
        self.initial_task
    }

    pub fn final_task(&self) -> TaskId {
        self.final_task
    }

    pub fn set_initial_task(&mut self, t: TaskId) {
        self.initial_task = t;
    }

    pub fn set_final_task(&mut self, t: TaskId) {
        self.final_task = t;
    }

    pub fn number_of_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn number_of_kernels(&self) -> usize {
        self.kernels.len()
    }

    pub fn number_of_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn leaf_alist(&self) -> &[(BufferId, L)] {
        &self.leaf_alist
    }

    pub fn root_buffers(&self) -> &[BufferId] {
        &self.root_buffers
    }

    // ---- task construction -------------------------------------------

    /// Adds a new, initially disconnected task.
    pub fn add_task(&mut self) -> TaskId {
        let id = TaskId(self.tasks.len() as u32);
        self.tasks.push(Task::new(id.number()));
        id
    }

    /// Records `pred -> succ` as a task-DAG edge.
    pub fn connect_tasks(&mut self, pred: TaskId, succ: TaskId) {
        self.tasks[pred.index()].add_successor(succ);
        self.tasks[succ.index()].add_predecessor(pred);
    }

    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.index()]
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn program_task(&self, number: u32) -> Result<&Task> {
        self.tasks
            .get(number as usize)
            .ok_or(IrError::NumberNotFound { kind: "task", number })
    }

    // ---- buffer construction -------------------------------------------

    /// Allocates a new buffer with no writers or readers (a leaf until a
    /// kernel writes it).
    pub fn add_buffer(&mut self, shape: Shape, ntype: N, depth: u32) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(Buffer::new(id.number(), shape, ntype, depth));
        id
    }

    /// Allocates a leaf buffer and records its pairing with the frontend's
    /// original lazy-array handle in `leaf_alist`.
    pub fn add_leaf_buffer(&mut self, shape: Shape, ntype: N, depth: u32, handle: L) -> BufferId {
        let id = self.add_buffer(shape, ntype, depth);
        self.leaf_alist.push((id, handle));
        id
    }

    /// Marks `buffer` as a root, in the order supplied.
    pub fn add_root_buffer(&mut self, buffer: BufferId) {
        if !self.root_buffers.contains(&buffer) {
            self.root_buffers.push(buffer);
        }
    }

    /// Assigns `buffer` to `task`'s `defined_buffers` (task-membership rule:
    /// a buffer written by a kernel in `T` is itself in `T`).
    pub fn assign_buffer_to_task(&mut self, buffer: BufferId, task: TaskId) {
        self.buffers[buffer.index()].set_task(task);
        self.tasks[task.index()].add_defined_buffer(buffer);
    }

    pub fn buffer(&self, id: BufferId) -> &Buffer<N> {
        &self.buffers[id.index()]
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> &mut Buffer<N> {
        &mut self.buffers[id.index()]
    }

    pub fn buffers(&self) -> &[Buffer<N>] {
        &self.buffers
    }

    /// Looks up a buffer by its `number`. O(n) in the number of
    /// buffers, as specified — `BufferId` gives O(1) access when the
    /// caller already has an id.
    pub fn program_buffer(&self, number: u32) -> Result<&Buffer<N>> {
        self.buffers
            .get(number as usize)
            .ok_or(IrError::NumberNotFound { kind: "buffer", number })
    }

    // ---- kernel construction -------------------------------------------

    /// Allocates a new, empty kernel owned by `task`.
    pub fn add_kernel(&mut self, task: TaskId, iteration_space: Shape) -> KernelId {
        let id = KernelId(self.kernels.len() as u32);
        self.kernels.push(Kernel::new(id.number(), iteration_space, task));
        self.tasks[task.index()].add_kernel(id);
        id
    }

    pub fn kernel(&self, id: KernelId) -> &Kernel {
        &self.kernels[id.index()]
    }

    pub fn kernel_mut(&mut self, id: KernelId) -> &mut Kernel {
        &mut self.kernels[id.index()]
    }

    pub fn kernels(&self) -> &[Kernel] {
        &self.kernels
    }

    /// Looks up a kernel by its `number`. O(n) in the number of kernels.
    pub fn program_kernel(&self, number: u32) -> Result<&Kernel> {
        self.kernels
            .get(number as usize)
            .ok_or(IrError::NumberNotFound { kind: "kernel", number })
    }

    // ---- instruction construction ---------------------------------------

    pub fn insert_call(
        &mut self,
        kernel: KernelId,
        inputs: Vec<(u32, InstructionId)>,
        fnrecord: FnRecord,
        number_of_values: u32,
    ) -> InstructionId {
        self.kernels[kernel.index()].insert_call(inputs, fnrecord, number_of_values)
    }

    pub fn insert_iref(&mut self, kernel: KernelId, inputs: Vec<(u32, InstructionId)>, transformation: Transformation) -> InstructionId {
        self.kernels[kernel.index()].insert_iref(inputs, transformation)
    }

    /// Inserts a `load` of `buffer` into `kernel`, clustering it into a
    /// stencil, and records the load in `buffer.readers`.
    pub fn insert_load(&mut self, kernel: KernelId, buffer: BufferId, transformation: Transformation) -> Result<InstructionId> {
        let buffer_shape = self.buffers[buffer.index()].shape().clone();
        if transformation.rank_out() != buffer_shape.rank() {
            return Err(IrError::ArrayBufferMismatch {
                reason: format!(
                    "load transformation has output rank {} but buffer#{} has rank {}",
                    transformation.rank_out(),
                    buffer.number(),
                    buffer_shape.rank()
                ),
            });
        }
        let steps: Vec<i64> = buffer_shape.ranges().iter().map(|r| r.step()).collect();
        let radius = self.stencil_radius;

        tracing::trace!(kernel = kernel.number(), buffer = buffer.number(), "inserting load");
        let load_id = self.kernels[kernel.index()].insert_load(buffer, transformation, &steps, radius);
        self.buffers[buffer.index()].record_read(kernel, load_id);
        Ok(load_id)
    }

    /// Inserts a `store` of `input` to `buffer` into `kernel`, and records
    /// the store in `buffer.writers`. Stores never group (§4.2).
    pub fn insert_store(
        &mut self,
        kernel: KernelId,
        input: (u32, InstructionId),
        buffer: BufferId,
        transformation: Transformation,
    ) -> Result<InstructionId> {
        let buffer_rank = self.buffers[buffer.index()].shape().rank();
        if transformation.rank_out() != buffer_rank {
            return Err(IrError::ArrayBufferMismatch {
                reason: format!(
                    "store transformation has output rank {} but buffer#{} has rank {}",
                    transformation.rank_out(),
                    buffer.number(),
                    buffer_rank
                ),
            });
        }
        tracing::trace!(kernel = kernel.number(), buffer = buffer.number(), "inserting store");
        let store_id = self.kernels[kernel.index()].insert_store(input, buffer, transformation);
        self.buffers[buffer.index()].record_write(kernel, store_id);
        Ok(store_id)
    }

    // ---- structural edits ------------------------------------------------

    /// Deletes a kernel: unlinks it from every buffer it read or wrote and
    /// clears its instruction vector. The kernel's number stays
    /// reserved (its slot is not reclaimed) — storage may be freed lazily
    /// by whatever owns `kernel.data`.
    pub fn delete_kernel(&mut self, kernel: KernelId) {
        tracing::debug!(kernel = kernel.number(), "deleting kernel");
        let source_buffers: Vec<BufferId> = self.kernels[kernel.index()].inputs().collect();
        let target_buffers: Vec<BufferId> = self.kernels[kernel.index()].outputs().collect();
        for b in source_buffers.into_iter().chain(target_buffers) {
            self.buffers[b.index()].forget_kernel(kernel);
        }
        self.kernels[kernel.index()].clear();
    }

    // ---- validation ------------------------------------------------------

    /// Walks the whole arena and returns the first violated structural
    /// invariant as a structured error. Not called from any
    /// construction or transform path — opt-in, for tests and debug-build
    /// assertions at major pass boundaries.
    pub fn check_invariants(&self) -> Result<()> {
        self.check_task_numbering()?;
        self.check_task_dag()?;
        self.check_buffer_kernel_back_references()?;
        self.check_stencil_membership()?;
        self.check_stencil_consistency()?;
        self.check_instruction_numbering()?;
        self.check_task_membership()?;
        Ok(())
    }

    fn violation(message: impl Into<String>) -> IrError {
        IrError::InvariantViolation(message.into())
    }

    /// Invariant 1: `task.number` equals its index in `task_vector`.
    fn check_task_numbering(&self) -> Result<()> {
        for (index, task) in self.tasks.iter().enumerate() {
            if task.number() as usize != index {
                return Err(Self::violation(format!("task at index {index} carries number {}", task.number())));
            }
        }
        Ok(())
    }

    /// Invariant 2: the task graph is a DAG with unique source
    /// `initial_task` and unique sink `final_task`.
    fn check_task_dag(&self) -> Result<()> {
        if self.tasks.iter().enumerate().any(|(i, t)| i as u32 != self.initial_task.number() && t.predecessors().is_empty()) {
            return Err(Self::violation("a task other than initial_task has no predecessors"));
        }
        if self.tasks.iter().enumerate().any(|(i, t)| i as u32 != self.final_task.number() && t.successors().is_empty()) {
            return Err(Self::violation("a task other than final_task has no successors"));
        }

        let n = self.tasks.len();
        let mut state = vec![0u8; n]; // 0=unvisited, 1=in-progress, 2=done
        for start in 0..n {
            if state[start] == 0 && self.has_cycle_from(start, &mut state) {
                return Err(Self::violation("task graph contains a cycle"));
            }
        }
        Ok(())
    }

    fn has_cycle_from(&self, node: usize, state: &mut [u8]) -> bool {
        state[node] = 1;
        for succ in self.tasks[node].successors() {
            match state[succ.index()] {
                1 => return true,
                0 if self.has_cycle_from(succ.index(), state) => return true,
                _ => {}
            }
        }
        state[node] = 2;
        false
    }

    /// Invariant 3: `B ∈ K.targets ⇔ K ∈ B.writers`; `B ∈ K.sources ⇔ K ∈ B.readers`.
    fn check_buffer_kernel_back_references(&self) -> Result<()> {
        for kernel in &self.kernels {
            for buffer in kernel.inputs() {
                if !self.buffers[buffer.index()].has_reader(kernel.id()) {
                    return Err(Self::violation(format!("kernel#{} reads buffer#{} but is not in its readers", kernel.number(), buffer)));
                }
            }
            for buffer in kernel.outputs() {
                if !self.buffers[buffer.index()].has_writer(kernel.id()) {
                    return Err(Self::violation(format!("kernel#{} writes buffer#{} but is not in its writers", kernel.number(), buffer)));
                }
            }
        }
        for buffer in &self.buffers {
            for (kernel, _) in buffer.readers() {
                if !self.kernels[kernel.index()].inputs().any(|b| b == buffer.id()) {
                    return Err(Self::violation(format!("buffer#{} lists kernel#{} as reader but kernel has no matching source", buffer.number(), kernel)));
                }
            }
            for (kernel, _) in buffer.writers() {
                if !self.kernels[kernel.index()].outputs().any(|b| b == buffer.id()) {
                    return Err(Self::violation(format!("buffer#{} lists kernel#{} as writer but kernel has no matching target", buffer.number(), kernel)));
                }
            }
        }
        Ok(())
    }

    /// Invariant 4: every load/store named by a kernel's sources/targets
    /// appears in its `instruction_vector` with the expected kind.
    fn check_stencil_membership(&self) -> Result<()> {
        for kernel in &self.kernels {
            for (buffer, stencils) in kernel.sources() {
                for stencil in stencils {
                    for &load in stencil.load_instructions() {
                        let instr = kernel.instruction_vector().get(load.index());
                        match instr {
                            Some(i) if i.is_load() && i.buffer() == Some(*buffer) => {}
                            _ => return Err(Self::violation(format!("kernel#{} stencil references load#{load} not present in its instruction vector", kernel.number()))),
                        }
                    }
                }
            }
            for (buffer, stores) in kernel.targets() {
                for &store in stores {
                    let instr = kernel.instruction_vector().get(store.index());
                    match instr {
                        Some(i) if i.is_store() && i.buffer() == Some(*buffer) => {}
                        _ => return Err(Self::violation(format!("kernel#{} target references store#{store} not present in its instruction vector", kernel.number()))),
                    }
                }
            }
        }
        Ok(())
    }

    /// Invariant 5: every stencil's loads share `output_mask`/`scalings`,
    /// and every member's offset lies within the radius of `center`.
    fn check_stencil_consistency(&self) -> Result<()> {
        for kernel in &self.kernels {
            for (buffer, stencils) in kernel.sources() {
                let buffer_shape = self.buffers[buffer.index()].shape();
                for stencil in stencils {
                    let members: Vec<&Transformation> = stencil
                        .load_instructions()
                        .iter()
                        .map(|&id| kernel.instruction(id).transformation().expect("stencil member must carry a transformation"))
                        .collect();
                    let Some((first, rest)) = members.split_first() else {
                        return Err(Self::violation(format!("kernel#{} has an empty stencil on buffer#{}", kernel.number(), buffer)));
                    };
                    for other in rest {
                        if other.output_mask() != first.output_mask() || other.scalings() != first.scalings() {
                            return Err(Self::violation(format!(
                                "kernel#{} stencil on buffer#{} mixes incompatible output_mask/scalings",
                                kernel.number(),
                                buffer
                            )));
                        }
                    }
                    for member in &members {
                        for (axis, &offset) in member.offsets().iter().enumerate() {
                            if first.output_mask()[axis].is_none() {
                                continue;
                            }
                            let step = buffer_shape.range(axis).step();
                            if (offset - stencil.center()[axis]).abs() > self.stencil_radius * step {
                                return Err(Self::violation(format!(
                                    "kernel#{} stencil on buffer#{} has an out-of-radius member on axis {axis}",
                                    kernel.number(),
                                    buffer
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Invariant 6: `instruction.number` values within a kernel are a
    /// permutation of `[0, |instructions|)`, and every producer's number is
    /// less than every consumer's.
    fn check_instruction_numbering(&self) -> Result<()> {
        for kernel in &self.kernels {
            let instructions = kernel.instruction_vector();
            for (index, instr) in instructions.iter().enumerate() {
                if instr.number() as usize != index {
                    return Err(Self::violation(format!("kernel#{} instruction at index {index} carries number {}", kernel.number(), instr.number())));
                }
                for (_, producer) in instr.inputs() {
                    if producer.number() >= instr.number() {
                        return Err(Self::violation(format!(
                            "kernel#{} instruction#{} consumes producer#{} which is not numbered earlier",
                            kernel.number(),
                            instr.number(),
                            producer
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Invariant 7: the task-membership rules hold: a kernel
    /// belongs to its owning task's `kernels`, and a buffer assigned to a
    /// task appears in that task's `defined_buffers`.
    fn check_task_membership(&self) -> Result<()> {
        for kernel in &self.kernels {
            if !self.tasks[kernel.task().index()].kernels().contains(&kernel.id()) {
                return Err(Self::violation(format!("kernel#{} claims task#{} but is absent from that task's kernels", kernel.number(), kernel.task())));
            }
        }
        for buffer in &self.buffers {
            if let Some(task) = buffer.task() {
                if !self.tasks[task.index()].defined_buffers().contains(&buffer.id()) {
                    return Err(Self::violation(format!("buffer#{} claims task#{} but is absent from that task's defined_buffers", buffer.number(), task)));
                }
            }
        }
        Ok(())
    }
}

impl<N: Ntype, L> Default for Program<N, L> {
    fn default() -> Self {
        Self::new()
    }
}
