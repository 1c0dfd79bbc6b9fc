//! Tasks: atomic scheduling units — maximal sets of kernels and buffers
//! that must execute together under the task-membership rules.

use crate::ids::{BufferId, KernelId, TaskId};

/// A node of the program's task DAG. `predecessors`/`successors` form a DAG
/// with a single source (`Program::initial_task`) and single sink
/// (`Program::final_task`).
#[derive(Debug, Default)]
pub struct Task {
    number: u32,
    predecessors: Vec<TaskId>,
    successors: Vec<TaskId>,
    kernels: Vec<KernelId>,
    defined_buffers: Vec<BufferId>,
}

impl Task {
    pub(crate) fn new(number: u32) -> Self {
        Self {
            number,
            predecessors: Vec::new(),
            successors: Vec::new(),
            kernels: Vec::new(),
            defined_buffers: Vec::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn id(&self) -> TaskId {
        TaskId(self.number)
    }

    pub fn predecessors(&self) -> &[TaskId] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[TaskId] {
        &self.successors
    }

    pub fn kernels(&self) -> &[KernelId] {
        &self.kernels
    }

    pub fn defined_buffers(&self) -> &[BufferId] {
        &self.defined_buffers
    }

    pub(crate) fn add_predecessor(&mut self, t: TaskId) {
        if !self.predecessors.contains(&t) {
            self.predecessors.push(t);
        }
    }

    pub(crate) fn add_successor(&mut self, t: TaskId) {
        if !self.successors.contains(&t) {
            self.successors.push(t);
        }
    }

    pub(crate) fn add_kernel(&mut self, k: KernelId) {
        if !self.kernels.contains(&k) {
            self.kernels.push(k);
        }
    }

    pub(crate) fn add_defined_buffer(&mut self, b: BufferId) {
        if !self.defined_buffers.contains(&b) {
            self.defined_buffers.push(b);
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task#{} ({} kernels)", self.number, self.kernels.len())
    }
}
