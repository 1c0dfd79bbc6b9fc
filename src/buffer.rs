//! Buffers: typed, shaped storage, produced by zero or more kernels and
//! consumed by zero or more kernels.

use crate::ids::{BufferId, InstructionId, KernelId, TaskId};
use crate::ntype::Ntype;
use crate::shape::Shape;
use std::any::Any;

/// How a buffer relates to the dataflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// No writers: an input supplied from outside the program.
    Leaf,
    /// No readers: an output of the program.
    Root,
    /// Both readers and writers.
    Interior,
}

/// A named region of typed storage with a shape.
///
/// `writers`/`readers` are association lists keyed by kernel, preserving
/// insertion order (append, per the decision recorded in `DESIGN.md`) —
/// not a `HashMap`, because traversal order over them is itself part of
/// this crate's observable, tested contract.
#[derive(Debug)]
pub struct Buffer<N: Ntype> {
    number: u32,
    shape: Shape,
    ntype: N,
    /// Generation of this buffer in the original lazy DAG the frontend
    /// built before lowering — opaque bookkeeping carried
    /// through for the backend/scheduler, not interpreted here.
    depth: u32,
    writers: Vec<(KernelId, Vec<InstructionId>)>,
    readers: Vec<(KernelId, Vec<InstructionId>)>,
    /// The task this buffer is defined in. `None` for a leaf buffer not yet
    /// claimed by any task's `defined_buffers` list.
    task: Option<TaskId>,
    /// Backend scratch slot: `None` until a backend allocates storage for
    /// this buffer. Entirely opaque to this crate — a weak,
    /// opaque handle whose lifetime is managed by the backend.
    storage: Option<Box<dyn Any>>,
}

impl<N: Ntype> Buffer<N> {
    pub(crate) fn new(number: u32, shape: Shape, ntype: N, depth: u32) -> Self {
        Self {
            number,
            shape,
            ntype,
            depth,
            writers: Vec::new(),
            readers: Vec::new(),
            task: None,
            storage: None,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn id(&self) -> BufferId {
        BufferId(self.number)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub fn ntype(&self) -> N {
        self.ntype
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    pub(crate) fn set_task(&mut self, task: TaskId) {
        self.task = Some(task);
    }

    pub fn storage(&self) -> Option<&(dyn Any)> {
        self.storage.as_deref()
    }

    pub fn set_storage(&mut self, storage: Box<dyn Any>) {
        self.storage = Some(storage);
    }

    pub fn clear_storage(&mut self) {
        self.storage = None;
    }

    pub fn writers(&self) -> &[(KernelId, Vec<InstructionId>)] {
        &self.writers
    }

    pub fn readers(&self) -> &[(KernelId, Vec<InstructionId>)] {
        &self.readers
    }

    pub fn writer_stores(&self, kernel: KernelId) -> &[InstructionId] {
        find_assoc(&self.writers, kernel)
    }

    pub fn reader_loads(&self, kernel: KernelId) -> &[InstructionId] {
        find_assoc(&self.readers, kernel)
    }

    pub fn has_writer(&self, kernel: KernelId) -> bool {
        self.writers.iter().any(|(k, _)| *k == kernel)
    }

    pub fn has_reader(&self, kernel: KernelId) -> bool {
        self.readers.iter().any(|(k, _)| *k == kernel)
    }

    pub fn kind(&self) -> BufferKind {
        if self.writers.is_empty() {
            BufferKind::Leaf
        } else if self.readers.is_empty() {
            BufferKind::Root
        } else {
            BufferKind::Interior
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind(), BufferKind::Leaf)
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind(), BufferKind::Root)
    }

    /// Element count: the product of the shape's range sizes.
    pub fn size(&self) -> u64 {
        self.shape.size()
    }

    /// Total storage in bits: `ntype.bits() * size()`.
    pub fn bits(&self) -> u64 {
        self.ntype.bits() as u64 * self.size()
    }

    pub(crate) fn record_write(&mut self, kernel: KernelId, store: InstructionId) {
        push_assoc(&mut self.writers, kernel, store);
    }

    pub(crate) fn record_read(&mut self, kernel: KernelId, load: InstructionId) {
        push_assoc(&mut self.readers, kernel, load);
    }

    pub(crate) fn forget_kernel(&mut self, kernel: KernelId) {
        self.writers.retain(|(k, _)| *k != kernel);
        self.readers.retain(|(k, _)| *k != kernel);
    }
}

fn find_assoc(list: &[(KernelId, Vec<InstructionId>)], key: KernelId) -> &[InstructionId] {
    list.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_slice()).unwrap_or(&[])
}

fn push_assoc(list: &mut Vec<(KernelId, Vec<InstructionId>)>, key: KernelId, value: InstructionId) {
    if let Some((_, v)) = list.iter_mut().find(|(k, _)| *k == key) {
        v.push(value);
    } else {
        list.push((key, vec![value]));
    }
}

impl<N: Ntype> std::fmt::Display for Buffer<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer#{} {:?} shape={:?}", self.number, self.ntype, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntype::ScalarNtype;
    use crate::shape::Range;

    fn test_buffer() -> Buffer<ScalarNtype> {
        Buffer::new(0, Shape::new(vec![Range::new(0, 1, 10)]), ScalarNtype::F32, 0)
    }

    #[test]
    fn fresh_buffer_is_leaf() {
        let b = test_buffer();
        assert!(b.is_leaf());
        assert!(!b.is_root());
    }

    #[test]
    fn record_write_then_read_changes_kind() {
        let mut b = test_buffer();
        b.record_write(KernelId(0), InstructionId(0));
        assert_eq!(b.kind(), BufferKind::Root); // no readers yet
        b.record_read(KernelId(1), InstructionId(0));
        assert_eq!(b.kind(), BufferKind::Interior);
    }

    #[test]
    fn size_and_bits() {
        let b = test_buffer();
        assert_eq!(b.size(), 10);
        assert_eq!(b.bits(), 320);
    }

    #[test]
    fn forget_kernel_removes_both_sides() {
        let mut b = test_buffer();
        b.record_write(KernelId(0), InstructionId(0));
        b.record_read(KernelId(1), InstructionId(0));
        b.forget_kernel(KernelId(0));
        assert!(!b.has_writer(KernelId(0)));
        assert!(b.has_reader(KernelId(1)));
    }
}
