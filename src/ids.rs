//! Arena index newtypes.
//!
//! Cross-references between tasks, kernels,
//! buffers, and instructions are indices into the program's (or kernel's)
//! flat vectors rather than owning pointers — this breaks the cycles that
//! would otherwise exist (kernel -> task -> kernel, buffer -> writer kernel
//! -> buffer, ...) and makes every numbered lookup O(1).

use std::fmt;

macro_rules! arena_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub fn number(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(TaskId, "Index of a [`crate::task::Task`] in a program's task vector.");
arena_id!(KernelId, "Index of a [`crate::kernel::Kernel`] in a program's kernel vector.");
arena_id!(BufferId, "Index of a [`crate::buffer::Buffer`] in a program's buffer vector.");
arena_id!(InstructionId, "Index of an [`crate::instruction::Instruction`] in its owning kernel's instruction vector.");
