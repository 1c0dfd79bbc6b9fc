//! Post-lowering intermediate representation for a lazy, parallel
//! array-programming compiler.
//!
//! A [`Program`](program::Program) is a DAG of [`Task`](task::Task)s, each
//! owning zero or more [`Kernel`](kernel::Kernel)s — parametric loop nests
//! over an iteration [`Shape`](shape::Shape) that read and write
//! [`Buffer`](buffer::Buffer)s through an embedded instruction DAG. Loads
//! on the same buffer that share an access pattern cluster into
//! [`Stencil`](stencil::Stencil)s; [`rewrite::transform_kernel`] and
//! [`rewrite::transform_buffer`] apply semantics-preserving affine
//! [`Transformation`](transform::Transformation)s to either side of that
//! graph, and [`analysis`] estimates how much cache reuse a given axis
//! ordering buys.

pub mod analysis;
pub mod buffer;
pub mod error;
pub mod ids;
pub mod instruction;
pub mod kernel;
pub mod ntype;
pub mod program;
pub mod rewrite;
pub mod shape;
pub mod stencil;
pub mod task;
pub mod traverse;
pub mod transform;

pub use buffer::{Buffer, BufferKind};
pub use error::{IrError, Result, TransformError};
pub use ids::{BufferId, InstructionId, KernelId, TaskId};
pub use instruction::{FnRecord, Instruction, InstructionKind};
pub use kernel::Kernel;
pub use ntype::{Ntype, ScalarNtype};
pub use program::Program;
pub use shape::{Range, Shape};
pub use stencil::{Stencil, STENCIL_MAX_RADIUS};
pub use task::Task;
pub use transform::Transformation;
