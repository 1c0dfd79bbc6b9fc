//! Instruction nodes forming a kernel's per-iteration-point DAG.
//!
//! Four variants, a closed sum type: `Call` (apply an
//! external function, possibly fanning out to several values), `Iref`
//! (derive a 1-D integer from the iteration index — used for e.g. iota),
//! `Load` (read a buffer element) and `Store` (write one). The three
//! iterating variants additionally carry a [`Transformation`] from
//! iteration index to a 1-D output or a buffer index.

use crate::ids::{BufferId, InstructionId};
use crate::transform::Transformation;

/// An external function descriptor (a `fnrecord`) — opaque to this
/// crate, supplied by whatever staged the `call` upstream. Only the
/// information this IR actually consults (a display name, for diagnostics,
/// and arity) is modeled here; the callable itself is a backend concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnRecord {
    pub name: String,
    pub arity: u32,
}

impl FnRecord {
    pub fn new(name: impl Into<String>, arity: u32) -> Self {
        Self { name: name.into(), arity }
    }
}

/// The variant-specific payload of an instruction. Shared fields
/// (`inputs`, `number`) live on [`Instruction`] itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// Applies an external function to `inputs`, producing
    /// `number_of_values` output values.
    Call { fnrecord: FnRecord, number_of_values: u32 },
    /// Derives a 1-D integer from the iteration index via `transformation`.
    Iref { transformation: Transformation },
    /// Reads one element of `buffer` at the index `transformation` maps the
    /// current iteration point to.
    Load { buffer: BufferId, transformation: Transformation },
    /// Writes the single value in `inputs` to `buffer` at the index
    /// `transformation` maps the current iteration point to.
    Store { buffer: BufferId, transformation: Transformation },
}

/// One node of a kernel's instruction DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Unique within the owning kernel; assigned in depth-first post-order
    /// from the leaves, so a producer's number is always less than every
    /// consumer's.
    number: u32,
    /// `(value_index, producer)` pairs: which value of which earlier
    /// instruction feeds each of this instruction's operands, in order.
    inputs: Vec<(u32, InstructionId)>,
    kind: InstructionKind,
}

impl Instruction {
    pub fn new(number: u32, inputs: Vec<(u32, InstructionId)>, kind: InstructionKind) -> Self {
        Self { number, inputs, kind }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: u32) {
        self.number = number;
    }

    pub fn inputs(&self) -> &[(u32, InstructionId)] {
        &self.inputs
    }

    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut InstructionKind {
        &mut self.kind
    }

    /// How many distinct values this instruction produces.
    pub fn number_of_values(&self) -> u32 {
        match &self.kind {
            InstructionKind::Call { number_of_values, .. } => *number_of_values,
            InstructionKind::Iref { .. } => 1,
            InstructionKind::Load { .. } => 1,
            InstructionKind::Store { .. } => 0,
        }
    }

    /// `true` iff this instruction carries a [`Transformation`] (Iref,
    /// Load, Store — the "iterating" variants).
    pub fn is_iterating(&self) -> bool {
        self.transformation().is_some()
    }

    /// The transformation carried by iterating variants, if any.
    pub fn transformation(&self) -> Option<&Transformation> {
        match &self.kind {
            InstructionKind::Iref { transformation }
            | InstructionKind::Load { transformation, .. }
            | InstructionKind::Store { transformation, .. } => Some(transformation),
            InstructionKind::Call { .. } => None,
        }
    }

    pub fn transformation_mut(&mut self) -> Option<&mut Transformation> {
        match &mut self.kind {
            InstructionKind::Iref { transformation }
            | InstructionKind::Load { transformation, .. }
            | InstructionKind::Store { transformation, .. } => Some(transformation),
            InstructionKind::Call { .. } => None,
        }
    }

    /// The buffer a `Load`/`Store` references, if this is one of those.
    pub fn buffer(&self) -> Option<BufferId> {
        match &self.kind {
            InstructionKind::Load { buffer, .. } | InstructionKind::Store { buffer, .. } => Some(*buffer),
            _ => None,
        }
    }

    pub fn is_load(&self) -> bool {
        matches!(self.kind, InstructionKind::Load { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self.kind, InstructionKind::Store { .. })
    }
}

/// Abbreviated, cycle-safe printed form: the number and inputs as
/// `(value_index, producer_number)` pairs, never recursing into a
/// producer's own `Debug` — doing so from a single `{:?}` on a load buried
/// deep in a DAG would print the whole upstream graph.
impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            InstructionKind::Call { fnrecord, number_of_values } => {
                format!("call {}/{}", fnrecord.name, number_of_values)
            }
            InstructionKind::Iref { .. } => "iref".to_string(),
            InstructionKind::Load { buffer, .. } => format!("load b{}", buffer.number()),
            InstructionKind::Store { buffer, .. } => format!("store b{}", buffer.number()),
        };
        write!(f, "%{} = {} (", self.number, kind)?;
        for (i, (value_index, producer)) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:%{}", value_index, producer.number())?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_of_values_matches_variant() {
        let store = Instruction::new(
            0,
            vec![(0, InstructionId(0))],
            InstructionKind::Store { buffer: BufferId(0), transformation: Transformation::identity(1) },
        );
        assert_eq!(store.number_of_values(), 0);

        let call = Instruction::new(
            1,
            vec![],
            InstructionKind::Call { fnrecord: FnRecord::new("sin", 1), number_of_values: 1 },
        );
        assert_eq!(call.number_of_values(), 1);
    }

    #[test]
    fn display_does_not_recurse_into_producers() {
        let load = Instruction::new(
            3,
            vec![(0, InstructionId(2))],
            InstructionKind::Load { buffer: BufferId(1), transformation: Transformation::identity(1) },
        );
        let text = load.to_string();
        assert!(text.contains("%3"));
        assert!(text.contains("0:%2"));
    }
}
