//! IR node definitions.
//!
//! A node is an operator applied to an ordered list of inputs. Inputs are
//! partitioned positionally:
//!
//! ```text
//! [ values | context? | frame-states | effects | controls ]
//! ```
//!
//! The width of each section comes from the operator (see
//! [`crate::ir::properties`]). An input slot may hold [`NodeId::INVALID`]
//! after its producer was trimmed away; such a slot contributes no use.
//!
//! Use lists are kept on the node itself but only the [`Graph`] mutates
//! them, so the def-use relation is always the mirror of the use-def one:
//! a node appears in `uses(x)` once per input slot that holds `x`.
//!
//! [`Graph`]: crate::ir::Graph

use smallvec::SmallVec;

use super::arena::Id;
use super::operators::Operator;
use super::types::Type;

// =============================================================================
// Node ID Type Alias
// =============================================================================

/// Unique identifier for a node in the graph.
pub type NodeId = Id<Node>;

/// Most nodes have four inputs or fewer.
pub(crate) type InputVec = SmallVec<[NodeId; 4]>;
pub(crate) type UseVec = SmallVec<[NodeId; 4]>;

// =============================================================================
// Node Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for node properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Node was killed: inputs nulled, no further meaning.
        const DEAD = 1 << 0;
        /// Node has been type-annotated.
        const TYPED = 1 << 1;
        /// Node was created by a lowering pass.
        const LOWERED = 1 << 2;
    }
}

// =============================================================================
// Node
// =============================================================================

/// A node in the graph.
#[derive(Clone)]
pub struct Node {
    op: Operator,
    pub(crate) inputs: InputVec,
    pub(crate) uses: UseVec,
    ty: Type,
    flags: NodeFlags,
}

impl Node {
    pub(crate) fn new(op: Operator, inputs: &[NodeId]) -> Self {
        Node {
            op,
            inputs: SmallVec::from_slice(inputs),
            uses: SmallVec::new(),
            ty: Type::ANY,
            flags: NodeFlags::empty(),
        }
    }

    #[inline]
    pub fn op(&self) -> &Operator {
        &self.op
    }

    #[inline]
    pub(crate) fn set_op(&mut self, op: Operator) {
        self.op = op;
    }

    #[inline]
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    #[inline]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Input at `index`; `INVALID` for a nulled slot.
    #[inline]
    pub fn input(&self, index: usize) -> NodeId {
        self.inputs[index]
    }

    #[inline]
    pub fn uses(&self) -> &[NodeId] {
        &self.uses
    }

    #[inline]
    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    #[inline]
    pub fn ty(&self) -> Type {
        self.ty
    }

    #[inline]
    pub fn set_ty(&mut self, ty: Type) {
        self.ty = ty;
        self.flags |= NodeFlags::TYPED;
    }

    #[inline]
    pub fn is_typed(&self) -> bool {
        self.flags.contains(NodeFlags::TYPED)
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    #[inline]
    pub(crate) fn add_flags(&mut self, flags: NodeFlags) {
        self.flags |= flags;
    }

    /// True once the node has been killed.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.op)?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", input)?;
        }
        write!(f, ")")?;
        if self.is_typed() {
            write!(f, " : {:?}", self.ty)?;
        }
        if self.is_dead() {
            write!(f, " [dead]")?;
        }
        Ok(())
    }
}

// =============================================================================
// Edge
// =============================================================================

/// An input slot: `from.inputs[index] == to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: NodeId,
    pub index: usize,
    pub to: NodeId,
}
