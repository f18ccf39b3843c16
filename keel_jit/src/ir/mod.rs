//! Sea-of-Nodes intermediate representation.
//!
//! # Core Components
//!
//! - **Operators** (`operators.rs`, `builders/`): what a node computes
//! - **Arena** (`arena.rs`): typed ids and dense side tables
//! - **Node / Graph** (`node.rs`, `graph.rs`): storage with def-use symmetry
//! - **Properties** (`properties.rs`): positional input sections
//! - **Visit** (`visit.rs`): depth-first traversal with visit states
//! - **Verifier** (`verifier.rs`): structural invariants
//! - **Types** (`types.rs`, `machine_type.rs`): static types and
//!   machine representations

pub mod arena;
pub mod builders;
mod display;
pub mod graph;
pub mod machine_type;
pub mod node;
pub mod operators;
pub mod properties;
pub mod types;
pub mod verifier;
pub mod visit;

pub use arena::{Arena, Id, IdMap, IdSet};
pub use builders::{
    CommonOperatorBuilder, JsOperatorBuilder, MachineOperatorBuilder, SimplifiedOperatorBuilder,
};
pub use graph::Graph;
pub use machine_type::MachineType;
pub use node::{Edge, Node, NodeFlags, NodeId};
pub use operators::{
    BranchHint, CallDescriptor, CallKind, ElementAccess, FieldAccess, FrameStateCallInfo,
    FrameStateKind, IrLevel, OpParam, Opcode, Operator, Properties, StoreRepresentation,
    WriteBarrierKind,
};
pub use properties::{InputLayout, NodeProperties};
pub use types::Type;
pub use verifier::Verifier;
