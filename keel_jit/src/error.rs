use thiserror::Error;

use crate::ir::{NodeId, Opcode};
use crate::schedule::BlockId;

pub type Result<T> = std::result::Result<T, CompileError>;

/// A structural invariant of the graph or of a schedule does not hold.
///
/// Every variant names the offending node or block so that a failing
/// verification can be traced back to the pass that broke it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("node {node} ({opcode}) has {actual} inputs, operator expects {expected}")]
    InputCount {
        node: NodeId,
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("node {node} uses {input} but is missing from its use list")]
    MissingUse { node: NodeId, input: NodeId },

    #[error("node {node} is listed as a user of {def} without a matching input")]
    DanglingUse { node: NodeId, def: NodeId },

    #[error("live node {node} has input {index} pointing at killed node {input}")]
    KilledInput {
        node: NodeId,
        index: usize,
        input: NodeId,
    },

    #[error("node {node} input {index} ({input}) must be a {expected} node")]
    InputKind {
        node: NodeId,
        index: usize,
        input: NodeId,
        expected: &'static str,
    },

    #[error("node {node} ({opcode}) has no inputs to merge")]
    EmptyMerge { node: NodeId, opcode: Opcode },

    #[error("node {node}: {detail}")]
    Malformed { node: NodeId, detail: &'static str },

    #[error("node {node} reachable from end but not scheduled")]
    Unscheduled { node: NodeId },

    #[error("input {input} of node {node} does not dominate block {block}")]
    NotDominated {
        node: NodeId,
        input: NodeId,
        block: BlockId,
    },

    #[error("input {input} of node {node} is scheduled after it in block {block}")]
    UseBeforeDef {
        node: NodeId,
        input: NodeId,
        block: BlockId,
    },

    #[error("block {block}: {detail}")]
    BadBlock { block: BlockId, detail: &'static str },

    #[error("loop headed by block {header} is not contiguous in the block order")]
    LoopNotContiguous { header: BlockId },
}

/// Failure of a compilation pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("{pass}: no lowering for {opcode}")]
    Unimplemented { pass: &'static str, opcode: Opcode },

    #[error("floating control still present after {rounds} scheduling rounds")]
    FloatingControl { rounds: usize },

    #[error("no OSR entry in graph")]
    NoOsrEntry,

    #[error("OSR entry into loop {header}: {detail}")]
    OsrShape { header: NodeId, detail: &'static str },

    #[error("loop {header} is not closed: {node} is used outside the loop without a loop exit")]
    LoopNotClosed { header: NodeId, node: NodeId },
}
