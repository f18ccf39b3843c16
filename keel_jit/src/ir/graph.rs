//! Sea-of-Nodes graph structure.
//!
//! The graph owns every node and is the only place where edges change, so
//! every mutation updates both directions of an edge together:
//!
//! - `replace_input` / `append_input` / `insert_input` / `remove_input`
//! - `trim_input_count` / `null_all_inputs` / `kill`
//! - `replace_uses`
//!
//! Node ids are monotonic and never reused. A killed node keeps its id but
//! carries the `DEAD` flag and no inputs.

use rustc_hash::FxHashMap;
use tracing::trace;

use super::arena::Arena;
use super::builders::CommonOperatorBuilder;
use super::node::{Edge, Node, NodeFlags, NodeId};
use super::operators::{Opcode, Operator};
use super::types::Type;

// =============================================================================
// Graph Structure
// =============================================================================

/// A Sea-of-Nodes graph.
#[derive(Clone)]
pub struct Graph {
    nodes: Arena<Node>,

    /// The start node (control and effect entry).
    pub start: NodeId,

    /// The end node (control exit). Its inputs are the graph terminators.
    pub end: NodeId,

    /// Shared `Dead` sentinel, created on first request.
    dead: Option<NodeId>,

    /// Canonical constant nodes.
    constants: FxHashMap<Operator, NodeId>,
}

impl Graph {
    /// A graph with `Start` (no formals) and an `End` without inputs.
    pub fn new() -> Self {
        Self::with_parameters(0)
    }

    /// A graph whose `Start` produces `num_formals` parameters.
    pub fn with_parameters(num_formals: u32) -> Self {
        let common = CommonOperatorBuilder::new();
        let mut nodes = Arena::with_capacity(256);
        let start = nodes.alloc(Node::new(common.start(num_formals), &[]));
        let end = nodes.alloc(Node::new(common.end(0), &[]));
        Graph {
            nodes,
            start,
            end,
            dead: None,
            constants: FxHashMap::default(),
        }
    }

    pub fn set_start(&mut self, start: NodeId) {
        self.start = start;
    }

    pub fn set_end(&mut self, end: NodeId) {
        self.end = end;
    }

    // =========================================================================
    // Node Access
    // =========================================================================

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_valid() {
            self.nodes.get(id)
        } else {
            None
        }
    }

    #[inline]
    pub fn op(&self, id: NodeId) -> &Operator {
        self.nodes[id].op()
    }

    #[inline]
    pub fn opcode(&self, id: NodeId) -> Opcode {
        self.nodes[id].op().opcode()
    }

    #[inline]
    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id].inputs()
    }

    #[inline]
    pub fn input(&self, id: NodeId, index: usize) -> NodeId {
        self.nodes[id].input(index)
    }

    /// One entry per input slot of another node that holds `id`.
    #[inline]
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id].uses()
    }

    #[inline]
    pub fn use_count(&self, id: NodeId) -> usize {
        self.nodes[id].use_count()
    }

    /// Every input slot that points at `id`.
    pub fn use_edges(&self, id: NodeId) -> Vec<Edge> {
        let mut users: Vec<NodeId> = self.uses(id).to_vec();
        users.sort_unstable();
        users.dedup();
        let mut edges = Vec::with_capacity(self.use_count(id));
        for from in users {
            for (index, &input) in self.inputs(from).iter().enumerate() {
                if input == id {
                    edges.push(Edge { from, index, to: id });
                }
            }
        }
        edges
    }

    /// Distinct users of `id`, in first-use order.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = Vec::with_capacity(self.use_count(id));
        for &user in self.uses(id) {
            if !seen.contains(&user) {
                seen.push(user);
            }
        }
        seen
    }

    #[inline]
    pub fn ty(&self, id: NodeId) -> Type {
        self.nodes[id].ty()
    }

    #[inline]
    pub fn set_type(&mut self, id: NodeId, ty: Type) {
        self.nodes[id].set_ty(ty);
    }

    #[inline]
    pub fn is_dead(&self, id: NodeId) -> bool {
        self.nodes[id].is_dead()
    }

    /// Number of ids handed out so far, live or not.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes that have not been killed.
    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|(_, n)| !n.is_dead()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes.ids()
    }

    // =========================================================================
    // Node Creation
    // =========================================================================

    /// Create a node. `inputs` must match the operator's total input count;
    /// `INVALID` slots are allowed and register no use.
    pub fn new_node(&mut self, op: Operator, inputs: &[NodeId]) -> NodeId {
        debug_assert_eq!(
            op.total_input_count() as usize,
            inputs.len(),
            "{} expects {} inputs",
            op,
            op.total_input_count()
        );
        let id = self.nodes.alloc(Node::new(op, inputs));
        for &input in inputs {
            self.add_use(input, id);
        }
        id
    }

    /// Like [`new_node`](Self::new_node) but with a static type.
    pub fn new_typed_node(&mut self, op: Operator, inputs: &[NodeId], ty: Type) -> NodeId {
        let id = self.new_node(op, inputs);
        self.set_type(id, ty);
        id
    }

    /// A copy of `id` with the same operator, inputs and type.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let op = *self.op(id);
        let inputs: Vec<NodeId> = self.inputs(id).to_vec();
        let copy = self.new_node_unchecked(op, &inputs);
        if self.node(id).is_typed() {
            let ty = self.ty(id);
            self.set_type(copy, ty);
        }
        copy
    }

    /// Create a node without checking the input count against `op`.
    /// Used while an arity is being rewritten.
    pub(crate) fn new_node_unchecked(&mut self, op: Operator, inputs: &[NodeId]) -> NodeId {
        let id = self.nodes.alloc(Node::new(op, inputs));
        for &input in inputs {
            self.add_use(input, id);
        }
        id
    }

    /// The shared `Dead` node.
    pub fn dead(&mut self) -> NodeId {
        match self.dead {
            Some(dead) if !self.is_dead(dead) => dead,
            _ => {
                let dead = self.new_node(CommonOperatorBuilder::new().dead(), &[]);
                self.set_type(dead, Type::NONE);
                self.dead = Some(dead);
                dead
            }
        }
    }

    /// Nodes the graph hands out from its caches.
    pub fn cached_nodes(&self) -> Vec<NodeId> {
        self.dead
            .into_iter()
            .chain(self.constants.values().copied())
            .filter(|&id| !self.is_dead(id))
            .collect()
    }

    fn cached_constant(&mut self, op: Operator, ty: Type) -> NodeId {
        if let Some(&id) = self.constants.get(&op) {
            if !self.is_dead(id) {
                return id;
            }
        }
        let id = self.new_typed_node(op, &[], ty);
        self.constants.insert(op, id);
        id
    }

    pub fn int32_constant(&mut self, value: i32) -> NodeId {
        let op = CommonOperatorBuilder::new().int32_constant(value);
        self.cached_constant(op, Type::for_int32_constant(value))
    }

    pub fn int64_constant(&mut self, value: i64) -> NodeId {
        let op = CommonOperatorBuilder::new().int64_constant(value);
        self.cached_constant(op, Type::INTERNAL)
    }

    pub fn float64_constant(&mut self, value: f64) -> NodeId {
        let op = CommonOperatorBuilder::new().float64_constant(value);
        self.cached_constant(op, Type::for_float64_constant(value))
    }

    pub fn number_constant(&mut self, value: f64) -> NodeId {
        let op = CommonOperatorBuilder::new().number_constant(value);
        self.cached_constant(op, Type::for_float64_constant(value))
    }

    pub fn heap_constant(&mut self, handle: u32, ty: Type) -> NodeId {
        let op = CommonOperatorBuilder::new().heap_constant(handle);
        self.cached_constant(op, ty)
    }

    // =========================================================================
    // Use-Def Maintenance
    // =========================================================================

    #[inline]
    fn add_use(&mut self, def: NodeId, user: NodeId) {
        if def.is_valid() {
            self.nodes[def].uses.push(user);
        }
    }

    /// Drop one use entry of `user` from `def`.
    #[inline]
    fn remove_use(&mut self, def: NodeId, user: NodeId) {
        if !def.is_valid() {
            return;
        }
        let uses = &mut self.nodes[def].uses;
        if let Some(pos) = uses.iter().position(|&u| u == user) {
            uses.swap_remove(pos);
        }
    }

    /// Point input slot `index` of `node` at `new_input` (`INVALID` nulls it).
    pub fn replace_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        let old = self.nodes[node].inputs[index];
        if old == new_input {
            return;
        }
        self.remove_use(old, node);
        self.nodes[node].inputs[index] = new_input;
        self.add_use(new_input, node);
    }

    pub fn append_input(&mut self, node: NodeId, input: NodeId) {
        self.nodes[node].inputs.push(input);
        self.add_use(input, node);
    }

    pub fn insert_input(&mut self, node: NodeId, index: usize, input: NodeId) {
        self.nodes[node].inputs.insert(index, input);
        self.add_use(input, node);
    }

    pub fn remove_input(&mut self, node: NodeId, index: usize) {
        let old = self.nodes[node].inputs.remove(index);
        self.remove_use(old, node);
    }

    /// Drop every input at position `count` or later.
    pub fn trim_input_count(&mut self, node: NodeId, count: usize) {
        while self.nodes[node].inputs.len() > count {
            let old = self.nodes[node].inputs.pop().unwrap_or(NodeId::INVALID);
            self.remove_use(old, node);
        }
    }

    /// Null every input slot of `node`, keeping the input count.
    pub fn null_all_inputs(&mut self, node: NodeId) {
        for index in 0..self.nodes[node].inputs.len() {
            self.replace_input(node, index, NodeId::INVALID);
        }
    }

    /// Turn `node` into a tombstone: all inputs are released and the node
    /// is marked dead. Its own uses are left for the caller to rewire.
    pub fn kill(&mut self, node: NodeId) {
        trace!(node = %node, op = %self.op(node), "kill");
        self.null_all_inputs(node);
        self.nodes[node].inputs.clear();
        self.nodes[node].add_flags(NodeFlags::DEAD);
    }

    /// Redirect every use of `old` to `new`.
    pub fn replace_uses(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        for edge in self.use_edges(old) {
            self.replace_input(edge.from, edge.index, new);
        }
    }

    /// Replace the operator of `node` in place. Input arity is the caller's
    /// business.
    pub fn change_op(&mut self, node: NodeId, op: Operator) {
        self.nodes[node].set_op(op);
    }

    /// Mark a node as produced by lowering.
    pub fn mark_lowered(&mut self, node: NodeId) {
        self.nodes[node].add_flags(NodeFlags::LOWERED);
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
