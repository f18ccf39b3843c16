//! Fixpoint reduction framework.
//!
//! A [`Reducer`] inspects one node and reports a [`Reduction`]:
//!
//! - `NoChange`: nothing to do
//! - `Changed`: the node was updated in place (operator or inputs)
//! - `Replace(other)`: every use of the node should use `other` instead
//!
//! [`GraphReducer`] drives a set of reducers over the graph until no more
//! reductions apply. Inputs are reduced before their users; when a node
//! changes, its users are queued for another look. When one reducer updates
//! a node in place, the whole reducer list is retried on that node.

use std::collections::VecDeque;

use tracing::{debug, debug_span, trace};

use crate::ir::arena::IdMap;
use crate::ir::graph::Graph;
use crate::ir::node::{Node, NodeId};
use crate::ir::properties::{InputLayout, NodeProperties};
use crate::ir::visit::VisitState;

// =============================================================================
// Reduction
// =============================================================================

/// Outcome of reducing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    NoChange,
    /// The node was updated in place.
    Changed,
    /// Uses of the node should be redirected to the given node.
    Replace(NodeId),
}

impl Reduction {
    #[inline]
    pub fn is_changed(self) -> bool {
        !matches!(self, Reduction::NoChange)
    }

    /// The node that now stands for `node`.
    #[inline]
    pub fn replacement(self, node: NodeId) -> NodeId {
        match self {
            Reduction::Replace(other) => other,
            _ => node,
        }
    }
}

// =============================================================================
// Editor
// =============================================================================

/// Graph access handed to reducers, with hooks back into the driver so that
/// nodes touched as a side effect get reduced again.
pub struct Editor<'a> {
    pub graph: &'a mut Graph,
    state: &'a mut IdMap<Node, VisitState>,
    revisit: &'a mut VecDeque<NodeId>,
}

impl<'a> Editor<'a> {
    /// Queue `node` for another reduction if it is already finished.
    pub fn revisit(&mut self, node: NodeId) {
        if node.is_valid() && *self.state.get(node) == VisitState::Visited {
            self.state.set(node, VisitState::Revisit);
            self.revisit.push_back(node);
        }
    }

    /// Redirect every use of `node` to `replacement`, requeue the users and
    /// the replacement, and kill `node`.
    pub fn replace(&mut self, node: NodeId, replacement: NodeId) {
        if node == replacement {
            return;
        }
        if node == self.graph.start {
            self.graph.set_start(replacement);
        }
        if node == self.graph.end {
            self.graph.set_end(replacement);
        }
        trace!(node = %node, replacement = %replacement, "replace");
        for edge in self.graph.use_edges(node) {
            self.graph.replace_input(edge.from, edge.index, replacement);
            if edge.from != node {
                self.revisit(edge.from);
            }
        }
        self.graph.kill(node);
        self.revisit(replacement);
    }

    /// Redirect uses of `node` by edge kind and requeue the users. `INVALID`
    /// for `effect` or `control` means the node's own input of that kind.
    pub fn replace_with_value(
        &mut self,
        node: NodeId,
        value: NodeId,
        effect: NodeId,
        control: NodeId,
    ) {
        let users = self.graph.users(node);
        NodeProperties::replace_with_value(self.graph, node, value, effect, control);
        for user in users {
            self.revisit(user);
        }
    }

    /// Remove `node` from the effect and control chains by connecting its
    /// effect and control users to its own effect and control inputs.
    pub fn relax_effects_and_controls(&mut self, node: NodeId) {
        let op = *self.graph.op(node);
        let layout = InputLayout::of(&op);
        let effect = if op.effect_input_count() > 0 {
            self.graph.input(node, layout.effect)
        } else {
            NodeId::INVALID
        };
        let control = if op.control_input_count() > 0 {
            self.graph.input(node, layout.control)
        } else {
            NodeId::INVALID
        };
        for edge in self.graph.use_edges(node) {
            let target = if NodeProperties::is_effect_edge(self.graph, edge) {
                effect
            } else if NodeProperties::is_control_edge(self.graph, edge) {
                control
            } else {
                continue;
            };
            self.graph.replace_input(edge.from, edge.index, target);
            self.revisit(edge.from);
        }
    }
}

// =============================================================================
// Reducer
// =============================================================================

/// A local rewrite rule applied to one node at a time.
pub trait Reducer {
    fn name(&self) -> &'static str;

    fn reduce(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction;

    /// Called whenever the work list drains; may queue more nodes.
    fn finalize(&mut self, _editor: &mut Editor<'_>) {}
}

// =============================================================================
// Graph Reducer
// =============================================================================

/// Counters collected while reducing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReducerStats {
    pub reductions: usize,
    pub in_place: usize,
    pub replacements: usize,
}

/// Drives reducers to a fixpoint.
pub struct GraphReducer {
    reducers: Vec<Box<dyn Reducer>>,
    state: IdMap<Node, VisitState>,
    /// (node, index of the next input to look at)
    stack: Vec<(NodeId, usize)>,
    revisit: VecDeque<NodeId>,
    stats: ReducerStats,
}

impl GraphReducer {
    pub fn new() -> Self {
        GraphReducer {
            reducers: Vec::new(),
            state: IdMap::with_len(0),
            stack: Vec::new(),
            revisit: VecDeque::new(),
            stats: ReducerStats::default(),
        }
    }

    pub fn add_reducer<R: Reducer + 'static>(&mut self, reducer: R) {
        self.reducers.push(Box::new(reducer));
    }

    pub fn stats(&self) -> ReducerStats {
        self.stats
    }

    /// Reduce everything reachable from `End`.
    pub fn reduce_graph(&mut self, graph: &mut Graph) {
        let end = graph.end;
        self.reduce_node(graph, end);
    }

    /// Reduce `root` and everything it reaches, then everything requeued.
    pub fn reduce_node(&mut self, graph: &mut Graph, root: NodeId) {
        let names: Vec<&str> = self.reducers.iter().map(|r| r.name()).collect();
        let _span = debug_span!("reduce", reducers = ?names).entered();
        debug_assert!(self.stack.is_empty() && self.revisit.is_empty());

        self.state = IdMap::with_len(graph.node_count());
        self.push(root);
        loop {
            if !self.stack.is_empty() {
                self.reduce_top(graph);
            } else if let Some(node) = self.revisit.pop_front() {
                // State can change while queued.
                if *self.state.get(node) == VisitState::Revisit {
                    self.push(node);
                }
            } else {
                let mut editor = Editor {
                    graph: &mut *graph,
                    state: &mut self.state,
                    revisit: &mut self.revisit,
                };
                for reducer in &mut self.reducers {
                    reducer.finalize(&mut editor);
                }
                if self.revisit.is_empty() {
                    break;
                }
            }
        }
        debug!(
            reductions = self.stats.reductions,
            replacements = self.stats.replacements,
            "reduction fixpoint reached"
        );
    }

    fn reduce_top(&mut self, graph: &mut Graph) {
        let Some(&(node, input_index)) = self.stack.last() else {
            return;
        };
        if graph.is_dead(node) {
            self.pop();
            return;
        }

        // Recurse on an input first, resuming where we left off.
        if self.recurse_on_inputs(graph, node, input_index) {
            return;
        }

        let max_id = graph.node_count();
        let reduction = self.reduce(graph, node);
        if !reduction.is_changed() {
            self.pop();
            return;
        }
        self.stats.reductions += 1;

        let replacement = reduction.replacement(node);
        if replacement == node {
            self.stats.in_place += 1;
            for user in graph.users(node) {
                self.revisit_node(user);
            }
            // The update may have introduced new inputs.
            if self.recurse_on_inputs(graph, node, 0) {
                return;
            }
        }

        self.pop();

        if replacement != node {
            self.stats.replacements += 1;
            self.replace(graph, node, replacement, max_id);
        }
    }

    /// Push the first unfinished input of the node on top of the stack,
    /// scanning from `start` and wrapping around. Returns whether something
    /// was pushed.
    fn recurse_on_inputs(&mut self, graph: &Graph, node: NodeId, start: usize) -> bool {
        let top = self.stack.len() - 1;
        let inputs = graph.inputs(node);
        let start = if start < inputs.len() { start } else { 0 };
        for i in (start..inputs.len()).chain(0..start) {
            let input = inputs[i];
            if input != node && self.recurse(input) {
                self.stack[top].1 = i + 1;
                return true;
            }
        }
        false
    }

    /// Apply the reducers in order. An in-place change restarts the list,
    /// skipping the reducer that made it.
    fn reduce(&mut self, graph: &mut Graph, node: NodeId) -> Reduction {
        let mut editor = Editor {
            graph,
            state: &mut self.state,
            revisit: &mut self.revisit,
        };
        let mut skip: Option<usize> = None;
        let mut i = 0;
        while i < self.reducers.len() {
            if skip != Some(i) {
                let reducer = &mut self.reducers[i];
                match reducer.reduce(&mut editor, node) {
                    Reduction::NoChange => {}
                    Reduction::Changed => {
                        trace!(reducer = reducer.name(), node = %node, "changed in place");
                        skip = Some(i);
                        i = 0;
                        continue;
                    }
                    Reduction::Replace(other) if other == node => {
                        skip = Some(i);
                        i = 0;
                        continue;
                    }
                    Reduction::Replace(other) => {
                        trace!(reducer = reducer.name(), node = %node, replacement = %other, "replaced");
                        return Reduction::Replace(other);
                    }
                }
            }
            i += 1;
        }
        if skip.is_some() {
            Reduction::Changed
        } else {
            Reduction::NoChange
        }
    }

    fn replace(&mut self, graph: &mut Graph, node: NodeId, replacement: NodeId, max_id: usize) {
        if node == graph.start {
            graph.set_start(replacement);
        }
        if node == graph.end {
            graph.set_end(replacement);
        }
        if replacement.as_usize() < max_id {
            // An existing node: its new users may open up further reductions.
            for edge in graph.use_edges(node) {
                graph.replace_input(edge.from, edge.index, replacement);
                if edge.from != node {
                    self.revisit_node(edge.from);
                }
            }
            graph.kill(node);
            self.revisit_node(replacement);
        } else {
            // A fresh node: only old users move over, so the replacement
            // itself may still refer to `node`.
            for edge in graph.use_edges(node) {
                if edge.from.as_usize() < max_id {
                    graph.replace_input(edge.from, edge.index, replacement);
                    if edge.from != node {
                        self.revisit_node(edge.from);
                    }
                }
            }
            if graph.use_count(node) == 0 {
                graph.kill(node);
            }
            self.recurse(replacement);
        }
    }

    fn push(&mut self, node: NodeId) {
        debug_assert_ne!(*self.state.get(node), VisitState::OnStack);
        self.state.set(node, VisitState::OnStack);
        self.stack.push((node, 0));
    }

    fn pop(&mut self) {
        if let Some((node, _)) = self.stack.pop() {
            self.state.set(node, VisitState::Visited);
        }
    }

    fn recurse(&mut self, node: NodeId) -> bool {
        if !node.is_valid() {
            return false;
        }
        match *self.state.get(node) {
            VisitState::Unvisited | VisitState::Revisit => {
                self.push(node);
                true
            }
            VisitState::OnStack | VisitState::Visited => false,
        }
    }

    fn revisit_node(&mut self, node: NodeId) {
        if *self.state.get(node) == VisitState::Visited {
            self.state.set(node, VisitState::Revisit);
            self.revisit.push_back(node);
        }
    }
}

impl Default for GraphReducer {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
