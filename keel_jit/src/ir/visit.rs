//! Generic depth-first graph traversal.
//!
//! Traversal follows either input edges (towards definitions) or use edges
//! (towards users). Each node carries a [`VisitState`]:
//!
//! - `Unvisited`: never entered
//! - `OnStack`: entered, children still being walked
//! - `Revisit`: finished, but its visitor asked to be entered again if
//!   another path reaches it
//! - `Visited`: finished for good
//!
//! A node reached while `OnStack` closes a cycle and is not re-entered.

use super::arena::IdMap;
use super::graph::Graph;
use super::node::{Node, NodeId};

/// Per-node traversal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitState {
    #[default]
    Unvisited,
    OnStack,
    Revisit,
    Visited,
}

/// Which edges a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inputs,
    Uses,
}

/// What a visitor wants after seeing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitAction {
    /// Walk the node's children.
    Continue,
    /// Do not walk the node's children.
    Skip,
    /// Finish the node but enter it again when reached by another path.
    Reenter,
}

/// Callbacks invoked by [`GraphTraversal`].
pub trait GraphVisitor {
    /// Called when a node is entered. Returning `Skip` prunes its children.
    fn pre(&mut self, _graph: &Graph, _node: NodeId) -> VisitAction {
        VisitAction::Continue
    }

    /// Called when all of a node's children are done.
    fn post(&mut self, _graph: &Graph, _node: NodeId) -> VisitAction {
        VisitAction::Continue
    }
}

/// Iterative depth-first traversal with explicit node states.
pub struct GraphTraversal {
    state: IdMap<Node, VisitState>,
    direction: Direction,
}

impl GraphTraversal {
    pub fn new(graph: &Graph, direction: Direction) -> Self {
        GraphTraversal {
            state: IdMap::with_len(graph.node_count()),
            direction,
        }
    }

    pub fn state(&self, node: NodeId) -> VisitState {
        *self.state.get(node)
    }

    /// Walk from every root in order, calling `visitor` on each node.
    pub fn visit<V: GraphVisitor>(&mut self, graph: &Graph, roots: &[NodeId], visitor: &mut V) {
        // (node, next child index)
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        for &root in roots {
            if !self.enter(graph, root, visitor, &mut stack) {
                continue;
            }
            while let Some(&(node, next)) = stack.last() {
                let children = self.children(graph, node);
                if next < children.len() {
                    let child = children[next];
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    self.enter(graph, child, visitor, &mut stack);
                } else {
                    stack.pop();
                    let action = visitor.post(graph, node);
                    self.state.set(
                        node,
                        if action == VisitAction::Reenter {
                            VisitState::Revisit
                        } else {
                            VisitState::Visited
                        },
                    );
                }
            }
        }
    }

    fn children<'g>(&self, graph: &'g Graph, node: NodeId) -> &'g [NodeId] {
        match self.direction {
            Direction::Inputs => graph.inputs(node),
            Direction::Uses => graph.uses(node),
        }
    }

    /// Enter `node` if its state allows; returns whether it was pushed.
    fn enter<V: GraphVisitor>(
        &mut self,
        graph: &Graph,
        node: NodeId,
        visitor: &mut V,
        stack: &mut Vec<(NodeId, usize)>,
    ) -> bool {
        if !node.is_valid() {
            return false;
        }
        match self.state(node) {
            VisitState::Unvisited | VisitState::Revisit => {}
            VisitState::OnStack | VisitState::Visited => return false,
        }
        self.state.set(node, VisitState::OnStack);
        match visitor.pre(graph, node) {
            VisitAction::Continue => {
                stack.push((node, 0));
                true
            }
            VisitAction::Skip | VisitAction::Reenter => {
                let action = visitor.post(graph, node);
                self.state.set(
                    node,
                    if action == VisitAction::Reenter {
                        VisitState::Revisit
                    } else {
                        VisitState::Visited
                    },
                );
                false
            }
        }
    }
}

/// Post-order over inputs from `roots`: every node follows its acyclic inputs.
pub fn post_order(graph: &Graph, roots: &[NodeId]) -> Vec<NodeId> {
    struct Collect(Vec<NodeId>);
    impl GraphVisitor for Collect {
        fn post(&mut self, _graph: &Graph, node: NodeId) -> VisitAction {
            self.0.push(node);
            VisitAction::Continue
        }
    }
    let mut collect = Collect(Vec::new());
    GraphTraversal::new(graph, Direction::Inputs).visit(graph, roots, &mut collect);
    collect.0
}

/// Every node reachable from `End` through input edges.
pub fn reachable_from_end(graph: &Graph) -> Vec<NodeId> {
    post_order(graph, &[graph.end])
}
