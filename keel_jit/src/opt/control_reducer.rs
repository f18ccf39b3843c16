//! Control reducer: graph trimming.
//!
//! `trim_graph` marks everything reachable from `End` over any edge kind
//! (plus the graph's cached nodes) and severs the input edges of every
//! other node, so that unreachable subgraphs no longer show up as uses of
//! live nodes. Trimmed nodes keep their operator; they are simply
//! disconnected.

use std::collections::VecDeque;

use tracing::{debug, debug_span, trace};

use crate::ir::node::NodeId;
use crate::ir::{Graph, IdSet, Node};

/// Result of one trim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimStats {
    /// Nodes reachable from `End`.
    pub live: usize,
    /// Unreachable nodes that had at least one input severed.
    pub trimmed_nodes: usize,
    /// Input edges nulled.
    pub severed_edges: usize,
}

pub struct ControlReducer;

impl ControlReducer {
    /// Sever every edge out of a node not reachable from `End`. Running it
    /// again on the result changes nothing.
    pub fn trim_graph(graph: &mut Graph) -> TrimStats {
        let _span = debug_span!("trim_graph").entered();
        let live = Self::mark_live(graph);

        let mut stats = TrimStats {
            live: live.count(),
            ..TrimStats::default()
        };
        let candidates: Vec<NodeId> = graph
            .iter()
            .filter(|(id, node)| !node.is_dead() && !live.contains(*id))
            .map(|(id, _)| id)
            .collect();
        for node in candidates {
            let mut severed = 0;
            for index in 0..graph.node(node).input_count() {
                let input = graph.input(node, index);
                if !input.is_valid() {
                    continue;
                }
                trace!(
                    from = %node,
                    index,
                    to = %input,
                    live_target = live.contains(input),
                    "dead link"
                );
                graph.replace_input(node, index, NodeId::INVALID);
                severed += 1;
            }
            if severed > 0 {
                stats.trimmed_nodes += 1;
                stats.severed_edges += severed;
            }
        }
        debug!(
            live = stats.live,
            trimmed = stats.trimmed_nodes,
            severed = stats.severed_edges,
            "trimmed graph"
        );
        stats
    }

    /// Breadth-first walk over inputs from `End` and the cached nodes.
    fn mark_live(graph: &Graph) -> IdSet<Node> {
        let mut live = IdSet::with_capacity(graph.node_count());
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let roots = std::iter::once(graph.end).chain(graph.cached_nodes());
        for root in roots {
            if root.is_valid() && !graph.is_dead(root) && live.insert(root) {
                queue.push_back(root);
            }
        }
        while let Some(node) = queue.pop_front() {
            for &input in graph.inputs(node) {
                if input.is_valid() && live.insert(input) {
                    queue.push_back(input);
                }
            }
        }
        live
    }
}

// =============================================================================
// Tests
// =============================================================================
