//! Loop peeling.
//!
//! Peeling copies one iteration of a loop in front of it:
//!
//! ```text
//!   entry ──► Loop ◄─┐             entry ──► peeled body ──► Loop ◄─┐
//!             body ──┘     ==>                    │          body ──┘
//!             exit                        exit' ──┴── Merge ◄── exit
//! ```
//!
//! Every member of the loop other than the header and its phis is cloned.
//! In the copy, the header stands for the loop's entry control and each
//! header phi for its entry value. The copied back edges then become the
//! loop's new entry, and each exit is merged with its copy so that values
//! leaving the loop are phis over both paths.
//!
//! Only closed loops can be peeled: every use outside the loop must go
//! through a `LoopExit`, `LoopExitValue` or `LoopExitEffect`.

use rustc_hash::FxHashMap;
use tracing::{debug, debug_span, trace};

use crate::error::{CompileError, Result};
use crate::ir::{CommonOperatorBuilder, Graph, NodeId, NodeProperties, Opcode};

use super::loop_finder::LoopInfo;

/// What one peel did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeelStats {
    /// Loop body nodes copied.
    pub copied: usize,
    /// Loop exits merged with their peeled counterparts.
    pub exits: usize,
}

#[derive(Debug, Default)]
pub struct LoopPeeler {
    common: CommonOperatorBuilder,
}

impl LoopPeeler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peel(&self, graph: &mut Graph, info: &LoopInfo) -> Result<PeelStats> {
        let header = info.header();
        let _span = debug_span!("peel_loop", header = %header).entered();
        if let Some(node) = info.escape() {
            return Err(CompileError::LoopNotClosed { header, node });
        }

        let header_phis: Vec<NodeId> = graph
            .users(header)
            .into_iter()
            .filter(|&u| {
                NodeProperties::is_phi(graph, u)
                    && NodeProperties::control_inputs(graph, u).first() == Some(&header)
            })
            .collect();

        // In the peeled iteration the header is its entry and each phi its
        // entry value.
        let mut copies: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        copies.insert(header, graph.input(header, 0));
        for &phi in &header_phis {
            copies.insert(phi, graph.input(phi, 0));
        }

        let body: Vec<NodeId> = info
            .members()
            .iter()
            .copied()
            .filter(|n| !copies.contains_key(n))
            .collect();
        for &node in &body {
            let copy = graph.clone_node(node);
            trace!(node = %node, copy = %copy, "peeled");
            copies.insert(node, copy);
        }
        for &node in &body {
            let copy = copies[&node];
            for index in 0..graph.inputs(copy).len() {
                let input = graph.input(copy, index);
                if let Some(&mapped) = copies.get(&input) {
                    graph.replace_input(copy, index, mapped);
                }
            }
        }
        let peeled = |node: NodeId| copies.get(&node).copied().unwrap_or(node);

        self.enter_through_peeled_iteration(graph, header, &header_phis, &peeled);

        let mut stats = PeelStats {
            copied: body.len(),
            exits: 0,
        };
        for &exit in info.exits() {
            if graph.opcode(exit) == Opcode::LoopExit {
                self.merge_exit(graph, exit, &peeled);
                stats.exits += 1;
            }
        }
        debug!(copied = stats.copied, exits = stats.exits, "peeled loop");
        Ok(stats)
    }

    /// Route the copied back edges into the header's entry.
    fn enter_through_peeled_iteration(
        &self,
        graph: &mut Graph,
        header: NodeId,
        header_phis: &[NodeId],
        peeled: &dyn Fn(NodeId) -> NodeId,
    ) {
        let back_edges = graph.inputs(header).len() - 1;
        let entry = if back_edges == 1 {
            peeled(graph.input(header, 1))
        } else {
            let controls: Vec<NodeId> = graph.inputs(header)[1..].iter().map(|&c| peeled(c)).collect();
            graph.new_node(self.common.merge(back_edges as u32), &controls)
        };

        for &phi in header_phis {
            let value = if back_edges == 1 {
                peeled(graph.input(phi, 1))
            } else {
                let mut inputs: Vec<NodeId> = graph.inputs(phi)[1..=back_edges]
                    .iter()
                    .map(|&v| peeled(v))
                    .collect();
                inputs.push(entry);
                let op = self
                    .common
                    .resize_merge_or_phi(graph.op(phi), back_edges as u32);
                graph.new_node(op, &inputs)
            };
            graph.replace_input(phi, 0, value);
        }
        graph.replace_input(header, 0, entry);
    }

    /// Merge `exit` with the peeled iteration's way out, and phi the values
    /// and effects leaving through it.
    fn merge_exit(&self, graph: &mut Graph, exit: NodeId, peeled: &dyn Fn(NodeId) -> NodeId) {
        let exit_values: Vec<NodeId> = graph
            .users(exit)
            .into_iter()
            .filter(|&u| {
                matches!(graph.opcode(u), Opcode::LoopExitValue | Opcode::LoopExitEffect)
                    && NodeProperties::control_inputs(graph, u).first() == Some(&exit)
            })
            .collect();

        let peeled_exit = peeled(graph.input(exit, 0));
        let merge = graph.new_node(self.common.merge(2), &[exit, peeled_exit]);
        graph.replace_uses(exit, merge);
        graph.replace_input(merge, 0, exit);
        for &value in &exit_values {
            let index = graph.inputs(value).len() - 1;
            graph.replace_input(value, index, exit);
        }

        for value in exit_values {
            let op = if graph.opcode(value) == Opcode::LoopExitValue {
                self.common.phi(graph.op(value).phi_representation(), 2)
            } else {
                self.common.effect_phi(2)
            };
            let peeled_value = peeled(graph.input(value, 0));
            let phi = graph.new_node(op, &[value, peeled_value, merge]);
            graph.replace_uses(value, phi);
            graph.replace_input(phi, 0, value);
        }
    }
}
