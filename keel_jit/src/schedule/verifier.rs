//! Schedule invariants.
//!
//! Checked after every scheduling run when verification is enabled:
//!
//! - the block order starts at the start block and numbers blocks densely
//! - every non-entry block's dominator comes earlier and dominates all of
//!   its forward predecessors
//! - every loop occupies exactly `[header.rpo, header.loop_end)`
//! - every node reachable from `End` is scheduled
//! - inputs are available where they are used: the input's block dominates
//!   the use block (a phi's predecessor for phi inputs) and, within one
//!   block, inputs come first

use tracing::debug_span;

use crate::error::VerifyError;
use crate::ir::{Graph, IdMap, InputLayout, Node, NodeId, NodeProperties};

use super::schedule::{BlockId, Schedule};

pub struct ScheduleVerifier;

impl ScheduleVerifier {
    pub fn run(graph: &Graph, schedule: &Schedule) -> Result<(), VerifyError> {
        let _span = debug_span!("schedule_verifier").entered();
        Self::verify_order(schedule)?;
        Self::verify_dominators(schedule)?;
        Self::verify_loops(schedule)?;
        Self::verify_nodes(graph, schedule)
    }

    fn verify_order(schedule: &Schedule) -> Result<(), VerifyError> {
        let order = schedule.rpo_order();
        match order.first() {
            Some(&first) if first == schedule.start() => {}
            _ => {
                return Err(VerifyError::BadBlock {
                    block: schedule.start(),
                    detail: "start block is not first in the block order",
                })
            }
        }
        let mut seen = vec![false; schedule.block_count()];
        for (i, &block) in order.iter().enumerate() {
            if std::mem::replace(&mut seen[block.index()], true) {
                return Err(VerifyError::BadBlock {
                    block,
                    detail: "block appears twice in the block order",
                });
            }
            if schedule.block(block).rpo_number() != Some(i as u32) {
                return Err(VerifyError::BadBlock {
                    block,
                    detail: "rpo number does not match position",
                });
            }
        }
        // Successors of ordered blocks are ordered too.
        for &block in order {
            for &succ in schedule.block(block).successors() {
                if !seen[succ.index()] {
                    return Err(VerifyError::BadBlock {
                        block: succ,
                        detail: "reachable block missing from the block order",
                    });
                }
            }
        }
        Ok(())
    }

    fn verify_dominators(schedule: &Schedule) -> Result<(), VerifyError> {
        for &block in schedule.rpo_order().iter().skip(1) {
            let b = schedule.block(block);
            let rpo = b.rpo_number().unwrap_or(0);
            let Some(dominator) = b.dominator() else {
                return Err(VerifyError::BadBlock {
                    block,
                    detail: "block has no dominator",
                });
            };
            if schedule.block(dominator).rpo_number().map_or(true, |d| d >= rpo) {
                return Err(VerifyError::BadBlock {
                    block,
                    detail: "dominator does not precede block",
                });
            }
            for &pred in b.predecessors() {
                let forward = schedule.block(pred).rpo_number().is_some_and(|p| p < rpo);
                if forward && !schedule.dominates(dominator, pred) {
                    return Err(VerifyError::BadBlock {
                        block,
                        detail: "dominator does not dominate a predecessor",
                    });
                }
            }
        }
        Ok(())
    }

    fn verify_loops(schedule: &Schedule) -> Result<(), VerifyError> {
        for &header in schedule.rpo_order() {
            let h = schedule.block(header);
            if !h.is_loop_header() {
                continue;
            }
            for &block in schedule.rpo_order() {
                let b = schedule.block(block);
                let in_range = b.rpo_number().is_some_and(|rpo| h.loop_contains(rpo));
                if in_range != Self::in_loop(schedule, block, header) {
                    return Err(VerifyError::LoopNotContiguous { header });
                }
            }
        }
        Ok(())
    }

    /// `header` is on the loop-header chain of `block`.
    fn in_loop(schedule: &Schedule, block: BlockId, header: BlockId) -> bool {
        let mut current = schedule.block(block).loop_header();
        while let Some(h) = current {
            if h == header {
                return true;
            }
            // A header's loop_header is itself; step out through its dominator.
            current = schedule
                .block(h)
                .dominator()
                .and_then(|d| schedule.block(d).loop_header());
        }
        false
    }

    fn verify_nodes(graph: &Graph, schedule: &Schedule) -> Result<(), VerifyError> {
        let reachable = crate::ir::visit::reachable_from_end(graph);
        for &node in &reachable {
            if !schedule.is_scheduled(node) {
                return Err(VerifyError::Unscheduled { node });
            }
        }

        let mut position: IdMap<Node, usize> = IdMap::filled(graph.node_count(), usize::MAX);
        for block in schedule.blocks() {
            for (i, &node) in block.nodes().iter().enumerate() {
                position.set(node, i);
            }
            if let Some(control) = block.control_input() {
                position.set(control, block.nodes().len());
            }
        }

        for &node in &reachable {
            let Some(block) = schedule.block_for(node) else {
                continue;
            };
            let layout = InputLayout::of(graph.op(node));
            let is_phi = NodeProperties::is_phi(graph, node);
            for (index, &input) in graph.inputs(node).iter().enumerate() {
                if !input.is_valid() {
                    continue;
                }
                let Some(input_block) = schedule.block_for(input) else {
                    return Err(VerifyError::Unscheduled { node: input });
                };
                let is_control = index >= layout.control;
                if is_control && layout.past_control - layout.control != 1 {
                    // Merge, Loop and End inputs are block edges.
                    continue;
                }
                let use_block = if is_phi && !is_control {
                    let merge = graph.input(node, layout.control);
                    let pred = graph.input(merge, index);
                    match schedule.block_for(pred) {
                        Some(b) => Self::control_block(graph, schedule, pred).unwrap_or(b),
                        None => block,
                    }
                } else {
                    block
                };
                if !schedule.dominates(input_block, use_block) {
                    return Err(VerifyError::NotDominated {
                        node,
                        input,
                        block: use_block,
                    });
                }
                if input_block == block
                    && !is_phi
                    && !is_control
                    && *position.get(input) >= *position.get(node)
                {
                    return Err(VerifyError::UseBeforeDef {
                        node,
                        input,
                        block,
                    });
                }
            }
        }
        Ok(())
    }

    /// The block a control node leaves through.
    fn control_block(graph: &Graph, schedule: &Schedule, control: NodeId) -> Option<BlockId> {
        let mut current = control;
        while current.is_valid() && !graph.opcode(current).is_basic_block_begin() {
            current = NodeProperties::control_inputs(graph, current)
                .first()
                .copied()
                .unwrap_or(NodeId::INVALID);
        }
        schedule.block_for(current)
    }
}
