//! Deconstruction of on-stack-replacement graphs.
//!
//! An OSR graph has two entries hanging off `Start`: `OsrNormalEntry`, the
//! ordinary function entry, and `OsrLoopEntry`, an extra input of the loop
//! header that execution jumps into mid-loop. Values live at that point are
//! `OsrValue` nodes controlled by the loop entry and feed the header's phis.
//!
//! Deconstruction makes the loop entry the only entry:
//!
//! 1. the header's OSR input is swapped into the entry position (input 0),
//!    and its phis are permuted to match
//! 2. uses of `OsrLoopEntry` move to `Start`, and uses of `OsrNormalEntry`
//!    to `Dead`
//! 3. trimming plus dead-code elimination remove the normal entry path and
//!    the dead loop inputs

use tracing::{debug, debug_span};

use crate::error::{CompileError, Result};
use crate::ir::{Graph, NodeId, NodeProperties, Opcode};
use crate::opt::control_reducer::{ControlReducer, TrimStats};
use crate::opt::dead_code::DeadCodeElimination;
use crate::opt::reducer::GraphReducer;

use super::loop_finder::LoopTree;

/// What one deconstruction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsrStats {
    /// The loop execution now enters first.
    pub header: NodeId,
    /// Header input that carried the OSR entry.
    pub entry_index: usize,
    pub trim: TrimStats,
}

pub struct OsrDeconstructor;

impl OsrDeconstructor {
    pub fn deconstruct(graph: &mut Graph) -> Result<OsrStats> {
        let _span = debug_span!("osr_deconstruct").entered();
        let (normal_entry, loop_entry) = Self::find_entries(graph)?;

        let header = graph
            .users(loop_entry)
            .into_iter()
            .find(|&u| graph.opcode(u) == Opcode::Loop)
            .ok_or(CompileError::OsrShape {
                header: loop_entry,
                detail: "OSR loop entry does not enter a loop",
            })?;
        if LoopTree::build(graph)
            .loop_of(header)
            .is_some_and(|l| l.parent().is_some())
        {
            return Err(CompileError::OsrShape {
                header,
                detail: "OSR entry into a nested loop",
            });
        }
        let entry_index = graph
            .inputs(header)
            .iter()
            .position(|&i| i == loop_entry)
            .ok_or(CompileError::OsrShape {
                header,
                detail: "loop lost its OSR input",
            })?;

        if entry_index != 0 {
            Self::swap_inputs(graph, header, entry_index);
            let phis: Vec<NodeId> = graph
                .users(header)
                .into_iter()
                .filter(|&u| NodeProperties::is_phi(graph, u))
                .collect();
            for phi in phis {
                Self::swap_inputs(graph, phi, entry_index);
            }
        }

        let start = graph.start;
        graph.replace_uses(loop_entry, start);
        graph.kill(loop_entry);
        let dead = graph.dead();
        graph.replace_uses(normal_entry, dead);
        graph.kill(normal_entry);

        ControlReducer::trim_graph(graph);
        let mut reducer = GraphReducer::new();
        reducer.add_reducer(DeadCodeElimination::new());
        reducer.reduce_graph(graph);
        let trim = ControlReducer::trim_graph(graph);

        debug!(header = %header, entry_index, live = trim.live, "deconstructed OSR graph");
        Ok(OsrStats {
            header,
            entry_index,
            trim,
        })
    }

    fn find_entries(graph: &Graph) -> Result<(NodeId, NodeId)> {
        let mut normal = None;
        let mut loop_entry = None;
        for node in crate::ir::visit::reachable_from_end(graph) {
            let slot = match graph.opcode(node) {
                Opcode::OsrNormalEntry => &mut normal,
                Opcode::OsrLoopEntry => &mut loop_entry,
                _ => continue,
            };
            if slot.replace(node).is_some() {
                return Err(CompileError::OsrShape {
                    header: node,
                    detail: "more than one OSR entry",
                });
            }
        }
        match (normal, loop_entry) {
            (Some(normal), Some(loop_entry)) => Ok((normal, loop_entry)),
            _ => Err(CompileError::NoOsrEntry),
        }
    }

    fn swap_inputs(graph: &mut Graph, node: NodeId, index: usize) {
        let first = graph.input(node, 0);
        let other = graph.input(node, index);
        graph.replace_input(node, 0, other);
        graph.replace_input(node, index, first);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{MachineType, Verifier};
    use crate::schedule::{ScheduleVerifier, Scheduler, SchedulerConfig};
    use crate::testing::GraphFixture;

    struct OsrGraph {
        header: NodeId,
        phi: NodeId,
        osr_value: NodeId,
        next: NodeId,
        normal: NodeId,
    }

    fn osr_loop(f: &mut GraphFixture) -> OsrGraph {
        let p0 = f.parameter(0);
        let start = f.graph.start;
        let (zero, one) = (f.int32(0), f.int32(1));
        let normal = f.graph.new_node(f.common.osr_normal_entry(), &[start, start]);
        let entry = f.graph.new_node(f.common.osr_loop_entry(), &[start, start]);
        let osr_value = f.graph.new_node(f.common.osr_value(0), &[entry]);
        let header = f.graph.new_node(f.common.loop_(3), &[normal, start, entry]);
        let phi = f.phi(MachineType::MACH_INT32, &[zero, zero, osr_value], header);
        let cmp = f.graph.new_node(f.machine.int32_less_than(), &[phi, p0]);
        let (body, out) = f.branch(cmp, header);
        let next = f.graph.new_node(f.machine.int32_add(), &[phi, one]);
        f.graph.replace_input(header, 1, body);
        f.graph.replace_input(phi, 1, next);
        let exit = f.graph.new_node(f.common.loop_exit(), &[out, header]);
        let value = f
            .graph
            .new_node(f.common.loop_exit_value(MachineType::MACH_INT32), &[phi, exit]);
        f.ret(value, start, exit);
        OsrGraph {
            header,
            phi,
            osr_value,
            next,
            normal,
        }
    }

    #[test]
    fn test_loop_entry_becomes_function_entry() {
        let mut f = GraphFixture::new(1);
        let g = osr_loop(&mut f);

        let stats = OsrDeconstructor::deconstruct(&mut f.graph).unwrap();
        assert_eq!(stats.header, g.header);
        assert_eq!(stats.entry_index, 2);

        let start = f.graph.start;
        assert_eq!(f.graph.opcode(g.header), Opcode::Loop);
        assert_eq!(f.graph.inputs(g.header)[0], start);
        assert_eq!(f.graph.inputs(g.header).len(), 2);
        assert_eq!(f.graph.inputs(g.phi), &[g.osr_value, g.next, g.header]);
        assert_eq!(f.graph.input(g.osr_value, 0), start);
        assert!(f.graph.is_dead(g.normal));
        assert_eq!(Verifier::run(&f.graph), Ok(()));
    }

    #[test]
    fn test_deconstructed_graph_schedules() {
        let mut f = GraphFixture::new(1);
        osr_loop(&mut f);
        OsrDeconstructor::deconstruct(&mut f.graph).unwrap();

        let s = Scheduler::compute_schedule(&mut f.graph, &SchedulerConfig::default()).unwrap();
        assert_eq!(ScheduleVerifier::run(&f.graph, &s), Ok(()));
    }

    #[test]
    fn test_graph_without_osr_entry_is_rejected() {
        let mut f = GraphFixture::new(1);
        let p0 = f.parameter(0);
        let start = f.graph.start;
        f.ret(p0, start, start);

        assert_eq!(
            OsrDeconstructor::deconstruct(&mut f.graph),
            Err(CompileError::NoOsrEntry)
        );
    }
}
