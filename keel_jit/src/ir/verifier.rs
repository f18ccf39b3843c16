//! Structural graph verification.
//!
//! Checks that hold after every pass:
//!
//! - every live node has exactly the input count its operator declares
//! - the def-use relation is the exact mirror of the use-def relation
//! - no node reachable from `End` points at a killed node
//! - inputs in each section have the right kind (value, effect, control,
//!   frame state)
//! - phis agree with their merge on arity; projections hang off branches
//! - no Merge, Phi or EffectPhi is empty

use rustc_hash::FxHashMap;

use super::graph::Graph;
use super::node::NodeId;
use super::operators::Opcode;
use super::properties::InputLayout;
use super::visit::reachable_from_end;
use crate::error::VerifyError;

pub struct Verifier;

impl Verifier {
    pub fn run(graph: &Graph) -> Result<(), VerifyError> {
        Self::check_symmetry(graph)?;
        for node in reachable_from_end(graph) {
            Self::check_node(graph, node)?;
        }
        Ok(())
    }

    fn check_symmetry(graph: &Graph) -> Result<(), VerifyError> {
        for (id, node) in graph.iter() {
            if node.is_dead() && node.input_count() > 0 {
                return Err(VerifyError::Malformed {
                    node: id,
                    detail: "killed node still has inputs",
                });
            }
            let mut input_counts: FxHashMap<NodeId, usize> = FxHashMap::default();
            for &input in node.inputs().iter().filter(|i| i.is_valid()) {
                *input_counts.entry(input).or_default() += 1;
            }
            for (&input, &count) in &input_counts {
                let listed = graph.uses(input).iter().filter(|&&u| u == id).count();
                if listed != count {
                    return Err(VerifyError::MissingUse { node: id, input });
                }
            }
            for &user in node.uses() {
                if !graph.inputs(user).contains(&id) {
                    return Err(VerifyError::DanglingUse { node: user, def: id });
                }
            }
        }
        Ok(())
    }

    fn check_node(graph: &Graph, id: NodeId) -> Result<(), VerifyError> {
        let node = graph.node(id);
        let op = node.op();
        let expected = op.total_input_count() as usize;
        if node.input_count() != expected {
            return Err(VerifyError::InputCount {
                node: id,
                opcode: op.opcode(),
                expected,
                actual: node.input_count(),
            });
        }

        let layout = InputLayout::of(op);
        for (index, &input) in node.inputs().iter().enumerate() {
            if !input.is_valid() {
                continue;
            }
            if graph.is_dead(input) {
                return Err(VerifyError::KilledInput { node: id, index, input });
            }
            let input_op = graph.op(input);
            if input_op.opcode() == Opcode::Dead {
                continue;
            }
            let (ok, expected) = if index < layout.context {
                (input_op.value_output_count() > 0, "value")
            } else if index < layout.frame_state {
                (input_op.value_output_count() > 0, "context")
            } else if index < layout.effect {
                (input_op.opcode() == Opcode::FrameState, "frame state")
            } else if index < layout.control {
                (input_op.produces_effect(), "effect")
            } else {
                let is_loop_ref = op.opcode() == Opcode::LoopExit && index == layout.control + 1;
                if is_loop_ref {
                    (input_op.opcode() == Opcode::Loop, "loop")
                } else if op.opcode() == Opcode::End {
                    (input_op.opcode().is_graph_terminator(), "terminator")
                } else {
                    (input_op.produces_control(), "control")
                }
            };
            if !ok {
                return Err(VerifyError::InputKind {
                    node: id,
                    index,
                    input,
                    expected,
                });
            }
        }

        let merged = match op.opcode() {
            Opcode::Phi => Some(op.value_input_count()),
            Opcode::EffectPhi => Some(op.effect_input_count()),
            Opcode::Merge => Some(op.control_input_count()),
            _ => None,
        };
        if merged == Some(0) {
            return Err(VerifyError::EmptyMerge {
                node: id,
                opcode: op.opcode(),
            });
        }

        match op.opcode() {
            Opcode::Phi | Opcode::EffectPhi => {
                let merge = graph.input(id, layout.control);
                if merge.is_valid() && graph.opcode(merge) != Opcode::Dead {
                    if !graph.opcode(merge).is_merge() {
                        return Err(VerifyError::InputKind {
                            node: id,
                            index: layout.control,
                            input: merge,
                            expected: "merge",
                        });
                    }
                    let arity = if op.opcode() == Opcode::Phi {
                        op.value_input_count()
                    } else {
                        op.effect_input_count()
                    };
                    if arity != graph.op(merge).control_input_count() {
                        return Err(VerifyError::Malformed {
                            node: id,
                            detail: "phi arity differs from its merge",
                        });
                    }
                }
            }
            Opcode::IfTrue | Opcode::IfFalse => {
                let branch = graph.input(id, 0);
                if branch.is_valid() && graph.opcode(branch) != Opcode::Branch {
                    return Err(VerifyError::InputKind {
                        node: id,
                        index: 0,
                        input: branch,
                        expected: "branch",
                    });
                }
            }
            Opcode::Start if node.input_count() != 0 => {
                return Err(VerifyError::Malformed {
                    node: id,
                    detail: "start has inputs",
                });
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builders::{CommonOperatorBuilder, MachineOperatorBuilder};
    use crate::ir::machine_type::MachineType;
    use crate::ir::operators::{OpParam, Operator};
    use crate::ir::properties::NodeProperties;

    fn diamond() -> Graph {
        let mut graph = Graph::with_parameters(1);
        let common = CommonOperatorBuilder::new();
        let start = graph.start;
        let p = graph.new_node(common.parameter(0), &[start]);
        let branch = graph.new_node(common.branch(Default::default()), &[p, start]);
        let t = graph.new_node(common.if_true(), &[branch]);
        let f = graph.new_node(common.if_false(), &[branch]);
        let merge = graph.new_node(common.merge(2), &[t, f]);
        let one = graph.int32_constant(1);
        let two = graph.int32_constant(2);
        let phi = graph.new_node(common.phi(MachineType::MACH_INT32, 2), &[one, two, merge]);
        let ret = graph.new_node(common.return_(), &[phi, start, merge]);
        NodeProperties::merge_control_to_end(&mut graph, ret);
        graph
    }

    #[test]
    fn test_valid_graph_passes() {
        let graph = diamond();
        assert_eq!(Verifier::run(&graph), Ok(()));
    }

    #[test]
    fn test_wrong_input_kind_is_reported() {
        let mut graph = diamond();
        let machine = MachineOperatorBuilder::new();
        let one = graph.int32_constant(1);
        let add = graph.new_node(machine.int32_add(), &[one, one]);
        let end = graph.end;
        let ret = graph.input(end, 0);
        // A value where control is expected.
        graph.replace_input(ret, 2, add);
        assert!(matches!(
            Verifier::run(&graph),
            Err(VerifyError::InputKind { expected: "control", .. })
        ));
    }

    #[test]
    fn test_phi_arity_mismatch_is_reported() {
        let mut graph = diamond();
        let common = CommonOperatorBuilder::new();
        let end = graph.end;
        let ret = graph.input(end, 0);
        let phi = graph.input(ret, 0);
        let merge = graph.input(phi, 2);
        graph.trim_input_count(merge, 1);
        graph.change_op(merge, common.merge(1));
        assert!(Verifier::run(&graph).is_err());
    }

    /// Operators the builders refuse to create.
    fn empty(opcode: Opcode) -> Operator {
        match opcode {
            Opcode::Phi => Operator::with_param(
                opcode,
                0,
                1,
                OpParam::Phi {
                    rep: MachineType::MACH_INT32,
                    arity: 0,
                },
            ),
            _ => Operator::with_param(opcode, 0, 0, OpParam::Arity(0)),
        }
    }

    /// The diamond with input `index` of its return swapped for an empty node.
    fn empty_in_return(opcode: Opcode, index: usize) -> (Graph, NodeId) {
        let mut graph = diamond();
        let end = graph.end;
        let ret = graph.input(end, 0);
        let merge = graph.input(ret, 2);
        let inputs: &[NodeId] = if opcode == Opcode::Merge { &[] } else { &[merge] };
        let node = graph.new_node(empty(opcode), inputs);
        graph.replace_input(ret, index, node);
        (graph, node)
    }

    #[test]
    fn test_empty_phi_is_reported() {
        let (graph, phi) = empty_in_return(Opcode::Phi, 0);
        assert_eq!(
            Verifier::run(&graph),
            Err(VerifyError::EmptyMerge {
                node: phi,
                opcode: Opcode::Phi
            })
        );
    }

    #[test]
    fn test_empty_effect_phi_is_reported() {
        let (graph, effect_phi) = empty_in_return(Opcode::EffectPhi, 1);
        assert_eq!(
            Verifier::run(&graph),
            Err(VerifyError::EmptyMerge {
                node: effect_phi,
                opcode: Opcode::EffectPhi
            })
        );
    }

    #[test]
    fn test_empty_merge_is_reported() {
        let (graph, merge) = empty_in_return(Opcode::Merge, 2);
        assert_eq!(
            Verifier::run(&graph),
            Err(VerifyError::EmptyMerge {
                node: merge,
                opcode: Opcode::Merge
            })
        );
    }

    #[test]
    fn test_killed_input_is_reported() {
        let mut graph = diamond();
        let end = graph.end;
        let ret = graph.input(end, 0);
        let phi = graph.input(ret, 0);
        let one = graph.input(phi, 0);
        // Killing leaves the phi pointing at the tombstone.
        graph.kill(one);
        assert!(matches!(
            Verifier::run(&graph),
            Err(VerifyError::KilledInput { .. })
        ));
    }
}
