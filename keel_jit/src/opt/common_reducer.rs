//! Local simplifications on common operators.
//!
//! - `Branch` on a constant condition folds to the taken projection.
//! - A diamond whose merge has no phis collapses to the branch's control.
//! - `Phi`/`EffectPhi` whose inputs are all the same node (ignoring
//!   self-references through a loop back edge) is that node.
//! - `Select` on a constant, or with equal arms, is the chosen arm.

use crate::ir::node::NodeId;
use crate::ir::operators::Opcode;
use crate::ir::properties::NodeProperties;
use crate::ir::Graph;

use super::reducer::{Editor, Reducer, Reduction};

#[derive(Debug, Default)]
pub struct CommonOperatorReducer;

impl CommonOperatorReducer {
    pub fn new() -> Self {
        CommonOperatorReducer
    }

    fn reduce_branch(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let condition = NodeProperties::get_value_input(editor.graph, node, 0);
        let Some(taken) = constant_truth(editor.graph, condition) else {
            return Reduction::NoChange;
        };
        let control = NodeProperties::get_control_input(editor.graph, node, 0);
        let [if_true, if_false] = NodeProperties::collect_control_projections(editor.graph, node);
        let (live, dead) = if taken {
            (if_true, if_false)
        } else {
            (if_false, if_true)
        };
        if live.is_valid() {
            editor.replace(live, control);
        }
        if dead.is_valid() {
            let dead_node = editor.graph.dead();
            editor.replace(dead, dead_node);
        }
        Reduction::Replace(editor.graph.dead())
    }

    fn reduce_merge(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let graph = &*editor.graph;
        if graph.node(node).input_count() != 2 {
            return Reduction::NoChange;
        }
        let (a, b) = (graph.input(node, 0), graph.input(node, 1));
        if !a.is_valid() || !b.is_valid() {
            return Reduction::NoChange;
        }
        let (if_true, if_false) = match (graph.opcode(a), graph.opcode(b)) {
            (Opcode::IfTrue, Opcode::IfFalse) => (a, b),
            (Opcode::IfFalse, Opcode::IfTrue) => (b, a),
            _ => return Reduction::NoChange,
        };
        let branch = graph.input(if_true, 0);
        if branch != graph.input(if_false, 0) {
            return Reduction::NoChange;
        }
        if graph.users(node).into_iter().any(|u| NodeProperties::is_phi(graph, u)) {
            return Reduction::NoChange;
        }
        // Both projections must only feed this merge.
        if graph.use_count(if_true) != 1 || graph.use_count(if_false) != 1 {
            return Reduction::NoChange;
        }
        let control = NodeProperties::get_control_input(graph, branch, 0);
        let dead = editor.graph.dead();
        editor.replace(if_true, dead);
        editor.replace(if_false, dead);
        editor.replace(branch, dead);
        Reduction::Replace(control)
    }

    fn reduce_phi(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let graph = &*editor.graph;
        let op = graph.op(node);
        let inputs = if op.opcode() == Opcode::Phi {
            NodeProperties::value_inputs(graph, node)
        } else {
            NodeProperties::effect_inputs(graph, node)
        };
        let mut value = NodeId::INVALID;
        for &input in inputs {
            if input == node || input == value {
                continue;
            }
            if value.is_valid() || !input.is_valid() {
                return Reduction::NoChange;
            }
            value = input;
        }
        if value.is_valid() {
            Reduction::Replace(value)
        } else {
            Reduction::NoChange
        }
    }

    fn reduce_select(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let graph = &*editor.graph;
        let condition = NodeProperties::get_value_input(graph, node, 0);
        let vtrue = NodeProperties::get_value_input(graph, node, 1);
        let vfalse = NodeProperties::get_value_input(graph, node, 2);
        if vtrue == vfalse {
            return Reduction::Replace(vtrue);
        }
        match constant_truth(graph, condition) {
            Some(true) => Reduction::Replace(vtrue),
            Some(false) => Reduction::Replace(vfalse),
            None => Reduction::NoChange,
        }
    }
}

impl Reducer for CommonOperatorReducer {
    fn name(&self) -> &'static str {
        "CommonOperatorReducer"
    }

    fn reduce(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        match editor.graph.opcode(node) {
            Opcode::Branch => self.reduce_branch(editor, node),
            Opcode::Merge => self.reduce_merge(editor, node),
            Opcode::Phi | Opcode::EffectPhi => self.reduce_phi(editor, node),
            Opcode::Select => self.reduce_select(editor, node),
            _ => Reduction::NoChange,
        }
    }
}

/// Truthiness of a numeric constant condition.
fn constant_truth(graph: &Graph, node: NodeId) -> Option<bool> {
    if !node.is_valid() {
        return None;
    }
    let op = graph.op(node);
    match op.opcode() {
        Opcode::Int32Constant => op.int32_value().map(|v| v != 0),
        Opcode::Float64Constant | Opcode::NumberConstant => {
            op.number_value().map(|v| v != 0.0 && !v.is_nan())
        }
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::machine_type::MachineType;
    use crate::opt::reducer::GraphReducer;
    use crate::testing::GraphFixture;

    fn run(graph: &mut Graph) {
        let mut reducer = GraphReducer::new();
        reducer.add_reducer(CommonOperatorReducer::new());
        reducer.reduce_graph(graph);
    }

    #[test]
    fn test_branch_on_true_constant_takes_true_arm() {
        let mut f = GraphFixture::new(2);
        let (p0, p1) = (f.parameter(0), f.parameter(1));
        let one = f.int32(1);
        let start = f.graph.start;
        let (t, fl) = f.branch(one, start);
        let ret_t = f.ret(p0, start, t);
        let ret_f = f.ret(p1, start, fl);

        run(&mut f.graph);

        assert_eq!(f.graph.input(ret_t, 2), start);
        assert_eq!(f.graph.opcode(f.graph.input(ret_f, 2)), Opcode::Dead);
    }

    #[test]
    fn test_empty_diamond_collapses() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let start = f.graph.start;
        let (t, fl) = f.branch(p, start);
        let merge = f.merge(&[t, fl]);
        let ret = f.ret(p, start, merge);

        run(&mut f.graph);

        assert_eq!(f.graph.input(ret, 2), start);
        assert!(f.graph.is_dead(merge));
    }

    #[test]
    fn test_diamond_with_phi_is_kept() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let start = f.graph.start;
        let (t, fl) = f.branch(p, start);
        let merge = f.merge(&[t, fl]);
        let (one, two) = (f.int32(1), f.int32(2));
        let phi = f.phi(MachineType::MACH_INT32, &[one, two], merge);
        let ret = f.ret(phi, start, merge);

        run(&mut f.graph);

        assert_eq!(f.graph.input(ret, 2), merge);
        assert_eq!(f.graph.input(ret, 0), phi);
    }

    #[test]
    fn test_redundant_phi_is_its_input() {
        let mut f = GraphFixture::new(2);
        let (p0, p1) = (f.parameter(0), f.parameter(1));
        let start = f.graph.start;
        let (t, fl) = f.branch(p0, start);
        let merge = f.merge(&[t, fl]);
        let phi = f.phi(MachineType::MACH_ANY_TAGGED, &[p1, p1], merge);
        let ret = f.ret(phi, start, merge);

        run(&mut f.graph);

        assert_eq!(f.graph.input(ret, 0), p1);
        assert!(f.graph.is_dead(phi));
    }

    #[test]
    fn test_loop_phi_ignores_self_reference() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let start = f.graph.start;
        let loop_ = f.graph.new_node(f.common.loop_(2), &[start, start]);
        let phi = f.phi(MachineType::MACH_ANY_TAGGED, &[p, p], loop_);
        f.graph.replace_input(phi, 1, phi);
        let ret = f.ret(phi, start, loop_);

        run(&mut f.graph);

        assert_eq!(f.graph.input(ret, 0), p);
    }

    #[test]
    fn test_select_on_constant() {
        let mut f = GraphFixture::new(2);
        let (p0, p1) = (f.parameter(0), f.parameter(1));
        let zero = f.int32(0);
        let select = f
            .graph
            .new_node(f.common.select(MachineType::MACH_ANY_TAGGED), &[zero, p0, p1]);
        let start = f.graph.start;
        let ret = f.ret(select, start, start);

        run(&mut f.graph);

        assert_eq!(f.graph.input(ret, 0), p1);
    }
}
