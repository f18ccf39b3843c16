//! Dead code elimination.
//!
//! Propagates three kinds of deadness through the graph:
//!
//! - `Dead` on control: a node whose control input is `Dead` is itself dead.
//!   Merges drop dead predecessors (keeping their phis in lockstep), and a
//!   loop whose entry is dead dies with it.
//! - `DeadValue` on values: a pure node with a dead input can never produce
//!   a value.
//! - `Unreachable` on effects: an effectful node with a dead input ends the
//!   effect chain; terminators reached by it turn into `Throw`.
//!
//! Reductions are local, so this runs as a [`Reducer`] inside a
//! [`GraphReducer`](super::reducer::GraphReducer).

use crate::ir::builders::CommonOperatorBuilder;
use crate::ir::machine_type::MachineType;
use crate::ir::node::NodeId;
use crate::ir::operators::Opcode;
use crate::ir::properties::NodeProperties;
use crate::ir::types::Type;
use crate::ir::Graph;

use super::reducer::{Editor, Reducer, Reduction};

#[derive(Debug, Default)]
pub struct DeadCodeElimination {
    common: CommonOperatorBuilder,
}

impl DeadCodeElimination {
    pub fn new() -> Self {
        Self::default()
    }

    fn reduce_end(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let graph = &mut *editor.graph;
        let count = graph.node(node).input_count();
        let mut live = 0;
        for i in 0..count {
            let input = graph.input(node, i);
            if !input.is_valid() || graph.opcode(input) == Opcode::Dead {
                continue;
            }
            if i != live {
                graph.replace_input(node, live, input);
            }
            live += 1;
        }
        if live == 0 {
            return Reduction::Replace(graph.dead());
        }
        if live < count {
            graph.trim_input_count(node, live);
            graph.change_op(node, self.common.end(live as u32));
            return Reduction::Changed;
        }
        Reduction::NoChange
    }

    fn reduce_loop_or_merge(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let count = editor.graph.node(node).input_count();
        let is_loop = editor.graph.opcode(node) == Opcode::Loop;
        let entry_dead = is_loop && is_dead_control(editor.graph, editor.graph.input(node, 0));

        let mut live = 0;
        if !entry_dead {
            let phis: Vec<NodeId> = editor
                .graph
                .users(node)
                .into_iter()
                .filter(|&u| NodeProperties::is_phi(editor.graph, u))
                .collect();
            for i in 0..count {
                let input = editor.graph.input(node, i);
                if is_dead_control(editor.graph, input) {
                    continue;
                }
                if live != i {
                    editor.graph.replace_input(node, live, input);
                    for &phi in &phis {
                        let moved = editor.graph.input(phi, i);
                        editor.graph.replace_input(phi, live, moved);
                    }
                }
                live += 1;
            }
        }

        if live == 0 {
            return Reduction::Replace(editor.graph.dead());
        }

        if live == 1 {
            let mut loop_exits = Vec::new();
            // After compaction the live input is at offset 0.
            for user in editor.graph.users(node) {
                if editor.graph.is_dead(user) {
                    continue;
                }
                match editor.graph.opcode(user) {
                    Opcode::Phi | Opcode::EffectPhi => {
                        let value = editor.graph.input(user, 0);
                        editor.replace(user, value);
                    }
                    Opcode::LoopExit if editor.graph.input(user, 1) == node => {
                        loop_exits.push(user);
                    }
                    Opcode::Terminate => {
                        let dead = editor.graph.dead();
                        editor.replace(user, dead);
                    }
                    _ => {}
                }
            }
            for exit in loop_exits {
                let dead = editor.graph.dead();
                editor.graph.replace_input(exit, 1, dead);
                editor.revisit(exit);
            }
            return Reduction::Replace(editor.graph.input(node, 0));
        }

        if live < count {
            let op = self.common.resize_merge_or_phi(editor.graph.op(node), live as u32);
            editor.graph.trim_input_count(node, live);
            editor.graph.change_op(node, op);
            for user in editor.graph.users(node) {
                if NodeProperties::is_phi(editor.graph, user) {
                    editor.graph.replace_input(user, live, node);
                    self.trim_merge_or_phi(editor.graph, user, live as u32);
                    editor.revisit(user);
                }
            }
            return Reduction::Changed;
        }
        Reduction::NoChange
    }

    fn trim_merge_or_phi(&self, graph: &mut Graph, node: NodeId, size: u32) {
        let op = self.common.resize_merge_or_phi(graph.op(node), size);
        graph.trim_input_count(node, op.total_input_count() as usize);
        graph.change_op(node, op);
    }

    fn reduce_loop_exit(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let control = NodeProperties::get_control_input(editor.graph, node, 0);
        let loop_ = NodeProperties::get_control_input(editor.graph, node, 1);
        if is_dead_control(editor.graph, control) || is_dead_control(editor.graph, loop_) {
            return self.remove_loop_exit(editor, node);
        }
        Reduction::NoChange
    }

    /// Splice a loop exit out, together with its value and effect markers.
    fn remove_loop_exit(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        for user in editor.graph.users(node) {
            if matches!(
                editor.graph.opcode(user),
                Opcode::LoopExitValue | Opcode::LoopExitEffect
            ) {
                let input = editor.graph.input(user, 0);
                editor.replace(user, input);
            }
        }
        let control = NodeProperties::get_control_input(editor.graph, node, 0);
        Reduction::Replace(control)
    }

    fn reduce_node(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let op = *editor.graph.op(node);
        debug_assert!(!op.opcode().is_graph_terminator());
        let effect_inputs = op.effect_input_count();
        let control_inputs = op.control_input_count();
        debug_assert!(control_inputs <= 1);
        if control_inputs == 1 {
            let reduction = self.propagate_dead_control(editor, node);
            if reduction.is_changed() {
                return reduction;
            }
        }
        if effect_inputs == 0 && (control_inputs == 0 || !op.produces_control()) {
            return self.reduce_pure_node(editor, node);
        }
        if effect_inputs > 0 {
            return self.reduce_effect_node(editor, node);
        }
        Reduction::NoChange
    }

    fn propagate_dead_control(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let control = NodeProperties::get_control_input(editor.graph, node, 0);
        if control.is_valid() && editor.graph.opcode(control) == Opcode::Dead {
            return Reduction::Replace(control);
        }
        Reduction::NoChange
    }

    fn reduce_pure_node(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        if editor.graph.opcode(node) == Opcode::DeadValue {
            return Reduction::NoChange;
        }
        match find_dead_input(editor.graph, node) {
            Some(input) => Reduction::Replace(self.dead_value(editor.graph, input, None)),
            None => Reduction::NoChange,
        }
    }

    fn reduce_effect_node(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let effect = NodeProperties::get_effect_input(editor.graph, node, 0);
        if effect.is_valid() && editor.graph.opcode(effect) == Opcode::Dead {
            return Reduction::Replace(effect);
        }
        let Some(input) = find_dead_input(editor.graph, node) else {
            return Reduction::NoChange;
        };
        if effect.is_valid() && editor.graph.opcode(effect) == Opcode::Unreachable {
            editor.relax_effects_and_controls(node);
            return Reduction::Replace(self.dead_value(editor.graph, input, None));
        }

        let control = if editor.graph.op(node).control_input_count() == 1 {
            NodeProperties::get_control_input(editor.graph, node, 0)
        } else {
            editor.graph.start
        };
        let unreachable =
            editor
                .graph
                .new_typed_node(self.common.unreachable(), &[effect, control], Type::NONE);
        let dead_value = self.dead_value(editor.graph, input, None);
        editor.replace_with_value(node, dead_value, node, control);
        Reduction::Replace(unreachable)
    }

    fn reduce_unreachable_or_if_exception(
        &mut self,
        editor: &mut Editor<'_>,
        node: NodeId,
    ) -> Reduction {
        let reduction = self.propagate_dead_control(editor, node);
        if reduction.is_changed() {
            return reduction;
        }
        let effect = NodeProperties::get_effect_input(editor.graph, node, 0);
        if effect.is_valid()
            && matches!(
                editor.graph.opcode(effect),
                Opcode::Dead | Opcode::Unreachable
            )
        {
            return Reduction::Replace(effect);
        }
        Reduction::NoChange
    }

    fn reduce_phi(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let reduction = self.propagate_dead_control(editor, node);
        if reduction.is_changed() {
            return reduction;
        }
        let rep = editor.graph.op(node).phi_representation();
        let node_ty_none = editor.graph.node(node).is_typed() && editor.graph.ty(node).is_none();
        if rep.is_empty() || node_ty_none {
            return Reduction::Replace(self.dead_value(editor.graph, node, Some(rep)));
        }
        let count = editor.graph.op(node).value_input_count() as usize;
        let mut changed = false;
        for i in 0..count {
            let input = editor.graph.input(node, i);
            if input.is_valid()
                && editor.graph.opcode(input) == Opcode::DeadValue
                && editor.graph.op(input).phi_representation() != rep
            {
                let retyped = self.dead_value(editor.graph, input, Some(rep));
                NodeProperties::replace_value_input(editor.graph, node, retyped, i);
                changed = true;
            }
        }
        if changed {
            Reduction::Changed
        } else {
            Reduction::NoChange
        }
    }

    fn reduce_effect_phi(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let mut reduction = self.propagate_dead_control(editor, node);
        if reduction.is_changed() {
            return reduction;
        }
        let merge = NodeProperties::get_control_input(editor.graph, node, 0);
        let count = editor.graph.op(node).effect_input_count() as usize;
        for i in 0..count {
            let effect = NodeProperties::get_effect_input(editor.graph, node, i);
            if effect.is_valid() && editor.graph.opcode(effect) == Opcode::Unreachable {
                // Connect the unreachable effect chain to End and drop the
                // corresponding merge and phi inputs.
                let control = NodeProperties::get_control_input(editor.graph, merge, i);
                let throw = editor.graph.new_node(self.common.throw(), &[effect, control]);
                NodeProperties::merge_control_to_end(editor.graph, throw);
                let dead = editor.graph.dead();
                NodeProperties::replace_effect_input(editor.graph, node, dead, i);
                NodeProperties::replace_control_input(editor.graph, merge, dead, i);
                let end = editor.graph.end;
                editor.revisit(merge);
                editor.revisit(end);
                reduction = Reduction::Changed;
            }
        }
        reduction
    }

    fn reduce_terminator(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let reduction = self.propagate_dead_control(editor, node);
        if reduction.is_changed() {
            return reduction;
        }
        // Terminate is not real control flow and never becomes a Throw.
        if editor.graph.opcode(node) == Opcode::Terminate
            || find_dead_input(editor.graph, node).is_none()
        {
            return Reduction::NoChange;
        }
        let mut effect = NodeProperties::get_effect_input(editor.graph, node, 0);
        let control = NodeProperties::get_control_input(editor.graph, node, 0);
        if editor.graph.opcode(effect) != Opcode::Unreachable {
            effect =
                editor
                    .graph
                    .new_typed_node(self.common.unreachable(), &[effect, control], Type::NONE);
        }
        editor.graph.trim_input_count(node, 2);
        editor.graph.replace_input(node, 0, effect);
        editor.graph.replace_input(node, 1, control);
        editor.graph.change_op(node, self.common.throw());
        Reduction::Changed
    }

    fn reduce_branch(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let reduction = self.propagate_dead_control(editor, node);
        if reduction.is_changed() {
            return reduction;
        }
        let condition = NodeProperties::get_value_input(editor.graph, node, 0);
        if condition.is_valid() && editor.graph.opcode(condition) == Opcode::DeadValue {
            // A branch on a dead value sits in unreachable code that the
            // effect chain has not caught up with yet. Pick the first arm.
            let [first, _] = NodeProperties::collect_control_projections(editor.graph, node);
            let control = NodeProperties::get_control_input(editor.graph, node, 0);
            if first.is_valid() {
                editor.replace(first, control);
            }
            return Reduction::Replace(editor.graph.dead());
        }
        Reduction::NoChange
    }

    /// A `DeadValue` standing for `node`, in representation `rep` when given.
    fn dead_value(&self, graph: &mut Graph, node: NodeId, rep: Option<MachineType>) -> NodeId {
        let mut input = node;
        if graph.opcode(node) == Opcode::DeadValue {
            let existing = graph.op(node).phi_representation();
            if rep.map_or(true, |rep| rep == existing) {
                return node;
            }
            input = graph.input(node, 0);
        }
        let rep = rep.unwrap_or(MachineType::empty());
        graph.new_typed_node(self.common.dead_value(rep), &[input], Type::NONE)
    }
}

impl Reducer for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "DeadCodeElimination"
    }

    fn reduce(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        match editor.graph.opcode(node) {
            Opcode::End => self.reduce_end(editor, node),
            Opcode::Loop | Opcode::Merge => self.reduce_loop_or_merge(editor, node),
            Opcode::LoopExit => self.reduce_loop_exit(editor, node),
            Opcode::Unreachable | Opcode::IfException => {
                self.reduce_unreachable_or_if_exception(editor, node)
            }
            Opcode::Phi => self.reduce_phi(editor, node),
            Opcode::EffectPhi => self.reduce_effect_phi(editor, node),
            Opcode::Deoptimize | Opcode::Return | Opcode::Terminate => {
                self.reduce_terminator(editor, node)
            }
            Opcode::Throw => self.propagate_dead_control(editor, node),
            Opcode::Branch => self.reduce_branch(editor, node),
            _ => self.reduce_node(editor, node),
        }
    }
}

fn is_dead_control(graph: &Graph, node: NodeId) -> bool {
    !node.is_valid() || graph.opcode(node) == Opcode::Dead
}

/// Dead markers and nodes typed `None` never return.
fn no_return(graph: &Graph, node: NodeId) -> bool {
    let opcode = graph.opcode(node);
    opcode.is_dead_marker() || (graph.node(node).is_typed() && graph.ty(node).is_none())
}

fn find_dead_input(graph: &Graph, node: NodeId) -> Option<NodeId> {
    graph
        .inputs(node)
        .iter()
        .copied()
        .find(|&input| input.is_valid() && no_return(graph, input))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builders::SimplifiedOperatorBuilder;
    use crate::opt::reducer::GraphReducer;
    use crate::testing::GraphFixture;

    fn run_dce(graph: &mut Graph) {
        let mut reducer = GraphReducer::new();
        reducer.add_reducer(DeadCodeElimination::new());
        reducer.reduce_graph(graph);
    }

    #[test]
    fn test_merge_with_dead_input_is_elided_with_its_phi() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let start = f.graph.start;
        let dead = f.graph.dead();
        let merge = f.merge(&[start, dead]);
        let one = f.int32(1);
        let phi = f.phi(MachineType::MACH_INT32, &[p, one], merge);
        let ret = f.ret(phi, start, merge);

        run_dce(&mut f.graph);

        assert!(f.graph.is_dead(merge));
        assert!(f.graph.is_dead(phi));
        assert_eq!(f.graph.inputs(ret), &[p, start, start]);
    }

    #[test]
    fn test_merge_compacts_dead_inputs_and_phis() {
        let mut f = GraphFixture::new(3);
        let (p0, p1, p2) = (f.parameter(0), f.parameter(1), f.parameter(2));
        let (t, fl) = f.branch(p0, f.graph.start);
        let dead = f.graph.dead();
        let merge = f.merge(&[t, dead, fl]);
        let phi = f.phi(MachineType::MACH_ANY_TAGGED, &[p0, p1, p2], merge);
        let start = f.graph.start;
        f.ret(phi, start, merge);

        run_dce(&mut f.graph);

        assert_eq!(f.graph.inputs(merge), &[t, fl]);
        assert_eq!(f.graph.op(merge).control_input_count(), 2);
        assert_eq!(f.graph.inputs(phi), &[p0, p2, merge]);
        assert_eq!(f.graph.op(phi).value_input_count(), 2);
    }

    #[test]
    fn test_loop_with_dead_entry_dies() {
        let mut f = GraphFixture::new(0);
        let dead = f.graph.dead();
        let start = f.graph.start;
        let loop_ = f.graph.new_node(f.common.loop_(2), &[dead, start]);
        let zero = f.int32(0);
        let ret = f.ret(zero, start, loop_);

        run_dce(&mut f.graph);

        // The Return died with its control, and End with it.
        assert!(f.graph.is_dead(loop_));
        assert!(f.graph.is_dead(ret));
        assert_eq!(f.graph.opcode(f.graph.end), Opcode::Dead);
    }

    #[test]
    fn test_loop_with_dead_back_edge_is_elided() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let start = f.graph.start;
        let dead = f.graph.dead();
        let loop_ = f.graph.new_node(f.common.loop_(2), &[start, dead]);
        let phi = f.phi(MachineType::MACH_ANY_TAGGED, &[p, p], loop_);
        let ephi = f.graph.new_node(f.common.effect_phi(2), &[start, start, loop_]);
        let terminate = f.graph.new_node(f.common.terminate(), &[ephi, loop_]);
        NodeProperties::merge_control_to_end(&mut f.graph, terminate);
        let ret = f.ret(phi, ephi, loop_);

        run_dce(&mut f.graph);

        assert!(f.graph.is_dead(loop_));
        assert_eq!(f.graph.inputs(ret), &[p, start, start]);
        let end = f.graph.end;
        assert_eq!(f.graph.inputs(end), &[ret]);
    }

    #[test]
    fn test_pure_node_with_dead_input_becomes_dead_value() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let dead_value = f
            .graph
            .new_typed_node(f.common.dead_value(MachineType::MACH_INT32), &[p], Type::NONE);
        let add = f.graph.new_node(f.machine.int32_add(), &[dead_value, p]);
        let start = f.graph.start;
        let ret = f.ret(add, start, start);

        run_dce(&mut f.graph);

        // The return now sees a dead value and turns into a throw.
        assert_eq!(f.graph.opcode(ret), Opcode::Throw);
        assert!(f.graph.is_dead(add));
        let unreachable = f.graph.input(ret, 0);
        assert_eq!(f.graph.opcode(unreachable), Opcode::Unreachable);
        assert_eq!(f.graph.inputs(unreachable), &[start, start]);
    }

    #[test]
    fn test_effect_node_with_dead_input_inserts_unreachable() {
        let mut f = GraphFixture::new(1);
        let simplified = SimplifiedOperatorBuilder::new();
        let p = f.parameter(0);
        let start = f.graph.start;
        let dead_value = f
            .graph
            .new_typed_node(f.common.dead_value(MachineType::MACH_ANY_TAGGED), &[p], Type::NONE);
        let load = f
            .graph
            .new_node(simplified.load_field(GraphFixture::tagged_field(8)), &[dead_value, start]);
        let ret = f.ret(p, load, start);

        run_dce(&mut f.graph);

        let effect = f.graph.input(ret, 0);
        assert_eq!(f.graph.opcode(ret), Opcode::Throw);
        assert_eq!(f.graph.opcode(effect), Opcode::Unreachable);
        assert!(f.graph.is_dead(load));
    }

    #[test]
    fn test_branch_on_dead_value_picks_first_arm() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let start = f.graph.start;
        let dv = f
            .graph
            .new_typed_node(f.common.dead_value(MachineType::MACH_BOOL), &[p], Type::NONE);
        let (t, fl) = f.branch(dv, start);
        let merge = f.merge(&[t, fl]);
        let ret = f.ret(p, start, merge);

        run_dce(&mut f.graph);

        assert_eq!(f.graph.inputs(ret), &[p, start, start]);
        assert!(f.graph.is_dead(merge));
    }
}
