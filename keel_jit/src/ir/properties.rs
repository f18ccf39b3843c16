//! Positional input classification.
//!
//! A node's inputs are laid out as
//! `[values | context? | frame-states | effects | controls]`, with section
//! widths taken from the operator. These helpers find sections, classify
//! edges and perform the common rewiring patterns.

use super::builders::CommonOperatorBuilder;
use super::graph::Graph;
use super::node::{Edge, NodeId};
use super::operators::{Opcode, Operator};

/// Index of the first input of each section of `op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLayout {
    pub context: usize,
    pub frame_state: usize,
    pub effect: usize,
    pub control: usize,
    pub past_control: usize,
}

impl InputLayout {
    pub fn of(op: &Operator) -> Self {
        let context = op.value_input_count() as usize;
        let frame_state = context + op.context_input_count() as usize;
        let effect = frame_state + op.frame_state_input_count() as usize;
        let control = effect + op.effect_input_count() as usize;
        let past_control = control + op.control_input_count() as usize;
        InputLayout {
            context,
            frame_state,
            effect,
            control,
            past_control,
        }
    }
}

/// Namespace for node-shape queries.
pub struct NodeProperties;

impl NodeProperties {
    // -------------------------------------------------------------------------
    // Input access
    // -------------------------------------------------------------------------

    pub fn get_value_input(graph: &Graph, node: NodeId, index: usize) -> NodeId {
        debug_assert!(index < graph.op(node).value_input_count() as usize);
        graph.input(node, index)
    }

    pub fn get_context_input(graph: &Graph, node: NodeId) -> NodeId {
        debug_assert!(graph.op(node).has_context_input());
        graph.input(node, InputLayout::of(graph.op(node)).context)
    }

    pub fn get_frame_state_input(graph: &Graph, node: NodeId, index: usize) -> NodeId {
        let layout = InputLayout::of(graph.op(node));
        debug_assert!(layout.frame_state + index < layout.effect);
        graph.input(node, layout.frame_state + index)
    }

    pub fn get_effect_input(graph: &Graph, node: NodeId, index: usize) -> NodeId {
        let layout = InputLayout::of(graph.op(node));
        debug_assert!(layout.effect + index < layout.control);
        graph.input(node, layout.effect + index)
    }

    pub fn get_control_input(graph: &Graph, node: NodeId, index: usize) -> NodeId {
        let layout = InputLayout::of(graph.op(node));
        debug_assert!(layout.control + index < layout.past_control);
        graph.input(node, layout.control + index)
    }

    pub fn value_inputs(graph: &Graph, node: NodeId) -> &[NodeId] {
        let n = graph.op(node).value_input_count() as usize;
        &graph.inputs(node)[..n]
    }

    pub fn control_inputs(graph: &Graph, node: NodeId) -> &[NodeId] {
        let layout = InputLayout::of(graph.op(node));
        let inputs = graph.inputs(node);
        &inputs[layout.control.min(inputs.len())..layout.past_control.min(inputs.len())]
    }

    pub fn effect_inputs(graph: &Graph, node: NodeId) -> &[NodeId] {
        let layout = InputLayout::of(graph.op(node));
        let inputs = graph.inputs(node);
        &inputs[layout.effect.min(inputs.len())..layout.control.min(inputs.len())]
    }

    // -------------------------------------------------------------------------
    // Edge classification
    // -------------------------------------------------------------------------

    pub fn is_value_edge(graph: &Graph, edge: Edge) -> bool {
        edge.index < graph.op(edge.from).value_input_count() as usize
    }

    pub fn is_context_edge(graph: &Graph, edge: Edge) -> bool {
        let layout = InputLayout::of(graph.op(edge.from));
        (layout.context..layout.frame_state).contains(&edge.index)
    }

    pub fn is_frame_state_edge(graph: &Graph, edge: Edge) -> bool {
        let layout = InputLayout::of(graph.op(edge.from));
        (layout.frame_state..layout.effect).contains(&edge.index)
    }

    pub fn is_effect_edge(graph: &Graph, edge: Edge) -> bool {
        let layout = InputLayout::of(graph.op(edge.from));
        (layout.effect..layout.control).contains(&edge.index)
    }

    pub fn is_control_edge(graph: &Graph, edge: Edge) -> bool {
        let layout = InputLayout::of(graph.op(edge.from));
        (layout.control..layout.past_control).contains(&edge.index)
    }

    pub fn is_phi(graph: &Graph, node: NodeId) -> bool {
        graph.opcode(node).is_phi()
    }

    /// True for nodes that can never produce a value or control token.
    pub fn is_dead_marker(graph: &Graph, node: NodeId) -> bool {
        node.is_valid() && graph.opcode(node).is_dead_marker()
    }

    // -------------------------------------------------------------------------
    // Rewiring
    // -------------------------------------------------------------------------

    pub fn replace_value_input(graph: &mut Graph, node: NodeId, value: NodeId, index: usize) {
        debug_assert!(index < graph.op(node).value_input_count() as usize);
        graph.replace_input(node, index, value);
    }

    pub fn replace_effect_input(graph: &mut Graph, node: NodeId, effect: NodeId, index: usize) {
        let layout = InputLayout::of(graph.op(node));
        debug_assert!(layout.effect + index < layout.control);
        graph.replace_input(node, layout.effect + index, effect);
    }

    pub fn replace_control_input(graph: &mut Graph, node: NodeId, control: NodeId, index: usize) {
        let layout = InputLayout::of(graph.op(node));
        debug_assert!(layout.control + index < layout.past_control);
        graph.replace_input(node, layout.control + index, control);
    }

    /// The `IfTrue`/`IfFalse` (or `IfSuccess`/`IfException`) uses of `node`,
    /// in that order. Missing projections are `INVALID`.
    pub fn collect_control_projections(graph: &Graph, node: NodeId) -> [NodeId; 2] {
        let mut projections = [NodeId::INVALID; 2];
        for user in graph.users(node) {
            match graph.opcode(user) {
                Opcode::IfTrue | Opcode::IfSuccess => projections[0] = user,
                Opcode::IfFalse | Opcode::IfException => projections[1] = user,
                _ => {}
            }
        }
        projections
    }

    /// Add `node` as another input of `End`.
    pub fn merge_control_to_end(graph: &mut Graph, node: NodeId) {
        let end = graph.end;
        graph.append_input(end, node);
        let arity = graph.node(end).input_count() as u32;
        let op = CommonOperatorBuilder::new().end(arity);
        graph.change_op(end, op);
    }

    /// Redirect all uses of `node` by edge kind: value uses to `value`,
    /// effect uses to `effect`, control uses to `control`. `INVALID`
    /// arguments fall back to the node's own corresponding input.
    pub fn replace_with_value(
        graph: &mut Graph,
        node: NodeId,
        value: NodeId,
        effect: NodeId,
        control: NodeId,
    ) {
        let op = *graph.op(node);
        let effect = if !effect.is_valid() && op.effect_input_count() > 0 {
            Self::get_effect_input(graph, node, 0)
        } else {
            effect
        };
        let control = if !control.is_valid() && op.control_input_count() > 0 {
            Self::get_control_input(graph, node, 0)
        } else {
            control
        };
        for edge in graph.use_edges(node) {
            let target = if Self::is_control_edge(graph, edge) {
                control
            } else if Self::is_effect_edge(graph, edge) {
                effect
            } else {
                value
            };
            graph.replace_input(edge.from, edge.index, target);
        }
    }
}
