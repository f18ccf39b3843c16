//! Representation selection (simplified lowering).
//!
//! Two phases over the nodes reachable from `End`:
//!
//! 1. **Propagate**: starting at `End`, every node tells its inputs how it
//!    will use them ([`UseInfo`]). Requests are merged per node with
//!    [`Truncation::generalize`]; a node whose truncation grows is queued
//!    again. The lattice is finite, so this terminates. Each node's output
//!    representation is decided from its type and its final truncation,
//!    and the order in which nodes were first reached is recorded.
//! 2. **Lower**: replays the recorded order, inserting conversions where an
//!    input's output representation differs from what the use needs and
//!    rewriting simplified operators to machine operators in place.
//!    Nodes that become a plain value (e.g. `NumberToInt32` of an int32)
//!    are replaced only after the whole phase, since other nodes still
//!    refer to their decisions.

use std::collections::VecDeque;

use tracing::{debug, debug_span, trace};

use crate::error::{CompileError, Result};
use crate::ir::builders::{CommonOperatorBuilder, MachineOperatorBuilder};
use crate::ir::machine_type::MachineType;
use crate::ir::node::{Node, NodeId};
use crate::ir::operators::{Opcode, StoreRepresentation, HEAP_OBJECT_TAG};
use crate::ir::types::Type;
use crate::ir::{Graph, IdMap};

use super::changer::RepresentationChanger;
use super::diamond;
use super::representation::{Truncation, UseInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Propagate,
    Lower,
}

#[derive(Debug, Clone, Copy)]
struct NodeInfo {
    truncation: Truncation,
    visited: bool,
    queued: bool,
    output: MachineType,
}

impl Default for NodeInfo {
    fn default() -> Self {
        NodeInfo {
            truncation: Truncation::None,
            visited: false,
            queued: false,
            output: MachineType::empty(),
        }
    }
}

/// Counters collected by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoweringStats {
    /// Nodes reached from `End`.
    pub visited: usize,
    /// Times a node was queued again because its truncation grew.
    pub requeued: usize,
    /// Operators rewritten in place.
    pub lowered: usize,
    /// Conversion nodes inserted.
    pub conversions: usize,
    /// Deferred replacements applied.
    pub replacements: usize,
}

pub struct RepresentationSelector {
    phase: Phase,
    info: IdMap<Node, NodeInfo>,
    /// Nodes in the order propagation first reached them.
    nodes: Vec<NodeId>,
    queue: VecDeque<NodeId>,
    replacements: Vec<(NodeId, NodeId)>,
    changer: RepresentationChanger,
    common: CommonOperatorBuilder,
    machine: MachineOperatorBuilder,
    stats: LoweringStats,
}

impl RepresentationSelector {
    pub fn new() -> Self {
        RepresentationSelector {
            phase: Phase::Propagate,
            info: IdMap::with_len(0),
            nodes: Vec::new(),
            queue: VecDeque::new(),
            replacements: Vec::new(),
            changer: RepresentationChanger::new(),
            common: CommonOperatorBuilder::new(),
            machine: MachineOperatorBuilder::new(),
            stats: LoweringStats::default(),
        }
    }

    pub fn stats(&self) -> LoweringStats {
        self.stats
    }

    /// Both phases, then the deferred replacements.
    pub fn run(&mut self, graph: &mut Graph) -> Result<LoweringStats> {
        let _span = debug_span!("simplified_lowering").entered();
        self.propagate(graph)?;
        self.lower(graph)?;
        debug!(
            visited = self.stats.visited,
            requeued = self.stats.requeued,
            lowered = self.stats.lowered,
            conversions = self.stats.conversions,
            replacements = self.stats.replacements,
            "representation selection done"
        );
        Ok(self.stats)
    }

    /// The propagation phase. Returns the number of requeue events.
    pub fn propagate(&mut self, graph: &mut Graph) -> Result<usize> {
        self.phase = Phase::Propagate;
        self.info = IdMap::with_len(graph.node_count());
        self.nodes.clear();
        let before = self.stats.requeued;
        let end = graph.end;
        self.enqueue(end, UseInfo::none());
        self.drain(graph)?;
        self.stats.visited = self.nodes.len();
        Ok(self.stats.requeued - before)
    }

    /// Visit every recorded node once more in propagation mode and report
    /// how many of them had to be queued again. Zero once propagation has
    /// reached its fixpoint.
    pub fn repropagate(&mut self, graph: &mut Graph) -> Result<usize> {
        debug_assert_eq!(self.phase, Phase::Propagate);
        let before = self.stats.requeued;
        for &node in &self.nodes {
            let info = self.info.get_mut(node);
            if !info.queued {
                info.queued = true;
                self.queue.push_back(node);
            }
        }
        self.drain(graph)?;
        Ok(self.stats.requeued - before)
    }

    /// The truncation propagation settled on for `node`.
    pub fn truncation(&self, node: NodeId) -> Truncation {
        self.info.get(node).truncation
    }

    /// The output machine type chosen for `node`.
    pub fn output(&self, node: NodeId) -> MachineType {
        self.info.get(node).output
    }

    fn drain(&mut self, graph: &mut Graph) -> Result<()> {
        while let Some(node) = self.queue.pop_front() {
            let info = self.info.get_mut(node);
            info.queued = false;
            let truncation = info.truncation;
            trace!(node = %node, op = %graph.op(node), %truncation, "propagate");
            self.visit_node(graph, node, truncation)?;
        }
        Ok(())
    }

    /// The lowering phase, followed by the deferred replacements.
    pub fn lower(&mut self, graph: &mut Graph) -> Result<()> {
        self.phase = Phase::Lower;
        let order = std::mem::take(&mut self.nodes);
        for &node in &order {
            let truncation = self.info.get(node).truncation;
            trace!(node = %node, op = %graph.op(node), %truncation, "lower");
            self.visit_node(graph, node, truncation)?;
        }
        self.nodes = order;
        self.apply_replacements(graph);
        self.stats.conversions = self.changer.inserted();
        Ok(())
    }

    fn apply_replacements(&mut self, graph: &mut Graph) {
        let mut replacements = std::mem::take(&mut self.replacements);
        for i in 0..replacements.len() {
            let (node, replacement) = replacements[i];
            trace!(node = %node, replacement = %replacement, "deferred replacement");
            graph.replace_uses(node, replacement);
            graph.kill(node);
            // Later entries may still name the node just replaced.
            for entry in &mut replacements[i + 1..] {
                if entry.1 == node {
                    entry.1 = replacement;
                }
            }
            self.stats.replacements += 1;
        }
    }

    // -------------------------------------------------------------------------
    // Phase-dependent primitives
    // -------------------------------------------------------------------------

    fn enqueue(&mut self, node: NodeId, use_info: UseInfo) {
        if !node.is_valid() {
            return;
        }
        let info = self.info.get_mut(node);
        if !info.visited {
            info.visited = true;
            info.queued = true;
            info.truncation = use_info.truncation;
            self.nodes.push(node);
            self.queue.push_back(node);
            return;
        }
        let generalized = info.truncation.generalize(use_info.truncation);
        if generalized != info.truncation {
            info.truncation = generalized;
            self.stats.requeued += 1;
            if !info.queued {
                info.queued = true;
                self.queue.push_back(node);
            }
        }
    }

    fn process_input(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        index: usize,
        use_info: UseInfo,
    ) -> Result<()> {
        let input = graph.input(node, index);
        match self.phase {
            Phase::Propagate => {
                self.enqueue(input, use_info);
                Ok(())
            }
            Phase::Lower => {
                if !input.is_valid() {
                    return Ok(());
                }
                let output = self.info.get(input).output;
                let converted =
                    self.changer
                        .get_representation_for(graph, input, output, use_info)?;
                if converted != input {
                    graph.replace_input(node, index, converted);
                }
                Ok(())
            }
        }
    }

    /// Inputs from `first` on carry no value the node computes with.
    fn process_remaining_inputs(&mut self, graph: &Graph, node: NodeId, first: usize) {
        if self.phase != Phase::Propagate {
            return;
        }
        for index in first..graph.node(node).input_count() {
            self.enqueue(graph.input(node, index), UseInfo::none());
        }
    }

    fn set_output(&mut self, node: NodeId, output: MachineType) {
        if self.phase == Phase::Propagate {
            self.info.get_mut(node).output = output;
        } else {
            debug_assert_eq!(self.info.get(node).output, output);
        }
    }

    fn lowering(&self) -> bool {
        self.phase == Phase::Lower
    }

    fn change_op(&mut self, graph: &mut Graph, node: NodeId, op: crate::ir::Operator) {
        graph.change_op(node, op);
        graph.mark_lowered(node);
        self.stats.lowered += 1;
    }

    fn defer_replacement(&mut self, node: NodeId, replacement: NodeId) {
        self.replacements.push((node, replacement));
    }

    // -------------------------------------------------------------------------
    // Visitors
    // -------------------------------------------------------------------------

    /// Value and context inputs as tagged, the rest as non-value uses.
    fn visit_inputs(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        let op = *graph.op(node);
        let tagged = (op.value_input_count() + op.context_input_count()) as usize;
        for index in 0..tagged {
            self.process_input(graph, node, index, UseInfo::any_tagged())?;
        }
        self.process_remaining_inputs(graph, node, tagged);
        Ok(())
    }

    fn visit_leaf(&mut self, graph: &mut Graph, node: NodeId, output: MachineType) {
        self.process_remaining_inputs(graph, node, 0);
        self.set_output(node, output);
    }

    fn visit_unop(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        input_use: UseInfo,
        output: MachineType,
    ) -> Result<()> {
        self.process_input(graph, node, 0, input_use)?;
        self.process_remaining_inputs(graph, node, 1);
        self.set_output(node, output);
        Ok(())
    }

    fn visit_binop(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        input_use: UseInfo,
        output: MachineType,
    ) -> Result<()> {
        self.process_input(graph, node, 0, input_use)?;
        self.process_input(graph, node, 1, input_use)?;
        self.process_remaining_inputs(graph, node, 2);
        self.set_output(node, output);
        Ok(())
    }

    fn visit_int32_binop(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        self.visit_binop(graph, node, UseInfo::truncating_word32(), MachineType::MACH_INT32)
    }

    fn visit_uint32_binop(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        self.visit_binop(graph, node, UseInfo::truncating_uint32(), MachineType::MACH_UINT32)
    }

    fn visit_float64_binop(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        self.visit_binop(graph, node, UseInfo::truncating_float64(), MachineType::MACH_FLOAT64)
    }

    fn visit_int32_cmp(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        self.visit_binop(graph, node, UseInfo::truncating_word32(), MachineType::MACH_BOOL)
    }

    fn visit_uint32_cmp(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        self.visit_binop(graph, node, UseInfo::truncating_uint32(), MachineType::MACH_BOOL)
    }

    fn visit_float64_cmp(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        self.visit_binop(graph, node, UseInfo::truncating_float64(), MachineType::MACH_BOOL)
    }

    fn visit_node(&mut self, graph: &mut Graph, node: NodeId, truncation: Truncation) -> Result<()> {
        use Opcode::*;
        let op = *graph.op(node);
        match op.opcode() {
            // Control and effect structure.
            Start | End | Dead | Loop | Merge | IfTrue | IfFalse | IfSuccess | IfException
            | Throw | Terminate | Unreachable | Deoptimize | LoopExit | LoopExitEffect
            | EffectPhi | OsrNormalEntry | OsrLoopEntry => {
                self.visit_leaf(graph, node, MachineType::empty());
            }
            Return => {
                self.visit_unop(graph, node, UseInfo::any_tagged(), MachineType::empty())?;
            }
            Branch => {
                self.visit_unop(graph, node, UseInfo::bool(), MachineType::empty())?;
            }

            // Leaves.
            Parameter | OsrValue | HeapConstant | NumberConstant => {
                self.visit_leaf(graph, node, MachineType::MACH_ANY_TAGGED);
            }
            Int32Constant => self.visit_leaf(graph, node, MachineType::MACH_INT32),
            Float64Constant => self.visit_leaf(graph, node, MachineType::MACH_FLOAT64),
            DeadValue => {
                let rep = op.phi_representation();
                let rep = if rep.is_empty() { MachineType::MACH_ANY_TAGGED } else { rep };
                self.visit_leaf(graph, node, rep);
            }
            Projection => self.visit_leaf(graph, node, MachineType::MACH_ANY_TAGGED),

            Phi => self.visit_phi(graph, node, truncation)?,
            Select => self.visit_select(graph, node, truncation)?,
            LoopExitValue => {
                let output = phi_output(graph, node, truncation);
                let use_info = UseInfo::for_machine_type(output, truncation);
                self.visit_unop(graph, node, use_info, output)?;
                if self.lowering() && op.phi_representation() != output {
                    let lowered = self.common.loop_exit_value(output);
                    self.change_op(graph, node, lowered);
                }
            }
            FrameState => {
                self.visit_inputs(graph, node)?;
                self.set_output(node, MachineType::empty());
            }
            StateValues => {
                self.visit_inputs(graph, node)?;
                self.set_output(node, MachineType::MACH_ANY_TAGGED);
            }
            Call | JsAdd | JsSubtract | JsMultiply | JsLessThan | JsStrictEqual | JsToNumber
            | JsToBoolean | JsCallFunction | JsStackCheck => {
                self.visit_inputs(graph, node)?;
                let output = if op.value_output_count() > 0 {
                    MachineType::MACH_ANY_TAGGED
                } else {
                    MachineType::empty()
                };
                self.set_output(node, output);
            }

            // Simplified operators.
            BooleanNot => {
                self.visit_unop(graph, node, UseInfo::bool(), MachineType::MACH_BOOL)?;
                if self.lowering() {
                    let zero = graph.int32_constant(0);
                    graph.append_input(node, zero);
                    let lowered = self.machine.word32_equal();
                    self.change_op(graph, node, lowered);
                }
            }
            BooleanToNumber => {
                self.visit_unop(graph, node, UseInfo::bool(), MachineType::MACH_INT32)?;
                if self.lowering() {
                    let input = graph.input(node, 0);
                    self.defer_replacement(node, input);
                }
            }
            NumberEqual | NumberLessThan | NumberLessThanOrEqual => {
                self.visit_number_comparison(graph, node)?;
            }
            NumberAdd | NumberSubtract => self.visit_number_add_sub(graph, node, truncation)?,
            NumberMultiply => self.visit_number_multiply(graph, node, truncation)?,
            NumberDivide | NumberModulus => self.visit_number_div_mod(graph, node, truncation)?,
            NumberToInt32 => {
                self.visit_unop(graph, node, UseInfo::truncating_word32(), MachineType::MACH_INT32)?;
                if self.lowering() {
                    let input = graph.input(node, 0);
                    self.defer_replacement(node, input);
                }
            }
            NumberToUint32 => {
                self.visit_unop(graph, node, UseInfo::truncating_uint32(), MachineType::MACH_UINT32)?;
                if self.lowering() {
                    let input = graph.input(node, 0);
                    self.defer_replacement(node, input);
                }
            }
            ReferenceEqual => {
                self.visit_binop(graph, node, UseInfo::any_tagged(), MachineType::MACH_BOOL)?;
                if self.lowering() {
                    let lowered = self.machine.word64_equal();
                    self.change_op(graph, node, lowered);
                }
            }
            LoadField => self.visit_load_field(graph, node)?,
            StoreField => self.visit_store_field(graph, node)?,
            LoadElement => self.visit_load_element(graph, node)?,
            StoreElement => self.visit_store_element(graph, node)?,

            // Machine operators already in the graph.
            Word32And | Word32Or | Word32Xor | Word32Shl | Word32Shr | Word32Sar | Int32Add
            | Int32Sub | Int32Mul | Int32Div | Int32Mod => self.visit_int32_binop(graph, node)?,
            Uint32Div | Uint32Mod => self.visit_uint32_binop(graph, node)?,
            Word32Equal | Int32LessThan | Int32LessThanOrEqual => {
                self.visit_int32_cmp(graph, node)?;
            }
            Uint32LessThan | Uint32LessThanOrEqual => self.visit_uint32_cmp(graph, node)?,
            Word64Equal => {
                self.visit_binop(graph, node, UseInfo::any_tagged(), MachineType::MACH_BOOL)?;
            }
            Float64Add | Float64Sub | Float64Mul | Float64Div | Float64Mod => {
                self.visit_binop(graph, node, UseInfo::float64(), MachineType::MACH_FLOAT64)?;
            }
            Float64Equal | Float64LessThan | Float64LessThanOrEqual => {
                self.visit_float64_cmp(graph, node)?;
            }
            ChangeInt32ToFloat64 => {
                self.visit_unop(graph, node, UseInfo::int32(), MachineType::MACH_FLOAT64)?;
            }
            ChangeUint32ToFloat64 => {
                let use_info = UseInfo::new(MachineType::MACH_UINT32, Truncation::Any);
                self.visit_unop(graph, node, use_info, MachineType::MACH_FLOAT64)?;
            }
            ChangeFloat64ToInt32 => {
                self.visit_unop(graph, node, UseInfo::float64(), MachineType::MACH_INT32)?;
            }
            ChangeFloat64ToUint32 => {
                self.visit_unop(graph, node, UseInfo::float64(), MachineType::MACH_UINT32)?;
            }
            TruncateFloat64ToInt32 => {
                self.visit_unop(graph, node, UseInfo::truncating_float64(), MachineType::MACH_INT32)?;
            }
            Load => {
                let rep = op.phi_representation();
                let base = UseInfo::new(MachineType::empty(), Truncation::Any);
                self.process_input(graph, node, 0, base)?;
                self.process_input(graph, node, 1, UseInfo::truncating_word32())?;
                self.process_remaining_inputs(graph, node, 2);
                self.set_output(node, rep);
            }
            Store => {
                let StoreRepresentation { machine_type, .. } = store_representation(graph, node);
                let base = UseInfo::new(MachineType::empty(), Truncation::Any);
                self.process_input(graph, node, 0, base)?;
                self.process_input(graph, node, 1, UseInfo::truncating_word32())?;
                self.process_input(graph, node, 2, use_for_stored(machine_type))?;
                self.process_remaining_inputs(graph, node, 3);
                self.set_output(node, MachineType::empty());
            }

            opcode => {
                return Err(CompileError::Unimplemented {
                    pass: "simplified lowering",
                    opcode,
                });
            }
        }
        Ok(())
    }

    fn visit_phi(&mut self, graph: &mut Graph, node: NodeId, truncation: Truncation) -> Result<()> {
        let op = *graph.op(node);
        let output = phi_output(graph, node, truncation);
        let use_info = UseInfo::for_machine_type(output, truncation);
        let arity = op.value_input_count() as usize;
        for index in 0..arity {
            self.process_input(graph, node, index, use_info)?;
        }
        self.process_remaining_inputs(graph, node, arity);
        self.set_output(node, output);
        if self.lowering() && op.phi_representation() != output {
            let lowered = self.common.phi(output, arity as u32);
            self.change_op(graph, node, lowered);
        }
        Ok(())
    }

    fn visit_select(&mut self, graph: &mut Graph, node: NodeId, truncation: Truncation) -> Result<()> {
        let op = *graph.op(node);
        let output = phi_output(graph, node, truncation);
        let use_info = UseInfo::for_machine_type(output, truncation);
        self.process_input(graph, node, 0, UseInfo::bool())?;
        self.process_input(graph, node, 1, use_info)?;
        self.process_input(graph, node, 2, use_info)?;
        self.process_remaining_inputs(graph, node, 3);
        self.set_output(node, output);
        if self.lowering() && op.phi_representation() != output {
            let lowered = self.common.select(output);
            self.change_op(graph, node, lowered);
        }
        Ok(())
    }

    fn visit_number_comparison(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        let opcode = graph.opcode(node);
        if both_inputs_are(graph, node, Type::SIGNED32) {
            self.visit_int32_cmp(graph, node)?;
            if self.lowering() {
                let lowered = match opcode {
                    Opcode::NumberEqual => self.machine.word32_equal(),
                    Opcode::NumberLessThan => self.machine.int32_less_than(),
                    _ => self.machine.int32_less_than_or_equal(),
                };
                self.change_op(graph, node, lowered);
            }
        } else if both_inputs_are(graph, node, Type::UNSIGNED32) {
            self.visit_uint32_cmp(graph, node)?;
            if self.lowering() {
                let lowered = match opcode {
                    Opcode::NumberEqual => self.machine.word32_equal(),
                    Opcode::NumberLessThan => self.machine.uint32_less_than(),
                    _ => self.machine.uint32_less_than_or_equal(),
                };
                self.change_op(graph, node, lowered);
            }
        } else {
            self.visit_float64_cmp(graph, node)?;
            if self.lowering() {
                let lowered = match opcode {
                    Opcode::NumberEqual => self.machine.float64_equal(),
                    Opcode::NumberLessThan => self.machine.float64_less_than(),
                    _ => self.machine.float64_less_than_or_equal(),
                };
                self.change_op(graph, node, lowered);
            }
        }
        Ok(())
    }

    fn visit_number_add_sub(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        truncation: Truncation,
    ) -> Result<()> {
        let is_add = graph.opcode(node) == Opcode::NumberAdd;
        if can_lower_to_int32_binop(graph, node, truncation) {
            self.visit_int32_binop(graph, node)?;
        } else if can_lower_to_uint32_binop(graph, node, truncation) {
            self.visit_uint32_binop(graph, node)?;
        } else {
            self.visit_float64_binop(graph, node)?;
            if self.lowering() {
                let lowered = if is_add {
                    self.machine.float64_add()
                } else {
                    self.machine.float64_sub()
                };
                self.change_op(graph, node, lowered);
            }
            return Ok(());
        }
        if self.lowering() {
            let lowered = if is_add {
                self.machine.int32_add()
            } else {
                self.machine.int32_sub()
            };
            self.change_op(graph, node, lowered);
        }
        Ok(())
    }

    fn visit_number_multiply(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        truncation: Truncation,
    ) -> Result<()> {
        // The double product of two int32s is exact only while it fits the
        // mantissa, so truncation alone is not enough.
        let small_rhs = constant_number(graph, graph.input(node, 1))
            .is_some_and(|v| (-1_048_576.0..=1_048_576.0).contains(&v));
        let int32 = both_inputs_are(graph, node, Type::SIGNED32)
            && (graph.ty(node).is(Type::SIGNED32)
                || (small_rhs && truncation.is_used_as_word32()));
        if int32 {
            self.visit_int32_binop(graph, node)?;
            if self.lowering() {
                let lowered = self.machine.int32_mul();
                self.change_op(graph, node, lowered);
            }
        } else {
            self.visit_float64_binop(graph, node)?;
            if self.lowering() {
                let lowered = self.machine.float64_mul();
                self.change_op(graph, node, lowered);
            }
        }
        Ok(())
    }

    fn visit_number_div_mod(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        truncation: Truncation,
    ) -> Result<()> {
        let is_div = graph.opcode(node) == Opcode::NumberDivide;
        let rhs = constant_number(graph, graph.input(node, 1));

        if rhs.is_some_and(|v| v != 0.0 && v != -1.0) {
            // A divisor that can neither trap nor overflow.
            if can_lower_to_int32_binop(graph, node, truncation) {
                self.visit_int32_binop(graph, node)?;
                if self.lowering() {
                    let lowered = if is_div {
                        self.machine.int32_div()
                    } else {
                        self.machine.int32_mod()
                    };
                    self.lower_to_pinned_division(graph, node, lowered);
                }
                return Ok(());
            }
            if can_lower_to_uint32_binop(graph, node, truncation) {
                self.visit_uint32_binop(graph, node)?;
                if self.lowering() {
                    let lowered = if is_div {
                        self.machine.uint32_div()
                    } else {
                        self.machine.uint32_mod()
                    };
                    self.lower_to_pinned_division(graph, node, lowered);
                }
                return Ok(());
            }
        }

        if can_lower_to_int32_binop(graph, node, truncation) {
            self.visit_int32_binop(graph, node)?;
            if self.lowering() {
                let (lhs, rhs) = (graph.input(node, 0), graph.input(node, 1));
                let expanded = if is_div {
                    diamond::int32_div(graph, lhs, rhs)
                } else {
                    diamond::int32_mod(graph, lhs, rhs)
                };
                self.defer_replacement(node, expanded);
            }
        } else if both_inputs_are(graph, node, Type::UNSIGNED32) && !truncation.can_observe_nan() {
            self.visit_uint32_binop(graph, node)?;
            if self.lowering() {
                let (lhs, rhs) = (graph.input(node, 0), graph.input(node, 1));
                let expanded = if is_div {
                    diamond::uint32_div(graph, lhs, rhs)
                } else {
                    diamond::uint32_mod(graph, lhs, rhs)
                };
                self.defer_replacement(node, expanded);
            }
        } else {
            self.visit_float64_binop(graph, node)?;
            if self.lowering() {
                let lowered = if is_div {
                    self.machine.float64_div()
                } else {
                    self.machine.float64_mod()
                };
                self.change_op(graph, node, lowered);
            }
        }
        Ok(())
    }

    /// Machine divisions carry a control input; a safe divisor lets them
    /// float from `Start`.
    fn lower_to_pinned_division(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        op: crate::ir::Operator,
    ) {
        let start = graph.start;
        graph.append_input(node, start);
        self.change_op(graph, node, op);
    }

    fn visit_load_field(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        let access = graph.op(node).field_access();
        self.visit_unop(graph, node, UseInfo::any_tagged(), access.machine_type)?;
        if self.lowering() {
            let offset = graph.int32_constant(access.untagged_offset());
            graph.insert_input(node, 1, offset);
            let lowered = self.machine.load(access.machine_type);
            self.change_op(graph, node, lowered);
        }
        Ok(())
    }

    fn visit_store_field(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        let access = graph.op(node).field_access();
        self.process_input(graph, node, 0, UseInfo::any_tagged())?;
        self.process_input(graph, node, 1, use_for_stored(access.machine_type))?;
        self.process_remaining_inputs(graph, node, 2);
        self.set_output(node, MachineType::empty());
        if self.lowering() {
            let offset = graph.int32_constant(access.untagged_offset());
            graph.insert_input(node, 1, offset);
            let lowered = self.machine.store(StoreRepresentation {
                machine_type: access.machine_type,
                write_barrier: access.write_barrier,
            });
            self.change_op(graph, node, lowered);
        }
        Ok(())
    }

    fn visit_load_element(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        let access = graph.op(node).element_access();
        self.process_input(graph, node, 0, UseInfo::any_tagged())?;
        self.process_input(graph, node, 1, UseInfo::truncating_word32())?;
        self.process_remaining_inputs(graph, node, 2);
        self.set_output(node, access.machine_type);
        if self.lowering() {
            let index = self.compute_element_index(graph, node, access.machine_type, access.header_size);
            graph.replace_input(node, 1, index);
            let lowered = self.machine.load(access.machine_type);
            self.change_op(graph, node, lowered);
        }
        Ok(())
    }

    fn visit_store_element(&mut self, graph: &mut Graph, node: NodeId) -> Result<()> {
        let access = graph.op(node).element_access();
        self.process_input(graph, node, 0, UseInfo::any_tagged())?;
        self.process_input(graph, node, 1, UseInfo::truncating_word32())?;
        self.process_input(graph, node, 2, use_for_stored(access.machine_type))?;
        self.process_remaining_inputs(graph, node, 3);
        self.set_output(node, MachineType::empty());
        if self.lowering() {
            let index = self.compute_element_index(graph, node, access.machine_type, access.header_size);
            graph.replace_input(node, 1, index);
            let lowered = self.machine.store(StoreRepresentation {
                machine_type: access.machine_type,
                write_barrier: access.write_barrier,
            });
            self.change_op(graph, node, lowered);
        }
        Ok(())
    }

    /// `(key << log2(size)) + (header - tag)`.
    fn compute_element_index(
        &mut self,
        graph: &mut Graph,
        node: NodeId,
        machine_type: MachineType,
        header_size: i32,
    ) -> NodeId {
        let key = graph.input(node, 1);
        let shift = graph.int32_constant(machine_type.element_size_log2() as i32);
        let scaled = graph.new_node(self.machine.word32_shl(), &[key, shift]);
        let offset = header_size - HEAP_OBJECT_TAG;
        if offset == 0 {
            return scaled;
        }
        let header = graph.int32_constant(offset);
        graph.new_node(self.machine.int32_add(), &[scaled, header])
    }
}

impl Default for RepresentationSelector {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn both_inputs_are(graph: &Graph, node: NodeId, ty: Type) -> bool {
    let (lhs, rhs) = (graph.input(node, 0), graph.input(node, 1));
    graph.ty(lhs).is(ty) && graph.ty(rhs).is(ty)
}

fn can_lower_to_int32_binop(graph: &Graph, node: NodeId, truncation: Truncation) -> bool {
    both_inputs_are(graph, node, Type::SIGNED32)
        && (truncation.is_used_as_word32() || graph.ty(node).is(Type::SIGNED32))
}

fn can_lower_to_uint32_binop(graph: &Graph, node: NodeId, truncation: Truncation) -> bool {
    both_inputs_are(graph, node, Type::UNSIGNED32)
        && (truncation.is_used_as_word32() || graph.ty(node).is(Type::UNSIGNED32))
}

fn constant_number(graph: &Graph, node: NodeId) -> Option<f64> {
    let op = graph.op(node);
    match op.opcode() {
        Opcode::Int32Constant => op.int32_value().map(f64::from),
        Opcode::NumberConstant | Opcode::Float64Constant => op.number_value(),
        _ => None,
    }
}

fn store_representation(graph: &Graph, node: NodeId) -> StoreRepresentation {
    match graph.op(node).param() {
        crate::ir::OpParam::Store(rep) => *rep,
        _ => StoreRepresentation {
            machine_type: MachineType::MACH_ANY_TAGGED,
            write_barrier: crate::ir::WriteBarrierKind::FullWriteBarrier,
        },
    }
}

/// The request a store of `machine_type` makes of the stored value.
fn use_for_stored(machine_type: MachineType) -> UseInfo {
    let rep = machine_type.representation();
    let truncation = if rep == MachineType::REP_BIT {
        Truncation::Bool
    } else if rep.is_word32() {
        Truncation::Word32
    } else if rep == MachineType::REP_FLOAT64 || rep == MachineType::REP_FLOAT32 {
        Truncation::Float64
    } else {
        Truncation::Any
    };
    UseInfo::for_machine_type(machine_type, truncation)
}

/// Representation of a phi-like node from its type and how it is used.
/// Untyped phis built directly at the machine level keep theirs.
fn phi_output(graph: &Graph, node: NodeId, truncation: Truncation) -> MachineType {
    let declared = graph.op(node).phi_representation();
    if !graph.node(node).is_typed() && !declared.is_empty() {
        return declared;
    }
    let ty = graph.ty(node);
    if ty.is(Type::BOOLEAN) && truncation == Truncation::Bool {
        MachineType::MACH_BOOL
    } else if ty.is(Type::SIGNED32) {
        MachineType::MACH_INT32
    } else if ty.is(Type::UNSIGNED32) {
        MachineType::MACH_UINT32
    } else if ty.is(Type::NUMBER) && truncation.is_used_as_word32() {
        MachineType::MACH_INT32
    } else if ty.is(Type::NUMBER) {
        MachineType::MACH_FLOAT64
    } else if ty.is(Type::INTERNAL) {
        MachineType::MACH_PTR
    } else {
        MachineType::MACH_ANY_TAGGED
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GraphFixture;

    fn lower(f: &mut GraphFixture) -> LoweringStats {
        RepresentationSelector::new()
            .run(&mut f.graph)
            .expect("lowering succeeds")
    }

    #[test]
    fn test_truncated_signed_add_becomes_int32_add() {
        let mut f = GraphFixture::new(1);
        let (x, y, effect) = f.int32_fields();
        let add = f.graph.new_node(f.simplified.number_add(), &[x, y]);
        let trunc = f.graph.new_node(f.simplified.number_to_int32(), &[add]);
        let start = f.graph.start;
        let ret = f.ret(trunc, effect, start);

        lower(&mut f);

        assert_eq!(f.graph.opcode(add), Opcode::Int32Add);
        assert_eq!(f.graph.inputs(add), &[x, y]);
        // The truncation itself disappears; only the return boxes the result.
        let value = f.graph.input(ret, 0);
        assert_eq!(f.graph.opcode(value), Opcode::ChangeInt32ToTagged);
        assert_eq!(f.graph.input(value, 0), add);
        assert!(f.graph.is_dead(trunc));
    }

    #[test]
    fn test_untruncated_add_stays_float() {
        let mut f = GraphFixture::new(1);
        let (x, y, effect) = f.int32_fields();
        let add = f.graph.new_node(f.simplified.number_add(), &[x, y]);
        let start = f.graph.start;
        let ret = f.ret(add, effect, start);

        lower(&mut f);

        assert_eq!(f.graph.opcode(add), Opcode::Float64Add);
        assert_eq!(f.graph.opcode(f.graph.input(add, 0)), Opcode::ChangeInt32ToFloat64);
        assert_eq!(f.graph.opcode(f.graph.input(ret, 0)), Opcode::ChangeFloat64ToTagged);
    }

    #[test]
    fn test_comparison_of_signed_values() {
        let mut f = GraphFixture::new(1);
        let (x, y, effect) = f.int32_fields();
        let cmp = f.graph.new_node(f.simplified.number_less_than(), &[x, y]);
        let start = f.graph.start;
        let (t, fl) = f.branch(cmp, start);
        let merge = f.merge(&[t, fl]);
        f.ret(x, effect, merge);

        lower(&mut f);

        assert_eq!(f.graph.opcode(cmp), Opcode::Int32LessThan);
        assert_eq!(f.graph.input(f.graph.input(t, 0), 0), cmp);
    }

    #[test]
    fn test_boolean_not_compares_with_zero() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let not = f.graph.new_node(f.simplified.boolean_not(), &[p]);
        let start = f.graph.start;
        f.ret(not, start, start);

        lower(&mut f);

        assert_eq!(f.graph.opcode(not), Opcode::Word32Equal);
        let bit = f.graph.input(not, 0);
        assert_eq!(f.graph.opcode(bit), Opcode::ChangeBoolToBit);
        assert_eq!(f.graph.op(f.graph.input(not, 1)).int32_value(), Some(0));
    }

    #[test]
    fn test_general_signed_division_expands_to_diamonds() {
        let mut f = GraphFixture::new(1);
        let (x, y, effect) = f.int32_fields();
        let div = f.graph.new_node(f.simplified.number_divide(), &[x, y]);
        let trunc = f.graph.new_node(f.simplified.number_to_int32(), &[div]);
        let start = f.graph.start;
        let ret = f.ret(trunc, effect, start);

        let stats = lower(&mut f);

        assert!(f.graph.is_dead(div));
        let boxed = f.graph.input(ret, 0);
        let phi = f.graph.input(boxed, 0);
        assert_eq!(f.graph.opcode(phi), Opcode::Phi);
        assert_eq!(f.graph.op(phi).phi_representation(), MachineType::MACH_INT32);
        assert_eq!(stats.replacements, 2);
    }

    #[test]
    fn test_division_by_safe_constant_stays_single_op() {
        let mut f = GraphFixture::new(1);
        let (x, _, effect) = f.int32_fields();
        let four = f.number(4.0);
        let div = f.graph.new_node(f.simplified.number_divide(), &[x, four]);
        let trunc = f.graph.new_node(f.simplified.number_to_int32(), &[div]);
        let start = f.graph.start;
        f.ret(trunc, effect, start);

        lower(&mut f);

        assert_eq!(f.graph.opcode(div), Opcode::Int32Div);
        assert_eq!(f.graph.op(f.graph.input(div, 1)).int32_value(), Some(4));
        assert_eq!(f.graph.input(div, 2), f.graph.start);
    }

    #[test]
    fn test_unsigned_modulus_without_nan_observation() {
        let mut f = GraphFixture::new(1);
        let (x, y, effect) = f.uint32_fields();
        let rem = f.graph.new_node(f.simplified.number_modulus(), &[x, y]);
        let trunc = f.graph.new_node(f.simplified.number_to_uint32(), &[rem]);
        let start = f.graph.start;
        let ret = f.ret(trunc, effect, start);

        lower(&mut f);

        let boxed = f.graph.input(ret, 0);
        assert_eq!(f.graph.opcode(boxed), Opcode::ChangeUint32ToTagged);
        let phi = f.graph.input(boxed, 0);
        assert_eq!(f.graph.opcode(phi), Opcode::Phi);
    }

    #[test]
    fn test_load_field_becomes_machine_load() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let start = f.graph.start;
        let load = f
            .graph
            .new_node(f.simplified.load_field(GraphFixture::tagged_field(16)), &[p, start]);
        f.ret(load, load, start);

        lower(&mut f);

        assert_eq!(f.graph.opcode(load), Opcode::Load);
        let offset = f.graph.input(load, 1);
        assert_eq!(f.graph.op(offset).int32_value(), Some(16 - HEAP_OBJECT_TAG));
        assert_eq!(f.graph.input(load, 2), start);
    }

    #[test]
    fn test_phi_takes_word32_representation_when_truncated() {
        let mut f = GraphFixture::new(1);
        let (x, y, effect) = f.int32_fields();
        let start = f.graph.start;
        let cond = f.parameter(0);
        let (t, fl) = f.branch(cond, start);
        let merge = f.merge(&[t, fl]);
        let phi = f.phi(MachineType::MACH_ANY_TAGGED, &[x, y], merge);
        f.graph.set_type(phi, Type::NUMBER);
        let trunc = f.graph.new_node(f.simplified.number_to_int32(), &[phi]);
        f.ret(trunc, effect, merge);

        lower(&mut f);

        assert_eq!(f.graph.op(phi).phi_representation(), MachineType::MACH_INT32);
        assert_eq!(f.graph.inputs(phi), &[x, y, merge]);
    }

    #[test]
    fn test_propagation_reaches_fixpoint() {
        let mut f = GraphFixture::new(1);
        let (x, y, effect) = f.int32_fields();
        let add = f.graph.new_node(f.simplified.number_add(), &[x, y]);
        let trunc = f.graph.new_node(f.simplified.number_to_int32(), &[add]);
        let both = f.graph.new_node(f.simplified.number_add(), &[add, trunc]);
        let start = f.graph.start;
        f.ret(both, effect, start);

        let mut selector = RepresentationSelector::new();
        selector.propagate(&mut f.graph).unwrap();
        assert_eq!(selector.truncation(add), Truncation::Float64);
        assert_eq!(selector.repropagate(&mut f.graph).unwrap(), 0);
    }

    #[test]
    fn test_unknown_opcode_is_reported() {
        let mut f = GraphFixture::new(1);
        let p = f.parameter(0);
        let change = f.graph.new_node(f.simplified.change_tagged_to_int32(), &[p]);
        let start = f.graph.start;
        f.ret(change, start, start);

        let err = RepresentationSelector::new().run(&mut f.graph).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Unimplemented { opcode: Opcode::ChangeTaggedToInt32, .. }
        ));
    }
}
