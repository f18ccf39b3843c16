//! Control-flow expansions of integer division and modulus.
//!
//! Machine divide instructions trap (or are undefined) on a zero divisor
//! and on `i32::MIN / -1`, while the language semantics produce a value.
//! The expansions below branch around those cases. Their branches hang
//! off `Start`: they float until the scheduler splices them into the
//! control chain of the block their result is needed in.

use crate::ir::builders::{CommonOperatorBuilder, MachineOperatorBuilder};
use crate::ir::machine_type::MachineType;
use crate::ir::node::NodeId;
use crate::ir::operators::{BranchHint, Opcode};
use crate::ir::Graph;

/// A two-armed branch joined by a merge.
#[derive(Debug, Clone, Copy)]
pub struct Diamond {
    pub branch: NodeId,
    pub if_true: NodeId,
    pub if_false: NodeId,
    pub merge: NodeId,
}

impl Diamond {
    pub fn new(graph: &mut Graph, condition: NodeId, control: NodeId, hint: BranchHint) -> Self {
        let common = CommonOperatorBuilder::new();
        let branch = graph.new_node(common.branch(hint), &[condition, control]);
        let if_true = graph.new_node(common.if_true(), &[branch]);
        let if_false = graph.new_node(common.if_false(), &[branch]);
        let merge = graph.new_node(common.merge(2), &[if_true, if_false]);
        Diamond {
            branch,
            if_true,
            if_false,
            merge,
        }
    }

    pub fn phi(&self, graph: &mut Graph, rep: MachineType, vtrue: NodeId, vfalse: NodeId) -> NodeId {
        let op = CommonOperatorBuilder::new().phi(rep, 2);
        graph.new_node(op, &[vtrue, vfalse, self.merge])
    }

    /// Nest this diamond in the `if_true` or `if_false` arm of `outer`.
    pub fn nest(&self, graph: &mut Graph, outer: &Diamond, in_true_arm: bool) {
        let (arm, index) = if in_true_arm {
            (outer.if_true, 0)
        } else {
            (outer.if_false, 1)
        };
        graph.replace_input(self.branch, 1, arm);
        graph.replace_input(outer.merge, index, self.merge);
    }
}

/// The value of an `Int32Constant`, if `node` is one.
pub fn int32_constant_value(graph: &Graph, node: NodeId) -> Option<i32> {
    if graph.opcode(node) == Opcode::Int32Constant {
        graph.op(node).int32_value()
    } else {
        None
    }
}

/// Signed division with JS-style results for the trapping cases:
///
/// ```text
/// if 0 < rhs then lhs / rhs
/// else if rhs < -1 then lhs / rhs
/// else if rhs == 0 then 0
/// else 0 - lhs
/// ```
pub fn int32_div(graph: &mut Graph, lhs: NodeId, rhs: NodeId) -> NodeId {
    let machine = MachineOperatorBuilder::new();
    let common = CommonOperatorBuilder::new();
    let zero = graph.int32_constant(0);
    let start = graph.start;

    match int32_constant_value(graph, rhs) {
        Some(-1) => return graph.new_node(machine.int32_sub(), &[zero, lhs]),
        Some(0) => return rhs,
        Some(_) => return graph.new_node(machine.int32_div(), &[lhs, rhs, start]),
        None => {}
    }

    let minus_one = graph.int32_constant(-1);
    let merge_op = common.merge(2);
    let phi_op = common.phi(MachineType::MACH_INT32, 2);

    let check0 = graph.new_node(machine.int32_less_than(), &[zero, rhs]);
    let branch0 = graph.new_node(common.branch(BranchHint::True), &[check0, start]);
    let if_true0 = graph.new_node(common.if_true(), &[branch0]);
    let true0 = graph.new_node(machine.int32_div(), &[lhs, rhs, if_true0]);

    let if_false0 = graph.new_node(common.if_false(), &[branch0]);
    let check1 = graph.new_node(machine.int32_less_than(), &[rhs, minus_one]);
    let branch1 = graph.new_node(common.branch(BranchHint::None), &[check1, if_false0]);
    let if_true1 = graph.new_node(common.if_true(), &[branch1]);
    let true1 = graph.new_node(machine.int32_div(), &[lhs, rhs, if_true1]);

    let if_false1 = graph.new_node(common.if_false(), &[branch1]);
    let check2 = graph.new_node(machine.word32_equal(), &[rhs, zero]);
    let branch2 = graph.new_node(common.branch(BranchHint::None), &[check2, if_false1]);
    let if_true2 = graph.new_node(common.if_true(), &[branch2]);
    let if_false2 = graph.new_node(common.if_false(), &[branch2]);
    let false2 = graph.new_node(machine.int32_sub(), &[zero, lhs]);
    let merge2 = graph.new_node(merge_op, &[if_true2, if_false2]);
    let false1 = graph.new_node(phi_op, &[zero, false2, merge2]);

    let merge1 = graph.new_node(merge_op, &[if_true1, merge2]);
    let false0 = graph.new_node(phi_op, &[true1, false1, merge1]);

    let merge0 = graph.new_node(merge_op, &[if_true0, merge1]);
    graph.new_node(phi_op, &[true0, false0, merge0])
}

/// Signed modulus, with a mask fast path for power-of-two divisors:
///
/// ```text
/// if 0 < rhs then
///   msk = rhs - 1
///   if rhs & msk != 0 then lhs % rhs
///   else if lhs < 0 then -(-lhs & msk)
///   else lhs & msk
/// else if rhs < -1 then lhs % rhs
/// else 0
/// ```
pub fn int32_mod(graph: &mut Graph, lhs: NodeId, rhs: NodeId) -> NodeId {
    let machine = MachineOperatorBuilder::new();
    let common = CommonOperatorBuilder::new();
    let zero = graph.int32_constant(0);
    let start = graph.start;

    match int32_constant_value(graph, rhs) {
        Some(-1) | Some(0) => return zero,
        Some(_) => return graph.new_node(machine.int32_mod(), &[lhs, rhs, start]),
        None => {}
    }

    let minus_one = graph.int32_constant(-1);
    let merge_op = common.merge(2);
    let phi_op = common.phi(MachineType::MACH_INT32, 2);

    let check0 = graph.new_node(machine.int32_less_than(), &[zero, rhs]);
    let branch0 = graph.new_node(common.branch(BranchHint::True), &[check0, start]);

    let if_true0 = graph.new_node(common.if_true(), &[branch0]);
    let msk = graph.new_node(machine.int32_add(), &[rhs, minus_one]);
    let masked = graph.new_node(machine.word32_and(), &[rhs, msk]);
    let branch1 = graph.new_node(common.branch(BranchHint::None), &[masked, if_true0]);

    let if_true1 = graph.new_node(common.if_true(), &[branch1]);
    let true1 = graph.new_node(machine.int32_mod(), &[lhs, rhs, if_true1]);

    let if_false1 = graph.new_node(common.if_false(), &[branch1]);
    let check2 = graph.new_node(machine.int32_less_than(), &[lhs, zero]);
    let branch2 = graph.new_node(common.branch(BranchHint::False), &[check2, if_false1]);
    let if_true2 = graph.new_node(common.if_true(), &[branch2]);
    let negated = graph.new_node(machine.int32_sub(), &[zero, lhs]);
    let negated_masked = graph.new_node(machine.word32_and(), &[negated, msk]);
    let true2 = graph.new_node(machine.int32_sub(), &[zero, negated_masked]);
    let if_false2 = graph.new_node(common.if_false(), &[branch2]);
    let false2 = graph.new_node(machine.word32_and(), &[lhs, msk]);
    let merge2 = graph.new_node(merge_op, &[if_true2, if_false2]);
    let false1 = graph.new_node(phi_op, &[true2, false2, merge2]);

    let merge1 = graph.new_node(merge_op, &[if_true1, merge2]);
    let true0 = graph.new_node(phi_op, &[true1, false1, merge1]);

    let if_false0 = graph.new_node(common.if_false(), &[branch0]);
    let check3 = graph.new_node(machine.int32_less_than(), &[rhs, minus_one]);
    let branch3 = graph.new_node(common.branch(BranchHint::True), &[check3, if_false0]);
    let if_true3 = graph.new_node(common.if_true(), &[branch3]);
    let true3 = graph.new_node(machine.int32_mod(), &[lhs, rhs, if_true3]);
    let if_false3 = graph.new_node(common.if_false(), &[branch3]);
    let merge3 = graph.new_node(merge_op, &[if_true3, if_false3]);
    let false0 = graph.new_node(phi_op, &[true3, zero, merge3]);

    let merge0 = graph.new_node(merge_op, &[merge1, merge3]);
    graph.new_node(phi_op, &[true0, false0, merge0])
}

/// Unsigned division; a zero divisor yields zero.
pub fn uint32_div(graph: &mut Graph, lhs: NodeId, rhs: NodeId) -> NodeId {
    let machine = MachineOperatorBuilder::new();
    let zero = graph.int32_constant(0);
    let start = graph.start;

    match int32_constant_value(graph, rhs) {
        Some(0) => return zero,
        Some(_) => return graph.new_node(machine.uint32_div(), &[lhs, rhs, start]),
        None => {}
    }

    let check = graph.new_node(machine.word32_equal(), &[rhs, zero]);
    let d = Diamond::new(graph, check, start, BranchHint::False);
    let div = graph.new_node(machine.uint32_div(), &[lhs, rhs, d.if_false]);
    d.phi(graph, MachineType::MACH_UINT32, zero, div)
}

/// Unsigned modulus, with a mask fast path for power-of-two divisors; a
/// zero divisor yields zero.
///
/// ```text
/// if rhs then
///   msk = rhs - 1
///   if rhs & msk != 0 then lhs % rhs else lhs & msk
/// else 0
/// ```
pub fn uint32_mod(graph: &mut Graph, lhs: NodeId, rhs: NodeId) -> NodeId {
    let machine = MachineOperatorBuilder::new();
    let zero = graph.int32_constant(0);
    let start = graph.start;

    match int32_constant_value(graph, rhs) {
        Some(0) => return zero,
        Some(_) => return graph.new_node(machine.uint32_mod(), &[lhs, rhs, start]),
        None => {}
    }

    let minus_one = graph.int32_constant(-1);
    let outer = Diamond::new(graph, rhs, start, BranchHint::True);

    let msk = graph.new_node(machine.int32_add(), &[rhs, minus_one]);
    let check = graph.new_node(machine.word32_and(), &[rhs, msk]);
    let inner = Diamond::new(graph, check, outer.if_true, BranchHint::None);
    inner.nest(graph, &outer, true);
    let rem = graph.new_node(machine.uint32_mod(), &[lhs, rhs, inner.if_true]);
    let masked = graph.new_node(machine.word32_and(), &[lhs, msk]);
    let true0 = inner.phi(graph, MachineType::MACH_UINT32, rem, masked);

    outer.phi(graph, MachineType::MACH_UINT32, true0, zero)
}

// =============================================================================
// Tests
// =============================================================================
