//! Branch conditions after representation selection.

use keel_jit::ir::{Graph, NodeId, Opcode, Type};
use keel_jit::lowering::RepresentationSelector;
use keel_jit::testing::GraphFixture;

/// Value of a lowered condition, with `inputs` bound to doubles.
fn evaluate(graph: &Graph, node: NodeId, inputs: &[(NodeId, f64)]) -> f64 {
    if let Some(&(_, value)) = inputs.iter().find(|(n, _)| *n == node) {
        return value;
    }
    let arg = |i: usize| evaluate(graph, graph.input(node, i), inputs);
    let bit = |b: bool| if b { 1.0 } else { 0.0 };
    match graph.opcode(node) {
        Opcode::Float64Constant | Opcode::NumberConstant => graph.op(node).number_value().unwrap(),
        Opcode::Int32Constant => f64::from(graph.op(node).int32_value().unwrap()),
        Opcode::ChangeTaggedToFloat64 => arg(0),
        Opcode::Float64Add => arg(0) + arg(1),
        Opcode::Float64LessThan => bit(arg(0) < arg(1)),
        Opcode::Float64Equal => bit(arg(0) == arg(1)),
        Opcode::Word32Equal => bit(arg(0) == arg(1)),
        Opcode::Word32Or => bit(arg(0) != 0.0 || arg(1) != 0.0),
        Opcode::Word32And => bit(arg(0) != 0.0 && arg(1) != 0.0),
        other => panic!("unexpected {other:?} in condition"),
    }
}

/// `if (x + y)` over two number parameters; returns the branch and the add.
fn branch_on_number_add(f: &mut GraphFixture) -> (NodeId, NodeId, NodeId, NodeId) {
    let (x, y) = (f.parameter(0), f.parameter(1));
    f.graph.set_type(x, Type::NUMBER);
    f.graph.set_type(y, Type::NUMBER);
    let start = f.graph.start;
    let add = f.graph.new_node(f.simplified.number_add(), &[x, y]);
    let (t, fl) = f.branch(add, start);
    let merge = f.merge(&[t, fl]);
    f.ret(x, start, merge);
    (f.graph.input(t, 0), add, x, y)
}

#[test]
fn test_branch_on_float_sum_is_false_for_nan_and_zeros() {
    let mut f = GraphFixture::new(2);
    let (branch, add, x, y) = branch_on_number_add(&mut f);
    RepresentationSelector::new().run(&mut f.graph).unwrap();

    assert_eq!(f.graph.opcode(add), Opcode::Float64Add);
    let cond = f.graph.input(branch, 0);
    assert_eq!(f.graph.opcode(cond), Opcode::Word32Or);

    let truthy = |a: f64, b: f64| evaluate(&f.graph, cond, &[(x, a), (y, b)]);
    assert_eq!(truthy(f64::NAN, 1.0), 0.0);
    assert_eq!(truthy(0.0, 0.0), 0.0);
    assert_eq!(truthy(-0.0, 0.0), 0.0);
    assert_eq!(truthy(-0.0, -0.0), 0.0);
    assert_eq!(truthy(0.5, 1.0), 1.0);
    assert_eq!(truthy(-3.0, 1.0), 1.0);
    assert_eq!(truthy(f64::INFINITY, 0.0), 1.0);
}

#[test]
fn test_branch_on_tagged_number_converts_through_float64() {
    let mut f = GraphFixture::new(1);
    let p = f.parameter(0);
    f.graph.set_type(p, Type::NUMBER);
    let start = f.graph.start;
    let (t, fl) = f.branch(p, start);
    let merge = f.merge(&[t, fl]);
    f.ret(p, start, merge);
    let branch = f.graph.input(t, 0);

    RepresentationSelector::new().run(&mut f.graph).unwrap();

    let cond = f.graph.input(branch, 0);
    assert_eq!(f.graph.opcode(cond), Opcode::Word32Or);
    let truthy = |v: f64| evaluate(&f.graph, cond, &[(p, v)]);
    assert_eq!(truthy(f64::NAN), 0.0);
    assert_eq!(truthy(-0.0), 0.0);
    assert_eq!(truthy(7.0), 1.0);
    assert_eq!(truthy(-1e-300), 1.0);
}

#[test]
fn test_branch_on_tagged_boolean_uses_bit_change() {
    let mut f = GraphFixture::new(1);
    let p = f.parameter(0);
    f.graph.set_type(p, Type::BOOLEAN);
    let start = f.graph.start;
    let (t, fl) = f.branch(p, start);
    let merge = f.merge(&[t, fl]);
    f.ret(p, start, merge);
    let branch = f.graph.input(t, 0);

    RepresentationSelector::new().run(&mut f.graph).unwrap();

    let cond = f.graph.input(branch, 0);
    assert_eq!(f.graph.opcode(cond), Opcode::ChangeBoolToBit);
    assert_eq!(f.graph.input(cond, 0), p);
}

#[test]
fn test_branch_on_int32_sum_compares_word() {
    let mut f = GraphFixture::new(2);
    let (x, y) = (f.int32_param(0), f.int32_param(1));
    let start = f.graph.start;
    let add = f.graph.new_node(f.simplified.number_add(), &[x, y]);
    f.graph.set_type(add, Type::SIGNED32);
    let (t, fl) = f.branch(add, start);
    let merge = f.merge(&[t, fl]);
    f.ret(x, start, merge);
    let branch = f.graph.input(t, 0);

    RepresentationSelector::new().run(&mut f.graph).unwrap();

    let cond = f.graph.input(branch, 0);
    assert_eq!(f.graph.opcode(add), Opcode::Int32Add);
    assert_eq!(f.graph.opcode(cond), Opcode::Uint32LessThan);
    assert_eq!(f.graph.input(cond, 1), add);
}
