//! Structural properties that hold for every graph and schedule.

use keel_jit::ir::{
    CommonOperatorBuilder, Graph, MachineOperatorBuilder, MachineType, NodeId, NodeProperties,
    StoreRepresentation, Verifier, WriteBarrierKind,
};
use keel_jit::lowering::RepresentationSelector;
use keel_jit::opt::{CommonOperatorReducer, ControlReducer, DeadCodeElimination, GraphReducer};
use keel_jit::schedule::{BlockId, Schedule, ScheduleVerifier, Scheduler, SchedulerConfig};
use keel_jit::testing::GraphFixture;

/// Every input edge has a matching use entry and vice versa.
fn assert_def_use_symmetric(graph: &Graph) {
    for (id, node) in graph.iter() {
        if node.is_dead() {
            continue;
        }
        for &input in graph.inputs(id) {
            if input.is_valid() {
                let edges = graph.inputs(id).iter().filter(|&&i| i == input).count();
                let uses = graph.uses(input).iter().filter(|&&u| u == id).count();
                assert_eq!(edges, uses, "{id} -> {input}");
            }
        }
        for &user in graph.uses(id) {
            assert!(graph.inputs(user).contains(&id), "{user} listed as user of {id}");
        }
    }
}

#[test]
fn test_def_use_symmetry_survives_mutation() {
    let mut f = GraphFixture::new(3);
    let (p0, p1, p2) = (f.parameter(0), f.parameter(1), f.parameter(2));
    let start = f.graph.start;
    let add = f.graph.new_node(f.machine.int32_add(), &[p0, p0]);
    assert_def_use_symmetric(&f.graph);

    f.graph.replace_input(add, 1, p1);
    assert_def_use_symmetric(&f.graph);

    let merge = f.merge(&[start, start]);
    f.graph.append_input(merge, start);
    f.graph.change_op(merge, f.common.merge(3));
    assert_def_use_symmetric(&f.graph);

    f.graph.trim_input_count(merge, 1);
    f.graph.change_op(merge, f.common.merge(1));
    assert_def_use_symmetric(&f.graph);

    f.graph.replace_uses(p0, p2);
    assert_def_use_symmetric(&f.graph);

    f.graph.null_all_inputs(add);
    assert_def_use_symmetric(&f.graph);
    assert!(f.graph.uses(p1).is_empty());
}

#[test]
fn test_operators_are_shared_between_builders() {
    let (a, b) = (CommonOperatorBuilder::new(), CommonOperatorBuilder::new());
    assert_eq!(a.if_true(), b.if_true());
    assert_eq!(a.return_(), b.return_());
    assert_eq!(a.merge(3), b.merge(3));
    assert_ne!(a.merge(2), b.merge(3));
    assert_eq!(
        a.phi(MachineType::MACH_INT32, 2),
        b.phi(MachineType::MACH_INT32, 2)
    );
    assert_ne!(
        a.phi(MachineType::MACH_INT32, 2),
        b.phi(MachineType::MACH_FLOAT64, 2)
    );

    let (m, n) = (MachineOperatorBuilder::new(), MachineOperatorBuilder::new());
    assert_eq!(m.int32_add(), n.int32_add());
    let rep = StoreRepresentation {
        machine_type: MachineType::MACH_INT32,
        write_barrier: WriteBarrierKind::NoWriteBarrier,
    };
    assert_eq!(m.store(rep), n.store(rep));
}

#[test]
fn test_trim_is_idempotent_and_keeps_reachable_nodes() {
    let mut f = GraphFixture::new(2);
    let (p0, p1) = (f.parameter(0), f.parameter(1));
    let start = f.graph.start;
    let live_add = f.graph.new_node(f.machine.int32_add(), &[p0, p1]);
    let dead_mul = f.graph.new_node(f.machine.int32_mul(), &[live_add, p1]);
    let (t, fl) = f.branch(p0, start);
    let merge = f.merge(&[t, fl]);
    f.ret(live_add, start, merge);

    let before = keel_jit::ir::visit::reachable_from_end(&f.graph);
    let first = ControlReducer::trim_graph(&mut f.graph);
    assert_eq!(first.severed_edges, 2);
    assert!(f.graph.inputs(dead_mul).iter().all(|i| !i.is_valid()));

    let after = keel_jit::ir::visit::reachable_from_end(&f.graph);
    assert_eq!(before.len(), after.len());
    for node in before {
        assert!(after.contains(&node));
    }

    let second = ControlReducer::trim_graph(&mut f.graph);
    assert_eq!(second.severed_edges, 0);
    assert_eq!(second.trimmed_nodes, 0);
}

#[test]
fn test_merge_and_phi_compaction_keeps_order() {
    let mut f = GraphFixture::new(4);
    let params: Vec<NodeId> = (0..4).map(|i| f.parameter(i)).collect();
    let start = f.graph.start;
    let (t0, f0) = f.branch(params[0], start);
    let (t1, f1) = f.branch(params[1], t0);
    let dead = f.graph.dead();
    let merge = f.merge(&[t1, dead, f1, dead]);
    let phi = f.phi(MachineType::MACH_ANY_TAGGED, &params, merge);
    let effect_phi = f.effect_phi(&[start, start, start, start], merge);
    let outer = f.merge(&[merge, f0]);
    f.ret(phi, effect_phi, outer);

    let mut reducer = GraphReducer::new();
    reducer.add_reducer(DeadCodeElimination::new());
    reducer.reduce_graph(&mut f.graph);

    assert_eq!(f.graph.inputs(merge), &[t1, f1]);
    assert_eq!(*f.graph.op(merge), f.common.merge(2));
    assert_eq!(f.graph.inputs(phi), &[params[0], params[2], merge]);
    assert_eq!(f.graph.inputs(effect_phi), &[start, start, merge]);
    assert_eq!(Verifier::run(&f.graph), Ok(()));
}

/// A counting loop `for (i = 0; i < p0; i += step(i))` on `control`; the
/// body is filled in by `body`, which gets the body control and the
/// induction phi and returns the back-edge control and the step.
fn counting_loop(
    f: &mut GraphFixture,
    control: NodeId,
    body: impl FnOnce(&mut GraphFixture, NodeId, NodeId) -> (NodeId, NodeId),
) -> (NodeId, NodeId) {
    let p0 = f.int32_param(0);
    let zero = f.int32(0);
    let header = f.graph.new_node(f.common.loop_(2), &[control, control]);
    let phi = f.phi(MachineType::MACH_INT32, &[zero, zero], header);
    let cmp = f.graph.new_node(f.machine.int32_less_than(), &[phi, p0]);
    let (inside, out) = f.branch(cmp, header);
    let (back, step) = body(f, inside, phi);
    let next = f.graph.new_node(f.machine.int32_add(), &[phi, step]);
    f.graph.replace_input(header, 1, back);
    f.graph.replace_input(phi, 1, next);
    let exit = f.graph.new_node(f.common.loop_exit(), &[out, header]);
    let value = f
        .graph
        .new_node(f.common.loop_exit_value(MachineType::MACH_INT32), &[phi, exit]);
    (exit, value)
}

/// Diamond on `cond` below `control`, joining `a` and `b`.
fn diamond(f: &mut GraphFixture, cond: NodeId, control: NodeId, a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    let (t, fl) = f.branch(cond, control);
    let join = f.merge(&[t, fl]);
    let value = f.phi(MachineType::MACH_INT32, &[a, b], join);
    (join, value)
}

/// Loop whose body branches on the parity of the induction variable.
fn loop_with_diamond(f: &mut GraphFixture) {
    let start = f.graph.start;
    let (exit, value) = counting_loop(f, start, |f, body, phi| {
        let (one, p1) = (f.int32(1), f.int32_param(1));
        let odd = f.graph.new_node(f.machine.word32_and(), &[phi, one]);
        diamond(f, odd, body, one, p1)
    });
    f.ret(value, start, exit);
}

/// `depth` loops nested in each other with a diamond in the innermost.
fn nested_loops(f: &mut GraphFixture, depth: usize) {
    fn nest(f: &mut GraphFixture, control: NodeId, depth: usize) -> (NodeId, NodeId) {
        counting_loop(f, control, |f, body, phi| {
            let one = f.int32(1);
            if depth == 1 {
                let odd = f.graph.new_node(f.machine.word32_and(), &[phi, one]);
                diamond(f, odd, body, one, phi)
            } else {
                let (exit, _) = nest(f, body, depth - 1);
                (exit, one)
            }
        })
    }
    let start = f.graph.start;
    let (exit, value) = nest(f, start, depth);
    f.ret(value, start, exit);
}

/// Diamond, then a loop holding two diamonds in sequence, then a diamond.
fn diamonds_around_loop(f: &mut GraphFixture) {
    let start = f.graph.start;
    let (p0, p1) = (f.int32_param(0), f.int32_param(1));
    let (join, first) = diamond(f, p1, start, p0, p1);
    let (exit, value) = counting_loop(f, join, |f, body, phi| {
        let one = f.int32(1);
        let (join, step) = diamond(f, phi, body, one, first);
        let odd = f.graph.new_node(f.machine.word32_and(), &[step, one]);
        diamond(f, odd, join, step, one)
    });
    let (join, last) = diamond(f, value, exit, value, first);
    f.ret(last, start, join);
}

/// Loop with a constant branch in its body; the reducers fold the dead arm
/// away before scheduling.
fn loop_with_folded_arm(f: &mut GraphFixture) {
    let start = f.graph.start;
    let (exit, value) = counting_loop(f, start, |f, body, _| {
        let (one, p1) = (f.int32(1), f.int32_param(1));
        diamond(f, one, body, one, p1)
    });
    f.ret(value, start, exit);

    let mut reducer = GraphReducer::new();
    reducer.add_reducer(CommonOperatorReducer::new());
    reducer.add_reducer(DeadCodeElimination::new());
    reducer.reduce_graph(&mut f.graph);
    ControlReducer::trim_graph(&mut f.graph);
    assert_eq!(Verifier::run(&f.graph), Ok(()));
}

/// Scheduled shapes with the number of loops in each.
fn scheduled_shapes() -> Vec<(&'static str, GraphFixture, Schedule, usize)> {
    let builders: [(&'static str, fn(&mut GraphFixture), usize); 6] = [
        ("loop_with_diamond", loop_with_diamond, 1),
        ("nested_2", |f| nested_loops(f, 2), 2),
        ("nested_4", |f| nested_loops(f, 4), 4),
        ("diamonds_around_loop", diamonds_around_loop, 1),
        ("loop_with_folded_arm", loop_with_folded_arm, 1),
        ("nested_1", |f| nested_loops(f, 1), 1),
    ];
    builders
        .into_iter()
        .map(|(name, build, loops)| {
            let mut f = GraphFixture::new(2);
            build(&mut f);
            let s = Scheduler::compute_schedule(&mut f.graph, &SchedulerConfig::default())
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(ScheduleVerifier::run(&f.graph, &s), Ok(()), "{name}");
            (name, f, s, loops)
        })
        .collect()
}

/// Block a control node leaves through.
fn control_block(graph: &Graph, s: &Schedule, mut control: NodeId) -> BlockId {
    while !graph.opcode(control).is_basic_block_begin() {
        control = NodeProperties::control_inputs(graph, control)[0];
    }
    s.block_for(control).unwrap()
}

#[test]
fn test_inputs_dominate_their_uses() {
    for (name, f, s, _) in scheduled_shapes() {
        let graph = &f.graph;
        let rpo = |b: BlockId| s.block(b).rpo_number().unwrap();
        for node in keel_jit::ir::visit::reachable_from_end(graph) {
            let Some(block) = s.block_for(node) else {
                panic!("{name}: {node} unscheduled");
            };
            let op = *graph.op(node);
            let layout = keel_jit::ir::InputLayout::of(&op);
            for (index, &input) in graph.inputs(node).iter().enumerate() {
                let input_block = s.block_for(input).unwrap();
                if index < layout.control {
                    let use_block = if NodeProperties::is_phi(graph, node) {
                        let merge = graph.input(node, layout.control);
                        control_block(graph, &s, graph.input(merge, index))
                    } else {
                        block
                    };
                    assert!(rpo(input_block) <= rpo(use_block), "{name}: {input} after {node}");
                    assert!(s.dominates(input_block, use_block), "{name}: {input} !dom {node}");
                } else if layout.past_control - layout.control == 1 {
                    assert!(s.dominates(input_block, block), "{name}: control {input} !dom {node}");
                }
            }
        }
    }
}

/// Blocks on a path from `block` back to `header` that `header` dominates.
fn natural_loop(s: &Schedule, header: BlockId) -> Vec<BlockId> {
    let mut members = vec![header];
    let mut stack: Vec<BlockId> = s
        .block(header)
        .predecessors()
        .iter()
        .copied()
        .filter(|&p| s.dominates(header, p))
        .collect();
    while let Some(block) = stack.pop() {
        if members.contains(&block) {
            continue;
        }
        members.push(block);
        stack.extend(s.block(block).predecessors().iter().copied());
    }
    members
}

#[test]
fn test_loops_are_contiguous() {
    for (name, _, s, loops) in scheduled_shapes() {
        let headers: Vec<BlockId> = s
            .rpo_order()
            .iter()
            .copied()
            .filter(|&b| s.block(b).is_loop_header())
            .collect();
        assert_eq!(headers.len(), loops, "{name}");
        for header in headers {
            let h = s.block(header);
            let begin = h.rpo_number().unwrap();
            let end = h.loop_end().unwrap();
            let members = natural_loop(&s, header);
            assert_eq!(members.len() as u32, end - begin, "{name}: loop {header}");
            for &block in s.rpo_order() {
                let rpo = s.block(block).rpo_number().unwrap();
                assert_eq!(
                    (begin..end).contains(&rpo),
                    members.contains(&block),
                    "{name}: {block} in loop {header}"
                );
            }
        }
    }
}

#[test]
fn test_nested_loop_depths_follow_nesting() {
    let mut f = GraphFixture::new(2);
    nested_loops(&mut f, 3);
    let s = Scheduler::compute_schedule(&mut f.graph, &SchedulerConfig::default()).unwrap();
    let mut depths: Vec<u32> = s
        .rpo_order()
        .iter()
        .filter(|&&b| s.block(b).is_loop_header())
        .map(|&b| s.block(b).loop_depth())
        .collect();
    depths.sort_unstable();
    assert_eq!(depths, vec![1, 2, 3]);
}

#[test]
fn test_representation_propagation_reaches_fixpoint() {
    let mut f = GraphFixture::new(1);
    let (x, y, effect) = f.int32_fields();
    let start = f.graph.start;
    let add = f.graph.new_node(f.simplified.number_add(), &[x, y]);
    let mul = f.graph.new_node(f.simplified.number_multiply(), &[add, y]);
    let trunc = f.graph.new_node(f.simplified.number_to_int32(), &[mul]);
    let (t, fl) = f.branch(trunc, start);
    let merge = f.merge(&[t, fl]);
    let phi = f.phi(MachineType::MACH_ANY_TAGGED, &[add, mul], merge);
    f.ret(phi, effect, merge);

    let mut selector = RepresentationSelector::new();
    selector.propagate(&mut f.graph).unwrap();
    assert_eq!(selector.repropagate(&mut f.graph).unwrap(), 0);
    assert_eq!(selector.repropagate(&mut f.graph).unwrap(), 0);
}
