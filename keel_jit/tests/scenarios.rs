//! End-to-end scenarios over the public API.

use keel_jit::ir::{MachineType, NodeId, Opcode, Verifier};
use keel_jit::lowering::RepresentationSelector;
use keel_jit::opt::{ControlReducer, DeadCodeElimination, GraphReducer};
use keel_jit::schedule::{ScheduleVerifier, Scheduler, SchedulerConfig};
use keel_jit::testing::GraphFixture;
use tracing_subscriber::EnvFilter;

/// Route compiler traces to the test output when `RUST_LOG` is set.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_merge_with_dead_input_is_elided_with_its_phi() {
    init_tracing();
    let mut f = GraphFixture::new(2);
    let (a, b) = (f.parameter(0), f.parameter(1));
    let start = f.graph.start;
    let dead = f.graph.dead();
    let merge = f.merge(&[start, dead]);
    let phi = f.phi(MachineType::MACH_ANY_TAGGED, &[a, b], merge);
    let ret = f.ret(phi, start, merge);

    let mut reducer = GraphReducer::new();
    reducer.add_reducer(DeadCodeElimination::new());
    reducer.reduce_graph(&mut f.graph);

    assert_eq!(f.graph.input(ret, 0), a);
    assert_eq!(f.graph.input(ret, 2), start);
    assert!(f.graph.is_dead(merge));
    assert!(f.graph.is_dead(phi));
    assert_eq!(Verifier::run(&f.graph), Ok(()));
}

#[test]
fn test_truncated_signed_add_lowers_without_conversions() {
    init_tracing();
    let mut f = GraphFixture::new(1);
    let (x, y, effect) = f.int32_fields();
    let object = f.parameter(0);
    let start = f.graph.start;
    let add = f.graph.new_node(f.simplified.number_add(), &[x, y]);
    let store = f.graph.new_node(
        f.simplified.store_field(GraphFixture::int32_field(16)),
        &[object, add, effect, start],
    );
    f.ret(object, store, start);

    let stats = RepresentationSelector::new().run(&mut f.graph).unwrap();

    assert_eq!(f.graph.opcode(add), Opcode::Int32Add);
    assert_eq!(f.graph.inputs(add), &[x, y]);
    assert_eq!(f.graph.opcode(store), Opcode::Store);
    assert_eq!(f.graph.input(store, 2), add);
    assert_eq!(stats.conversions, 0);
}

#[test]
fn test_trim_severs_dead_chain_and_keeps_live_chain() {
    init_tracing();
    const DEPTH: usize = 15;
    let mut f = GraphFixture::new(1);
    let p0 = f.parameter(0);
    let start = f.graph.start;

    let mut live: Vec<NodeId> = Vec::with_capacity(DEPTH);
    let mut dead: Vec<NodeId> = Vec::with_capacity(DEPTH);
    let mut control = start;
    for _ in 0..DEPTH {
        let merge = f.merge(&[control]);
        dead.push(f.merge(&[merge]));
        live.push(merge);
        control = merge;
    }
    f.ret(p0, start, control);

    let stats = ControlReducer::trim_graph(&mut f.graph);
    assert_eq!(stats.severed_edges, DEPTH);

    for (i, &node) in dead.iter().enumerate() {
        assert!(!f.graph.input(node, 0).is_valid(), "dead chain node {i} kept its input");
    }
    let mut previous = start;
    for &node in &live {
        assert_eq!(f.graph.inputs(node), &[previous]);
        assert!(!f.graph.is_dead(node));
        previous = node;
    }
    for (&l, &d) in live.iter().zip(&dead) {
        assert!(!f.graph.uses(l).contains(&d));
    }
    assert_eq!(Verifier::run(&f.graph), Ok(()));
}

#[test]
fn test_branch_diamond_dominance() {
    init_tracing();
    let mut f = GraphFixture::new(1);
    let p0 = f.parameter(0);
    let start = f.graph.start;
    let (t, fl) = f.branch(p0, start);
    let merge = f.merge(&[t, fl]);
    let ret = f.ret(p0, start, merge);

    let s = Scheduler::compute_schedule(&mut f.graph, &SchedulerConfig::default()).unwrap();
    let branch = f.graph.input(t, 0);
    let block = |n| s.block_for(n).unwrap();
    let (branch_block, true_block, false_block) = (block(branch), block(t), block(fl));
    let (merge_block, ret_block) = (block(merge), block(ret));

    assert_eq!(s.block(true_block).dominator(), Some(branch_block));
    assert_eq!(s.block(false_block).dominator(), Some(branch_block));
    assert_eq!(s.block(merge_block).dominator(), Some(branch_block));
    assert!(s.block(merge_block).predecessors().contains(&true_block));
    assert!(s.block(merge_block).predecessors().contains(&false_block));
    assert!(s.dominates(merge_block, ret_block));
    assert!(!s.dominates(true_block, merge_block));
    assert_eq!(ScheduleVerifier::run(&f.graph, &s), Ok(()));
}
