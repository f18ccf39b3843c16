//! Scheduling: from the sea of nodes to ordered basic blocks.
//!
//! One round runs these phases over a fresh [`Schedule`]:
//!
//! 1. **Build CFG**: breadth-first from `End` along control inputs. Every
//!    block-begin node gets a block; terminators wire blocks together.
//! 2. **Special RPO**: loop-contiguous block order (see `special_rpo.rs`).
//! 3. **Dominators**: iterative intersection in RPO.
//! 4. **Fixed placement**: parameters into the start block, phis into their
//!    merge's block, loop exits next to their control.
//! 5. **Prepare uses / schedule early / schedule late**: each floating node
//!    gets the deepest input block as its earliest position, is released
//!    once all its uses are placed, lands in the common dominator of its
//!    uses and is then hoisted out of loops while that stays legal.
//!
//! Control nodes not reached in phase 1 but used by values (diamonds built
//! by lowering) are *floating control*. They are scheduled like any other
//! node; afterwards each one is spliced into the control chain of the block
//! it landed in and the round is discarded. Rounds repeat until no floating
//! control remains or the configured limit is hit.

use std::collections::VecDeque;

use tracing::{debug, debug_span, trace};

use crate::error::{CompileError, Result};
use crate::ir::{BranchHint, Graph, IdMap, IdSet, InputLayout, Node, NodeId, NodeProperties, Opcode};

use super::schedule::{BlockControl, BlockId, Schedule};
use super::special_rpo::compute_special_rpo;

/// Rounds allowed before floating control is reported as an error.
pub const DEFAULT_MAX_FLOATING_CONTROL_ROUNDS: usize = 16;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Move loop-invariant nodes to loop pre-headers.
    pub hoist_loop_invariants: bool,
    /// Upper bound on schedule restarts caused by floating control.
    pub max_floating_control_rounds: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hoist_loop_invariants: true,
            max_floating_control_rounds: DEFAULT_MAX_FLOATING_CONTROL_ROUNDS,
        }
    }
}

/// Floating control discovered by one round.
struct FloatingControl {
    nodes: IdSet<Node>,
    /// Bottom-most floating nodes and the block each one landed in.
    ends: Vec<(NodeId, BlockId)>,
}

pub struct Scheduler<'g> {
    graph: &'g Graph,
    config: &'g SchedulerConfig,
    schedule: Schedule,
    /// Nodes reachable from `End`, inputs before uses where acyclic.
    reachable: Vec<NodeId>,
    is_reachable: IdSet<Node>,
    /// Reachable control nodes without a block after fixed placement.
    floating: IdSet<Node>,
    early: IdMap<Node, Option<BlockId>>,
    unscheduled_uses: IdMap<Node, u32>,
    /// Late-placed nodes per block, users before inputs.
    placed: Vec<Vec<NodeId>>,
    /// Fixed nodes that go after everything else in their block.
    trailing: Vec<Vec<NodeId>>,
    hoisted: usize,
}

impl<'g> Scheduler<'g> {
    /// Schedule `graph`, splicing floating control into it as needed.
    pub fn compute_schedule(graph: &mut Graph, config: &SchedulerConfig) -> Result<Schedule> {
        let _span = debug_span!("scheduler").entered();
        for round in 0..=config.max_floating_control_rounds {
            let (schedule, floating) = {
                let mut scheduler = Scheduler::new(graph, config);
                scheduler.run_round();
                let floating = scheduler.floating_control();
                if floating.ends.is_empty() {
                    scheduler.seal_blocks();
                    debug!(
                        rounds = round + 1,
                        blocks = scheduler.schedule.rpo_order().len(),
                        hoisted = scheduler.hoisted,
                        "schedule computed"
                    );
                }
                (scheduler.schedule, floating)
            };
            if floating.ends.is_empty() {
                return Ok(schedule);
            }
            if round == config.max_floating_control_rounds {
                break;
            }
            let spliced = connect_floating_control(graph, &schedule, &floating);
            debug!(round, spliced, "restarting after connecting floating control");
        }
        Err(CompileError::FloatingControl {
            rounds: config.max_floating_control_rounds,
        })
    }

    fn new(graph: &'g Graph, config: &'g SchedulerConfig) -> Self {
        let n = graph.node_count();
        let reachable = crate::ir::visit::reachable_from_end(graph);
        let mut is_reachable = IdSet::with_capacity(n);
        for &node in &reachable {
            is_reachable.insert(node);
        }
        Scheduler {
            graph,
            config,
            schedule: Schedule::new(n),
            reachable,
            is_reachable,
            floating: IdSet::with_capacity(n),
            early: IdMap::filled(n, None),
            unscheduled_uses: IdMap::filled(n, 0),
            placed: Vec::new(),
            trailing: Vec::new(),
            hoisted: 0,
        }
    }

    fn run_round(&mut self) {
        self.build_cfg();
        compute_special_rpo(&mut self.schedule);
        self.generate_dominator_tree();
        let blocks = self.schedule.block_count();
        self.placed = vec![Vec::new(); blocks];
        self.trailing = vec![Vec::new(); blocks];
        self.place_fixed_nodes();
        self.prepare_uses();
        self.schedule_early();
        self.schedule_late();
    }

    // -------------------------------------------------------------------------
    // Phase 1: control flow graph
    // -------------------------------------------------------------------------

    fn build_cfg(&mut self) {
        let graph = self.graph;
        let mut queue = VecDeque::new();
        let mut visited = IdSet::with_capacity(graph.node_count());
        let mut control = Vec::new();
        queue.push_back(graph.end);
        visited.insert(graph.end);
        while let Some(node) = queue.pop_front() {
            self.build_block(node);
            control.push(node);
            for &input in NodeProperties::control_inputs(graph, node) {
                if input.is_valid() && graph.opcode(input) != Opcode::Dead && visited.insert(input) {
                    queue.push_back(input);
                }
            }
        }
        for node in control {
            self.connect_block(node);
        }
    }

    fn build_block(&mut self, node: NodeId) {
        match self.graph.opcode(node) {
            Opcode::Start => {
                let start = self.schedule.start();
                self.schedule.add_node(start, node);
            }
            Opcode::End => {
                let end = self.schedule.end();
                self.schedule.add_node(end, node);
            }
            Opcode::Loop
            | Opcode::Merge
            | Opcode::IfTrue
            | Opcode::IfFalse
            | Opcode::IfSuccess
            | Opcode::IfException => {
                let block = self.schedule.new_block();
                self.schedule.add_node(block, node);
                if self.graph.opcode(node) == Opcode::IfException {
                    self.schedule.mark_deferred(block);
                }
                trace!(node = %node, block = %block, "block");
            }
            _ => {}
        }
    }

    /// The block holding the block-begin node that `control` descends from.
    fn predecessor_block(&self, control: NodeId) -> Option<BlockId> {
        let graph = self.graph;
        let mut current = control;
        while current.is_valid() && !graph.opcode(current).is_basic_block_begin() {
            current = NodeProperties::control_inputs(graph, current)
                .first()
                .copied()
                .unwrap_or(NodeId::INVALID);
        }
        self.schedule.block_for(current)
    }

    fn connect_block(&mut self, node: NodeId) {
        let graph = self.graph;
        let opcode = graph.opcode(node);
        match opcode {
            Opcode::Loop | Opcode::Merge => {
                let Some(block) = self.schedule.block_for(node) else {
                    return;
                };
                for &input in NodeProperties::control_inputs(graph, node) {
                    if !input.is_valid() || graph.opcode(input) == Opcode::Dead {
                        continue;
                    }
                    if let Some(pred) = self.predecessor_block(input) {
                        self.schedule.add_goto(pred, block);
                    }
                }
            }
            Opcode::Branch | Opcode::Call => {
                let [first, second] = NodeProperties::collect_control_projections(graph, node);
                if !first.is_valid() || !second.is_valid() {
                    debug_assert!(opcode == Opcode::Call, "branch {} lacks a projection", node);
                    return;
                }
                let control = NodeProperties::get_control_input(graph, node, 0);
                let (Some(block), Some(t), Some(f)) = (
                    self.predecessor_block(control),
                    self.schedule.block_for(first),
                    self.schedule.block_for(second),
                ) else {
                    return;
                };
                if opcode == Opcode::Branch {
                    self.schedule.add_branch(block, node, t, f);
                    match graph.op(node).branch_hint() {
                        BranchHint::True => self.schedule.mark_deferred(f),
                        BranchHint::False => self.schedule.mark_deferred(t),
                        BranchHint::None => {}
                    }
                } else {
                    self.schedule.add_call(block, node, t, f);
                }
            }
            Opcode::Return | Opcode::Throw | Opcode::Deoptimize => {
                let control = NodeProperties::get_control_input(graph, node, 0);
                let kind = match opcode {
                    Opcode::Return => BlockControl::Return,
                    Opcode::Throw => BlockControl::Throw,
                    _ => BlockControl::Deoptimize,
                };
                if let Some(block) = self.predecessor_block(control) {
                    self.schedule.add_exit(block, kind, node);
                }
            }
            _ => {}
        }
    }

    // -------------------------------------------------------------------------
    // Phase 3: dominators
    // -------------------------------------------------------------------------

    fn rpo(&self, block: BlockId) -> u32 {
        self.schedule.block(block).rpo_number().unwrap_or(0)
    }

    fn generate_dominator_tree(&mut self) {
        let order = self.schedule.rpo_order().to_vec();
        for &block in order.iter().skip(1) {
            let rpo = self.rpo(block);
            let mut dominator: Option<BlockId> = None;
            let preds: Vec<BlockId> = self.schedule.block(block).predecessors().to_vec();
            for pred in preds {
                // Back-edge sources come later in the order and are skipped.
                let Some(pred_rpo) = self.schedule.block(pred).rpo_number() else {
                    continue;
                };
                if pred_rpo >= rpo {
                    continue;
                }
                dominator = Some(match dominator {
                    None => pred,
                    Some(current) => self.intersect(current, pred),
                });
            }
            let depth = dominator.map_or(0, |d| self.schedule.block(d).dominator_depth + 1);
            let b = self.schedule.block_mut(block);
            b.dominator = dominator;
            b.dominator_depth = depth;
        }
    }

    fn intersect(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            if self.rpo(a) > self.rpo(b) {
                match self.schedule.block(a).dominator() {
                    Some(d) => a = d,
                    None => break,
                }
            } else {
                match self.schedule.block(b).dominator() {
                    Some(d) => b = d,
                    None => break,
                }
            }
        }
        a
    }

    // -------------------------------------------------------------------------
    // Phase 4: fixed placement
    // -------------------------------------------------------------------------

    fn place_fixed_nodes(&mut self) {
        let graph = self.graph;
        let mut ids: Vec<NodeId> = self.reachable.clone();
        ids.sort_unstable();
        for node in ids {
            if self.schedule.is_scheduled(node) {
                continue;
            }
            let opcode = graph.opcode(node);
            match opcode {
                Opcode::Parameter | Opcode::OsrValue => {
                    let start = self.schedule.start();
                    self.schedule.add_node(start, node);
                }
                Opcode::Phi | Opcode::EffectPhi => {
                    let merge = NodeProperties::get_control_input(graph, node, 0);
                    if let Some(block) = self.schedule.block_for(merge) {
                        self.schedule.add_node(block, node);
                    } else {
                        self.floating.insert(node);
                    }
                }
                Opcode::LoopExit => {
                    let control = NodeProperties::get_control_input(graph, node, 0);
                    match self.predecessor_block(control) {
                        Some(block) => self.schedule.add_node(block, node),
                        _ => {
                            self.floating.insert(node);
                        }
                    }
                }
                Opcode::Terminate | Opcode::OsrNormalEntry | Opcode::OsrLoopEntry => {
                    let control = NodeProperties::get_control_input(graph, node, 0);
                    match self.predecessor_block(control) {
                        Some(block) => {
                            self.schedule.plan_node(block, node);
                            self.trailing[block.index()].push(node);
                        }
                        _ => {
                            self.floating.insert(node);
                        }
                    }
                }
                _ if opcode.is_control() => {
                    self.floating.insert(node);
                }
                _ => {}
            }
        }
        for node in self.floating.iter() {
            trace!(node = %node, op = %graph.op(node), "floating control");
        }
    }

    // -------------------------------------------------------------------------
    // Phase 5: early and late placement
    // -------------------------------------------------------------------------

    fn prepare_uses(&mut self) {
        let graph = self.graph;
        for &node in &self.reachable {
            for &input in graph.inputs(node) {
                if input.is_valid() && !self.schedule.is_scheduled(input) {
                    *self.unscheduled_uses.get_mut(input) += 1;
                }
            }
        }
    }

    /// Earliest block: the deepest block among the inputs' earliest blocks,
    /// propagated forward from the fixed nodes until nothing changes.
    fn schedule_early(&mut self) {
        let graph = self.graph;
        let start = self.schedule.start();
        let mut worklist: VecDeque<NodeId> = VecDeque::with_capacity(self.reachable.len());
        for &node in &self.reachable {
            let block = self.schedule.block_for(node).unwrap_or(start);
            self.early.set(node, Some(block));
            worklist.push_back(node);
        }
        while let Some(node) = worklist.pop_front() {
            let Some(block) = *self.early.get(node) else {
                continue;
            };
            let rpo = self.rpo(block);
            for &user in graph.uses(node) {
                if !self.is_reachable.contains(user) || self.schedule.is_scheduled(user) {
                    continue;
                }
                let later = match *self.early.get(user) {
                    Some(current) => self.rpo(current) < rpo,
                    None => true,
                };
                if later {
                    self.early.set(user, Some(block));
                    worklist.push_back(user);
                }
            }
        }
    }

    fn schedule_late(&mut self) {
        let graph = self.graph;
        let mut stack: Vec<NodeId> = Vec::new();
        let mut fixed: Vec<NodeId> = self
            .reachable
            .iter()
            .copied()
            .filter(|&n| self.schedule.is_scheduled(n))
            .collect();
        fixed.sort_unstable();
        for node in fixed {
            for &input in graph.inputs(node) {
                self.release(input, &mut stack);
            }
        }
        while let Some(node) = stack.pop() {
            self.place_late(node);
            for &input in graph.inputs(node) {
                self.release(input, &mut stack);
            }
        }
    }

    fn release(&mut self, input: NodeId, stack: &mut Vec<NodeId>) {
        if !input.is_valid() || self.schedule.is_scheduled(input) {
            return;
        }
        let count = self.unscheduled_uses.get_mut(input);
        debug_assert!(*count > 0, "use count underflow at {}", input);
        *count = count.saturating_sub(1);
        if *count == 0 {
            stack.push(input);
        }
    }

    /// The block in which `user` needs the value on input `index`. Phis
    /// need it at the end of the matching predecessor.
    fn use_block(&self, user: NodeId, index: usize) -> Option<BlockId> {
        let graph = self.graph;
        if NodeProperties::is_phi(graph, user) && !self.floating.contains(user) {
            let layout = InputLayout::of(graph.op(user));
            if index < layout.control {
                let merge = graph.input(user, layout.control);
                let pred_control = graph.input(merge, index);
                return self.predecessor_block(pred_control);
            }
        }
        self.schedule.block_for(user)
    }

    fn place_late(&mut self, node: NodeId) {
        let graph = self.graph;
        let mut late: Option<BlockId> = None;
        for edge in graph.use_edges(node) {
            if !self.is_reachable.contains(edge.from) {
                continue;
            }
            let Some(block) = self.use_block(edge.from, edge.index) else {
                continue;
            };
            late = Some(match late {
                None => block,
                Some(current) => self.schedule.common_dominator(current, block),
            });
        }
        let early = (*self.early.get(node)).unwrap_or(self.schedule.start());
        let mut block = late.unwrap_or(early);

        if self.config.hoist_loop_invariants && !self.floating.contains(node) {
            let early_rpo = self.rpo(early);
            loop {
                let current = self.schedule.block(block);
                let Some(header) = current.loop_header() else {
                    break;
                };
                let Some(pre_header) = self.schedule.block(header).dominator() else {
                    break;
                };
                let pre = self.schedule.block(pre_header);
                if self.rpo(pre_header) < early_rpo || pre.loop_depth() >= current.loop_depth() {
                    break;
                }
                trace!(node = %node, from = %block, to = %pre_header, "hoisted");
                block = pre_header;
                self.hoisted += 1;
            }
        }

        trace!(node = %node, early = %early, block = %block, "placed");
        self.schedule.plan_node(block, node);
        self.placed[block.index()].push(node);
    }

    fn floating_control(&self) -> FloatingControl {
        let graph = self.graph;
        let mut ends: Vec<(NodeId, BlockId)> = Vec::new();
        for node in self.floating.iter() {
            if !graph.opcode(node).is_control() {
                continue;
            }
            let feeds_floating = graph.use_edges(node).into_iter().any(|edge| {
                self.floating.contains(edge.from)
                    && graph.opcode(edge.from).is_control()
                    && NodeProperties::is_control_edge(graph, edge)
            });
            if feeds_floating {
                continue;
            }
            let Some(block) = self.schedule.block_for(node) else {
                continue;
            };
            // One splice per block per round.
            if ends.iter().all(|&(_, b)| b != block) {
                ends.push((node, block));
            }
        }
        FloatingControl {
            nodes: self.floating.clone(),
            ends,
        }
    }

    /// Final block contents: fixed nodes, late-placed nodes inputs first,
    /// then trailing fixed nodes.
    fn seal_blocks(&mut self) {
        for index in 0..self.schedule.block_count() {
            let block = BlockId::new(index as u32);
            let placed = std::mem::take(&mut self.placed[index]);
            let trailing = std::mem::take(&mut self.trailing[index]);
            let b = self.schedule.block_mut(block);
            b.nodes.extend(placed.into_iter().rev());
            b.nodes.extend(trailing);
        }
    }
}

/// Splice each floating end into the block it was scheduled in. Returns the
/// number of splices.
fn connect_floating_control(graph: &mut Graph, schedule: &Schedule, floating: &FloatingControl) -> usize {
    let mut spliced = 0;
    for &(end, block) in &floating.ends {
        let Some(&block_start) = schedule.block(block).nodes().first() else {
            continue;
        };

        // The connected control node that currently follows the block start.
        let successor = graph.use_edges(block_start).into_iter().find(|&edge| {
            let from = edge.from;
            let opcode = graph.opcode(from);
            NodeProperties::is_control_edge(graph, edge)
                && opcode.is_control()
                && opcode != Opcode::Terminate
                && !(opcode == Opcode::LoopExit && edge.index == 1)
                && schedule.is_scheduled(from)
                && !floating.nodes.contains(from)
        });
        let Some(successor) = successor else {
            debug!(end = %end, block = %block, "no control successor to splice before");
            continue;
        };
        graph.replace_input(successor.from, successor.index, end);

        // The floating nodes hanging off connected control are the top.
        let mut queue = vec![end];
        let mut seen = IdSet::with_capacity(graph.node_count());
        seen.insert(end);
        let mut tops: Vec<(NodeId, usize)> = Vec::new();
        while let Some(node) = queue.pop() {
            let layout = InputLayout::of(graph.op(node));
            for (i, &input) in NodeProperties::control_inputs(graph, node).iter().enumerate() {
                if !input.is_valid() {
                    continue;
                }
                if floating.nodes.contains(input) {
                    if seen.insert(input) {
                        queue.push(input);
                    }
                } else if input != block_start {
                    tops.push((node, layout.control + i));
                }
            }
        }
        for (node, index) in tops {
            trace!(node = %node, block_start = %block_start, "connect floating control");
            graph.replace_input(node, index, block_start);
        }
        trace!(end = %end, successor = %successor.from, block = %block, "spliced");
        spliced += 1;
    }
    spliced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::machine_type::MachineType;
    use crate::lowering::diamond;
    use crate::testing::GraphFixture;

    fn schedule(f: &mut GraphFixture) -> Schedule {
        Scheduler::compute_schedule(&mut f.graph, &SchedulerConfig::default())
            .expect("schedule succeeds")
    }

    fn block_of(s: &Schedule, node: NodeId) -> BlockId {
        s.block_for(node).expect("node is scheduled")
    }

    #[test]
    fn test_straight_line_function() {
        let mut f = GraphFixture::new(2);
        let (p0, p1) = (f.parameter(0), f.parameter(1));
        let add = f.graph.new_node(f.machine.int32_add(), &[p0, p1]);
        let start = f.graph.start;
        let ret = f.ret(add, start, start);

        let s = schedule(&mut f);
        let entry = s.start();
        assert_eq!(block_of(&s, add), entry);
        assert_eq!(block_of(&s, ret), entry);
        assert_eq!(s.block(entry).control(), BlockControl::Return);
        let nodes = s.block(entry).nodes();
        let pos = |n| nodes.iter().position(|&x| x == n).unwrap();
        assert!(pos(p0) < pos(add) && pos(p1) < pos(add));
        assert_eq!(s.rpo_order(), &[entry, s.end()]);
    }

    #[test]
    fn test_diamond_dominance() {
        let mut f = GraphFixture::new(1);
        let p0 = f.parameter(0);
        let start = f.graph.start;
        let (t, fl) = f.branch(p0, start);
        let merge = f.merge(&[t, fl]);
        let ret = f.ret(p0, start, merge);

        let s = schedule(&mut f);
        let branch = f.graph.input(t, 0);
        let branch_block = block_of(&s, branch);
        let (tb, fb, mb) = (block_of(&s, t), block_of(&s, fl), block_of(&s, merge));
        assert_eq!(s.block(tb).dominator(), Some(branch_block));
        assert_eq!(s.block(fb).dominator(), Some(branch_block));
        assert_eq!(s.block(mb).dominator(), Some(branch_block));
        assert!(!s.dominates(tb, mb) && !s.dominates(fb, mb));
        assert!(s.dominates(mb, block_of(&s, ret)));
        assert_eq!(s.block(mb).predecessors(), &[tb, fb]);
    }

    #[test]
    fn test_phi_inputs_are_computed_in_predecessors() {
        let mut f = GraphFixture::new(2);
        let (p0, p1) = (f.parameter(0), f.parameter(1));
        let start = f.graph.start;
        let (t, fl) = f.branch(p0, start);
        let one = f.int32(1);
        let in_true = f.graph.new_node(f.machine.int32_add(), &[p1, one]);
        let in_false = f.graph.new_node(f.machine.int32_sub(), &[p1, one]);
        let merge = f.merge(&[t, fl]);
        let phi = f.phi(MachineType::MACH_INT32, &[in_true, in_false], merge);
        f.ret(phi, start, merge);

        let s = schedule(&mut f);
        assert_eq!(block_of(&s, in_true), block_of(&s, t));
        assert_eq!(block_of(&s, in_false), block_of(&s, fl));
        assert_eq!(block_of(&s, phi), block_of(&s, merge));
    }

    /// `for (i = 0; i < p0; i = i + (p1 * 3)) {}; return i`
    fn counting_loop(f: &mut GraphFixture) -> (NodeId, NodeId, NodeId) {
        let (p0, p1) = (f.parameter(0), f.parameter(1));
        let start = f.graph.start;
        let zero = f.int32(0);
        let three = f.int32(3);
        let loop_ = f.graph.new_node(f.common.loop_(2), &[start, start]);
        let phi = f.graph.new_node(f.common.phi(MachineType::MACH_INT32, 2), &[zero, zero, loop_]);
        let invariant = f.graph.new_node(f.machine.int32_mul(), &[p1, three]);
        let cmp = f.graph.new_node(f.machine.int32_less_than(), &[phi, p0]);
        let (body, exit) = f.branch(cmp, loop_);
        let next = f.graph.new_node(f.machine.int32_add(), &[phi, invariant]);
        f.graph.replace_input(loop_, 1, body);
        f.graph.replace_input(phi, 1, next);
        f.ret(phi, start, exit);
        (loop_, invariant, next)
    }

    #[test]
    fn test_loop_invariant_is_hoisted() {
        let mut f = GraphFixture::new(2);
        let (loop_, invariant, next) = counting_loop(&mut f);

        let s = schedule(&mut f);
        let header = block_of(&s, loop_);
        assert!(s.block(header).is_loop_header());
        assert_eq!(block_of(&s, invariant), s.start());
        let next_block = block_of(&s, next);
        assert!(s.block(header).loop_contains(s.block(next_block).rpo_number().unwrap()));
    }

    #[test]
    fn test_hoisting_can_be_disabled() {
        let mut f = GraphFixture::new(2);
        let (loop_, invariant, _) = counting_loop(&mut f);
        let config = SchedulerConfig {
            hoist_loop_invariants: false,
            ..SchedulerConfig::default()
        };

        let s = Scheduler::compute_schedule(&mut f.graph, &config).unwrap();
        let header = block_of(&s, loop_);
        let rpo = s.block(block_of(&s, invariant)).rpo_number().unwrap();
        assert!(s.block(header).loop_contains(rpo));
    }

    #[test]
    fn test_floating_diamond_is_connected() {
        let mut f = GraphFixture::new(2);
        let (x, y) = (f.int32_param(0), f.int32_param(1));
        let quotient = diamond::int32_div(&mut f.graph, x, y);
        let start = f.graph.start;
        let ret = f.ret(quotient, start, start);

        let s = schedule(&mut f);
        // Three nested branches, seven new blocks besides start and end.
        assert_eq!(s.rpo_order().len(), 2 + 9);
        let merge = f.graph.input(quotient, 2);
        assert_eq!(block_of(&s, quotient), block_of(&s, merge));
        assert_eq!(NodeProperties::get_control_input(&f.graph, ret, 0), merge);
    }

    #[test]
    fn test_round_limit_is_reported() {
        let mut f = GraphFixture::new(2);
        let (x, y) = (f.int32_param(0), f.int32_param(1));
        let quotient = diamond::int32_div(&mut f.graph, x, y);
        let start = f.graph.start;
        f.ret(quotient, start, start);
        let config = SchedulerConfig {
            max_floating_control_rounds: 0,
            ..SchedulerConfig::default()
        };

        let err = Scheduler::compute_schedule(&mut f.graph, &config).unwrap_err();
        assert_eq!(err, CompileError::FloatingControl { rounds: 0 });
    }

    #[test]
    fn test_display_lists_blocks_in_order() {
        let mut f = GraphFixture::new(1);
        let p0 = f.parameter(0);
        let start = f.graph.start;
        let (t, fl) = f.branch(p0, start);
        let merge = f.merge(&[t, fl]);
        f.ret(p0, start, merge);

        let s = schedule(&mut f);
        let text = s.display(&f.graph).to_string();
        assert!(text.starts_with("--- BLOCK B0 ---\n"));
        assert!(text.contains("Branch"));
        assert!(text.contains("Return"));
        assert_eq!(text.matches("--- BLOCK").count(), s.rpo_order().len());
    }
}
