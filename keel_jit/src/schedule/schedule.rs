//! Basic blocks and the schedule that owns them.
//!
//! A [`Schedule`] is the scheduler's output: blocks in a loop-contiguous
//! reverse post-order, a dominator tree, and for every scheduled node the
//! block it lives in. Blocks refer to each other by [`BlockId`]; the
//! schedule never points back into the graph except through node ids.

use std::fmt;

use smallvec::SmallVec;

use crate::ir::{Graph, IdMap, Node, NodeId};

/// Index of a block in its [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        BlockId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// How control leaves a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockControl {
    /// Not connected yet.
    None,
    Goto,
    Branch,
    /// A call with success and exception continuations.
    Call,
    Return,
    Throw,
    Deoptimize,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    id: BlockId,
    /// Scheduled nodes, in order. The terminating node is not included.
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) control: BlockControl,
    /// The node ending the block (Branch, Return, ...), if any.
    pub(crate) control_input: NodeId,
    pub(crate) predecessors: SmallVec<[BlockId; 2]>,
    pub(crate) successors: SmallVec<[BlockId; 2]>,
    pub(crate) dominator: Option<BlockId>,
    pub(crate) dominator_depth: u32,
    /// Position in the block order; `None` for blocks not reached from start.
    pub(crate) rpo_number: Option<u32>,
    /// Innermost loop header containing this block (itself for a header).
    pub(crate) loop_header: Option<BlockId>,
    pub(crate) loop_depth: u32,
    /// For headers: one past the RPO number of the last loop member.
    pub(crate) loop_end: Option<u32>,
    pub(crate) deferred: bool,
}

impl BasicBlock {
    fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            nodes: Vec::new(),
            control: BlockControl::None,
            control_input: NodeId::INVALID,
            predecessors: SmallVec::new(),
            successors: SmallVec::new(),
            dominator: None,
            dominator_depth: 0,
            rpo_number: None,
            loop_header: None,
            loop_depth: 0,
            loop_end: None,
            deferred: false,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn control(&self) -> BlockControl {
        self.control
    }

    pub fn control_input(&self) -> Option<NodeId> {
        self.control_input.is_valid().then_some(self.control_input)
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    pub fn dominator(&self) -> Option<BlockId> {
        self.dominator
    }

    pub fn rpo_number(&self) -> Option<u32> {
        self.rpo_number
    }

    pub fn loop_header(&self) -> Option<BlockId> {
        self.loop_header
    }

    pub fn loop_depth(&self) -> u32 {
        self.loop_depth
    }

    pub fn loop_end(&self) -> Option<u32> {
        self.loop_end
    }

    pub fn is_loop_header(&self) -> bool {
        self.loop_end.is_some()
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// `rpo` lies in this header's loop range.
    pub fn loop_contains(&self, rpo: u32) -> bool {
        match (self.rpo_number, self.loop_end) {
            (Some(start), Some(end)) => rpo >= start && rpo < end,
            _ => false,
        }
    }
}

/// Blocks, their order, and the node-to-block mapping.
#[derive(Debug, Clone)]
pub struct Schedule {
    blocks: Vec<BasicBlock>,
    node_to_block: IdMap<Node, Option<BlockId>>,
    rpo_order: Vec<BlockId>,
    start: BlockId,
    end: BlockId,
}

impl Schedule {
    /// An empty schedule with its start and end blocks.
    pub fn new(node_count: usize) -> Self {
        let mut schedule = Schedule {
            blocks: Vec::new(),
            node_to_block: IdMap::filled(node_count, None),
            rpo_order: Vec::new(),
            start: BlockId(0),
            end: BlockId(0),
        };
        schedule.start = schedule.new_block();
        schedule.end = schedule.new_block();
        schedule
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    #[inline]
    pub fn start(&self) -> BlockId {
        self.start
    }

    #[inline]
    pub fn end(&self) -> BlockId {
        self.end
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    #[inline]
    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    /// Blocks reached from start, in loop-contiguous reverse post-order.
    pub fn rpo_order(&self) -> &[BlockId] {
        &self.rpo_order
    }

    pub(crate) fn set_rpo_order(&mut self, order: Vec<BlockId>) {
        self.rpo_order = order;
    }

    pub fn block_for(&self, node: NodeId) -> Option<BlockId> {
        if !node.is_valid() {
            return None;
        }
        *self.node_to_block.get(node)
    }

    pub fn is_scheduled(&self, node: NodeId) -> bool {
        self.block_for(node).is_some()
    }

    /// Total number of nodes placed in block lists, terminators included.
    pub fn scheduled_node_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.nodes.len() + usize::from(b.control_input.is_valid()))
            .sum()
    }

    /// Record `node`'s block without appending it to the block.
    pub(crate) fn plan_node(&mut self, block: BlockId, node: NodeId) {
        self.node_to_block.set(node, Some(block));
    }

    /// Append `node` to `block`.
    pub(crate) fn add_node(&mut self, block: BlockId, node: NodeId) {
        self.plan_node(block, node);
        self.block_mut(block).nodes.push(node);
    }

    fn add_successor(&mut self, block: BlockId, succ: BlockId) {
        self.block_mut(block).successors.push(succ);
        self.block_mut(succ).predecessors.push(block);
    }

    fn set_control(&mut self, block: BlockId, control: BlockControl, node: NodeId) {
        let b = self.block_mut(block);
        debug_assert_eq!(b.control, BlockControl::None, "{} already terminated", block);
        b.control = control;
        b.control_input = node;
        if node.is_valid() {
            self.plan_node(block, node);
        }
    }

    pub(crate) fn add_goto(&mut self, block: BlockId, succ: BlockId) {
        self.set_control(block, BlockControl::Goto, NodeId::INVALID);
        self.add_successor(block, succ);
    }

    pub(crate) fn add_branch(
        &mut self,
        block: BlockId,
        branch: NodeId,
        if_true: BlockId,
        if_false: BlockId,
    ) {
        self.set_control(block, BlockControl::Branch, branch);
        self.add_successor(block, if_true);
        self.add_successor(block, if_false);
    }

    pub(crate) fn add_call(
        &mut self,
        block: BlockId,
        call: NodeId,
        if_success: BlockId,
        if_exception: BlockId,
    ) {
        self.set_control(block, BlockControl::Call, call);
        self.add_successor(block, if_success);
        self.add_successor(block, if_exception);
    }

    /// Return, Throw and Deoptimize all flow into the end block.
    pub(crate) fn add_exit(&mut self, block: BlockId, control: BlockControl, node: NodeId) {
        self.set_control(block, control, node);
        let end = self.end;
        self.add_successor(block, end);
    }

    pub(crate) fn mark_deferred(&mut self, block: BlockId) {
        self.block_mut(block).deferred = true;
    }

    // -------------------------------------------------------------------------
    // Dominance
    // -------------------------------------------------------------------------

    fn rpo(&self, block: BlockId) -> i64 {
        self.block(block).rpo_number.map_or(-1, i64::from)
    }

    /// `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = Some(b);
        while let Some(block) = current {
            if block == a {
                return true;
            }
            if self.rpo(block) < self.rpo(a) {
                return false;
            }
            current = self.block(block).dominator;
        }
        false
    }

    /// The deepest block dominating both `a` and `b`.
    pub fn common_dominator(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            let (da, db) = (self.block(a).dominator_depth, self.block(b).dominator_depth);
            let next = if da > db || (da == db && self.rpo(a) > self.rpo(b)) {
                &mut a
            } else {
                &mut b
            };
            match self.block(*next).dominator {
                Some(dom) => *next = dom,
                None => break,
            }
        }
        a
    }

    /// Print with operator names resolved against `graph`.
    pub fn display<'a>(&'a self, graph: &'a Graph) -> ScheduleDisplay<'a> {
        ScheduleDisplay {
            schedule: self,
            graph: Some(graph),
        }
    }
}

/// Line-oriented block listing.
pub struct ScheduleDisplay<'a> {
    schedule: &'a Schedule,
    graph: Option<&'a Graph>,
}

impl ScheduleDisplay<'_> {
    fn node(&self, f: &mut fmt::Formatter<'_>, node: NodeId) -> fmt::Result {
        match self.graph {
            Some(graph) => {
                write!(f, "{}: {}", node, graph.op(node))?;
                let inputs = graph.inputs(node);
                if !inputs.is_empty() {
                    f.write_str("(")?;
                    for (i, input) in inputs.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", input)?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
            None => write!(f, "{}", node),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, blocks: &[BlockId]) -> fmt::Result {
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", block)?;
    }
    Ok(())
}

impl fmt::Display for ScheduleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schedule = self.schedule;
        for &id in schedule.rpo_order() {
            let block = schedule.block(id);
            write!(f, "--- BLOCK {}", id)?;
            if block.deferred {
                f.write_str(" (deferred)")?;
            }
            if !block.predecessors.is_empty() {
                f.write_str(" <- ")?;
                join(f, &block.predecessors)?;
            }
            f.write_str(" ---\n")?;
            for &node in &block.nodes {
                f.write_str("  ")?;
                self.node(f, node)?;
                f.write_str("\n")?;
            }
            let terminator = match block.control {
                BlockControl::None => None,
                BlockControl::Goto => Some("Goto"),
                BlockControl::Branch => Some("Branch"),
                BlockControl::Call => Some("Call"),
                BlockControl::Return => Some("Return"),
                BlockControl::Throw => Some("Throw"),
                BlockControl::Deoptimize => Some("Deoptimize"),
            };
            if let Some(name) = terminator {
                f.write_str("  ")?;
                if block.control_input.is_valid() {
                    self.node(f, block.control_input)?;
                } else {
                    f.write_str(name)?;
                }
                if !block.successors.is_empty() {
                    f.write_str(" -> ")?;
                    join(f, &block.successors)?;
                }
                f.write_str("\n")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ScheduleDisplay {
            schedule: self,
            graph: None,
        }
        .fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (Schedule, [BlockId; 4]) {
        let mut s = Schedule::new(0);
        let entry = s.start();
        let t = s.new_block();
        let f = s.new_block();
        let join = s.new_block();
        s.add_branch(entry, NodeId::INVALID, t, f);
        s.add_goto(t, join);
        s.add_goto(f, join);
        for (i, &b) in [entry, t, f, join].iter().enumerate() {
            s.block_mut(b).rpo_number = Some(i as u32);
        }
        for &b in &[t, f, join] {
            s.block_mut(b).dominator = Some(entry);
            s.block_mut(b).dominator_depth = 1;
        }
        (s, [entry, t, f, join])
    }

    #[test]
    fn test_dominance_queries() {
        let (s, [entry, t, f, join]) = diamond();
        assert!(s.dominates(entry, join));
        assert!(s.dominates(t, t));
        assert!(!s.dominates(t, join));
        assert_eq!(s.common_dominator(t, f), entry);
        assert_eq!(s.common_dominator(join, t), entry);
    }

    #[test]
    fn test_edges_are_mirrored() {
        let (s, [entry, t, f, join]) = diamond();
        assert_eq!(s.block(entry).successors(), &[t, f]);
        assert_eq!(s.block(join).predecessors(), &[t, f]);
        assert_eq!(s.block(entry).control(), BlockControl::Branch);
    }

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId::new(7).to_string(), "B7");
    }
}
