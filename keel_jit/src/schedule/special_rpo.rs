//! Block ordering with contiguous loops.
//!
//! Plain reverse post-order only guarantees that forward predecessors come
//! first. Code generation also wants every loop body to form one run of
//! blocks, so that `[header.rpo, header.loop_end)` is exactly the loop.
//!
//! The order is built in three steps:
//!
//! 1. A depth-first walk from the start block finds the reachable blocks
//!    and the back-edges (edges into a block still on the walk's stack).
//! 2. Each back-edge target is a loop header. Its members are found by
//!    walking predecessors backwards from every latch until the header.
//!    Loops nest by membership of their headers.
//! 3. Each loop (and the function itself) is ordered as a DAG in which
//!    directly nested loops are collapsed to a single node, exits are left
//!    to the enclosing level and back-edges are dropped. Splicing every
//!    collapsed loop's own order in its place gives the final order.
//!
//! All walks use explicit stacks.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::trace;

use super::schedule::{BlockId, Schedule};

#[derive(Debug)]
struct LoopInfo {
    header: BlockId,
    /// Member blocks in discovery order, header first.
    blocks: Vec<BlockId>,
    members: FxHashSet<BlockId>,
    parent: Option<usize>,
    depth: u32,
}

impl LoopInfo {
    fn size(&self) -> usize {
        self.blocks.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RegionNode {
    Block(BlockId),
    Loop(usize),
}

struct SpecialRpo<'s> {
    schedule: &'s Schedule,
    reachable: Vec<bool>,
    loops: Vec<LoopInfo>,
    /// Innermost loop of each block.
    innermost: Vec<Option<usize>>,
}

/// Compute the order, store RPO numbers and loop data on the blocks, and
/// return the order.
pub fn compute_special_rpo(schedule: &mut Schedule) -> Vec<BlockId> {
    let (order, loops, innermost) = {
        let mut rpo = SpecialRpo::new(schedule);
        let back_edges = rpo.find_back_edges();
        rpo.compute_loops(&back_edges);
        let order = rpo.order();
        (order, rpo.loops, rpo.innermost)
    };

    for i in 0..schedule.block_count() {
        let b = schedule.block_mut(BlockId::new(i as u32));
        b.rpo_number = None;
        b.loop_header = None;
        b.loop_depth = 0;
        b.loop_end = None;
    }
    for (number, &id) in order.iter().enumerate() {
        let block = schedule.block_mut(id);
        block.rpo_number = Some(number as u32);
        if let Some(l) = innermost[id.index()] {
            block.loop_header = Some(loops[l].header);
            block.loop_depth = loops[l].depth;
        }
    }
    for info in &loops {
        let header = schedule.block_mut(info.header);
        let start = header.rpo_number.unwrap_or(0);
        header.loop_end = Some(start + info.size() as u32);
        trace!(header = %info.header, size = info.size(), depth = info.depth, "loop");
    }
    schedule.set_rpo_order(order.clone());
    order
}

impl<'s> SpecialRpo<'s> {
    fn new(schedule: &'s Schedule) -> Self {
        let n = schedule.block_count();
        SpecialRpo {
            schedule,
            reachable: vec![false; n],
            loops: Vec::new(),
            innermost: vec![None; n],
        }
    }

    fn successors(&self, block: BlockId) -> &[BlockId] {
        self.schedule.block(block).successors()
    }

    /// Step 1: reachability and back-edges as `(latch, header)` pairs.
    fn find_back_edges(&mut self) -> Vec<(BlockId, BlockId)> {
        let n = self.schedule.block_count();
        let mut on_stack = vec![false; n];
        let mut back_edges = Vec::new();
        let start = self.schedule.start();
        let mut stack: Vec<(BlockId, usize)> = vec![(start, 0)];
        self.reachable[start.index()] = true;
        on_stack[start.index()] = true;

        let schedule = self.schedule;
        while let Some(top) = stack.last_mut() {
            let (block, next) = *top;
            let succs = schedule.block(block).successors();
            if next < succs.len() {
                let succ = succs[next];
                top.1 += 1;
                if on_stack[succ.index()] {
                    back_edges.push((block, succ));
                } else if !self.reachable[succ.index()] {
                    self.reachable[succ.index()] = true;
                    on_stack[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                on_stack[block.index()] = false;
                stack.pop();
            }
        }
        back_edges
    }

    /// Step 2: membership and nesting.
    fn compute_loops(&mut self, back_edges: &[(BlockId, BlockId)]) {
        let n = self.schedule.block_count();
        let mut header_to_loop: Vec<Option<usize>> = vec![None; n];
        for &(latch, header) in back_edges {
            let l = match header_to_loop[header.index()] {
                Some(l) => l,
                None => {
                    let mut members = FxHashSet::default();
                    members.insert(header);
                    self.loops.push(LoopInfo {
                        header,
                        blocks: vec![header],
                        members,
                        parent: None,
                        depth: 0,
                    });
                    header_to_loop[header.index()] = Some(self.loops.len() - 1);
                    self.loops.len() - 1
                }
            };
            let mut worklist: SmallVec<[BlockId; 8]> = SmallVec::new();
            worklist.push(latch);
            while let Some(block) = worklist.pop() {
                let info = &mut self.loops[l];
                if !info.members.insert(block) {
                    continue;
                }
                info.blocks.push(block);
                for &pred in self.schedule.block(block).predecessors() {
                    if self.reachable[pred.index()] {
                        worklist.push(pred);
                    }
                }
            }
        }

        // Outer loops are strictly larger than the loops they hold, so
        // visiting by decreasing size sees every parent before its children
        // and leaves each block with its smallest enclosing loop.
        let mut by_size: Vec<usize> = (0..self.loops.len()).collect();
        by_size.sort_by_key(|&l| std::cmp::Reverse(self.loops[l].size()));
        for l in by_size {
            let parent = self.innermost[self.loops[l].header.index()];
            let depth = parent.map_or(1, |p| self.loops[p].depth + 1);
            self.loops[l].parent = parent;
            self.loops[l].depth = depth;
            for &b in &self.loops[l].blocks {
                self.innermost[b.index()] = Some(l);
            }
        }
    }

    fn in_region(&self, block: BlockId, region: Option<usize>) -> bool {
        match region {
            None => self.reachable[block.index()],
            Some(l) => self.loops[l].members.contains(&block),
        }
    }

    /// What `block` looks like from inside `region`.
    fn representative(&self, block: BlockId, region: Option<usize>) -> Option<RegionNode> {
        if !self.in_region(block, region) {
            return None;
        }
        let mut l = self.innermost[block.index()];
        if l == region {
            return Some(RegionNode::Block(block));
        }
        while let Some(current) = l {
            if self.loops[current].parent == region {
                return Some(RegionNode::Loop(current));
            }
            l = self.loops[current].parent;
        }
        None
    }

    fn region_successors(&self, node: RegionNode, region: Option<usize>) -> Vec<RegionNode> {
        let header = self.region_header(region);
        let mut out: Vec<RegionNode> = Vec::new();
        let push = |succ: BlockId, out: &mut Vec<RegionNode>| {
            if succ == header {
                return;
            }
            if let Some(rep) = self.representative(succ, region) {
                if rep != node && !out.contains(&rep) {
                    out.push(rep);
                }
            }
        };
        match node {
            RegionNode::Block(b) => {
                for &succ in self.successors(b) {
                    push(succ, &mut out);
                }
            }
            RegionNode::Loop(l) => {
                for &b in &self.loops[l].blocks {
                    for &succ in self.successors(b) {
                        push(succ, &mut out);
                    }
                }
            }
        }
        out
    }

    fn region_header(&self, region: Option<usize>) -> BlockId {
        match region {
            None => self.schedule.start(),
            Some(l) => self.loops[l].header,
        }
    }

    /// Reverse post-order of one region with nested loops collapsed.
    fn order_region(&self, region: Option<usize>) -> Vec<RegionNode> {
        let header = RegionNode::Block(self.region_header(region));
        let mut post: Vec<RegionNode> = Vec::new();
        let mut seen: FxHashSet<RegionNode> = FxHashSet::default();
        seen.insert(header);
        // Successors are consumed from the back so that the first one
        // ends up first in the reversed order.
        let mut stack: Vec<(RegionNode, Vec<RegionNode>)> =
            vec![(header, self.region_successors(header, region))];
        while let Some((node, succs)) = stack.last_mut() {
            match succs.pop() {
                Some(succ) => {
                    if seen.insert(succ) {
                        let next = self.region_successors(succ, region);
                        stack.push((succ, next));
                    }
                }
                None => {
                    post.push(*node);
                    stack.pop();
                }
            }
        }
        post.reverse();
        post
    }

    /// Step 3: splice the region orders together.
    fn order(&self) -> Vec<BlockId> {
        let root = self.order_region(None);
        let nested: Vec<Vec<RegionNode>> =
            (0..self.loops.len()).map(|l| self.order_region(Some(l))).collect();

        let mut order = Vec::new();
        let mut stack: Vec<(&[RegionNode], usize)> = vec![(root.as_slice(), 0)];
        while let Some((nodes, pos)) = stack.last_mut() {
            if *pos == nodes.len() {
                stack.pop();
                continue;
            }
            let node = nodes[*pos];
            *pos += 1;
            match node {
                RegionNode::Block(b) => order.push(b),
                RegionNode::Loop(l) => stack.push((nested[l].as_slice(), 0)),
            }
        }
        order
    }
}
