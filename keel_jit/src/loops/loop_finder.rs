//! Loop membership over the sea of nodes.
//!
//! A loop's members are the nodes that depend on its header: everything
//! reachable from the `Loop` node along use edges, stopping at the loop's
//! own exits (`LoopExit` on the header and the `LoopExitValue` /
//! `LoopExitEffect` nodes hanging off it). Nodes that do not depend on the
//! header are invariant and belong to the enclosing region.
//!
//! Loops nest when one header is a member of another loop; the parent is
//! the smallest such loop.

use tracing::{debug, debug_span};

use crate::ir::{Graph, IdSet, InputLayout, Node, NodeId, Opcode};

/// One loop of the graph.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    header: NodeId,
    members: Vec<NodeId>,
    member_set: IdSet<Node>,
    exits: Vec<NodeId>,
    /// Member with a use outside the loop that is not an exit.
    escape: Option<NodeId>,
    parent: Option<usize>,
    depth: u32,
}

impl LoopInfo {
    /// The `Loop` node.
    pub fn header(&self) -> NodeId {
        self.header
    }

    /// Members in discovery order, header first.
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.member_set.contains(node)
    }

    /// `LoopExit`, `LoopExitValue` and `LoopExitEffect` nodes of this loop.
    pub fn exits(&self) -> &[NodeId] {
        &self.exits
    }

    /// `true` when every value leaving the loop goes through an exit.
    pub fn is_closed(&self) -> bool {
        self.escape.is_none()
    }

    pub fn escape(&self) -> Option<NodeId> {
        self.escape
    }

    /// Index of the enclosing loop in the tree.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// 1 for outermost loops.
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// All loops reachable from `End`, outer loops before inner ones.
#[derive(Debug, Clone, Default)]
pub struct LoopTree {
    loops: Vec<LoopInfo>,
}

impl LoopTree {
    pub fn build(graph: &Graph) -> Self {
        let _span = debug_span!("loop_finder").entered();
        let reachable = crate::ir::visit::reachable_from_end(graph);
        let mut live = IdSet::with_capacity(graph.node_count());
        for &node in &reachable {
            live.insert(node);
        }

        let mut loops: Vec<LoopInfo> = reachable
            .iter()
            .filter(|&&n| graph.opcode(n) == Opcode::Loop)
            .map(|&header| Self::find_members(graph, &live, header))
            .collect();

        // A loop contains every loop whose header it owns, so larger loops
        // come first and parents precede their children.
        loops.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
        for i in 0..loops.len() {
            let header = loops[i].header;
            let parent = (0..i)
                .rev()
                .find(|&j| loops[j].header != header && loops[j].contains(header));
            loops[i].parent = parent;
            loops[i].depth = parent.map_or(1, |p| loops[p].depth + 1);
        }
        debug!(loops = loops.len(), "found loops");
        Self { loops }
    }

    fn find_members(graph: &Graph, live: &IdSet<Node>, header: NodeId) -> LoopInfo {
        let mut member_set = IdSet::with_capacity(graph.node_count());
        let mut members = vec![header];
        let mut exits = Vec::new();
        let mut escape = None;
        member_set.insert(header);

        let mut index = 0;
        while index < members.len() {
            let node = members[index];
            index += 1;
            for user in graph.users(node) {
                if !live.contains(user) || member_set.contains(user) {
                    continue;
                }
                if Self::is_exit_of(graph, user, header) {
                    if !exits.contains(&user) {
                        exits.push(user);
                    }
                    continue;
                }
                match graph.opcode(user) {
                    // Non-terminating loops hang off End through Terminate.
                    Opcode::Terminate => continue,
                    Opcode::End => {
                        escape.get_or_insert(node);
                        continue;
                    }
                    _ => {}
                }
                member_set.insert(user);
                members.push(user);
            }
        }

        LoopInfo {
            header,
            members,
            member_set,
            exits,
            escape,
            parent: None,
            depth: 1,
        }
    }

    fn is_exit_of(graph: &Graph, node: NodeId, header: NodeId) -> bool {
        match graph.opcode(node) {
            Opcode::LoopExit => graph.input(node, 1) == header,
            Opcode::LoopExitValue | Opcode::LoopExitEffect => {
                let control = graph.input(node, InputLayout::of(graph.op(node)).control);
                control.is_valid()
                    && graph.opcode(control) == Opcode::LoopExit
                    && graph.input(control, 1) == header
            }
            _ => false,
        }
    }

    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The loop headed by `header`.
    pub fn loop_of(&self, header: NodeId) -> Option<&LoopInfo> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// The innermost loop containing `node`.
    pub fn innermost(&self, node: NodeId) -> Option<&LoopInfo> {
        self.loops
            .iter()
            .filter(|l| l.contains(node))
            .max_by_key(|l| l.depth)
    }
}
