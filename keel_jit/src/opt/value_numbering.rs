//! Global value numbering over pure nodes.
//!
//! Two idempotent nodes with the same operator and the same inputs compute
//! the same value; the later one is replaced by the earlier one. Entries are
//! validated on lookup because reducers mutate nodes in place.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::ir::node::NodeId;
use crate::ir::operators::{Operator, Properties};
use crate::ir::Graph;

use super::reducer::{Editor, Reducer, Reduction};

type Key = (Operator, SmallVec<[NodeId; 4]>);

#[derive(Debug, Default)]
pub struct ValueNumberingReducer {
    table: FxHashMap<Key, NodeId>,
}

impl ValueNumberingReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn key(graph: &Graph, node: NodeId) -> Key {
        (*graph.op(node), SmallVec::from_slice(graph.inputs(node)))
    }

    fn still_matches(graph: &Graph, candidate: NodeId, key: &Key) -> bool {
        !graph.is_dead(candidate)
            && *graph.op(candidate) == key.0
            && graph.inputs(candidate) == key.1.as_slice()
    }
}

impl Reducer for ValueNumberingReducer {
    fn name(&self) -> &'static str {
        "ValueNumberingReducer"
    }

    fn reduce(&mut self, editor: &mut Editor<'_>, node: NodeId) -> Reduction {
        let graph = &*editor.graph;
        let op = graph.op(node);
        if !op.has_property(Properties::IDEMPOTENT) || op.value_output_count() == 0 {
            return Reduction::NoChange;
        }
        if graph.inputs(node).iter().any(|i| !i.is_valid()) {
            return Reduction::NoChange;
        }
        let key = Self::key(graph, node);
        match self.table.get(&key) {
            Some(&existing) if existing != node && Self::still_matches(graph, existing, &key) => {
                trace!(node = %node, existing = %existing, "value numbered");
                if graph.node(node).is_typed() && graph.node(existing).is_typed() {
                    let narrowed = graph.ty(node).intersect(graph.ty(existing));
                    if !narrowed.is_none() {
                        editor.graph.set_type(existing, narrowed);
                    }
                }
                Reduction::Replace(existing)
            }
            Some(&existing) if existing == node => Reduction::NoChange,
            _ => {
                self.table.insert(key, node);
                Reduction::NoChange
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
