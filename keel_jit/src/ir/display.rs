//! Textual dumps of a graph: debug listing, Graphviz DOT and JSON.
//!
//! Use: `dot -Tsvg graph.dot -o graph.svg`.

use std::fmt::{self, Write};

use serde::Serialize;

use super::graph::Graph;
use super::node::{Edge, NodeId};
use super::properties::{InputLayout, NodeProperties};
use super::visit::reachable_from_end;

impl Graph {
    /// DOT rendering of every node reachable from `End`. Control edges are
    /// drawn bold, effect edges dashed.
    pub fn write_dot(&self, out: &mut impl Write) -> fmt::Result {
        writeln!(out, "digraph Graph {{")?;
        writeln!(out, "  rankdir=BT;")?;
        writeln!(out, "  node [shape=box, style=rounded, fontsize=10];")?;
        for id in reachable_from_end(self) {
            let op = self.op(id);
            let shape = if op.opcode().is_control() {
                ", style=\"rounded,filled\", fillcolor=khaki"
            } else {
                ""
            };
            writeln!(
                out,
                "  n{} [label=\"{}: {}\"{}];",
                id.index(),
                id.index(),
                escape_dot(&op.to_string()),
                shape
            )?;
            for edge in self.input_edges(id) {
                let style = if NodeProperties::is_control_edge(self, edge) {
                    " [style=bold]"
                } else if NodeProperties::is_effect_edge(self, edge) {
                    " [style=dashed]"
                } else {
                    ""
                };
                writeln!(out, "  n{} -> n{}{};", edge.from.index(), edge.to.index(), style)?;
            }
        }
        writeln!(out, "}}")
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_dot(&mut dot);
        dot
    }

    /// JSON dump of all live nodes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let dump = GraphDump {
            start: self.start.index(),
            end: self.end.index(),
            nodes: self
                .iter()
                .filter(|(_, node)| !node.is_dead())
                .map(|(id, node)| NodeDump {
                    id: id.index(),
                    op: node.op().to_string(),
                    opcode: node.op().opcode().mnemonic(),
                    inputs: node
                        .inputs()
                        .iter()
                        .map(|i| i.is_valid().then(|| i.index()))
                        .collect(),
                    first_control: InputLayout::of(node.op()).control,
                    ty: node.is_typed().then(|| format!("{:?}", node.ty())),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&dump)
    }

    fn input_edges(&self, id: NodeId) -> Vec<Edge> {
        self.inputs(id)
            .iter()
            .enumerate()
            .filter(|(_, input)| input.is_valid())
            .map(|(index, &to)| Edge { from: id, index, to })
            .collect()
    }
}

#[derive(Serialize)]
struct GraphDump {
    start: u32,
    end: u32,
    nodes: Vec<NodeDump>,
}

#[derive(Serialize)]
struct NodeDump {
    id: u32,
    op: String,
    opcode: &'static str,
    inputs: Vec<Option<u32>>,
    /// Index of the first control input.
    first_control: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    ty: Option<String>,
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph (start={}, end={}) {{", self.start, self.end)?;
        for (id, node) in self.iter() {
            if node.is_dead() {
                continue;
            }
            writeln!(f, "  {:?} = {:?}", id, node)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builders::CommonOperatorBuilder;

    fn returning_graph() -> Graph {
        let mut graph = Graph::new();
        let common = CommonOperatorBuilder::new();
        let start = graph.start;
        let value = graph.int32_constant(42);
        let ret = graph.new_node(common.return_(), &[value, start, start]);
        NodeProperties::merge_control_to_end(&mut graph, ret);
        graph
    }

    #[test]
    fn test_dot_lists_edges() {
        let graph = returning_graph();
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph Graph {"));
        assert!(dot.contains("Int32Constant[42]"));
        assert!(dot.contains("[style=bold]"));
        assert!(dot.contains("[style=dashed]"));
    }

    #[test]
    fn test_json_round_trips_through_serde_value() {
        let graph = returning_graph();
        let json = graph.to_json().expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["start"], 0);
        let nodes = value["nodes"].as_array().expect("node list");
        assert!(nodes.iter().any(|n| n["opcode"] == "Return"));
    }

    #[test]
    fn test_debug_skips_killed_nodes() {
        let mut graph = returning_graph();
        let extra = graph.int32_constant(7);
        graph.kill(extra);
        let text = format!("{:?}", graph);
        assert!(text.contains("Return"));
        assert!(!text.contains("[7]"));
    }
}
