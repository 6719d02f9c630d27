use crate::core::strategy::graph::StrategyGraph;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;

/// Node weight carrying display information.
struct NodeLabel {
    id: String,
    state: String,
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.state)
    }
}

/// Edge weight carrying the transformation label.
struct EdgeLabel {
    label: String,
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

fn build_graph(strategy: &StrategyGraph) -> DiGraph<NodeLabel, EdgeLabel> {
    let mut graph = DiGraph::new();
    let mut node_map: HashMap<&str, NodeIndex> = HashMap::new();

    for (id, node) in strategy.nodes() {
        let idx = graph.add_node(NodeLabel {
            id: id.to_string(),
            state: node.state().to_string(),
        });
        node_map.insert(id, idx);
    }

    for edge in strategy.edges() {
        if let (Some(&from), Some(&to)) = (node_map.get(edge.parent), node_map.get(edge.child)) {
            let name = edge.transformation.name();
            let label = if name.is_empty() {
                edge.transformation.kind().to_string()
            } else {
                format!("{} ({})", name, edge.transformation.kind())
            };
            graph.add_edge(from, to, EdgeLabel { label });
        }
    }

    graph
}

/// Render the strategy graph as a Graphviz DOT string using petgraph.
pub fn strategy_to_dot(strategy: &StrategyGraph) -> String {
    let graph = build_graph(strategy);
    format!("{}", Dot::new(&graph))
}
