#![allow(dead_code)]

use deploydag::DirectedGraph;

/// Builder for `DirectedGraph` to simplify test setup.
///
/// Node payloads default to the node's own name.
pub struct GraphBuilder {
    graph: DirectedGraph<String, String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: DirectedGraph::new(),
        }
    }

    pub fn node(mut self, name: &str) -> Self {
        self.graph.upsert_node(name, name.to_string());
        self
    }

    /// Arc whose payload is `"from->to"`.
    pub fn arc(mut self, from: &str, to: &str) -> Self {
        for end in [from, to] {
            if self.graph.node_data(end).is_none() {
                self.graph.upsert_node(end, end.to_string());
            }
        }
        self.graph.add_arc(from, to, Some(format!("{from}->{to}")));
        self
    }

    /// Arcs along `names` in order: `a -> b -> c ...`.
    pub fn chain(mut self, names: &[&str]) -> Self {
        for pair in names.windows(2) {
            self = self.arc(pair[0], pair[1]);
        }
        self
    }

    pub fn build(self) -> DirectedGraph<String, String> {
        self.graph
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `a -> b`, `a -> c`, `b -> d`, `c -> d`.
pub fn diamond() -> DirectedGraph<String, String> {
    GraphBuilder::new()
        .arc("a", "b")
        .arc("a", "c")
        .arc("b", "d")
        .arc("c", "d")
        .build()
}

/// Positions of every name in `order`, for "comes before" assertions.
pub fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
}
