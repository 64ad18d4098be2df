// src/dag/graph.rs

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::errors::{DeploydagError, Result};

/// Dense index of a node slot inside a [`DirectedGraph`].
pub type NodeId = usize;

/// Internal node structure: payload plus ordered adjacency.
#[derive(Debug, Clone)]
pub(crate) struct Node<N> {
    pub(crate) name: String,
    pub(crate) data: Option<N>,
    /// Sources of arcs pointing at this node, in insertion order.
    pub(crate) preds: Vec<NodeId>,
    /// Destinations of arcs leaving this node, in insertion order.
    pub(crate) succs: Vec<NodeId>,
}

/// Generic directed graph keyed by node name.
///
/// Nodes live in an arena of slots addressed by [`NodeId`]; names are only
/// resolved at the API boundary. Node payloads are optional so that arcs may
/// reference nodes that have not been declared yet: such endpoints are created
/// with no payload and can be filled in later with [`upsert_node`].
///
/// The graph is a plain data structure with no interior locking. Build it
/// up front, then share it read-only.
///
/// [`upsert_node`]: DirectedGraph::upsert_node
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, A = ()> {
    pub(crate) slots: Vec<Option<Node<N>>>,
    free: Vec<NodeId>,
    index: HashMap<String, NodeId>,
    pub(crate) arcs: HashMap<(NodeId, NodeId), Option<A>>,
}

impl<N, A> Default for DirectedGraph<N, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, A> DirectedGraph<N, A> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            arcs: HashMap::new(),
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of distinct arcs.
    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Node names in slot order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|n| n.name.as_str()))
    }

    /// Payload of a node; `None` if the node is unknown or has no payload.
    pub fn node_data(&self, name: &str) -> Option<&N> {
        let id = *self.index.get(name)?;
        self.node(id).data.as_ref()
    }

    pub fn node_data_mut(&mut self, name: &str) -> Option<&mut N> {
        let id = *self.index.get(name)?;
        self.node_mut(id).data.as_mut()
    }

    /// Whether an arc `from -> to` exists.
    pub fn has_arc(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&f), Some(&t)) => self.arcs.contains_key(&(f, t)),
            _ => false,
        }
    }

    /// Payload of the arc `from -> to`, if the arc exists and carries one.
    pub fn arc_data(&self, from: &str, to: &str) -> Option<&A> {
        let f = *self.index.get(from)?;
        let t = *self.index.get(to)?;
        self.arcs.get(&(f, t))?.as_ref()
    }

    /// Create a node, or replace the payload of an existing one.
    ///
    /// Adjacency of an existing node is left untouched.
    pub fn upsert_node(&mut self, name: &str, data: N) {
        let id = self.ensure_node(name);
        self.node_mut(id).data = Some(data);
    }

    /// Add the arc `from -> to`, creating missing endpoints without payload.
    ///
    /// Adding the same arc twice keeps a single logical edge; the payload of
    /// the last call wins.
    pub fn add_arc(&mut self, from: &str, to: &str, data: Option<A>) {
        let f = self.ensure_node(from);
        let t = self.ensure_node(to);

        if !self.node(f).succs.contains(&t) {
            self.node_mut(f).succs.push(t);
        }
        if !self.node(t).preds.contains(&f) {
            self.node_mut(t).preds.push(f);
        }
        self.arcs.insert((f, t), data);
    }

    /// Remove a node together with every arc touching it.
    ///
    /// Returns the removed payload. Unknown names are a no-op.
    pub fn remove_node(&mut self, name: &str) -> Option<N> {
        let id = self.index.remove(name)?;
        let node = self.slots[id].take()?;

        for &p in &node.preds {
            if let Some(pred) = self.slots[p].as_mut() {
                pred.succs.retain(|&s| s != id);
            }
            self.arcs.remove(&(p, id));
        }
        for &s in &node.succs {
            if let Some(succ) = self.slots[s].as_mut() {
                succ.preds.retain(|&p| p != id);
            }
            self.arcs.remove(&(id, s));
        }

        self.free.push(id);
        debug!(node = %name, "removed node from graph");
        node.data
    }

    /// Remove the arc `from -> to`. No-op if either endpoint is unknown.
    pub fn remove_arc(&mut self, from: &str, to: &str) {
        let (Some(&f), Some(&t)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        self.node_mut(f).succs.retain(|&s| s != t);
        self.node_mut(t).preds.retain(|&p| p != f);
        self.arcs.remove(&(f, t));
    }

    /// Direct predecessors (sources of incoming arcs), in insertion order.
    pub fn predecessors(&self, name: &str) -> Result<Vec<&str>> {
        let id = self.id_of(name)?;
        Ok(self.names(&self.node(id).preds))
    }

    /// Direct successors (destinations of outgoing arcs), in insertion order.
    pub fn successors(&self, name: &str) -> Result<Vec<&str>> {
        let id = self.id_of(name)?;
        Ok(self.names(&self.node(id).succs))
    }

    /// A linear order of all nodes such that every arc's source comes before
    /// its destination.
    ///
    /// Ties between nodes that become ready together are broken in slot
    /// order. On a cycle, the error lists every node that could not be
    /// placed.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut remaining: Vec<usize> = self
            .slots
            .iter()
            .map(|slot| slot.as_ref().map_or(0, |n| n.preds.len()))
            .collect();

        let mut ready: VecDeque<NodeId> = self
            .live_ids()
            .filter(|&id| remaining[id] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(id) = ready.pop_front() {
            let node = self.node(id);
            order.push(node.name.clone());
            for &s in &node.succs {
                remaining[s] -= 1;
                if remaining[s] == 0 {
                    ready.push_back(s);
                }
            }
        }

        if order.len() < self.len() {
            let outstanding: Vec<String> = self
                .live_ids()
                .filter(|&id| remaining[id] > 0)
                .map(|id| self.node(id).name.clone())
                .collect();
            debug!(?outstanding, "topological sort found a cycle");
            return Err(DeploydagError::DagCycle { outstanding });
        }

        Ok(order)
    }

    /// A new graph with every arc flipped.
    ///
    /// Node payloads are cloned; arc payloads are not carried over and every
    /// reversed arc has no payload.
    pub fn reverse(&self) -> DirectedGraph<N, A>
    where
        N: Clone,
    {
        let mut reversed = DirectedGraph::new();
        for node in self.slots.iter().flatten() {
            let id = reversed.ensure_node(&node.name);
            reversed.node_mut(id).data = node.data.clone();
        }
        for node in self.slots.iter().flatten() {
            for &s in &node.succs {
                reversed.add_arc(&self.node(s).name, &node.name, None);
            }
        }
        reversed
    }

    pub(crate) fn id_of(&self, name: &str) -> Result<NodeId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| DeploydagError::NodeNotFound(name.to_string()))
    }

    /// Panics on a vacant slot; ids handed out by the index are always live.
    pub(crate) fn node(&self, id: NodeId) -> &Node<N> {
        self.slots[id]
            .as_ref()
            .unwrap_or_else(|| panic!("node slot {id} is vacant"))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<N> {
        self.slots[id]
            .as_mut()
            .unwrap_or_else(|| panic!("node slot {id} is vacant"))
    }

    fn live_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }

    fn names(&self, ids: &[NodeId]) -> Vec<&str> {
        ids.iter().map(|&id| self.node(id).name.as_str()).collect()
    }

    fn ensure_node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }

        let node = Node {
            name: name.to_string(),
            data: None,
            preds: Vec::new(),
            succs: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(name.to_string(), id);
        id
    }
}
