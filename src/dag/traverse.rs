// src/dag/traverse.rs

//! Depth-first traversals over a [`DirectedGraph`].
//!
//! All traversals use an explicit stack, so deep graphs cannot overflow the
//! call stack. Neighbours are pushed in reverse so that they are visited in
//! their original insertion order. Each call keeps its own visited set; a
//! node is handed to the visitor at most once per call.

use crate::dag::graph::{DirectedGraph, NodeId};
use crate::errors::Result;
use crate::types::Direction;

/// What a traversal visitor sees for each node.
#[derive(Debug)]
pub struct Visit<'g, N, A> {
    /// Name of the node being visited.
    pub name: &'g str,
    /// Payload of the node being visited.
    pub data: Option<&'g N>,
    /// Node this one was reached from; `None` for the start node.
    pub from: Option<&'g str>,
    /// Payload of the node this one was reached from.
    pub from_data: Option<&'g N>,
    /// Direction of the step that reached this node.
    pub direction: Direction,
    /// Payload of the arc connecting `from` and this node.
    pub arc: Option<&'g A>,
}

#[derive(Debug, Clone, Copy)]
struct Step {
    node: NodeId,
    from: Option<NodeId>,
    direction: Direction,
}

impl<N, A> DirectedGraph<N, A> {
    /// Visit everything reachable from `start` by following arcs forwards.
    ///
    /// The visitor returns whether the visited node's successors should be
    /// expanded.
    pub fn traverse_forward<F>(&self, start: &str, mut visitor: F) -> Result<()>
    where
        F: FnMut(&Visit<'_, N, A>) -> bool,
    {
        self.traverse(start, Direction::Forward, &mut visitor)
    }

    /// Visit everything reachable from `start` by following arcs backwards,
    /// i.e. `start` and its transitive dependencies.
    pub fn traverse_backward<F>(&self, start: &str, mut visitor: F) -> Result<()>
    where
        F: FnMut(&Visit<'_, N, A>) -> bool,
    {
        self.traverse(start, Direction::Backward, &mut visitor)
    }

    /// Visit the forward closure of `start`, then the full ancestry of every
    /// node reached forwards.
    ///
    /// This is the set of nodes relevant to re-running `start` and all of
    /// its descendants. One visited set spans the whole call, so a node shared
    /// between several ancestries is still visited once. Forward-reached nodes
    /// are always reported with [`Direction::Forward`].
    pub fn traverse_closure_forest<F>(&self, start: &str, mut visitor: F) -> Result<()>
    where
        F: FnMut(&Visit<'_, N, A>) -> bool,
    {
        let start = self.id_of(start)?;
        let mut visited = vec![false; self.slots.len()];
        let mut reached = Vec::new();

        let mut stack = vec![Step {
            node: start,
            from: None,
            direction: Direction::Forward,
        }];
        self.walk(&mut stack, &mut visited, &mut visitor, Some(&mut reached));

        for id in reached {
            self.push_neighbours(&mut stack, &visited, id, Direction::Backward);
            self.walk(&mut stack, &mut visited, &mut visitor, None);
        }

        Ok(())
    }

    fn traverse<F>(&self, start: &str, direction: Direction, visitor: &mut F) -> Result<()>
    where
        F: FnMut(&Visit<'_, N, A>) -> bool,
    {
        let start = self.id_of(start)?;
        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![Step {
            node: start,
            from: None,
            direction,
        }];
        self.walk(&mut stack, &mut visited, visitor, None);
        Ok(())
    }

    fn walk<F>(
        &self,
        stack: &mut Vec<Step>,
        visited: &mut [bool],
        visitor: &mut F,
        mut reached: Option<&mut Vec<NodeId>>,
    ) where
        F: FnMut(&Visit<'_, N, A>) -> bool,
    {
        while let Some(step) = stack.pop() {
            if visited[step.node] {
                continue;
            }
            visited[step.node] = true;
            if let Some(reached) = reached.as_deref_mut() {
                reached.push(step.node);
            }

            if visitor(&self.visit(step)) {
                self.push_neighbours(stack, visited, step.node, step.direction);
            }
        }
    }

    fn push_neighbours(
        &self,
        stack: &mut Vec<Step>,
        visited: &[bool],
        id: NodeId,
        direction: Direction,
    ) {
        let node = self.node(id);
        let neighbours = match direction {
            Direction::Forward => &node.succs,
            Direction::Backward => &node.preds,
        };
        for &next in neighbours.iter().rev() {
            if !visited[next] {
                stack.push(Step {
                    node: next,
                    from: Some(id),
                    direction,
                });
            }
        }
    }

    fn visit(&self, step: Step) -> Visit<'_, N, A> {
        let node = self.node(step.node);
        let from = step.from.map(|f| self.node(f));
        let arc = step.from.and_then(|f| {
            let key = match step.direction {
                Direction::Forward => (f, step.node),
                Direction::Backward => (step.node, f),
            };
            self.arcs.get(&key).and_then(|a| a.as_ref())
        });

        Visit {
            name: &node.name,
            data: node.data.as_ref(),
            from: from.map(|n| n.name.as_str()),
            from_data: from.and_then(|n| n.data.as_ref()),
            direction: step.direction,
            arc,
        }
    }
}
