// src/dag/mod.rs

//! Generic directed graph.
//!
//! - [`graph`] holds the arena-backed [`DirectedGraph`] with mutation,
//!   adjacency queries, topological ordering and reversal.
//! - [`traverse`] adds explicit-stack depth-first traversals with a
//!   pluggable visitor.

pub mod graph;
pub mod traverse;

pub use crate::types::Direction;
pub use graph::{DirectedGraph, NodeId};
pub use traverse::Visit;
