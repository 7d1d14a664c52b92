//! Adjacency indices over the predecessor relation.
//!
//! The dependency graph and the parent/child hierarchy share the task-id
//! space but are kept as separate indices; this module only covers
//! dependencies (see `hierarchy` for containment).

use rustc_hash::FxHashMap;

use crate::models::Predecessor;

/// Borrowed edge lists keyed by task id in both directions.
pub struct DependencyGraph<'a> {
    /// task_id -> edges where the task is the dependent
    incoming: FxHashMap<&'a str, Vec<&'a Predecessor>>,
    /// task_id -> edges where the task is the predecessor
    outgoing: FxHashMap<&'a str, Vec<&'a Predecessor>>,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(edges: &'a [Predecessor]) -> Self {
        let mut incoming: FxHashMap<&str, Vec<&Predecessor>> =
            FxHashMap::with_capacity_and_hasher(edges.len(), Default::default());
        let mut outgoing: FxHashMap<&str, Vec<&Predecessor>> =
            FxHashMap::with_capacity_and_hasher(edges.len(), Default::default());
        for edge in edges {
            incoming.entry(edge.task_id.as_str()).or_default().push(edge);
            outgoing
                .entry(edge.predecessor_id.as_str())
                .or_default()
                .push(edge);
        }
        Self { incoming, outgoing }
    }

    /// Edges whose dependent is `task_id` (its predecessors).
    pub fn predecessors_of(&self, task_id: &str) -> &[&'a Predecessor] {
        self.incoming.get(task_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Edges whose predecessor is `task_id` (its dependents).
    pub fn dependents_of(&self, task_id: &str) -> &[&'a Predecessor] {
        self.outgoing.get(task_id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
