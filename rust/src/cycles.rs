//! Cycle detection over the predecessor graph.
//!
//! Traversal follows task -> predecessor links with an explicit frame stack.
//! Each scan reports at most one cycle; its nodes are then excluded and the
//! scan repeats until the remaining graph is acyclic, so every disjoint
//! cycle is reported from one call.

use std::collections::HashSet;

use pyo3::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::DependencyGraph;
use crate::interner::{NodeId, NodeInterner};
use crate::models::{Predecessor, Task};
use crate::{log_changes, log_debug};

const UNVISITED: u8 = 0;
const ON_STACK: u8 = 1;
const DONE: u8 = 2;

/// A closed loop of dependencies.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Cycle {
    /// Task ids in dependency order; the first id is repeated at the end
    #[pyo3(get)]
    pub path: Vec<String>,
    /// Display names matching `path`
    #[pyo3(get)]
    pub path_names: Vec<String>,
    #[pyo3(get)]
    pub node_ids: HashSet<String>,
}

#[pymethods]
impl Cycle {
    /// Number of distinct tasks in the loop.
    fn __len__(&self) -> usize {
        self.node_ids.len()
    }

    fn __repr__(&self) -> String {
        format!("Cycle({})", self.path_names.join(" -> "))
    }
}

/// Result of a full project scan.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    #[pyo3(get)]
    pub has_cycle: bool,
    #[pyo3(get)]
    pub cycles: Vec<Cycle>,
}

/// task -> predecessor adjacency in dense ids.
struct PredecessorAdjacency {
    interner: NodeInterner,
    adjacency: Vec<Vec<NodeId>>,
}

impl PredecessorAdjacency {
    fn build(tasks: &[Task], edges: &[Predecessor]) -> Self {
        let mut interner = NodeInterner::from_ids(tasks.iter().map(|t| t.id.as_str()));

        // Endpoints that are not in the task list still participate
        let mut extras: Vec<&str> = edges
            .iter()
            .flat_map(|e| [e.task_id.as_str(), e.predecessor_id.as_str()])
            .filter(|id| interner.get(id).is_none())
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        extras.sort_unstable();
        for id in extras {
            interner.intern(id);
        }

        let mut adjacency = vec![Vec::new(); interner.len()];
        for edge in edges {
            if let (Some(from), Some(to)) =
                (interner.get(&edge.task_id), interner.get(&edge.predecessor_id))
            {
                adjacency[from as usize].push(to);
            }
        }

        Self {
            interner,
            adjacency,
        }
    }

    /// First cycle reachable from any non-excluded node, as a closed path in
    /// traversal order (dependent first).
    fn find_cycle(&self, excluded: &[bool]) -> Option<Vec<NodeId>> {
        let n = self.adjacency.len();
        let mut state = vec![UNVISITED; n];
        // (node, index of the next outgoing link to try)
        let mut stack: Vec<(NodeId, usize)> = Vec::new();

        for root in 0..n as NodeId {
            if excluded[root as usize] || state[root as usize] != UNVISITED {
                continue;
            }
            state[root as usize] = ON_STACK;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let links = &self.adjacency[node as usize];
                if frame.1 >= links.len() {
                    state[node as usize] = DONE;
                    stack.pop();
                    continue;
                }
                let next = links[frame.1];
                frame.1 += 1;

                if excluded[next as usize] {
                    continue;
                }
                match state[next as usize] {
                    UNVISITED => {
                        state[next as usize] = ON_STACK;
                        stack.push((next, 0));
                    }
                    ON_STACK => {
                        let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut path: Vec<NodeId> = stack[from..].iter().map(|(n, _)| *n).collect();
                        path.push(next);
                        return Some(path);
                    }
                    _ => {}
                }
            }
        }
        None
    }
}

/// Find every disjoint cycle in the project's predecessor graph.
pub fn detect_cycles(tasks: &[Task], edges: &[Predecessor], verbosity: u8) -> CycleReport {
    let graph = PredecessorAdjacency::build(tasks, edges);
    let names: FxHashMap<&str, &str> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();
    let mut excluded = vec![false; graph.adjacency.len()];
    let mut cycles = Vec::new();

    while let Some(mut nodes) = graph.find_cycle(&excluded) {
        for node in &nodes {
            excluded[*node as usize] = true;
        }
        // Traversal runs dependent -> predecessor; report predecessor first
        nodes.reverse();

        let path: Vec<String> = nodes
            .iter()
            .map(|n| graph.interner.resolve(*n).to_string())
            .collect();
        let path_names: Vec<String> = path
            .iter()
            .map(|id| names.get(id.as_str()).copied().unwrap_or(id.as_str()).to_string())
            .collect();
        let node_ids: HashSet<String> = path.iter().cloned().collect();

        log_changes!(verbosity, "Cycle detected: {}", path_names.join(" -> "));
        cycles.push(Cycle {
            path,
            path_names,
            node_ids,
        });
    }

    log_debug!(
        verbosity,
        "Cycle scan over {} nodes found {} cycle(s)",
        graph.adjacency.len(),
        cycles.len()
    );

    CycleReport {
        has_cycle: !cycles.is_empty(),
        cycles,
    }
}

/// Pre-commit guard: would `task_id` depending on `predecessor_id` close a loop?
pub fn would_create_cycle(task_id: &str, predecessor_id: &str, edges: &[Predecessor]) -> bool {
    if task_id == predecessor_id {
        return true;
    }

    // The new link closes a loop iff predecessor_id already depends on task_id
    let graph = DependencyGraph::new(edges);
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut stack: Vec<&str> = vec![predecessor_id];
    while let Some(node) = stack.pop() {
        if node == task_id {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        stack.extend(
            graph
                .predecessors_of(node)
                .iter()
                .map(|e| e.predecessor_id.as_str()),
        );
    }
    false
}

/// Every edge with both endpoints inside a cycle's node set. Candidates only;
/// removing any one of them may or may not break the loop.
pub fn suggest_edges_to_remove(
    node_ids: &HashSet<String>,
    edges: &[Predecessor],
) -> Vec<Predecessor> {
    edges
        .iter()
        .filter(|e| node_ids.contains(&e.task_id) && node_ids.contains(&e.predecessor_id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_task(id: &str) -> Task {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Task::new(id, "p", day, day).with_name(&format!("Task {}", id.to_uppercase()))
    }

    fn edge(task: &str, pred: &str) -> Predecessor {
        Predecessor::finish_to_start(&format!("{}<-{}", task, pred), task, pred)
    }

    fn ids(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_three_node_cycle() {
        let tasks = vec![make_task("a"), make_task("b"), make_task("c")];
        // A -> B -> C -> A
        let edges = vec![edge("b", "a"), edge("c", "b"), edge("a", "c")];
        let report = detect_cycles(&tasks, &edges, 0);

        assert!(report.has_cycle);
        assert_eq!(report.cycles.len(), 1);
        let cycle = &report.cycles[0];
        assert_eq!(cycle.path.len(), 4);
        assert_eq!(cycle.path.first(), cycle.path.last());
        assert_eq!(cycle.node_ids, ids(&["a", "b", "c"]));
        assert!(cycle.path_names.iter().all(|n| n.starts_with("Task ")));
    }

    #[test]
    fn test_path_follows_dependency_order() {
        let tasks = vec![make_task("a"), make_task("b")];
        let edges = vec![edge("b", "a"), edge("a", "b")];
        let report = detect_cycles(&tasks, &edges, 0);
        assert_eq!(report.cycles[0].path, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_acyclic_graph() {
        let tasks = vec![make_task("a"), make_task("b"), make_task("c"), make_task("d")];
        // Diamond
        let edges = vec![edge("b", "a"), edge("c", "a"), edge("d", "b"), edge("d", "c")];
        let report = detect_cycles(&tasks, &edges, 0);
        assert!(!report.has_cycle);
        assert!(report.cycles.is_empty());
    }

    #[test]
    fn test_finds_all_disjoint_cycles() {
        let tasks: Vec<Task> = ["a", "b", "c", "x", "y"].iter().map(|id| make_task(id)).collect();
        let edges = vec![
            edge("b", "a"),
            edge("a", "b"),
            edge("y", "x"),
            edge("x", "y"),
            edge("c", "b"),
        ];
        let report = detect_cycles(&tasks, &edges, 0);
        assert_eq!(report.cycles.len(), 2);
        assert_eq!(report.cycles[0].node_ids, ids(&["a", "b"]));
        assert_eq!(report.cycles[1].node_ids, ids(&["x", "y"]));
    }

    #[test]
    fn test_self_loop_is_cycle_of_one() {
        let tasks = vec![make_task("a")];
        let report = detect_cycles(&tasks, &[edge("a", "a")], 0);
        assert!(report.has_cycle);
        assert_eq!(report.cycles[0].path, vec!["a", "a"]);
    }

    #[test]
    fn test_endpoints_outside_task_list() {
        let tasks = vec![make_task("a")];
        let edges = vec![edge("a", "ghost"), edge("ghost", "a")];
        let report = detect_cycles(&tasks, &edges, 0);
        assert_eq!(report.cycles.len(), 1);
        // Unknown ids fall back to the id as display name
        assert!(report.cycles[0].path_names.contains(&"ghost".to_string()));
    }

    #[test]
    fn test_would_create_cycle() {
        let edges = vec![edge("b", "a"), edge("c", "b")];
        assert!(would_create_cycle("a", "a", &[]));
        // a depending on c closes a -> b -> c -> a
        assert!(would_create_cycle("a", "c", &edges));
        assert!(!would_create_cycle("c", "a", &edges));
        assert!(!would_create_cycle("d", "c", &edges));
    }

    #[test]
    fn test_suggest_edges_inside_cycle_only() {
        let edges = vec![edge("b", "a"), edge("a", "b"), edge("c", "b")];
        let suggestions = suggest_edges_to_remove(&ids(&["a", "b"]), &edges);
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions.iter().all(|e| e.task_id != "c"));
    }
}
