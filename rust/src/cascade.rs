//! Predecessor cascade: propagate one task's date change to its dependents.
//!
//! The region reachable from the changed task is collected first and then
//! evaluated in topological order over a working copy of the snapshot, so a
//! task is checked against all of its incoming links only after every
//! predecessor in the region has settled. Each node is evaluated once; nodes
//! left on a cycle are evaluated in discovery order, which bounds the run.
//! Updates are returned, never applied; callers confirm and persist them.

use std::collections::VecDeque;

use chrono::NaiveDate;
use pyo3::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::duration::minutes_to_whole_days;
use crate::graph::DependencyGraph;
use crate::hierarchy::{shift_days, HierarchyIndex, TaskDates};
use crate::models::{DependencyType, Predecessor, Task};
use crate::{log_changes, log_checks, log_debug};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CascadeError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

/// Why a task's dates moved.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    /// A predecessor link pushed the task later
    Dependency,
    /// A summary was pushed and the move was applied to its leaves
    ParentShift,
    /// A summary re-derived from its children
    SummaryRollup,
}

/// A proposed, not yet applied, date change.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct DateUpdate {
    #[pyo3(get)]
    pub task_id: String,
    #[pyo3(get)]
    pub new_start: NaiveDate,
    #[pyo3(get)]
    pub new_end: NaiveDate,
    /// Only set for summary rollups
    #[pyo3(get)]
    pub new_duration_minutes: Option<i64>,
    #[pyo3(get)]
    pub reason: String,
    #[pyo3(get)]
    pub kind: UpdateKind,
}

#[pymethods]
impl DateUpdate {
    fn __repr__(&self) -> String {
        format!(
            "DateUpdate({}: {} .. {}, {})",
            self.task_id, self.new_start, self.new_end, self.reason
        )
    }
}

#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CascadeResult {
    #[pyo3(get)]
    pub updates: Vec<DateUpdate>,
    /// Summary tasks whose link conflict was a false positive (their children
    /// already start late enough)
    #[pyo3(get)]
    pub suppressed: Vec<String>,
}

impl CascadeResult {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Propagate a change to `changed_task_id`. The snapshot must already carry
/// the task's new dates.
pub fn calculate_cascade(
    changed_task_id: &str,
    tasks: &[Task],
    edges: &[Predecessor],
    verbosity: u8,
) -> Result<CascadeResult, CascadeError> {
    let mut cascade = Cascade::new(tasks, edges, verbosity);
    let seed = cascade.resolve(changed_task_id)?;
    let origin = if cascade.hierarchy.is_summary(seed) {
        Node::Rollup(seed)
    } else {
        Node::Task(seed)
    };
    cascade.moved.insert(seed);
    cascade.run(origin, false);
    Ok(cascade.finish())
}

/// Propagate after a link's type or lag was edited. `edges` must contain the
/// edited link.
pub fn calculate_cascade_for_edge(
    edge: &Predecessor,
    tasks: &[Task],
    edges: &[Predecessor],
    verbosity: u8,
) -> Result<CascadeResult, CascadeError> {
    let mut cascade = Cascade::new(tasks, edges, verbosity);
    cascade.resolve(&edge.predecessor_id)?;
    let target = cascade.resolve(&edge.task_id)?;

    if edge.dependency_type.is_supported() {
        let origin = cascade.entry_node(target);
        cascade.run(origin, true);
    } else {
        log_checks!(verbosity, "Skipping {} link {}: no cascade rule", edge.dependency_type, edge.id);
    }
    Ok(cascade.finish())
}

/// Write updates into a task list.
pub fn apply_updates(tasks: &mut [Task], updates: &[DateUpdate]) {
    let by_id: FxHashMap<&str, &DateUpdate> =
        updates.iter().map(|u| (u.task_id.as_str(), u)).collect();
    for task in tasks.iter_mut() {
        if let Some(update) = by_id.get(task.id.as_str()) {
            task.start_date = Some(update.new_start);
            task.end_date = Some(update.new_end);
            if let Some(minutes) = update.new_duration_minutes {
                task.duration_minutes = minutes;
            }
        }
    }
}

/// Evaluation step in the cascade order. A summary is split in two: its own
/// incoming links (which shift its leaves) and its rollup (which its
/// outgoing links read), so containment adds no cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Node<'a> {
    /// Leaf task checked against its incoming links
    Task(&'a str),
    /// Summary checked against its incoming links
    Links(&'a str),
    /// Summary re-derived from its children
    Rollup(&'a str),
}

struct Cascade<'a> {
    verbosity: u8,
    hierarchy: HierarchyIndex<'a>,
    graph: DependencyGraph<'a>,
    working: FxHashMap<&'a str, TaskDates>,
    /// Tasks whose working dates differ from the snapshot (plus the seed)
    moved: FxHashSet<&'a str>,
    /// Nodes with at least one changed upstream node
    touched: FxHashSet<Node<'a>>,
    updates: Vec<DateUpdate>,
    positions: FxHashMap<&'a str, usize>,
    suppressed: Vec<String>,
}

impl<'a> Cascade<'a> {
    fn new(tasks: &'a [Task], edges: &'a [Predecessor], verbosity: u8) -> Self {
        Self {
            verbosity,
            hierarchy: HierarchyIndex::new(tasks),
            graph: DependencyGraph::new(edges),
            working: tasks
                .iter()
                .map(|t| (t.id.as_str(), TaskDates::from(t)))
                .collect(),
            moved: FxHashSet::default(),
            touched: FxHashSet::default(),
            updates: Vec::new(),
            positions: FxHashMap::default(),
            suppressed: Vec::new(),
        }
    }

    fn resolve(&self, id: &str) -> Result<&'a str, CascadeError> {
        self.hierarchy
            .task(id)
            .map(|t| t.id.as_str())
            .ok_or_else(|| CascadeError::TaskNotFound(id.to_string()))
    }

    fn name_of(&self, id: &str) -> String {
        self.hierarchy
            .task(id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Node that evaluates the links pointing at `id`.
    fn entry_node(&self, id: &'a str) -> Node<'a> {
        if self.hierarchy.is_summary(id) {
            Node::Links(id)
        } else {
            Node::Task(id)
        }
    }

    fn successors(&self, node: Node<'a>) -> Vec<Node<'a>> {
        let mut next = Vec::new();
        match node {
            Node::Task(id) | Node::Rollup(id) => {
                for edge in self.graph.dependents_of(id) {
                    if edge.dependency_type.is_supported() {
                        if let Some(target) = self.hierarchy.task(&edge.task_id) {
                            next.push(self.entry_node(target.id.as_str()));
                        }
                    } else {
                        log_checks!(
                            self.verbosity,
                            "Skipping {} link {}: no cascade rule",
                            edge.dependency_type,
                            edge.id
                        );
                    }
                }
                if let Some(parent) = self.hierarchy.parent_of(id) {
                    next.push(Node::Rollup(parent));
                }
            }
            Node::Links(id) => {
                next.extend(self.hierarchy.leaf_descendants(id).into_iter().map(Node::Task));
            }
        }
        next
    }

    /// Evaluate every node reachable from `origin` in topological order.
    /// The origin itself is only evaluated when `evaluate_origin` is set.
    fn run(&mut self, origin: Node<'a>, evaluate_origin: bool) {
        let mut order: Vec<Node<'a>> = vec![origin];
        let mut discovered: FxHashSet<Node<'a>> = FxHashSet::from_iter([origin]);
        let mut adjacency: FxHashMap<Node<'a>, Vec<Node<'a>>> = FxHashMap::default();
        let mut cursor = 0;
        while cursor < order.len() {
            let node = order[cursor];
            cursor += 1;
            let next = self.successors(node);
            for &succ in &next {
                if discovered.insert(succ) {
                    order.push(succ);
                }
            }
            adjacency.insert(node, next);
        }

        let mut indegree: FxHashMap<Node<'a>, usize> = FxHashMap::default();
        for succs in adjacency.values() {
            for &succ in succs {
                *indegree.entry(succ).or_default() += 1;
            }
        }

        let mut done: FxHashSet<Node<'a>> = FxHashSet::default();
        let mut ready: VecDeque<Node<'a>> = VecDeque::from([origin]);
        let mut fallback = order.iter();
        loop {
            let node = match ready.pop_front() {
                Some(node) => node,
                // Remaining nodes sit on a cycle
                None => match fallback.by_ref().find(|n| !done.contains(*n)) {
                    Some(&node) => {
                        log_debug!(self.verbosity, "{:?} is on a cycle; evaluating out of order", node);
                        node
                    }
                    None => break,
                },
            };
            if !done.insert(node) {
                continue;
            }

            let changed = if node == origin && !evaluate_origin {
                true
            } else if node == origin || self.touched.contains(&node) {
                self.process(node)
            } else {
                false
            };

            for &succ in adjacency.get(&node).map(|v| v.as_slice()).unwrap_or(&[]) {
                if changed {
                    self.touched.insert(succ);
                }
                if let Some(count) = indegree.get_mut(&succ) {
                    *count = count.saturating_sub(1);
                    if *count == 0 && !done.contains(&succ) {
                        ready.push_back(succ);
                    }
                }
            }
        }
    }

    /// Returns whether the node changed something its successors read.
    fn process(&mut self, node: Node<'a>) -> bool {
        match node {
            Node::Task(id) => {
                self.evaluate_task(id);
                self.moved.contains(id)
            }
            Node::Links(id) => self.evaluate_summary(id),
            Node::Rollup(id) => self.rollup(id),
        }
    }

    /// Latest start demanded by the target's incoming links, with the link
    /// that demands it.
    fn required_start(
        &self,
        target: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<(NaiveDate, &'a Predecessor)> {
        let span = (end - start).num_days();
        let mut best: Option<(NaiveDate, &'a Predecessor)> = None;

        for &edge in self.graph.predecessors_of(target) {
            let Some(pred) = self.working.get(edge.predecessor_id.as_str()) else {
                continue;
            };
            let (Some(pred_start), Some(pred_end)) = (pred.start, pred.end) else {
                continue;
            };
            let lag = minutes_to_whole_days(edge.lag_minutes);
            let candidate = match edge.dependency_type {
                DependencyType::FinishToStart => shift_days(pred_end, 1 + lag),
                DependencyType::StartToStart => shift_days(pred_start, lag),
                DependencyType::FinishToFinish => shift_days(pred_end, lag - span),
                DependencyType::StartToFinish => continue,
            };
            if best.map_or(true, |(current, _)| candidate > current) {
                best = Some((candidate, edge));
            }
        }
        best
    }

    fn describe(&self, edge: &Predecessor) -> String {
        let lag = minutes_to_whole_days(edge.lag_minutes);
        let lag_text = match lag {
            0 => String::new(),
            l if l > 0 => format!(" +{}d", l),
            l => format!(" {}d", l),
        };
        format!(
            "{} on '{}'{}",
            edge.dependency_type,
            self.name_of(&edge.predecessor_id),
            lag_text
        )
    }

    fn dated(&self, id: &str) -> Option<(NaiveDate, NaiveDate)> {
        let current = self.working.get(id)?;
        match (current.start, current.end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => {
                log_checks!(self.verbosity, "{} has no dates; not cascaded", id);
                None
            }
        }
    }

    fn evaluate_task(&mut self, target: &'a str) {
        let Some((start, end)) = self.dated(target) else {
            return;
        };
        let Some((required, edge)) = self.required_start(target, start, end) else {
            return;
        };
        if required <= start {
            log_checks!(self.verbosity, "{} satisfies its links (start {})", target, start);
            return;
        }
        let reason = self.describe(edge);
        self.shift(target, (required - start).num_days(), reason, UpdateKind::Dependency);
    }

    /// Returns whether any leaf was shifted.
    fn evaluate_summary(&mut self, target: &'a str) -> bool {
        let Some((start, end)) = self.dated(target) else {
            return false;
        };
        let Some((required, edge)) = self.required_start(target, start, end) else {
            return false;
        };

        let leaves = self.hierarchy.leaf_descendants(target);
        let earliest = leaves
            .iter()
            .filter_map(|leaf| self.working.get(leaf).and_then(|d| d.start))
            .min();
        let Some(earliest) = earliest else {
            return false;
        };

        if required <= earliest {
            log_checks!(
                self.verbosity,
                "Suppressed conflict on summary {}: children start {} >= required {}",
                target,
                earliest,
                required
            );
            self.suppressed.push(target.to_string());
            return false;
        }

        let delta = (required - earliest).num_days();
        let reason = format!("{} (via summary '{}')", self.describe(edge), self.name_of(target));
        let mut shifted = false;
        for leaf in leaves {
            if self.dated(leaf).is_some() {
                self.shift(leaf, delta, reason.clone(), UpdateKind::ParentShift);
                shifted = true;
            }
        }
        shifted
    }

    fn shift(&mut self, id: &'a str, delta: i64, reason: String, kind: UpdateKind) {
        let Some(current) = self.working.get(id).copied() else {
            return;
        };
        let (Some(start), Some(end)) = (current.start, current.end) else {
            return;
        };
        let new_start = shift_days(start, delta);
        let new_end = shift_days(end, delta);
        self.working.insert(
            id,
            TaskDates {
                start: Some(new_start),
                end: Some(new_end),
                duration_minutes: current.duration_minutes,
            },
        );

        log_changes!(
            self.verbosity,
            "{}: {}..{} -> {}..{} ({})",
            id,
            start,
            end,
            new_start,
            new_end,
            reason
        );
        self.moved.insert(id);
        self.record(DateUpdate {
            task_id: id.to_string(),
            new_start,
            new_end,
            new_duration_minutes: None,
            reason,
            kind,
        });
    }

    /// Re-derive a summary from the working dates of its children. Returns
    /// whether its dates changed.
    fn rollup(&mut self, id: &'a str) -> bool {
        let Some(derived) = self.hierarchy.derive(id, &self.working) else {
            return false;
        };
        let (Some(new_start), Some(new_end)) = (derived.start, derived.end) else {
            return false;
        };
        if self.working.get(id) == Some(&derived) {
            return false;
        }
        self.working.insert(id, derived);

        log_changes!(
            self.verbosity,
            "Summary {} rolled up to {}..{}",
            id,
            new_start,
            new_end
        );
        self.moved.insert(id);
        self.record(DateUpdate {
            task_id: id.to_string(),
            new_start,
            new_end,
            new_duration_minutes: Some(derived.duration_minutes),
            reason: "Rolled up from subtasks".to_string(),
            kind: UpdateKind::SummaryRollup,
        });
        true
    }

    /// Keep one entry per task; a later update overwrites the earlier one.
    fn record(&mut self, update: DateUpdate) {
        let key = match self.hierarchy.task(&update.task_id) {
            Some(task) => task.id.as_str(),
            None => return,
        };
        match self.positions.get(key) {
            Some(&pos) => self.updates[pos] = update,
            None => {
                self.positions.insert(key, self.updates.len());
                self.updates.push(update);
            }
        }
    }

    fn finish(self) -> CascadeResult {
        CascadeResult {
            updates: self.updates,
            suppressed: self.suppressed,
        }
    }
}
