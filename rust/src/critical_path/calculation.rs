//! Critical path calculation using forward and backward passes.

use std::collections::{HashMap, VecDeque};

use rustc_hash::FxHashMap;

use crate::hierarchy::HierarchyIndex;
use crate::interner::{NodeId, NodeInterner};
use crate::models::{DependencyType, Predecessor, Task};
use crate::{log_changes, log_checks, log_debug};

use super::types::{CpmError, CpmResult, TaskTiming};

/// A supported link between two leaf tasks, in interned ids.
#[derive(Clone, Copy, Debug)]
struct Link {
    from: NodeId,
    to: NodeId,
    kind: DependencyType,
    lag: i64,
}

/// Leaf tasks of one project with their links, indexed by `NodeId`.
/// Ids are assigned in (sort_order, id) order so ties resolve the same way
/// on every run.
struct ProjectGraph<'a> {
    index: NodeInterner,
    tasks: Vec<&'a Task>,
    incoming: Vec<Vec<Link>>,
    outgoing: Vec<Vec<Link>>,
}

impl<'a> ProjectGraph<'a> {
    /// Links touching a summary are expanded to its leaf descendants: a link
    /// out of a summary leaves from each of its leaves, a link into one
    /// reaches each of its leaves.
    fn build(
        leaves: Vec<&'a Task>,
        edges: &[Predecessor],
        hierarchy: &HierarchyIndex<'_>,
        verbosity: u8,
    ) -> Self {
        let mut tasks = leaves;
        tasks.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
        let index = NodeInterner::from_ids(tasks.iter().map(|t| t.id.as_str()));

        let n = tasks.len();
        let mut incoming: Vec<Vec<Link>> = vec![Vec::new(); n];
        let mut outgoing: Vec<Vec<Link>> = vec![Vec::new(); n];

        let endpoints = |id: &str| -> Vec<NodeId> {
            match index.get(id) {
                Some(node) => vec![node],
                None if hierarchy.is_summary(id) => hierarchy
                    .leaf_descendants(id)
                    .iter()
                    .filter_map(|leaf| index.get(leaf))
                    .collect(),
                None => Vec::new(),
            }
        };

        for edge in edges {
            if !edge.dependency_type.is_supported() {
                log_checks!(
                    verbosity,
                    "CPM ignores {} link {} ({} -> {})",
                    edge.dependency_type,
                    edge.id,
                    edge.predecessor_id,
                    edge.task_id
                );
                continue;
            }
            let sources = endpoints(&edge.predecessor_id);
            let targets = endpoints(&edge.task_id);
            if sources.is_empty() || targets.is_empty() {
                log_debug!(
                    verbosity,
                    "CPM skips link {}: {} -> {} has no leaf task in this project",
                    edge.id,
                    edge.predecessor_id,
                    edge.task_id
                );
                continue;
            }
            for &from in &sources {
                for &to in &targets {
                    if from == to {
                        log_checks!(
                            verbosity,
                            "CPM skips link {} between {} and its own summary",
                            edge.id,
                            index.resolve(from)
                        );
                        continue;
                    }
                    let link = Link {
                        from,
                        to,
                        kind: edge.dependency_type,
                        lag: edge.lag_minutes,
                    };
                    incoming[to as usize].push(link);
                    outgoing[from as usize].push(link);
                }
            }
        }

        Self {
            index,
            tasks,
            incoming,
            outgoing,
        }
    }

    fn duration(&self, node: NodeId) -> i64 {
        self.tasks[node as usize].duration_minutes.max(0)
    }

    /// Kahn's algorithm; sources are seeded in id order so every disconnected
    /// chain starts at zero.
    fn topological_order(&self) -> Result<Vec<NodeId>, CpmError> {
        let n = self.tasks.len();
        let mut in_degree: Vec<usize> = self.incoming.iter().map(|links| links.len()).collect();
        let mut queue: VecDeque<NodeId> = (0..n as NodeId)
            .filter(|&node| in_degree[node as usize] == 0)
            .collect();
        let mut order: Vec<NodeId> = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for link in &self.outgoing[node as usize] {
                let next = link.to as usize;
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(link.to);
                }
            }
        }

        if order.len() != n {
            let mut stuck: Vec<String> = (0..n as NodeId)
                .filter(|&node| in_degree[node as usize] > 0)
                .map(|node| self.index.resolve(node).to_string())
                .collect();
            stuck.sort();
            return Err(CpmError::CircularDependency(stuck));
        }

        Ok(order)
    }
}

/// Compute CPM timings for the leaf tasks of `project_id`.
///
/// Summary tasks are not scheduled themselves; a summary is flagged critical
/// when any of its leaf descendants is. Start-to-finish links are ignored.
pub fn calculate_critical_path(
    project_id: &str,
    tasks: &[Task],
    edges: &[Predecessor],
    verbosity: u8,
) -> Result<CpmResult, CpmError> {
    let hierarchy = HierarchyIndex::new(tasks);
    let project_tasks: Vec<&Task> = tasks.iter().filter(|t| t.project_id == project_id).collect();
    let leaves: Vec<&Task> = project_tasks
        .iter()
        .copied()
        .filter(|t| !hierarchy.is_summary(&t.id))
        .collect();

    let graph = ProjectGraph::build(leaves, edges, &hierarchy, verbosity);
    if graph.index.is_empty() {
        log_checks!(verbosity, "Project {} has no leaf tasks; nothing to schedule", project_id);
        return Ok(CpmResult::default());
    }
    let order = graph.topological_order()?;
    let n = graph.tasks.len();

    // Forward pass: earliest start/finish
    let mut timings: Vec<TaskTiming> = vec![TaskTiming::default(); n];
    for &node in &order {
        let duration = graph.duration(node);
        let mut earliest_start = 0;
        for link in &graph.incoming[node as usize] {
            let pred = &timings[link.from as usize];
            let required = match link.kind {
                DependencyType::FinishToStart => pred.earliest_finish + link.lag,
                DependencyType::StartToStart => pred.earliest_start + link.lag,
                DependencyType::FinishToFinish => pred.earliest_finish + link.lag - duration,
                DependencyType::StartToFinish => continue,
            };
            earliest_start = earliest_start.max(required);
        }
        let timing = &mut timings[node as usize];
        timing.earliest_start = earliest_start;
        timing.earliest_finish = earliest_start + duration;
    }

    let project_duration = timings.iter().map(|t| t.earliest_finish).max().unwrap_or(0);

    // Backward pass: latest start/finish, sinks anchored at project duration
    for &node in order.iter().rev() {
        let duration = graph.duration(node);
        let mut latest_finish = project_duration;
        for link in &graph.outgoing[node as usize] {
            let succ = &timings[link.to as usize];
            let allowed = match link.kind {
                DependencyType::FinishToStart => succ.latest_start - link.lag,
                DependencyType::StartToStart => succ.latest_start - link.lag + duration,
                DependencyType::FinishToFinish => succ.latest_finish - link.lag,
                DependencyType::StartToFinish => continue,
            };
            latest_finish = latest_finish.min(allowed);
        }
        let timing = &mut timings[node as usize];
        timing.latest_finish = latest_finish;
        timing.latest_start = latest_finish - duration;
        timing.slack = timing.latest_start - timing.earliest_start;

        log_debug!(
            verbosity,
            "{}: es={} ef={} ls={} lf={} slack={}",
            graph.index.resolve(node),
            timing.earliest_start,
            timing.earliest_finish,
            timing.latest_start,
            timing.latest_finish,
            timing.slack
        );
    }

    // Critical path: zero slack, ordered by earliest start then sort order
    let mut critical_nodes: Vec<NodeId> = (0..n as NodeId)
        .filter(|&node| timings[node as usize].is_critical())
        .collect();
    critical_nodes.sort_by_key(|&node| (timings[node as usize].earliest_start, node));
    let critical_path: Vec<String> = critical_nodes
        .iter()
        .map(|&node| graph.index.resolve(node).to_string())
        .collect();

    let mut critical_flags: FxHashMap<&str, bool> = (0..n as NodeId)
        .map(|node| (graph.index.resolve(node), timings[node as usize].is_critical()))
        .collect();
    for task in &project_tasks {
        if hierarchy.is_summary(&task.id) {
            let any_critical = hierarchy
                .leaf_descendants(&task.id)
                .iter()
                .any(|leaf| critical_flags.get(leaf).copied().unwrap_or(false));
            critical_flags.insert(task.id.as_str(), any_critical);
        }
    }

    for task in &project_tasks {
        if let Some(&flag) = critical_flags.get(task.id.as_str()) {
            if flag != task.is_critical_path {
                log_changes!(verbosity, "{} critical: {} -> {}", task.id, task.is_critical_path, flag);
            }
        }
    }

    Ok(CpmResult {
        timings: (0..n as NodeId)
            .map(|node| (graph.index.resolve(node).to_string(), timings[node as usize]))
            .collect::<HashMap<_, _>>(),
        project_duration_minutes: project_duration,
        critical_path,
        critical_flags: critical_flags
            .into_iter()
            .map(|(id, flag)| (id.to_string(), flag))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::MINUTES_PER_DAY as DAY;
    use chrono::NaiveDate;

    fn make_task(id: &str, days: i64) -> Task {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Task::new(id, "p", start, start).with_duration_minutes(days * DAY)
    }

    fn fs(task: &str, pred: &str) -> Predecessor {
        Predecessor::finish_to_start(&format!("{}-{}", pred, task), task, pred)
    }

    fn link(task: &str, pred: &str, kind: DependencyType, lag_days: i64) -> Predecessor {
        Predecessor::new(&format!("{}-{}", pred, task), task, pred, kind, lag_days * DAY)
    }

    fn run(tasks: &[Task], edges: &[Predecessor]) -> CpmResult {
        calculate_critical_path("p", tasks, edges, 0).unwrap()
    }

    #[test]
    fn test_single_task_critical_path() {
        let result = run(&[make_task("a", 5)], &[]);
        assert_eq!(result.project_duration_minutes, 5 * DAY);
        assert_eq!(result.critical_path, vec!["a"]);
    }

    #[test]
    fn test_chain_critical_path() {
        // a -> b -> c (all on critical path)
        let tasks = vec![make_task("a", 2), make_task("b", 3), make_task("c", 4)];
        let result = run(&tasks, &[fs("b", "a"), fs("c", "b")]);

        assert_eq!(result.project_duration_minutes, 9 * DAY);
        assert_eq!(result.critical_path, vec!["a", "b", "c"]);
        let c = result.timings["c"];
        assert_eq!(c.earliest_start, 5 * DAY);
        assert_eq!(c.latest_finish, 9 * DAY);
    }

    #[test]
    fn test_diamond_dependency() {
        // Path via b: 2 + 3 + 1 = 6, via c: 2 + 5 + 1 = 8 (critical)
        let tasks = vec![
            make_task("a", 2),
            make_task("b", 3),
            make_task("c", 5),
            make_task("d", 1),
        ];
        let edges = vec![fs("b", "a"), fs("c", "a"), fs("d", "b"), fs("d", "c")];
        let result = run(&tasks, &edges);

        assert_eq!(result.project_duration_minutes, 8 * DAY);
        assert_eq!(result.critical_path, vec!["a", "c", "d"]);
        assert_eq!(result.slack_of("b"), Some(2 * DAY));
        assert!(!result.critical_flags["b"]);
    }

    #[test]
    fn test_disconnected_chains_each_start_at_zero() {
        let tasks = vec![
            make_task("a", 4),
            make_task("b", 2),
            make_task("x", 1),
            make_task("y", 1),
        ];
        let result = run(&tasks, &[fs("b", "a"), fs("y", "x")]);

        assert_eq!(result.project_duration_minutes, 6 * DAY);
        assert_eq!(result.timings["x"].earliest_start, 0);
        // short chain floats against the project end
        assert_eq!(result.slack_of("x"), Some(4 * DAY));
        assert_eq!(result.slack_of("y"), Some(4 * DAY));
        assert!(result.timings.values().all(|t| t.slack >= 0));
    }

    #[test]
    fn test_parallel_zero_slack_branches_all_critical() {
        let tasks = vec![make_task("a", 1), make_task("b", 3), make_task("c", 3), make_task("d", 1)];
        let edges = vec![fs("b", "a"), fs("c", "a"), fs("d", "b"), fs("d", "c")];
        let result = run(&tasks, &edges);
        assert_eq!(result.critical_path, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_with_lag() {
        // a (2d) -[3d lag]-> b (1d)
        let tasks = vec![make_task("a", 2), make_task("b", 1)];
        let result = run(&tasks, &[link("b", "a", DependencyType::FinishToStart, 3)]);
        assert_eq!(result.project_duration_minutes, 6 * DAY);
        assert_eq!(result.critical_path, vec!["a", "b"]);
    }

    #[test]
    fn test_start_to_start_and_finish_to_finish() {
        let tasks = vec![make_task("a", 4), make_task("b", 2), make_task("c", 1)];
        let edges = vec![
            link("b", "a", DependencyType::StartToStart, 1),
            link("c", "a", DependencyType::FinishToFinish, 0),
        ];
        let result = run(&tasks, &edges);

        let b = result.timings["b"];
        assert_eq!(b.earliest_start, DAY);
        assert_eq!(b.earliest_finish, 3 * DAY);
        let c = result.timings["c"];
        assert_eq!(c.earliest_finish, 4 * DAY);
        assert_eq!(result.project_duration_minutes, 4 * DAY);
        assert_eq!(result.slack_of("b"), Some(DAY));
        assert!(result.timings.values().all(|t| t.slack >= 0));
    }

    #[test]
    fn test_start_to_finish_is_ignored() {
        let tasks = vec![make_task("a", 2), make_task("b", 2)];
        let result = run(&tasks, &[link("b", "a", DependencyType::StartToFinish, 0)]);
        assert_eq!(result.timings["b"].earliest_start, 0);
        assert_eq!(result.project_duration_minutes, 2 * DAY);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let tasks = vec![make_task("a", 1), make_task("b", 1), make_task("c", 1)];
        let edges = vec![fs("b", "a"), fs("a", "b"), fs("c", "b")];
        let err = calculate_critical_path("p", &tasks, &edges, 0).unwrap_err();
        assert_eq!(
            err,
            CpmError::CircularDependency(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_summary_flag_follows_descendants() {
        let tasks = vec![
            make_task("phase", 0),
            make_task("a", 3).with_parent("phase"),
            make_task("b", 1),
            make_task("idle", 0),
            make_task("side", 1).with_parent("idle"),
        ];
        let edges = vec![fs("b", "a")];
        let result = run(&tasks, &edges);

        assert!(!result.timings.contains_key("phase"));
        assert!(result.critical_flags["phase"]);
        assert!(!result.critical_flags["idle"]);
        assert_eq!(result.project_duration_minutes, 4 * DAY);
    }

    #[test]
    fn test_link_into_summary_reaches_its_leaves() {
        let tasks = vec![
            make_task("a", 3),
            make_task("phase", 0),
            make_task("p1", 1).with_parent("phase"),
        ];
        let result = run(&tasks, &[fs("phase", "a")]);

        assert_eq!(result.timings["p1"].earliest_start, 3 * DAY);
        assert_eq!(result.project_duration_minutes, 4 * DAY);
        assert_eq!(result.critical_path, vec!["a", "p1"]);
        assert!(result.critical_flags["phase"]);
    }

    #[test]
    fn test_link_out_of_summary_waits_for_every_leaf() {
        let tasks = vec![
            make_task("phase", 0),
            make_task("p1", 2).with_parent("phase"),
            make_task("p2", 4).with_parent("phase"),
            make_task("z", 1),
        ];
        let result = run(&tasks, &[fs("z", "phase")]);

        assert_eq!(result.timings["z"].earliest_start, 4 * DAY);
        assert_eq!(result.project_duration_minutes, 5 * DAY);
        assert_eq!(result.slack_of("p1"), Some(2 * DAY));
        assert_eq!(result.critical_path, vec!["p2", "z"]);
    }

    #[test]
    fn test_project_without_tasks_is_empty() {
        let result = run(&[], &[]);
        assert_eq!(result.project_duration_minutes, 0);
        assert!(result.critical_path.is_empty());
    }

    #[test]
    fn test_other_projects_are_excluded() {
        let mut other = make_task("z", 50);
        other.project_id = "other".to_string();
        let result = run(&[make_task("a", 1), other], &[]);
        assert_eq!(result.project_duration_minutes, DAY);
        assert!(!result.critical_flags.contains_key("z"));
    }

    #[test]
    fn test_tie_break_by_sort_order() {
        let tasks = vec![
            make_task("late", 1).with_sort_order(2),
            make_task("early", 1).with_sort_order(1),
        ];
        let result = run(&tasks, &[]);
        assert_eq!(result.critical_path, vec!["early", "late"]);
    }
}
