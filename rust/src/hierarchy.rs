//! Task hierarchy: summary rollup, outline numbering and sibling reordering.
//!
//! A summary task's dates are never authoritative. They are re-derived as
//! `min(child.start) - margin_start ..= max(child.end) + margin_end`, and its
//! duration is the sum of its children's durations.

use chrono::{Days, NaiveDate};
use pyo3::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::models::Task;

/// Errors from hierarchy edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Tasks {0} and {1} are not siblings")]
    NotSiblings(String, String),
}

/// Mutable date triple used while recomputing without touching the snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskDates {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub duration_minutes: i64,
}

impl From<&Task> for TaskDates {
    fn from(task: &Task) -> Self {
        Self {
            start: task.start_date,
            end: task.end_date,
            duration_minutes: task.duration_minutes,
        }
    }
}

/// A re-derived summary whose stored values were stale.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryRollup {
    #[pyo3(get)]
    pub task_id: String,
    #[pyo3(get)]
    pub start_date: NaiveDate,
    #[pyo3(get)]
    pub end_date: NaiveDate,
    #[pyo3(get)]
    pub duration_minutes: i64,
}

/// Parent/child index over a task snapshot.
pub struct HierarchyIndex<'a> {
    tasks: FxHashMap<&'a str, &'a Task>,
    parent: FxHashMap<&'a str, &'a str>,
    /// Children ordered by (sort_order, id)
    children: FxHashMap<&'a str, Vec<&'a str>>,
    roots: Vec<&'a str>,
}

impl<'a> HierarchyIndex<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        let by_id: FxHashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut parent: FxHashMap<&str, &str> = FxHashMap::default();
        let mut children: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        let mut roots: Vec<&str> = Vec::new();

        for task in tasks {
            match task.parent_id.as_deref() {
                Some(pid) if pid != task.id && by_id.contains_key(pid) => {
                    parent.insert(task.id.as_str(), pid);
                    children.entry(pid).or_default().push(task.id.as_str());
                }
                _ => roots.push(task.id.as_str()),
            }
        }

        let order_key = |id: &&str| by_id.get(id).map(|t| (t.sort_order, t.id.clone()));
        for list in children.values_mut() {
            list.sort_by_key(order_key);
        }
        roots.sort_by_key(order_key);

        Self {
            tasks: by_id,
            parent,
            children,
            roots,
        }
    }

    pub fn task(&self, id: &str) -> Option<&'a Task> {
        self.tasks.get(id).copied()
    }

    pub fn is_summary(&self, id: &str) -> bool {
        self.children.get(id).is_some_and(|c| !c.is_empty())
    }

    pub fn parent_of(&self, id: &str) -> Option<&'a str> {
        self.parent.get(id).copied()
    }

    pub fn children_of(&self, id: &str) -> &[&'a str] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Ancestors nearest first. Stops if the parent chain loops.
    pub fn ancestors(&self, id: &str) -> Vec<&'a str> {
        let mut result = Vec::new();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut current = self.parent_of(id);
        while let Some(pid) = current {
            if !seen.insert(pid) || pid == id {
                break;
            }
            result.push(pid);
            current = self.parent_of(pid);
        }
        result
    }

    pub fn depth(&self, id: &str) -> usize {
        self.ancestors(id).len()
    }

    /// All non-summary descendants of `id`, in outline order.
    pub fn leaf_descendants(&self, id: &str) -> Vec<&'a str> {
        let mut leaves = Vec::new();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = self.children_of(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if self.is_summary(node) {
                stack.extend(self.children_of(node).iter().rev().copied());
            } else {
                leaves.push(node);
            }
        }
        leaves
    }

    /// Summary ids ordered deepest first, so children settle before parents.
    pub fn summaries_deepest_first(&self) -> Vec<&'a str> {
        let mut summaries: Vec<(usize, &str)> = self
            .children
            .keys()
            .filter(|id| self.is_summary(id))
            .map(|id| (self.depth(id), *id))
            .collect();
        summaries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));
        summaries.into_iter().map(|(_, id)| id).collect()
    }

    /// Derive a summary's dates from the current values of its children.
    pub fn derive(&self, id: &str, working: &FxHashMap<&'a str, TaskDates>) -> Option<TaskDates> {
        let summary = self.task(id)?;
        let children = self
            .children_of(id)
            .iter()
            .filter_map(|child| working.get(child).copied());
        derive_summary_dates(children, summary.margin_start, summary.margin_end)
    }

    /// Roots and children in outline order (depth-first).
    pub fn outline_order(&self) -> Vec<&'a str> {
        let mut order = Vec::with_capacity(self.tasks.len());
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = self.roots.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            order.push(node);
            stack.extend(self.children_of(node).iter().rev().copied());
        }
        order
    }
}

/// Combine child dates into summary dates. Children missing either date are
/// ignored for the range but still count toward duration.
pub fn derive_summary_dates(
    children: impl Iterator<Item = TaskDates>,
    margin_start: i64,
    margin_end: i64,
) -> Option<TaskDates> {
    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;
    let mut duration_minutes = 0;

    for child in children {
        duration_minutes += child.duration_minutes;
        if let (Some(s), Some(e)) = (child.start, child.end) {
            start = Some(start.map_or(s, |cur| cur.min(s)));
            end = Some(end.map_or(e, |cur| cur.max(e)));
        }
    }

    let start = shift_days(start?, -margin_start);
    let end = shift_days(end?, margin_end);
    Some(TaskDates {
        start: Some(start),
        end: Some(end),
        duration_minutes,
    })
}

/// Move a date by a signed number of calendar days, saturating at the range edge.
pub fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    let magnitude = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(magnitude).unwrap_or(date)
    } else {
        date.checked_sub_days(magnitude).unwrap_or(date)
    }
}

/// Re-derive every summary bottom-up and report the ones whose stored dates
/// or duration differ from the derived values.
pub fn rollup_summaries(tasks: &[Task]) -> Vec<SummaryRollup> {
    let index = HierarchyIndex::new(tasks);
    let mut working: FxHashMap<&str, TaskDates> =
        tasks.iter().map(|t| (t.id.as_str(), TaskDates::from(t))).collect();
    let mut rollups = Vec::new();

    for summary_id in index.summaries_deepest_first() {
        let Some(derived) = index.derive(summary_id, &working) else {
            continue;
        };
        let (Some(start), Some(end)) = (derived.start, derived.end) else {
            continue;
        };
        let stored = working.insert(summary_id, derived);
        if stored != Some(derived) {
            rollups.push(SummaryRollup {
                task_id: summary_id.to_string(),
                start_date: start,
                end_date: end,
                duration_minutes: derived.duration_minutes,
            });
        }
    }

    rollups
}

/// Write rollups back into a task list.
pub fn apply_rollups(tasks: &mut [Task], rollups: &[SummaryRollup]) {
    let by_id: FxHashMap<&str, &SummaryRollup> =
        rollups.iter().map(|r| (r.task_id.as_str(), r)).collect();
    for task in tasks.iter_mut() {
        if let Some(rollup) = by_id.get(task.id.as_str()) {
            task.start_date = Some(rollup.start_date);
            task.end_date = Some(rollup.end_date);
            task.duration_minutes = rollup.duration_minutes;
        }
    }
}

/// Derive `outline_level` (roots are 1) and `wbs_code` ("1", "1.2", "1.2.3")
/// from parent links and sibling `sort_order`.
pub fn assign_outline(tasks: &mut [Task]) {
    let assignments: FxHashMap<String, (u32, String)> = {
        let index = HierarchyIndex::new(tasks);
        let mut codes: FxHashMap<&str, (u32, String)> = FxHashMap::default();

        for (position, root) in index.roots.iter().enumerate() {
            codes.insert(*root, (1, (position + 1).to_string()));
        }
        for node in index.outline_order() {
            let Some((level, code)) = codes.get(node).cloned() else {
                continue;
            };
            for (position, child) in index.children_of(node).iter().enumerate() {
                codes.insert(*child, (level + 1, format!("{}.{}", code, position + 1)));
            }
        }

        codes
            .into_iter()
            .map(|(id, value)| (id.to_string(), value))
            .collect()
    };

    for task in tasks.iter_mut() {
        if let Some((level, code)) = assignments.get(&task.id) {
            task.outline_level = *level;
            task.wbs_code = Some(code.clone());
        }
    }
}

/// Drag-reorder: swap the `sort_order` of two siblings.
pub fn swap_sort_order(tasks: &mut [Task], a: &str, b: &str) -> Result<(), HierarchyError> {
    let ia = tasks
        .iter()
        .position(|t| t.id == a)
        .ok_or_else(|| HierarchyError::TaskNotFound(a.to_string()))?;
    let ib = tasks
        .iter()
        .position(|t| t.id == b)
        .ok_or_else(|| HierarchyError::TaskNotFound(b.to_string()))?;

    if tasks[ia].parent_id != tasks[ib].parent_id || tasks[ia].project_id != tasks[ib].project_id {
        return Err(HierarchyError::NotSiblings(a.to_string(), b.to_string()));
    }

    let order_a = tasks[ia].sort_order;
    tasks[ia].sort_order = tasks[ib].sort_order;
    tasks[ib].sort_order = order_a;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_task(id: &str, parent: Option<&str>, start: NaiveDate, end: NaiveDate, order: i32) -> Task {
        let task = Task::new(id, "p", start, end).with_sort_order(order);
        match parent {
            Some(p) => task.with_parent(p),
            None => task,
        }
    }

    #[test]
    fn test_summary_rollup_with_margins() {
        let tasks = vec![
            make_task("phase", None, date(2024, 1, 1), date(2024, 1, 1), 0).with_margins(1, 2),
            make_task("a", Some("phase"), date(2024, 1, 3), date(2024, 1, 5), 0),
            make_task("b", Some("phase"), date(2024, 1, 4), date(2024, 1, 9), 1),
        ];

        let rollups = rollup_summaries(&tasks);
        assert_eq!(rollups.len(), 1);
        let phase = &rollups[0];
        assert_eq!(phase.task_id, "phase");
        assert_eq!(phase.start_date, date(2024, 1, 2));
        assert_eq!(phase.end_date, date(2024, 1, 11));
        assert_eq!(phase.duration_minutes, (3 + 6) * 540);
    }

    #[test]
    fn test_nested_rollup_settles_bottom_up() {
        let tasks = vec![
            make_task("root", None, date(2024, 1, 1), date(2024, 1, 1), 0),
            make_task("mid", Some("root"), date(2024, 1, 1), date(2024, 1, 1), 0),
            make_task("leaf", Some("mid"), date(2024, 2, 1), date(2024, 2, 3), 0),
        ];
        let mut updated = tasks.clone();
        apply_rollups(&mut updated, &rollup_summaries(&tasks));

        let root = updated.iter().find(|t| t.id == "root").unwrap();
        assert_eq!(root.start_date, Some(date(2024, 2, 1)));
        assert_eq!(root.end_date, Some(date(2024, 2, 3)));
        assert_eq!(root.duration_minutes, 3 * 540);

        // Already consistent: nothing to report
        assert!(rollup_summaries(&updated).is_empty());
    }

    #[test]
    fn test_leaf_descendants_and_ancestors() {
        let tasks = vec![
            make_task("root", None, date(2024, 1, 1), date(2024, 1, 1), 0),
            make_task("mid", Some("root"), date(2024, 1, 1), date(2024, 1, 1), 0),
            make_task("x", Some("mid"), date(2024, 1, 1), date(2024, 1, 1), 1),
            make_task("y", Some("mid"), date(2024, 1, 1), date(2024, 1, 1), 0),
            make_task("z", Some("root"), date(2024, 1, 1), date(2024, 1, 1), 1),
        ];
        let index = HierarchyIndex::new(&tasks);
        assert_eq!(index.leaf_descendants("root"), vec!["y", "x", "z"]);
        assert_eq!(index.ancestors("x"), vec!["mid", "root"]);
        assert!(index.is_summary("mid"));
        assert!(!index.is_summary("z"));
        assert_eq!(index.summaries_deepest_first(), vec!["mid", "root"]);
    }

    #[test]
    fn test_parent_cycle_does_not_hang() {
        let a = make_task("a", Some("b"), date(2024, 1, 1), date(2024, 1, 1), 0);
        let b = make_task("b", Some("a"), date(2024, 1, 1), date(2024, 1, 1), 0);
        let tasks = vec![a, b];
        let index = HierarchyIndex::new(&tasks);
        assert_eq!(index.ancestors("a"), vec!["b"]);
        assert!(index.leaf_descendants("a").is_empty());
    }

    #[test]
    fn test_assign_outline_wbs_codes() {
        let mut tasks = vec![
            make_task("second", None, date(2024, 1, 1), date(2024, 1, 1), 2),
            make_task("first", None, date(2024, 1, 1), date(2024, 1, 1), 1),
            make_task("first.b", Some("first"), date(2024, 1, 1), date(2024, 1, 1), 5),
            make_task("first.a", Some("first"), date(2024, 1, 1), date(2024, 1, 1), 3),
            make_task("first.a.i", Some("first.a"), date(2024, 1, 1), date(2024, 1, 1), 0),
        ];
        assign_outline(&mut tasks);

        let code = |id: &str| {
            let t = tasks.iter().find(|t| t.id == id).unwrap();
            (t.outline_level, t.wbs_code.clone().unwrap())
        };
        assert_eq!(code("first"), (1, "1".to_string()));
        assert_eq!(code("second"), (1, "2".to_string()));
        assert_eq!(code("first.a"), (2, "1.1".to_string()));
        assert_eq!(code("first.b"), (2, "1.2".to_string()));
        assert_eq!(code("first.a.i"), (3, "1.1.1".to_string()));
    }

    #[test]
    fn test_swap_sort_order() {
        let mut tasks = vec![
            make_task("a", Some("p"), date(2024, 1, 1), date(2024, 1, 1), 1),
            make_task("b", Some("p"), date(2024, 1, 1), date(2024, 1, 1), 2),
            make_task("c", None, date(2024, 1, 1), date(2024, 1, 1), 3),
        ];
        swap_sort_order(&mut tasks, "a", "b").unwrap();
        assert_eq!(tasks[0].sort_order, 2);
        assert_eq!(tasks[1].sort_order, 1);

        assert_eq!(
            swap_sort_order(&mut tasks, "a", "c"),
            Err(HierarchyError::NotSiblings("a".to_string(), "c".to_string()))
        );
        assert!(matches!(
            swap_sort_order(&mut tasks, "a", "zz"),
            Err(HierarchyError::TaskNotFound(_))
        ));
    }
}
