//! Types for critical path computation.

use std::collections::HashMap;

use pyo3::prelude::*;
use thiserror::Error;

use crate::models::Task;

/// Per-task timing in work-minutes from the project start.
#[pyclass]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskTiming {
    /// Earliest possible start (forward pass).
    #[pyo3(get)]
    pub earliest_start: i64,
    /// Earliest possible finish (forward pass).
    #[pyo3(get)]
    pub earliest_finish: i64,
    /// Latest allowable start (backward pass).
    #[pyo3(get)]
    pub latest_start: i64,
    /// Latest allowable finish (backward pass).
    #[pyo3(get)]
    pub latest_finish: i64,
    /// latest_start - earliest_start
    #[pyo3(get)]
    pub slack: i64,
}

#[pymethods]
impl TaskTiming {
    pub fn is_critical(&self) -> bool {
        self.slack == 0
    }

    fn __repr__(&self) -> String {
        format!(
            "TaskTiming(es={}, ef={}, ls={}, lf={}, slack={})",
            self.earliest_start,
            self.earliest_finish,
            self.latest_start,
            self.latest_finish,
            self.slack
        )
    }
}

/// Error types for critical path calculation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpmError {
    /// Lists the tasks left unordered by the topological sort.
    #[error("Circular dependency detected among tasks: {}", .0.join(", "))]
    CircularDependency(Vec<String>),
}

/// Output of one CPM run over a project.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CpmResult {
    /// Timings for every leaf task in the project.
    #[pyo3(get)]
    pub timings: HashMap<String, TaskTiming>,
    /// max(earliest_finish) over all tasks.
    #[pyo3(get)]
    pub project_duration_minutes: i64,
    /// Zero-slack tasks ordered by earliest start, then sort order.
    #[pyo3(get)]
    pub critical_path: Vec<String>,
    /// Derived `is_critical_path` for every project task, summaries included.
    #[pyo3(get)]
    pub critical_flags: HashMap<String, bool>,
}

#[pymethods]
impl CpmResult {
    /// Slack of a task, None if it was not part of the run.
    pub fn slack_of(&self, task_id: &str) -> Option<i64> {
        self.timings.get(task_id).map(|t| t.slack)
    }

    fn __repr__(&self) -> String {
        format!(
            "CpmResult(project_duration_minutes={}, critical_path={:?})",
            self.project_duration_minutes, self.critical_path
        )
    }
}

impl CpmResult {
    /// Flags that differ from what the snapshot currently stores.
    pub fn changed_flags(&self, tasks: &[Task]) -> Vec<(String, bool)> {
        tasks
            .iter()
            .filter_map(|task| {
                let flag = *self.critical_flags.get(&task.id)?;
                (flag != task.is_critical_path).then(|| (task.id.clone(), flag))
            })
            .collect()
    }
}
