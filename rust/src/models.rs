//! Core data types for the scheduling engine.

use chrono::{Days, NaiveDate};
use pyo3::prelude::*;

use crate::duration::MINUTES_PER_DAY;

/// How a task consumes time and resource capacity.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkType {
    /// Consumes resource capacity, advances on working days only.
    Work,
    /// Passive waiting (curing, delivery); advances on calendar days.
    Wait,
    /// Zero-duration marker.
    Milestone,
}

impl Default for WorkType {
    fn default() -> Self {
        Self::Work
    }
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Wait => "wait",
            Self::Milestone => "milestone",
        }
    }

    /// Whether tasks of this type draw on a resource's daily capacity.
    pub fn consumes_capacity(&self) -> bool {
        matches!(self, Self::Work)
    }
}

impl std::str::FromStr for WorkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "wait" => Ok(Self::Wait),
            "milestone" => Ok(Self::Milestone),
            other => Err(format!("Invalid work type: {}", other)),
        }
    }
}

/// Dependency relation between a predecessor and its dependent.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyType {
    FinishToStart,
    StartToStart,
    FinishToFinish,
    /// Accepted on import, ignored by cascade and CPM.
    StartToFinish,
}

impl Default for DependencyType {
    fn default() -> Self {
        Self::FinishToStart
    }
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinishToStart => "finish_to_start",
            Self::StartToStart => "start_to_start",
            Self::FinishToFinish => "finish_to_finish",
            Self::StartToFinish => "start_to_finish",
        }
    }

    /// Whether the scheduling passes have a rule for this relation.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::StartToFinish)
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finish_to_start" | "fs" => Ok(Self::FinishToStart),
            "start_to_start" | "ss" => Ok(Self::StartToStart),
            "finish_to_finish" | "ff" => Ok(Self::FinishToFinish),
            "start_to_finish" | "sf" => Ok(Self::StartToFinish),
            other => Err(format!("Invalid dependency type: {}", other)),
        }
    }
}

/// Project complexity; only feeds buffer suggestions.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Complexity {
    Simples,
    Padrao,
    Complexo,
}

impl Default for Complexity {
    fn default() -> Self {
        Self::Padrao
    }
}

impl Complexity {
    /// Share of the working span suggested as schedule buffer.
    pub fn buffer_ratio(&self) -> f64 {
        match self {
            Self::Simples => 0.10,
            Self::Padrao => 0.15,
            Self::Complexo => 0.25,
        }
    }
}

/// A schedulable task. Tasks with children are summaries whose dates are
/// derived from those children.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub parent_id: Option<String>,
    #[pyo3(get, set)]
    pub project_id: String,
    /// Inclusive first day
    #[pyo3(get, set)]
    pub start_date: Option<NaiveDate>,
    /// Inclusive last day
    #[pyo3(get, set)]
    pub end_date: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub duration_minutes: i64,
    #[pyo3(get, set)]
    pub work_type: WorkType,
    #[pyo3(get, set)]
    pub progress: i32,
    /// Written back by the CPM engine only
    #[pyo3(get, set)]
    pub is_critical_path: bool,
    #[pyo3(get, set)]
    pub sort_order: i32,
    #[pyo3(get, set)]
    pub outline_level: u32,
    #[pyo3(get, set)]
    pub wbs_code: Option<String>,
    /// Days of padding before the earliest child when rolled up
    #[pyo3(get, set)]
    pub margin_start: i64,
    /// Days of padding after the latest child when rolled up
    #[pyo3(get, set)]
    pub margin_end: i64,
    #[pyo3(get, set)]
    pub estimated_cost: f64,
    #[pyo3(get, set)]
    pub actual_cost: f64,
}

#[pymethods]
impl Task {
    #[new]
    #[pyo3(signature = (
        id,
        name,
        project_id,
        start_date=None,
        end_date=None,
        duration_minutes=0,
        work_type=WorkType::Work,
        parent_id=None,
        progress=0,
        sort_order=0,
        margin_start=0,
        margin_end=0,
        estimated_cost=0.0,
        actual_cost=0.0
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        id: String,
        name: String,
        project_id: String,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        duration_minutes: i64,
        work_type: WorkType,
        parent_id: Option<String>,
        progress: i32,
        sort_order: i32,
        margin_start: i64,
        margin_end: i64,
        estimated_cost: f64,
        actual_cost: f64,
    ) -> Self {
        Self {
            id,
            name,
            parent_id,
            project_id,
            start_date,
            end_date,
            duration_minutes,
            work_type,
            progress: progress.clamp(0, 100),
            is_critical_path: false,
            sort_order,
            outline_level: 0,
            wbs_code: None,
            margin_start,
            margin_end,
            estimated_cost,
            actual_cost,
        }
    }

    /// Inclusive calendar-day span, or None when a date is missing.
    #[pyo3(name = "span_days")]
    fn py_span_days(&self) -> Option<i64> {
        self.span_days()
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(id={:?}, start={:?}, end={:?}, duration_minutes={}, work_type={})",
            self.id,
            self.start_date,
            self.end_date,
            self.duration_minutes,
            self.work_type.as_str()
        )
    }
}

impl Task {
    /// Undated work task with zero duration.
    pub fn blank(id: &str, project_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            parent_id: None,
            project_id: project_id.to_string(),
            start_date: None,
            end_date: None,
            duration_minutes: 0,
            work_type: WorkType::Work,
            progress: 0,
            is_critical_path: false,
            sort_order: 0,
            outline_level: 0,
            wbs_code: None,
            margin_start: 0,
            margin_end: 0,
            estimated_cost: 0.0,
            actual_cost: 0.0,
        }
    }

    /// Build a work task spanning `start..=end` whose duration is one working
    /// day per calendar day in the span.
    pub fn new(id: &str, project_id: &str, start: NaiveDate, end: NaiveDate) -> Self {
        let days = (end - start).num_days() + 1;
        Self {
            start_date: Some(start),
            end_date: Some(end),
            duration_minutes: days.max(0) * MINUTES_PER_DAY,
            ..Self::blank(id, project_id)
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_work_type(mut self, work_type: WorkType) -> Self {
        self.work_type = work_type;
        if work_type == WorkType::Milestone {
            self.duration_minutes = 0;
        }
        self
    }

    pub fn with_duration_minutes(mut self, minutes: i64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_margins(mut self, margin_start: i64, margin_end: i64) -> Self {
        self.margin_start = margin_start;
        self.margin_end = margin_end;
        self
    }

    /// Inclusive calendar-day span: end - start + 1.
    pub fn span_days(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((end - start).num_days() + 1),
            _ => None,
        }
    }

    /// End date, falling back to start + duration when no end is stored.
    pub fn effective_end(&self) -> Option<NaiveDate> {
        if let Some(end) = self.end_date {
            return Some(end);
        }
        let start = self.start_date?;
        let days = crate::duration::minutes_to_whole_days_ceil(self.duration_minutes);
        start.checked_add_days(Days::new(days.saturating_sub(1).max(0) as u64))
    }
}

/// Dependency edge: `task_id` depends on `predecessor_id`.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predecessor {
    #[pyo3(get, set)]
    pub id: String,
    /// Dependent task
    #[pyo3(get, set)]
    pub task_id: String,
    /// Depended-upon task
    #[pyo3(get, set)]
    pub predecessor_id: String,
    #[pyo3(get, set)]
    pub dependency_type: DependencyType,
    /// Signed lag in minutes (540 per working day)
    #[pyo3(get, set)]
    pub lag_minutes: i64,
}

#[pymethods]
impl Predecessor {
    #[new]
    #[pyo3(signature = (id, task_id, predecessor_id, dependency_type=DependencyType::FinishToStart, lag_minutes=0))]
    fn py_new(
        id: String,
        task_id: String,
        predecessor_id: String,
        dependency_type: DependencyType,
        lag_minutes: i64,
    ) -> Self {
        Self {
            id,
            task_id,
            predecessor_id,
            dependency_type,
            lag_minutes,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Predecessor(id={:?}, {} -> {}, type={}, lag_minutes={})",
            self.id, self.predecessor_id, self.task_id, self.dependency_type, self.lag_minutes
        )
    }
}

impl Predecessor {
    pub fn new(
        id: &str,
        task_id: &str,
        predecessor_id: &str,
        dependency_type: DependencyType,
        lag_minutes: i64,
    ) -> Self {
        Self {
            id: id.to_string(),
            task_id: task_id.to_string(),
            predecessor_id: predecessor_id.to_string(),
            dependency_type,
            lag_minutes,
        }
    }

    /// Finish-to-start edge with no lag.
    pub fn finish_to_start(id: &str, task_id: &str, predecessor_id: &str) -> Self {
        Self::new(id, task_id, predecessor_id, DependencyType::FinishToStart, 0)
    }

    pub fn is_self_reference(&self) -> bool {
        self.task_id == self.predecessor_id
    }
}

/// A project and its schedule protection settings.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub name: String,
    /// Derived from tasks, see `derive_dates`
    #[pyo3(get, set)]
    pub start_date: Option<NaiveDate>,
    /// Derived from tasks, see `derive_dates`
    #[pyo3(get, set)]
    pub end_date: Option<NaiveDate>,
    /// Baseline finish the buffer is anchored at; never derived
    #[pyo3(get, set)]
    pub planned_end_date: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub buffer_days: i64,
    #[pyo3(get, set)]
    pub target_end_date: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub complexity: Complexity,
}

#[pymethods]
impl Project {
    #[new]
    #[pyo3(signature = (
        id,
        name,
        start_date=None,
        end_date=None,
        planned_end_date=None,
        buffer_days=0,
        target_end_date=None,
        complexity=Complexity::Padrao
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        id: String,
        name: String,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        planned_end_date: Option<NaiveDate>,
        buffer_days: i64,
        target_end_date: Option<NaiveDate>,
        complexity: Complexity,
    ) -> Self {
        Self {
            id,
            name,
            start_date,
            end_date,
            planned_end_date,
            buffer_days,
            target_end_date,
            complexity,
        }
    }

    #[pyo3(name = "derive_dates")]
    fn py_derive_dates(&mut self, tasks: Vec<Task>) {
        self.derive_dates(&tasks);
    }

    fn __repr__(&self) -> String {
        format!(
            "Project(id={:?}, start={:?}, end={:?}, buffer_days={})",
            self.id, self.start_date, self.end_date, self.buffer_days
        )
    }
}

impl Project {
    pub fn new(id: &str, buffer_days: i64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            start_date: None,
            end_date: None,
            planned_end_date: None,
            buffer_days,
            target_end_date: None,
            complexity: Complexity::default(),
        }
    }

    /// Re-derive start/end as min/max over the project's task dates. The
    /// planned end is left alone.
    pub fn derive_dates(&mut self, tasks: &[Task]) {
        let own: Vec<&Task> = tasks.iter().filter(|t| t.project_id == self.id).collect();
        self.start_date = own.iter().filter_map(|t| t.start_date).min();
        self.end_date = own.iter().filter_map(|t| t.effective_end()).max();
    }
}
