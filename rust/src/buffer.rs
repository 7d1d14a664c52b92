//! Project buffer consumption and deadline status.

use chrono::NaiveDate;
use pyo3::prelude::*;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::hierarchy::shift_days;
use crate::models::{Complexity, Project, Task};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Project {0} has no dated tasks")]
    NoDatedTasks(String),
}

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferStatus {
    /// Real end is before the buffer end
    Safe,
    /// Real end lands exactly on the buffer end
    Consumed,
    /// Real end is past the buffer end
    Exceeded,
}

impl BufferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferStatus::Safe => "safe",
            BufferStatus::Consumed => "consumed",
            BufferStatus::Exceeded => "exceeded",
        }
    }
}

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    OnTrack,
    Tight,
    Delayed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::OnTrack => "on_track",
            TargetStatus::Tight => "tight",
            TargetStatus::Delayed => "delayed",
        }
    }
}

#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct BufferReport {
    /// Latest task end in the project
    #[pyo3(get)]
    pub real_end_date: NaiveDate,
    /// Date the buffer is measured from
    #[pyo3(get)]
    pub planned_end_date: NaiveDate,
    #[pyo3(get)]
    pub buffer_end_date: NaiveDate,
    #[pyo3(get)]
    pub buffer_days: i64,
    /// buffer_end - real_end; negative once exceeded
    #[pyo3(get)]
    pub buffer_days_remaining: i64,
    #[pyo3(get)]
    pub overrun_days: i64,
    /// Share of the buffer already used, 0..=100 (100 when exceeded)
    #[pyo3(get)]
    pub consumption_percent: f64,
    #[pyo3(get)]
    pub status: BufferStatus,
    #[pyo3(get)]
    pub target_end_date: Option<NaiveDate>,
    /// target - real_end in calendar days
    #[pyo3(get)]
    pub target_slack_days: Option<i64>,
    #[pyo3(get)]
    pub target_status: Option<TargetStatus>,
}

#[pymethods]
impl BufferReport {
    /// Target status when a deadline exists, else buffer status.
    pub fn display_status(&self) -> &'static str {
        match self.target_status {
            Some(target) => target.as_str(),
            None => self.status.as_str(),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "BufferReport(real_end={}, buffer_end={}, status={}, remaining={})",
            self.real_end_date,
            self.buffer_end_date,
            self.status.as_str(),
            self.buffer_days_remaining
        )
    }
}

/// Latest end over the project's tasks, using start + duration where a task
/// has no end date.
pub fn real_end_date(project_id: &str, tasks: &[Task]) -> Option<NaiveDate> {
    tasks
        .iter()
        .filter(|t| t.project_id == project_id)
        .filter_map(|t| t.effective_end())
        .max()
}

/// Measure buffer consumption for `project`.
///
/// The buffer is anchored at the project's planned end date
/// (`planned_end_date`); a project without one anchors at the real end,
/// which always reads as safe.
pub fn compute_project_buffer(
    project: &Project,
    tasks: &[Task],
    config: &EngineConfig,
) -> Result<BufferReport, BufferError> {
    let real_end = real_end_date(&project.id, tasks)
        .ok_or_else(|| BufferError::NoDatedTasks(project.id.clone()))?;
    let planned_end = project.planned_end_date.unwrap_or(real_end);
    let buffer_end = shift_days(planned_end, project.buffer_days);

    let remaining = (buffer_end - real_end).num_days();
    let status = match real_end.cmp(&buffer_end) {
        std::cmp::Ordering::Less => BufferStatus::Safe,
        std::cmp::Ordering::Equal => BufferStatus::Consumed,
        std::cmp::Ordering::Greater => BufferStatus::Exceeded,
    };

    let consumption_percent = if project.buffer_days > 0 {
        let used = (project.buffer_days - remaining).clamp(0, project.buffer_days);
        used as f64 / project.buffer_days as f64 * 100.0
    } else if status == BufferStatus::Safe {
        0.0
    } else {
        100.0
    };

    let target_slack_days = project
        .target_end_date
        .map(|target| (target - real_end).num_days());
    let target_status = target_slack_days.map(|slack| {
        if slack < 0 {
            TargetStatus::Delayed
        } else if slack <= config.tight_threshold_days {
            TargetStatus::Tight
        } else {
            TargetStatus::OnTrack
        }
    });

    Ok(BufferReport {
        real_end_date: real_end,
        planned_end_date: planned_end,
        buffer_end_date: buffer_end,
        buffer_days: project.buffer_days,
        buffer_days_remaining: remaining,
        overrun_days: (-remaining).max(0),
        consumption_percent,
        status,
        target_end_date: project.target_end_date,
        target_slack_days,
        target_status,
    })
}

/// Suggested buffer for a project of `duration_days` at the given complexity.
/// Always at least one day for a non-empty project.
pub fn suggest_buffer_days(duration_days: i64, complexity: Complexity) -> i64 {
    if duration_days <= 0 {
        return 0;
    }
    let suggested = (duration_days as f64 * complexity.buffer_ratio()).ceil() as i64;
    suggested.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn project(buffer_days: i64, planned_end: NaiveDate) -> Project {
        let mut project = Project::new("p", buffer_days);
        project.planned_end_date = Some(planned_end);
        project
    }

    fn tasks_ending(end: NaiveDate) -> Vec<Task> {
        vec![
            Task::new("a", "p", date(2024, 1, 1), date(2024, 1, 5)),
            Task::new("b", "p", date(2024, 1, 2), end),
        ]
    }

    #[test]
    fn test_buffer_safe() {
        let report = compute_project_buffer(
            &project(5, date(2024, 1, 10)),
            &tasks_ending(date(2024, 1, 10)),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.buffer_end_date, date(2024, 1, 15));
        assert_eq!(report.status, BufferStatus::Safe);
        assert_eq!(report.buffer_days_remaining, 5);
        assert_eq!(report.consumption_percent, 0.0);
        assert_eq!(report.display_status(), "safe");
    }

    #[test]
    fn test_buffer_consumed_at_boundary() {
        let report = compute_project_buffer(
            &project(5, date(2024, 1, 10)),
            &tasks_ending(date(2024, 1, 15)),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.status, BufferStatus::Consumed);
        assert_eq!(report.buffer_days_remaining, 0);
        assert_eq!(report.overrun_days, 0);
        assert_eq!(report.consumption_percent, 100.0);
    }

    #[test]
    fn test_buffer_exceeded() {
        let report = compute_project_buffer(
            &project(5, date(2024, 1, 10)),
            &tasks_ending(date(2024, 1, 17)),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(report.status, BufferStatus::Exceeded);
        assert_eq!(report.buffer_days_remaining, -2);
        assert_eq!(report.overrun_days, 2);
    }

    #[test]
    fn test_derived_dates_do_not_move_the_anchor() {
        let mut p = project(5, date(2024, 1, 10));
        let tasks = tasks_ending(date(2024, 1, 17));
        p.derive_dates(&tasks);
        assert_eq!(p.end_date, Some(date(2024, 1, 17)));

        let report = compute_project_buffer(&p, &tasks, &EngineConfig::default()).unwrap();
        assert_eq!(report.planned_end_date, date(2024, 1, 10));
        assert_eq!(report.buffer_end_date, date(2024, 1, 15));
        assert_eq!(report.status, BufferStatus::Exceeded);
    }

    #[test]
    fn test_missing_end_uses_start_plus_duration() {
        let mut open_ended = Task::new("c", "p", date(2024, 1, 12), date(2024, 1, 12));
        open_ended.end_date = None;
        open_ended.duration_minutes = 3 * 540;
        let mut tasks = tasks_ending(date(2024, 1, 10));
        tasks.push(open_ended);
        assert_eq!(real_end_date("p", &tasks), Some(date(2024, 1, 14)));
    }

    #[test]
    fn test_target_status_takes_priority() {
        let config = EngineConfig::default();
        let mut p = project(5, date(2024, 1, 10));

        p.target_end_date = Some(date(2024, 1, 12));
        let tight = compute_project_buffer(&p, &tasks_ending(date(2024, 1, 10)), &config).unwrap();
        assert_eq!(tight.target_status, Some(TargetStatus::Tight));
        assert_eq!(tight.display_status(), "tight");

        p.target_end_date = Some(date(2024, 1, 20));
        let on_track = compute_project_buffer(&p, &tasks_ending(date(2024, 1, 10)), &config).unwrap();
        assert_eq!(on_track.target_status, Some(TargetStatus::OnTrack));

        p.target_end_date = Some(date(2024, 1, 9));
        let delayed = compute_project_buffer(&p, &tasks_ending(date(2024, 1, 10)), &config).unwrap();
        assert_eq!(delayed.target_slack_days, Some(-1));
        assert_eq!(delayed.display_status(), "delayed");
    }

    #[test]
    fn test_no_dated_tasks() {
        assert_eq!(
            compute_project_buffer(&Project::new("p", 5), &[], &EngineConfig::default()),
            Err(BufferError::NoDatedTasks("p".to_string()))
        );
    }

    #[test]
    fn test_suggest_buffer_days() {
        assert_eq!(suggest_buffer_days(20, Complexity::Simples), 2);
        assert_eq!(suggest_buffer_days(20, Complexity::Padrao), 3);
        assert_eq!(suggest_buffer_days(20, Complexity::Complexo), 5);
        assert_eq!(suggest_buffer_days(3, Complexity::Simples), 1);
        assert_eq!(suggest_buffer_days(0, Complexity::Complexo), 0);
    }
}
