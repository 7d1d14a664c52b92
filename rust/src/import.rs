//! Import boundary: pre-parsed project-file records to engine tasks and links.
//!
//! The legacy format counts 480 minutes per day and numbers relations
//! 0=FF, 1=FS, 2=SF, 3=SS. Everything crossing this boundary is converted to
//! the internal 540-minute day here and nowhere else.

use chrono::NaiveDate;
use pyo3::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::duration::MINUTES_PER_DAY;
use crate::log_checks;
use crate::models::{DependencyType, Predecessor, Task, WorkType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("Duplicate task uid {0}")]
    DuplicateUid(i64),
    #[error("Unknown relation type code {0}")]
    UnknownRelationCode(i32),
    #[error("Invalid outline number {0:?}")]
    InvalidOutline(String),
}

/// A task row as delivered by the file parser.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedTask {
    #[pyo3(get, set)]
    pub uid: i64,
    #[pyo3(get, set)]
    pub name: String,
    /// Dotted outline position, "1", "1.2", "1.2.3"
    #[pyo3(get, set)]
    pub outline_number: String,
    #[pyo3(get, set)]
    pub start: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub finish: Option<NaiveDate>,
    /// Legacy minutes (480 per day)
    #[pyo3(get, set)]
    pub duration_minutes: i64,
    #[pyo3(get, set)]
    pub percent_complete: i32,
    #[pyo3(get, set)]
    pub is_summary: bool,
    #[pyo3(get, set)]
    pub is_critical: bool,
}

#[pymethods]
impl ImportedTask {
    #[new]
    #[pyo3(signature = (
        uid,
        name,
        outline_number,
        start=None,
        finish=None,
        duration_minutes=0,
        percent_complete=0,
        is_summary=false,
        is_critical=false
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        uid: i64,
        name: String,
        outline_number: String,
        start: Option<NaiveDate>,
        finish: Option<NaiveDate>,
        duration_minutes: i64,
        percent_complete: i32,
        is_summary: bool,
        is_critical: bool,
    ) -> Self {
        Self {
            uid,
            name,
            outline_number,
            start,
            finish,
            duration_minutes,
            percent_complete,
            is_summary,
            is_critical,
        }
    }
}

/// A predecessor row as delivered by the file parser.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedLink {
    #[pyo3(get, set)]
    pub task_uid: i64,
    #[pyo3(get, set)]
    pub predecessor_uid: i64,
    #[pyo3(get, set)]
    pub relation_code: i32,
    /// Legacy minutes (480 per day)
    #[pyo3(get, set)]
    pub lag_minutes: i64,
}

#[pymethods]
impl ImportedLink {
    #[new]
    #[pyo3(signature = (task_uid, predecessor_uid, relation_code=1, lag_minutes=0))]
    fn py_new(task_uid: i64, predecessor_uid: i64, relation_code: i32, lag_minutes: i64) -> Self {
        Self {
            task_uid,
            predecessor_uid,
            relation_code,
            lag_minutes,
        }
    }
}

/// Engine records produced from one import.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportBatch {
    #[pyo3(get)]
    pub tasks: Vec<Task>,
    #[pyo3(get)]
    pub predecessors: Vec<Predecessor>,
    /// Human-readable reasons for links that were dropped
    #[pyo3(get)]
    pub skipped_links: Vec<String>,
}

/// Relation code mapping of the legacy format.
pub fn relation_from_code(code: i32) -> Result<DependencyType, ImportError> {
    match code {
        0 => Ok(DependencyType::FinishToFinish),
        1 => Ok(DependencyType::FinishToStart),
        2 => Ok(DependencyType::StartToFinish),
        3 => Ok(DependencyType::StartToStart),
        other => Err(ImportError::UnknownRelationCode(other)),
    }
}

/// Legacy minutes to internal minutes, preserving the number of days.
pub fn convert_import_minutes(minutes: i64, config: &EngineConfig) -> i64 {
    if config.import_minutes_per_day <= 0 {
        return minutes;
    }
    (minutes as f64 * MINUTES_PER_DAY as f64 / config.import_minutes_per_day as f64).round() as i64
}

/// Parent outline of "1.2.3" is "1.2"; top-level rows have none.
fn parent_outline(outline: &str) -> Result<Option<&str>, ImportError> {
    let valid = !outline.is_empty()
        && outline
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if !valid {
        return Err(ImportError::InvalidOutline(outline.to_string()));
    }
    Ok(outline.rfind('.').map(|pos| &outline[..pos]))
}

pub fn task_id_for(project_id: &str, uid: i64) -> String {
    format!("{}:{}", project_id, uid)
}

/// Convert parsed rows into tasks and predecessors for `project_id`.
///
/// Links to unknown uids and self-links are dropped and reported in
/// `skipped_links`; an unknown relation code fails the whole import.
pub fn import_tasks(
    project_id: &str,
    rows: &[ImportedTask],
    links: &[ImportedLink],
    config: &EngineConfig,
) -> Result<ImportBatch, ImportError> {
    let mut seen: FxHashSet<i64> = FxHashSet::default();
    let mut by_outline: FxHashMap<&str, String> = FxHashMap::default();
    for row in rows {
        if !seen.insert(row.uid) {
            return Err(ImportError::DuplicateUid(row.uid));
        }
        by_outline.insert(row.outline_number.as_str(), task_id_for(project_id, row.uid));
    }

    let mut tasks = Vec::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        let parent_id = parent_outline(&row.outline_number)?
            .and_then(|outline| by_outline.get(outline).cloned());
        let duration_minutes = convert_import_minutes(row.duration_minutes.max(0), config);
        let work_type = if duration_minutes == 0 && !row.is_summary {
            WorkType::Milestone
        } else {
            WorkType::Work
        };

        let mut task = Task {
            name: row.name.clone(),
            parent_id,
            start_date: row.start,
            end_date: row.finish,
            duration_minutes,
            work_type,
            progress: row.percent_complete.clamp(0, 100),
            is_critical_path: row.is_critical,
            sort_order: position as i32,
            outline_level: row.outline_number.split('.').count() as u32,
            wbs_code: Some(row.outline_number.clone()),
            ..Task::blank(&task_id_for(project_id, row.uid), project_id)
        };
        if work_type == WorkType::Milestone {
            task.end_date = task.start_date.or(task.end_date);
        }
        tasks.push(task);
    }

    let mut predecessors = Vec::with_capacity(links.len());
    let mut skipped_links = Vec::new();
    for link in links {
        let dependency_type = relation_from_code(link.relation_code)?;
        let reason = if link.task_uid == link.predecessor_uid {
            Some(format!("Link {} -> {} is a self-reference", link.predecessor_uid, link.task_uid))
        } else if !seen.contains(&link.task_uid) || !seen.contains(&link.predecessor_uid) {
            Some(format!("Link {} -> {} references an unknown task", link.predecessor_uid, link.task_uid))
        } else {
            None
        };
        if let Some(reason) = reason {
            log_checks!(config.verbosity, "{}", reason);
            skipped_links.push(reason);
            continue;
        }

        let task_id = task_id_for(project_id, link.task_uid);
        let predecessor_id = task_id_for(project_id, link.predecessor_uid);
        predecessors.push(Predecessor::new(
            &format!("{}->{}", predecessor_id, task_id),
            &task_id,
            &predecessor_id,
            dependency_type,
            convert_import_minutes(link.lag_minutes, config),
        ));
    }

    Ok(ImportBatch {
        tasks,
        predecessors,
        skipped_links,
    })
}
