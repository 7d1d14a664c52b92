//! Rust implementation of the Gantt scheduling engine.
//!
//! Duration model, dependency cycle detection, predecessor cascade, critical
//! path analysis, buffer and capacity evaluation, exposed to Python through
//! the `rust` extension module and usable directly from Rust.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use std::collections::HashSet;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

pub mod logging;

pub mod buffer;
pub mod calendar;
pub mod capacity;
pub mod cascade;
mod config;
pub mod critical_path;
pub mod cycles;
pub mod debounce;
pub mod duration;
mod graph;
pub mod hierarchy;
pub mod import;
mod interner;
mod models;
pub mod service;
pub mod store;

pub use buffer::{compute_project_buffer, suggest_buffer_days, BufferError, BufferReport, BufferStatus, TargetStatus};
pub use calendar::WorkCalendar;
pub use capacity::{
    resolve_capacity, CapacityError, CapacityRequest, CapacityResolution, ResolutionKind, ResolutionOption,
};
pub use cascade::{calculate_cascade, calculate_cascade_for_edge, CascadeError, CascadeResult, DateUpdate, UpdateKind};
pub use config::EngineConfig;
pub use critical_path::{calculate_critical_path, CpmError, CpmResult, TaskTiming};
pub use cycles::{detect_cycles, suggest_edges_to_remove, would_create_cycle, Cycle, CycleReport};
pub use duration::{DurationError, DurationFormat, ValidationOutcome};
pub use hierarchy::{HierarchyError, SummaryRollup};
pub use import::{import_tasks, ImportBatch, ImportError, ImportedLink, ImportedTask};
pub use models::{Complexity, DependencyType, Predecessor, Project, Task, WorkType};
pub use service::{Confirmation, ScheduleService, ServiceError};
pub use store::{InMemoryRecordStore, RecordStore, StoreError, TaskPatch};

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Parse "2d", "3.5h", "90m" or "1d 4h" into minutes.
///
/// # Raises
/// * ValueError on empty or malformed input
#[pyfunction]
#[pyo3(name = "parse_duration")]
fn py_parse_duration(input: &str) -> PyResult<i64> {
    duration::parse_duration(input).map_err(value_error)
}

#[pyfunction]
#[pyo3(name = "format_duration", signature = (minutes, mode=DurationFormat::Auto))]
fn py_format_duration(minutes: i64, mode: DurationFormat) -> String {
    duration::format_duration(minutes, mode)
}

#[pyfunction]
#[pyo3(name = "days_to_minutes")]
fn py_days_to_minutes(days: f64) -> i64 {
    duration::days_to_minutes(days)
}

#[pyfunction]
#[pyo3(name = "minutes_to_days")]
fn py_minutes_to_days(minutes: i64) -> f64 {
    duration::minutes_to_days(minutes)
}

/// Validate a duration for a work type; never raises.
#[pyfunction]
#[pyo3(name = "validate_duration", signature = (minutes, work_type, config=None))]
fn py_validate_duration(minutes: i64, work_type: WorkType, config: Option<EngineConfig>) -> ValidationOutcome {
    let config = config.unwrap_or_default();
    duration::validate_duration(minutes, work_type, config.max_duration_minutes).into()
}

/// Scan a project's links for circular dependencies.
#[pyfunction]
#[pyo3(name = "detect_cycles", signature = (tasks, predecessors, verbosity=0))]
fn py_detect_cycles(tasks: Vec<Task>, predecessors: Vec<Predecessor>, verbosity: u8) -> CycleReport {
    detect_cycles(&tasks, &predecessors, verbosity)
}

/// Whether adding `predecessor_id -> task_id` would close a loop.
#[pyfunction]
#[pyo3(name = "would_create_cycle")]
fn py_would_create_cycle(task_id: &str, predecessor_id: &str, predecessors: Vec<Predecessor>) -> bool {
    would_create_cycle(task_id, predecessor_id, &predecessors)
}

#[pyfunction]
#[pyo3(name = "suggest_edges_to_remove")]
fn py_suggest_edges_to_remove(node_ids: HashSet<String>, predecessors: Vec<Predecessor>) -> Vec<Predecessor> {
    suggest_edges_to_remove(&node_ids, &predecessors)
}

/// Propose date updates after `changed_task_id` moved.
///
/// `tasks` must already carry the changed task's new dates. Nothing is
/// mutated; the caller applies the result after confirmation.
///
/// # Raises
/// * ValueError if the changed task is unknown
#[pyfunction]
#[pyo3(name = "calculate_cascade", signature = (changed_task_id, tasks, predecessors, verbosity=0))]
fn py_calculate_cascade(
    changed_task_id: &str,
    tasks: Vec<Task>,
    predecessors: Vec<Predecessor>,
    verbosity: u8,
) -> PyResult<CascadeResult> {
    calculate_cascade(changed_task_id, &tasks, &predecessors, verbosity).map_err(value_error)
}

/// Propose date updates after a link's type or lag was edited.
#[pyfunction]
#[pyo3(name = "calculate_cascade_for_edge", signature = (edge, tasks, predecessors, verbosity=0))]
fn py_calculate_cascade_for_edge(
    edge: Predecessor,
    tasks: Vec<Task>,
    predecessors: Vec<Predecessor>,
    verbosity: u8,
) -> PyResult<CascadeResult> {
    calculate_cascade_for_edge(&edge, &tasks, &predecessors, verbosity).map_err(value_error)
}

/// Forward and backward pass over a project's leaf tasks.
///
/// # Raises
/// * ValueError if the links contain a circular dependency
#[pyfunction]
#[pyo3(name = "calculate_critical_path", signature = (project_id, tasks, predecessors, verbosity=0))]
fn py_calculate_critical_path(
    project_id: &str,
    tasks: Vec<Task>,
    predecessors: Vec<Predecessor>,
    verbosity: u8,
) -> PyResult<CpmResult> {
    calculate_critical_path(project_id, &tasks, &predecessors, verbosity).map_err(value_error)
}

#[pyfunction]
#[pyo3(name = "compute_project_buffer", signature = (project, tasks, config=None))]
fn py_compute_project_buffer(project: Project, tasks: Vec<Task>, config: Option<EngineConfig>) -> PyResult<BufferReport> {
    compute_project_buffer(&project, &tasks, &config.unwrap_or_default()).map_err(value_error)
}

#[pyfunction]
#[pyo3(name = "suggest_buffer_days")]
fn py_suggest_buffer_days(duration_days: i64, complexity: Complexity) -> i64 {
    suggest_buffer_days(duration_days, complexity)
}

/// Overflow options for an allocation, or None when it fits.
#[pyfunction]
#[pyo3(name = "resolve_capacity", signature = (request, calendar=None, config=None))]
fn py_resolve_capacity(
    request: CapacityRequest,
    calendar: Option<WorkCalendar>,
    config: Option<EngineConfig>,
) -> PyResult<Option<CapacityResolution>> {
    resolve_capacity(
        &request,
        &calendar.unwrap_or_default(),
        &config.unwrap_or_default(),
    )
    .map_err(value_error)
}

#[pyfunction]
#[pyo3(name = "import_tasks", signature = (project_id, rows, links, config=None))]
fn py_import_tasks(
    project_id: &str,
    rows: Vec<ImportedTask>,
    links: Vec<ImportedLink>,
    config: Option<EngineConfig>,
) -> PyResult<ImportBatch> {
    import_tasks(project_id, &rows, &links, &config.unwrap_or_default()).map_err(value_error)
}

/// Summary dates that differ from their children's span.
#[pyfunction]
#[pyo3(name = "rollup_summaries")]
fn py_rollup_summaries(tasks: Vec<Task>) -> Vec<SummaryRollup> {
    hierarchy::rollup_summaries(&tasks)
}

/// Recompute outline levels and WBS codes; returns the updated tasks.
#[pyfunction]
#[pyo3(name = "assign_outline")]
fn py_assign_outline(mut tasks: Vec<Task>) -> Vec<Task> {
    hierarchy::assign_outline(&mut tasks);
    tasks
}

/// Install the stderr tracing subscriber. Returns False if one exists.
#[pyfunction]
#[pyo3(name = "init_logging", signature = (filter=None))]
fn py_init_logging(filter: Option<&str>) -> bool {
    logging::init_logging(filter)
}

/// The gantt.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<WorkType>()?;
    m.add_class::<DependencyType>()?;
    m.add_class::<Complexity>()?;
    m.add_class::<Task>()?;
    m.add_class::<Predecessor>()?;
    m.add_class::<Project>()?;
    m.add_class::<EngineConfig>()?;
    m.add_class::<WorkCalendar>()?;

    // Results
    m.add_class::<DurationFormat>()?;
    m.add_class::<ValidationOutcome>()?;
    m.add_class::<Cycle>()?;
    m.add_class::<CycleReport>()?;
    m.add_class::<UpdateKind>()?;
    m.add_class::<DateUpdate>()?;
    m.add_class::<CascadeResult>()?;
    m.add_class::<TaskTiming>()?;
    m.add_class::<CpmResult>()?;
    m.add_class::<BufferStatus>()?;
    m.add_class::<TargetStatus>()?;
    m.add_class::<BufferReport>()?;
    m.add_class::<ResolutionKind>()?;
    m.add_class::<CapacityRequest>()?;
    m.add_class::<ResolutionOption>()?;
    m.add_class::<CapacityResolution>()?;
    m.add_class::<SummaryRollup>()?;
    m.add_class::<ImportedTask>()?;
    m.add_class::<ImportedLink>()?;
    m.add_class::<ImportBatch>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(py_parse_duration, m)?)?;
    m.add_function(wrap_pyfunction!(py_format_duration, m)?)?;
    m.add_function(wrap_pyfunction!(py_days_to_minutes, m)?)?;
    m.add_function(wrap_pyfunction!(py_minutes_to_days, m)?)?;
    m.add_function(wrap_pyfunction!(py_validate_duration, m)?)?;
    m.add_function(wrap_pyfunction!(py_detect_cycles, m)?)?;
    m.add_function(wrap_pyfunction!(py_would_create_cycle, m)?)?;
    m.add_function(wrap_pyfunction!(py_suggest_edges_to_remove, m)?)?;
    m.add_function(wrap_pyfunction!(py_calculate_cascade, m)?)?;
    m.add_function(wrap_pyfunction!(py_calculate_cascade_for_edge, m)?)?;
    m.add_function(wrap_pyfunction!(py_calculate_critical_path, m)?)?;
    m.add_function(wrap_pyfunction!(py_compute_project_buffer, m)?)?;
    m.add_function(wrap_pyfunction!(py_suggest_buffer_days, m)?)?;
    m.add_function(wrap_pyfunction!(py_resolve_capacity, m)?)?;
    m.add_function(wrap_pyfunction!(py_import_tasks, m)?)?;
    m.add_function(wrap_pyfunction!(py_rollup_summaries, m)?)?;
    m.add_function(wrap_pyfunction!(py_assign_outline, m)?)?;
    m.add_function(wrap_pyfunction!(py_init_logging, m)?)?;

    Ok(())
}
