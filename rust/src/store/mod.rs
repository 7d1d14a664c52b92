//! Record store port and best-effort batch writes.
//!
//! The engine only needs fetch-by-project, fetch-by-ids, insert, update-by-id
//! and delete-by-id. Batch updates run as independent concurrent writes; one
//! failing row never aborts the others and nothing is rolled back.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rustc_hash::FxHashSet;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::cascade::DateUpdate;
use crate::models::{Predecessor, Project, Task};

pub use memory::InMemoryRecordStore;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by record store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("duplicate {kind} identifier: {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    pub fn task_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }
}

/// Partial update of a task row. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskPatch {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_minutes: Option<i64>,
    pub is_critical_path: Option<bool>,
    pub sort_order: Option<i32>,
}

impl TaskPatch {
    pub fn critical(flag: bool) -> Self {
        Self {
            is_critical_path: Some(flag),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(start) = self.start_date {
            task.start_date = Some(start);
        }
        if let Some(end) = self.end_date {
            task.end_date = Some(end);
        }
        if let Some(minutes) = self.duration_minutes {
            task.duration_minutes = minutes;
        }
        if let Some(flag) = self.is_critical_path {
            task.is_critical_path = flag;
        }
        if let Some(order) = self.sort_order {
            task.sort_order = order;
        }
    }
}

impl From<&DateUpdate> for TaskPatch {
    fn from(update: &DateUpdate) -> Self {
        Self {
            start_date: Some(update.new_start),
            end_date: Some(update.new_end),
            duration_minutes: update.new_duration_minutes,
            ..Self::default()
        }
    }
}

/// Persistence contract used by the schedule service.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_project(&self, project_id: &str) -> StoreResult<Project>;

    /// All tasks of a project ordered by `sort_order`.
    async fn fetch_tasks(&self, project_id: &str) -> StoreResult<Vec<Task>>;

    /// Unknown ids are skipped.
    async fn fetch_tasks_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Task>>;

    /// Links whose dependent task belongs to the project.
    async fn fetch_predecessors(&self, project_id: &str) -> StoreResult<Vec<Predecessor>>;

    async fn insert_project(&self, project: &Project) -> StoreResult<()>;

    async fn insert_task(&self, task: &Task) -> StoreResult<()>;

    async fn insert_predecessor(&self, edge: &Predecessor) -> StoreResult<()>;

    /// Returns the updated row.
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> StoreResult<Task>;

    /// Deletes the task and every link referencing it; returns the number
    /// of links removed.
    async fn delete_task(&self, id: &str) -> StoreResult<usize>;

    async fn delete_predecessor(&self, id: &str) -> StoreResult<()>;

    /// Deletes the project with its tasks and links.
    async fn delete_project(&self, project_id: &str) -> StoreResult<()>;
}

/// A consistent read of one project, taken before any pure computation.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub predecessors: Vec<Predecessor>,
}

pub async fn snapshot<S: RecordStore + ?Sized>(store: &S, project_id: &str) -> StoreResult<Snapshot> {
    let project = store.fetch_project(project_id).await?;
    let tasks = store.fetch_tasks(project_id).await?;
    let predecessors = store.fetch_predecessors(project_id).await?;
    Ok(Snapshot {
        project,
        tasks,
        predecessors,
    })
}

/// Which rows of a batch were written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Sorted task ids
    pub succeeded: Vec<String>,
    /// (task id, error message), sorted by id
    pub failed: Vec<(String, String)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write every patch as an independent task. Failures are logged and
/// reported, never retried.
pub async fn batch_update<S>(store: Arc<S>, patches: Vec<(String, TaskPatch)>) -> BatchOutcome
where
    S: RecordStore + ?Sized + 'static,
{
    let mut writes: JoinSet<(String, StoreResult<Task>)> = JoinSet::new();
    let mut pending: FxHashSet<String> = FxHashSet::default();

    for (id, patch) in patches {
        let store = Arc::clone(&store);
        pending.insert(id.clone());
        writes.spawn(async move {
            let result = store.update_task(&id, &patch).await;
            (id, result)
        });
    }

    let mut outcome = BatchOutcome::default();
    while let Some(joined) = writes.join_next().await {
        match joined {
            Ok((id, Ok(_))) => {
                pending.remove(&id);
                outcome.succeeded.push(id);
            }
            Ok((id, Err(err))) => {
                pending.remove(&id);
                tracing::warn!(task_id = %id, error = %err, "batch update failed");
                outcome.failed.push((id, err.to_string()));
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "batch update task aborted");
            }
        }
    }
    // Writes that panicked or were cancelled never reported back
    for id in pending {
        outcome.failed.push((id, "write did not complete".to_string()));
    }

    outcome.succeeded.sort();
    outcome.failed.sort();
    outcome
}
