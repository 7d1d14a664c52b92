//! Schedule service: snapshot, pure computation, best-effort writes.
//!
//! All engine computations run over a snapshot fetched up front, so nothing
//! is re-read mid-computation. Writes are issued afterwards and may partially
//! fail; the caller gets the outcome and decides whether to retry.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cascade::{calculate_cascade, calculate_cascade_for_edge, CascadeError, CascadeResult, DateUpdate};
use crate::config::EngineConfig;
use crate::critical_path::{calculate_critical_path, CpmError, CpmResult};
use crate::cycles::{detect_cycles, suggest_edges_to_remove, would_create_cycle, CycleReport};
use crate::debounce::{DebounceError, Debouncer};
use crate::hierarchy::{rollup_summaries, swap_sort_order, HierarchyError};
use crate::models::{Predecessor, Task};
use crate::store::{batch_update, snapshot, BatchOutcome, RecordStore, StoreError, TaskPatch};
use crate::{log_changes, log_checks};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error(transparent)]
    Cpm(#[from] CpmError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error("Link {predecessor_id} -> {task_id} would create a circular dependency")]
    CycleRejected {
        task_id: String,
        predecessor_id: String,
    },
    #[error("{0} requires explicit confirmation")]
    ConfirmationRequired(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Caller's answer to a destructive-action prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Pending,
    Confirmed,
}

/// A finished CPM computation and its in-flight flag publication.
pub struct CriticalPathRun {
    pub result: CpmResult,
    /// Resolves once every changed flag write has completed or failed
    pub publish: JoinHandle<BatchOutcome>,
}

/// Cycle audit: every cycle with its removal candidates.
#[derive(Clone, Debug)]
pub struct CycleAudit {
    pub report: CycleReport,
    /// One candidate list per entry in `report.cycles`
    pub suggestions: Vec<Vec<Predecessor>>,
}

pub struct ScheduleService<S: RecordStore + ?Sized + 'static> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: RecordStore + ?Sized + 'static> Clone for ScheduleService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: RecordStore + ?Sized + 'static> ScheduleService<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Updates that would follow from saving `edited` (not yet persisted).
    pub async fn preview_cascade(&self, edited: &Task) -> ServiceResult<CascadeResult> {
        let snap = snapshot(self.store.as_ref(), &edited.project_id).await?;
        let mut tasks = snap.tasks;
        match tasks.iter_mut().find(|t| t.id == edited.id) {
            Some(slot) => *slot = edited.clone(),
            None => return Err(StoreError::task_not_found(&edited.id).into()),
        }
        Ok(calculate_cascade(
            &edited.id,
            &tasks,
            &snap.predecessors,
            self.config.verbosity,
        )?)
    }

    /// Persist the edited task together with its confirmed cascade.
    pub async fn apply_updates(&self, edited: Option<&Task>, updates: &[DateUpdate]) -> BatchOutcome {
        let mut patches: Vec<(String, TaskPatch)> = Vec::with_capacity(updates.len() + 1);
        if let Some(task) = edited {
            patches.push((
                task.id.clone(),
                TaskPatch {
                    start_date: task.start_date,
                    end_date: task.end_date,
                    duration_minutes: Some(task.duration_minutes),
                    ..TaskPatch::default()
                },
            ));
        }
        patches.extend(updates.iter().map(|u| (u.task_id.clone(), TaskPatch::from(u))));

        let outcome = batch_update(Arc::clone(&self.store), patches).await;
        log_changes!(
            self.config.verbosity,
            "Applied {} date update(s), {} failed",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        outcome
    }

    /// Insert a link after the pre-commit cycle guard; returns the cascade
    /// the new link implies.
    pub async fn add_predecessor(&self, project_id: &str, edge: Predecessor) -> ServiceResult<CascadeResult> {
        let existing = self.store.fetch_predecessors(project_id).await?;
        if would_create_cycle(&edge.task_id, &edge.predecessor_id, &existing) {
            log_changes!(
                self.config.verbosity,
                "Rejected link {} -> {}: circular dependency",
                edge.predecessor_id,
                edge.task_id
            );
            return Err(ServiceError::CycleRejected {
                task_id: edge.task_id,
                predecessor_id: edge.predecessor_id,
            });
        }

        self.store.insert_predecessor(&edge).await?;
        let snap = snapshot(self.store.as_ref(), project_id).await?;
        Ok(calculate_cascade_for_edge(
            &edge,
            &snap.tasks,
            &snap.predecessors,
            self.config.verbosity,
        )?)
    }

    /// Recompute CPM and publish changed `is_critical_path` flags without
    /// waiting for the writes.
    pub async fn recompute_critical_path(&self, project_id: &str) -> ServiceResult<CriticalPathRun> {
        let snap = snapshot(self.store.as_ref(), project_id).await?;
        let result = calculate_critical_path(
            project_id,
            &snap.tasks,
            &snap.predecessors,
            self.config.verbosity,
        )?;

        let patches: Vec<(String, TaskPatch)> = result
            .changed_flags(&snap.tasks)
            .into_iter()
            .map(|(id, flag)| (id, TaskPatch::critical(flag)))
            .collect();
        log_checks!(
            self.config.verbosity,
            "Publishing {} critical flag change(s) for {}",
            patches.len(),
            project_id
        );

        let store = Arc::clone(&self.store);
        let publish = tokio::spawn(async move {
            let outcome = batch_update(store, patches).await;
            if !outcome.is_complete() {
                tracing::warn!(
                    failed = outcome.failed.len(),
                    "critical flag publication partially failed"
                );
            }
            outcome
        });

        Ok(CriticalPathRun { result, publish })
    }

    /// Debounced CPM recompute: a burst of calls results in one run after
    /// the settle window.
    pub fn schedule_recompute(&self, debouncer: &Debouncer, project_id: &str) -> Result<(), DebounceError> {
        let service = self.clone();
        let project_id = project_id.to_string();
        debouncer.trigger(move || async move {
            match service.recompute_critical_path(&project_id).await {
                Ok(run) => {
                    if let Err(err) = run.publish.await {
                        tracing::error!(error = %err, "critical flag publication aborted");
                    }
                }
                Err(err) => tracing::warn!(project_id = %project_id, error = %err, "CPM recompute failed"),
            }
        })
    }

    pub async fn audit_cycles(&self, project_id: &str) -> ServiceResult<CycleAudit> {
        let snap = snapshot(self.store.as_ref(), project_id).await?;
        let report = detect_cycles(&snap.tasks, &snap.predecessors, self.config.verbosity);
        let suggestions = report
            .cycles
            .iter()
            .map(|cycle| suggest_edges_to_remove(&cycle.node_ids, &snap.predecessors))
            .collect();
        Ok(CycleAudit { report, suggestions })
    }

    /// Remove a link, e.g. to break a cycle. Never done automatically.
    pub async fn remove_predecessor(&self, edge_id: &str, confirmation: Confirmation) -> ServiceResult<()> {
        if confirmation != Confirmation::Confirmed {
            return Err(ServiceError::ConfirmationRequired(format!("Removing link {}", edge_id)));
        }
        self.store.delete_predecessor(edge_id).await?;
        log_changes!(self.config.verbosity, "Removed link {}", edge_id);
        Ok(())
    }

    pub async fn delete_project(&self, project_id: &str, confirmation: Confirmation) -> ServiceResult<()> {
        if confirmation != Confirmation::Confirmed {
            return Err(ServiceError::ConfirmationRequired(format!("Deleting project {}", project_id)));
        }
        self.store.delete_project(project_id).await?;
        log_changes!(self.config.verbosity, "Deleted project {}", project_id);
        Ok(())
    }

    /// Drag-reorder two siblings.
    pub async fn reorder(&self, task_a: &str, task_b: &str) -> ServiceResult<BatchOutcome> {
        let ids = [task_a.to_string(), task_b.to_string()];
        let mut tasks = self.store.fetch_tasks_by_ids(&ids).await?;
        swap_sort_order(&mut tasks, task_a, task_b)?;
        let patches = tasks
            .iter()
            .map(|t| {
                let patch = TaskPatch {
                    sort_order: Some(t.sort_order),
                    ..TaskPatch::default()
                };
                (t.id.clone(), patch)
            })
            .collect();
        Ok(batch_update(Arc::clone(&self.store), patches).await)
    }

    /// Re-derive summary dates and persist the ones that were stale.
    pub async fn rollup(&self, project_id: &str) -> ServiceResult<BatchOutcome> {
        let tasks = self.store.fetch_tasks(project_id).await?;
        let patches = rollup_summaries(&tasks)
            .into_iter()
            .map(|r| {
                let patch = TaskPatch {
                    start_date: Some(r.start_date),
                    end_date: Some(r.end_date),
                    duration_minutes: Some(r.duration_minutes),
                    ..TaskPatch::default()
                };
                (r.task_id, patch)
            })
            .collect();
        Ok(batch_update(Arc::clone(&self.store), patches).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Project;
    use crate::store::InMemoryRecordStore;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn service_with(tasks: Vec<Task>, edges: Vec<Predecessor>) -> ScheduleService<InMemoryRecordStore> {
        let store = InMemoryRecordStore::new();
        store.insert_project(&Project::new("p", 5)).await.unwrap();
        for task in &tasks {
            store.insert_task(task).await.unwrap();
        }
        for edge in &edges {
            store.insert_predecessor(edge).await.unwrap();
        }
        ScheduleService::new(Arc::new(store), EngineConfig::default())
    }

    fn chain() -> (Vec<Task>, Vec<Predecessor>) {
        (
            vec![
                Task::new("a", "p", date(2024, 3, 4), date(2024, 3, 6)).with_sort_order(1),
                Task::new("b", "p", date(2024, 3, 7), date(2024, 3, 8)).with_sort_order(2),
                Task::new("c", "p", date(2024, 3, 4), date(2024, 3, 4)).with_sort_order(3),
            ],
            vec![Predecessor::finish_to_start("e1", "b", "a")],
        )
    }

    #[tokio::test]
    async fn test_preview_then_apply() {
        let (tasks, edges) = chain();
        let service = service_with(tasks.clone(), edges).await;

        let mut edited = tasks[0].clone();
        edited.end_date = Some(date(2024, 3, 10));
        let preview = service.preview_cascade(&edited).await.unwrap();
        assert_eq!(preview.updates.len(), 1);
        assert_eq!(preview.updates[0].new_start, date(2024, 3, 11));

        // Nothing is written until apply
        let stored = service.store().fetch_tasks("p").await.unwrap();
        assert_eq!(stored[1].start_date, Some(date(2024, 3, 7)));

        let outcome = service.apply_updates(Some(&edited), &preview.updates).await;
        assert!(outcome.is_complete());
        let stored = service.store().fetch_tasks("p").await.unwrap();
        assert_eq!(stored[0].end_date, Some(date(2024, 3, 10)));
        assert_eq!(stored[1].start_date, Some(date(2024, 3, 11)));
    }

    #[tokio::test]
    async fn test_add_predecessor_rejects_cycle() {
        let (tasks, edges) = chain();
        let service = service_with(tasks, edges).await;

        let err = service
            .add_predecessor("p", Predecessor::finish_to_start("e2", "a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CycleRejected { .. }));
        assert_eq!(service.store().fetch_predecessors("p").await.unwrap().len(), 1);

        let self_link = service
            .add_predecessor("p", Predecessor::finish_to_start("e3", "c", "c"))
            .await;
        assert!(matches!(self_link, Err(ServiceError::CycleRejected { .. })));
    }

    #[tokio::test]
    async fn test_add_predecessor_returns_cascade() {
        let (tasks, edges) = chain();
        let service = service_with(tasks, edges).await;

        let preview = service
            .add_predecessor("p", Predecessor::finish_to_start("e2", "c", "b"))
            .await
            .unwrap();
        assert_eq!(preview.updates[0].task_id, "c");
        assert_eq!(preview.updates[0].new_start, date(2024, 3, 9));
    }

    #[tokio::test]
    async fn test_recompute_publishes_changed_flags() {
        let (tasks, edges) = chain();
        let service = service_with(tasks, edges).await;

        let run = service.recompute_critical_path("p").await.unwrap();
        assert_eq!(run.result.critical_path, vec!["a", "b"]);
        let outcome = run.publish.await.unwrap();
        assert_eq!(outcome.succeeded, vec!["a", "b"]);

        // Second run has nothing new to publish
        let again = service.recompute_critical_path("p").await.unwrap();
        assert!(again.publish.await.unwrap().succeeded.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported_not_fatal() {
        let (tasks, edges) = chain();
        let service = service_with(tasks, edges).await;
        service.store().fail_updates_for("a");

        let run = service.recompute_critical_path("p").await.unwrap();
        assert_eq!(run.result.critical_path.len(), 2);
        let outcome = run.publish.await.unwrap();
        assert_eq!(outcome.succeeded, vec!["b"]);
        assert_eq!(outcome.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_audit_and_confirmed_removal() {
        let tasks = vec![
            Task::new("a", "p", date(2024, 1, 1), date(2024, 1, 2)),
            Task::new("b", "p", date(2024, 1, 3), date(2024, 1, 4)),
        ];
        let edges = vec![
            Predecessor::finish_to_start("e1", "b", "a"),
            Predecessor::finish_to_start("e2", "a", "b"),
        ];
        let service = service_with(tasks, edges).await;

        let audit = service.audit_cycles("p").await.unwrap();
        assert!(audit.report.has_cycle);
        assert_eq!(audit.suggestions[0].len(), 2);

        let refused = service.remove_predecessor("e2", Confirmation::Pending).await;
        assert!(matches!(refused, Err(ServiceError::ConfirmationRequired(_))));
        assert!(service.audit_cycles("p").await.unwrap().report.has_cycle);

        service.remove_predecessor("e2", Confirmation::Confirmed).await.unwrap();
        assert!(!service.audit_cycles("p").await.unwrap().report.has_cycle);
    }

    #[tokio::test]
    async fn test_delete_project_needs_confirmation() {
        let (tasks, edges) = chain();
        let service = service_with(tasks, edges).await;
        assert!(service.delete_project("p", Confirmation::Pending).await.is_err());
        service.delete_project("p", Confirmation::Confirmed).await.unwrap();
        assert!(service.store().fetch_tasks("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reorder_and_rollup() {
        let tasks = vec![
            Task::new("phase", "p", date(2024, 1, 1), date(2024, 1, 1)),
            Task::new("x", "p", date(2024, 1, 2), date(2024, 1, 3)).with_parent("phase").with_sort_order(1),
            Task::new("y", "p", date(2024, 1, 4), date(2024, 1, 8)).with_parent("phase").with_sort_order(2),
        ];
        let service = service_with(tasks, vec![]).await;

        let outcome = service.reorder("x", "y").await.unwrap();
        assert!(outcome.is_complete());
        let stored = service.store().fetch_tasks_by_ids(&["x".to_string()]).await.unwrap();
        assert_eq!(stored[0].sort_order, 2);

        let rolled = service.rollup("p").await.unwrap();
        assert_eq!(rolled.succeeded, vec!["phase"]);
        let phase = service.store().fetch_tasks_by_ids(&["phase".to_string()]).await.unwrap();
        assert_eq!(phase[0].start_date, Some(date(2024, 1, 2)));
        assert_eq!(phase[0].end_date, Some(date(2024, 1, 8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_recompute_runs_once() {
        let (tasks, edges) = chain();
        let service = service_with(tasks, edges).await;
        let debouncer = Debouncer::new(Duration::from_millis(500));

        for _ in 0..3 {
            service.schedule_recompute(&debouncer, "p").unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let before = service.store().fetch_tasks("p").await.unwrap();
        assert!(before.iter().all(|t| !t.is_critical_path));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let after = service.store().fetch_tasks("p").await.unwrap();
        assert!(after[0].is_critical_path);
        assert!(after[1].is_critical_path);
        assert!(!after[2].is_critical_path);
    }
}
