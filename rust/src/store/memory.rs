//! In-memory record store for tests and embedding.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{RecordStore, StoreError, StoreResult, TaskPatch};
use crate::models::{Predecessor, Project, Task};

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    projects: FxHashMap<String, Project>,
    tasks: FxHashMap<String, Task>,
    predecessors: FxHashMap<String, Predecessor>,
    /// Task ids whose updates fail with a persistence error
    failing_updates: FxHashSet<String>,
}

impl InMemoryState {
    fn project_task_ids(&self, project_id: &str) -> FxHashSet<&str> {
        self.tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .map(|t| t.id.as_str())
            .collect()
    }

    /// Drops every link touching `task_id`; returns how many were removed.
    fn remove_links_of(&mut self, task_id: &str) -> usize {
        let before = self.predecessors.len();
        self.predecessors
            .retain(|_, e| e.task_id != task_id && e.predecessor_id != task_id);
        before - self.predecessors.len()
    }
}

fn lock_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::persistence(std::io::Error::other(err.to_string()))
}

fn sorted_tasks<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<Task> {
    let mut tasks: Vec<Task> = tasks.cloned().collect();
    tasks.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
    tasks
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `update_task` on `task_id` fail.
    pub fn fail_updates_for(&self, task_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state.failing_updates.insert(task_id.to_string());
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, InMemoryState>> {
        self.state.read().map_err(lock_error)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, InMemoryState>> {
        self.state.write().map_err(lock_error)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_project(&self, project_id: &str) -> StoreResult<Project> {
        let state = self.read()?;
        state
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "project",
                id: project_id.to_string(),
            })
    }

    async fn fetch_tasks(&self, project_id: &str) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(sorted_tasks(
            state.tasks.values().filter(|t| t.project_id == project_id),
        ))
    }

    async fn fetch_tasks_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(sorted_tasks(ids.iter().filter_map(|id| state.tasks.get(id))))
    }

    async fn fetch_predecessors(&self, project_id: &str) -> StoreResult<Vec<Predecessor>> {
        let state = self.read()?;
        let own = state.project_task_ids(project_id);
        let mut edges: Vec<Predecessor> = state
            .predecessors
            .values()
            .filter(|e| own.contains(e.task_id.as_str()))
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    async fn insert_project(&self, project: &Project) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.projects.contains_key(&project.id) {
            return Err(StoreError::Duplicate {
                kind: "project",
                id: project.id.clone(),
            });
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate {
                kind: "task",
                id: task.id.clone(),
            });
        }
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn insert_predecessor(&self, edge: &Predecessor) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.predecessors.contains_key(&edge.id) {
            return Err(StoreError::Duplicate {
                kind: "predecessor",
                id: edge.id.clone(),
            });
        }
        for endpoint in [&edge.task_id, &edge.predecessor_id] {
            if !state.tasks.contains_key(endpoint) {
                return Err(StoreError::task_not_found(endpoint));
            }
        }
        state.predecessors.insert(edge.id.clone(), edge.clone());
        Ok(())
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> StoreResult<Task> {
        let mut state = self.write()?;
        if state.failing_updates.contains(id) {
            return Err(StoreError::persistence(std::io::Error::other(format!(
                "write rejected for {}",
                id
            ))));
        }
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::task_not_found(id))?;
        patch.apply(task);
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &str) -> StoreResult<usize> {
        let mut state = self.write()?;
        if state.tasks.remove(id).is_none() {
            return Err(StoreError::task_not_found(id));
        }
        Ok(state.remove_links_of(id))
    }

    async fn delete_predecessor(&self, id: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        state
            .predecessors
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "predecessor",
                id: id.to_string(),
            })
    }

    async fn delete_project(&self, project_id: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.projects.remove(project_id).is_none() {
            return Err(StoreError::NotFound {
                kind: "project",
                id: project_id.to_string(),
            });
        }
        let task_ids: Vec<String> = state
            .project_task_ids(project_id)
            .into_iter()
            .map(str::to_string)
            .collect();
        for id in &task_ids {
            state.tasks.remove(id);
            state.remove_links_of(id);
        }
        Ok(())
    }
}
