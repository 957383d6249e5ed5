#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DtaskError;
use crate::task::ids::{self, IdMap};
use crate::task::model::Task;
use crate::task::query::{self, Query};
use crate::task::sort;
use crate::task::status::Status;
use crate::task::store::TaskStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub tasks: usize,
    pub resolved: usize,
    pub active: usize,
}

/// All tasks loaded for one invocation, plus the narrowed view shown to the
/// user.
///
/// Filtering and sorting only touch the view. Mutations replace records by
/// UUID and mark them for the next [`persist_all`](Self::persist_all).
#[derive(Debug)]
pub struct TaskSet<S> {
    store: S,
    tasks: Vec<Task>,
    view: Vec<usize>,
    statuses: Vec<Status>,
    id_statuses: Vec<Status>,
}

impl<S: TaskStore> TaskSet<S> {
    /// Loads every task with a status in `statuses` and numbers the ones
    /// whose status is in `id_statuses`.
    pub fn load(store: S, statuses: &[Status], id_statuses: &[Status]) -> Result<Self, DtaskError> {
        let mut tasks: Vec<Task> = store
            .load_all(statuses)?
            .into_iter()
            .filter(|t| statuses.contains(&t.status))
            .collect();
        for task in &mut tasks {
            task.write_pending = false;
        }
        tasks.sort_by_key(|t| t.uuid);
        tasks.dedup_by_key(|t| t.uuid);

        let hints = store.id_hints()?;
        ids::allocate(&mut tasks, id_statuses, &hints);
        debug!(count = tasks.len(), ?statuses, "loaded task set");

        let view = (0..tasks.len()).collect();
        Ok(Self {
            store,
            tasks,
            view,
            statuses: statuses.to_vec(),
            id_statuses: id_statuses.to_vec(),
        })
    }

    pub fn get_by_id(&self, id: u32) -> Result<Task, DtaskError> {
        self.tasks
            .iter()
            .find(|t| id != 0 && t.id == id)
            .cloned()
            .ok_or_else(|| {
                let loaded: Vec<&str> = self.statuses.iter().map(|s| s.as_str()).collect();
                DtaskError::NotFound(format!(
                    "no task with ID {id} among {} tasks; if it was resolved, look for it with show-resolved",
                    loaded.join("/")
                ))
            })
    }

    pub fn get_by_uuid(&self, uuid: Uuid) -> Result<Task, DtaskError> {
        self.index_of(uuid)
            .map(|i| self.tasks[i].clone())
            .ok_or_else(|| DtaskError::NotFound(format!("no loaded task with UUID {uuid}")))
    }

    /// Adds a new task, minting a UUID when it has none. The stored copy is
    /// returned with its display ID assigned.
    pub fn add(&mut self, mut task: Task) -> Result<Task, DtaskError> {
        if task.uuid.is_nil() {
            task.uuid = Uuid::new_v4();
        }
        task.validate()?;
        if self.index_of(task.uuid).is_some() {
            return Err(DtaskError::Validation(format!(
                "a task with UUID {} already exists",
                task.uuid
            )));
        }
        task.id = 0;
        task.write_pending = true;
        self.tasks.push(task);
        let idx = self.tasks.len() - 1;
        self.view.push(idx);
        self.renumber();
        Ok(self.tasks[idx].clone())
    }

    /// Replaces the loaded task with the same UUID. Fails for UUIDs that were
    /// not loaded, so a task dropped by a narrower load is never written back
    /// by accident.
    ///
    /// Status and timestamps are fixed here; they change only through
    /// [`start`](Self::start), [`stop`](Self::stop), [`resolve`](Self::resolve)
    /// and [`remove`](Self::remove).
    pub fn update(&mut self, task: Task) -> Result<(), DtaskError> {
        let idx = self.loaded_index(task.uuid)?;
        let current = &self.tasks[idx];
        if task.status != current.status {
            return Err(DtaskError::Validation(format!(
                "status cannot change from {} to {} by editing; use start, stop, resolve or remove",
                current.status, task.status
            )));
        }
        if task.created != current.created || task.resolved != current.resolved {
            return Err(DtaskError::Validation(
                "created and resolved times cannot be edited".to_owned(),
            ));
        }
        self.replace(idx, task)
    }

    pub fn start(&mut self, id: u32) -> Result<Task, DtaskError> {
        self.mutate(id, Task::start)
    }

    pub fn stop(&mut self, id: u32) -> Result<Task, DtaskError> {
        self.mutate(id, Task::stop)
    }

    pub fn resolve(&mut self, id: u32) -> Result<Task, DtaskError> {
        let now = OffsetDateTime::now_utc();
        self.mutate(id, |t| t.resolve(now))
    }

    pub fn comment(&mut self, id: u32, text: &str) -> Result<Task, DtaskError> {
        self.mutate(id, |t| t.add_comment(text))
    }

    pub fn remove(&mut self, id: u32) -> Result<Task, DtaskError> {
        self.mutate(id, Task::remove)
    }

    /// Applies the tags, project and priority of `query` to task `id`.
    pub fn modify(&mut self, id: u32, query: &Query) -> Result<Task, DtaskError> {
        self.mutate(id, |t| {
            query.apply_to(t);
            if !query.note.is_empty() {
                t.add_comment(query.note.clone())?;
            }
            Ok(())
        })
    }

    /// Creates a pending task from template `template_id`. Text in `query`
    /// replaces the template summary; its tags, project and priority are laid
    /// over the template's.
    pub fn instantiate(&mut self, template_id: u32, query: &Query) -> Result<Task, DtaskError> {
        let template = self.get_by_id(template_id)?;
        if template.status != Status::Template {
            return Err(DtaskError::Validation(format!(
                "task {template_id} is not a template"
            )));
        }
        let summary = if query.text.is_empty() {
            template.summary.clone()
        } else {
            query.text.clone()
        };
        let mut task = Task::new(summary);
        task.tags = template.tags;
        task.project = template.project;
        task.priority = template.priority;
        query.apply_to(&mut task);
        if !query.note.is_empty() {
            task.add_comment(query.note.clone())?;
        }
        self.add(task)
    }

    /// Narrows the view to tasks visible under `context` and `query`. The
    /// context is skipped when the query asks to ignore it.
    pub fn filter(&mut self, context: &Query, query: &Query) {
        let before = self.view.len();
        self.view
            .retain(|&i| query::visible(context, query, &self.tasks[i]));
        debug!(before, after = self.view.len(), "filtered view");
    }

    /// Narrows the view to tasks whose status is in `statuses`.
    pub fn filter_statuses(&mut self, statuses: &[Status]) {
        self.view
            .retain(|&i| statuses.contains(&self.tasks[i].status));
    }

    pub fn sort_for_display(&mut self) {
        let tasks = &self.tasks;
        self.view
            .sort_by(|&a, &b| sort::display_order(&tasks[a], &tasks[b]));
    }

    /// Re-runs ID allocation, writes every dirty task and commits once.
    /// Returns the number of records written; nothing dirty means no commit.
    pub fn persist_all(&mut self, message: &str) -> Result<usize, DtaskError> {
        let assigned = self.renumber();

        let dirty: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| self.tasks[i].write_pending)
            .collect();
        if dirty.is_empty() {
            debug!("nothing to persist");
            return Ok(0);
        }

        for &i in &dirty {
            self.store.write_one(&self.tasks[i])?;
        }
        if self.covers_id_statuses() {
            self.store.save_id_hints(&assigned)?;
        }
        self.store.commit(message)?;

        for &i in &dirty {
            self.tasks[i].write_pending = false;
        }
        info!(written = dirty.len(), commit = message, "persisted task set");
        Ok(dirty.len())
    }

    /// Tasks in the current view, in view order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.view.iter().map(|&i| &self.tasks[i])
    }

    /// Every loaded task, regardless of filtering.
    #[must_use]
    pub fn all_tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn projects(&self) -> BTreeSet<String> {
        self.tasks().filter_map(|t| t.project.clone()).collect()
    }

    #[must_use]
    pub fn tags(&self) -> BTreeSet<String> {
        self.tasks().flat_map(|t| t.tags.iter().cloned()).collect()
    }

    #[must_use]
    pub fn project_summaries(&self) -> BTreeMap<String, ProjectSummary> {
        let mut out: BTreeMap<String, ProjectSummary> = BTreeMap::new();
        for task in self.tasks() {
            let Some(project) = task.project.as_deref() else {
                continue;
            };
            let summary = out.entry(project.to_owned()).or_default();
            summary.tasks += 1;
            match task.status {
                Status::Resolved => summary.resolved += 1,
                Status::Active => summary.active += 1,
                _ => {}
            }
        }
        out
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    fn mutate(
        &mut self,
        id: u32,
        f: impl FnOnce(&mut Task) -> Result<(), DtaskError>,
    ) -> Result<Task, DtaskError> {
        let mut task = self.get_by_id(id)?;
        let uuid = task.uuid;
        f(&mut task)?;
        let idx = self.loaded_index(uuid)?;
        self.replace(idx, task)?;
        self.get_by_uuid(uuid)
    }

    fn loaded_index(&self, uuid: Uuid) -> Result<usize, DtaskError> {
        self.index_of(uuid).ok_or_else(|| {
            DtaskError::NotFound(format!(
                "task {uuid} is not in the loaded set; reload with a broader status filter"
            ))
        })
    }

    /// Stores `task` at `idx`, keeping its display ID while it still bears
    /// one. Comments are append-only.
    fn replace(&mut self, idx: usize, mut task: Task) -> Result<(), DtaskError> {
        task.validate()?;
        let current = &self.tasks[idx];
        if !task.comments.starts_with(&current.comments) {
            return Err(DtaskError::Validation(
                "comments are append-only".to_owned(),
            ));
        }
        task.id = if task.bears_id(&self.id_statuses) {
            current.id
        } else {
            0
        };
        task.write_pending = true;
        self.tasks[idx] = task;
        Ok(())
    }

    fn index_of(&self, uuid: Uuid) -> Option<usize> {
        self.tasks.iter().position(|t| t.uuid == uuid)
    }

    fn renumber(&mut self) -> IdMap {
        let current: IdMap = self
            .tasks
            .iter()
            .filter(|t| t.id != 0)
            .map(|t| (t.uuid, t.id))
            .collect();
        ids::allocate(&mut self.tasks, &self.id_statuses, &current)
    }

    fn covers_id_statuses(&self) -> bool {
        self.id_statuses.iter().all(|s| self.statuses.contains(s))
    }
}
