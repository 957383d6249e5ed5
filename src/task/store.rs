#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::DtaskError;
use crate::task::ids::IdMap;
use crate::task::model::Task;
use crate::task::status::Status;

/// Persistence port used by [`TaskSet`](crate::task::set::TaskSet).
///
/// Records are keyed by UUID. Implementations must not commit from
/// [`write_one`](Self::write_one); a persist pass writes every record first
/// and then calls [`commit`](Self::commit) once.
pub trait TaskStore {
    /// Loads every task whose status is in `statuses`.
    fn load_all(&self, statuses: &[Status]) -> Result<Vec<Task>, DtaskError>;

    /// Writes (or, for deleted tasks, removes) a single record.
    fn write_one(&mut self, task: &Task) -> Result<(), DtaskError>;

    fn commit(&mut self, message: &str) -> Result<(), DtaskError>;

    /// Display IDs handed out by the previous persist pass.
    fn id_hints(&self) -> Result<IdMap, DtaskError>;

    fn save_id_hints(&mut self, ids: &IdMap) -> Result<(), DtaskError>;
}

/// Store that keeps everything in memory. Commits are recorded as messages.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tasks: BTreeMap<Uuid, Task>,
    hints: IdMap,
    commits: Vec<String>,
    writes: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut store = Self::new();
        for mut task in tasks {
            task.id = 0;
            task.write_pending = false;
            store.tasks.insert(task.uuid, task);
        }
        store
    }

    #[must_use]
    pub fn commits(&self) -> &[String] {
        &self.commits
    }

    /// Number of records written since creation.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }

    #[must_use]
    pub fn get(&self, uuid: &Uuid) -> Option<&Task> {
        self.tasks.get(uuid)
    }
}

impl TaskStore for MemoryStore {
    fn load_all(&self, statuses: &[Status]) -> Result<Vec<Task>, DtaskError> {
        Ok(self
            .tasks
            .values()
            .filter(|t| statuses.contains(&t.status))
            .cloned()
            .collect())
    }

    fn write_one(&mut self, task: &Task) -> Result<(), DtaskError> {
        self.writes += 1;
        if task.status == Status::Deleted {
            self.tasks.remove(&task.uuid);
            return Ok(());
        }
        let mut stored = task.clone();
        stored.id = 0;
        stored.write_pending = false;
        self.tasks.insert(stored.uuid, stored);
        Ok(())
    }

    fn commit(&mut self, message: &str) -> Result<(), DtaskError> {
        self.commits.push(message.to_owned());
        Ok(())
    }

    fn id_hints(&self) -> Result<IdMap, DtaskError> {
        Ok(self.hints.clone())
    }

    fn save_id_hints(&mut self, ids: &IdMap) -> Result<(), DtaskError> {
        self.hints.clone_from(ids);
        Ok(())
    }
}
