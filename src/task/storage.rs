#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::git::Git;
use crate::core::state::StateDir;
use crate::error::DtaskError;
use crate::task::ids::IdMap;
use crate::task::model::Task;
use crate::task::status::{self, Status};
use crate::task::store::TaskStore;

/// File-per-task store inside a git repository.
///
/// Each task lives at `<repo>/<status>/<uuid>.yml`; the directory is the
/// authoritative status. Display-ID hints live in the local state dir.
#[derive(Debug, Clone)]
pub struct TaskStorage {
    git: Git,
    state: StateDir,
}

impl TaskStorage {
    #[must_use]
    pub fn new(repo: PathBuf, state: StateDir) -> Self {
        Self {
            git: Git::new(repo),
            state,
        }
    }

    #[must_use]
    pub fn repo(&self) -> &Path {
        self.git.repo_root()
    }

    #[must_use]
    pub fn git(&self) -> &Git {
        &self.git
    }

    #[must_use]
    pub fn state(&self) -> &StateDir {
        &self.state
    }

    #[must_use]
    pub fn task_path(&self, status: Status, uuid: Uuid) -> PathBuf {
        self.status_dir(status).join(format!("{uuid}.yml"))
    }

    fn status_dir(&self, status: Status) -> PathBuf {
        self.repo().join(status.as_str())
    }

    /// UUID-named record files under one status directory.
    fn record_paths(&self, status: Status) -> Result<Vec<(Uuid, PathBuf)>, DtaskError> {
        let dir = self.status_dir(status);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| DtaskError::io(&dir, e))? {
            let path = entry.map_err(|e| DtaskError::io(&dir, e))?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("yml") {
                continue;
            }
            let Some(uuid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                warn!(path = %path.display(), "skipping file without a UUID name");
                continue;
            };
            records.push((uuid, path));
        }
        Ok(records)
    }

    fn load_dir(&self, status: Status) -> Result<Vec<Task>, DtaskError> {
        let mut tasks = Vec::new();
        for (stem_uuid, path) in self.record_paths(status)? {
            let mut task = read_task(&path)?;
            if task.uuid != stem_uuid {
                warn!(path = %path.display(), record = %task.uuid, "record UUID differs from file name, using file name");
                task.uuid = stem_uuid;
            }
            if task.status != status {
                debug!(path = %path.display(), recorded = %task.status, "status taken from directory");
                task.status = status;
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    fn remove_copies(&self, uuid: Uuid, keep: Option<Status>) -> Result<(), DtaskError> {
        for &other in status::ALL {
            if Some(other) == keep {
                continue;
            }
            let path = self.task_path(other, uuid);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| DtaskError::io(&path, e))?;
                debug!(path = %path.display(), "removed stale record");
            }
        }
        Ok(())
    }
}

impl TaskStore for TaskStorage {
    fn load_all(&self, statuses: &[Status]) -> Result<Vec<Task>, DtaskError> {
        let mut by_uuid: BTreeMap<Uuid, Task> = BTreeMap::new();
        for &status in statuses {
            if status == Status::Deleted {
                continue;
            }
            for task in self.load_dir(status)? {
                match by_uuid.get(&task.uuid) {
                    Some(existing) if existing.status.precedence() >= task.status.precedence() => {
                        warn!(uuid = %task.uuid, kept = %existing.status, dropped = %task.status, "duplicate task record");
                    }
                    Some(existing) => {
                        warn!(uuid = %task.uuid, kept = %task.status, dropped = %existing.status, "duplicate task record");
                        by_uuid.insert(task.uuid, task);
                    }
                    None => {
                        by_uuid.insert(task.uuid, task);
                    }
                }
            }
        }

        // A copy in a directory that was not requested can still outrank the
        // loaded one; such tasks are left out rather than shown in a stale state.
        for &other in status::ALL {
            if statuses.contains(&other) {
                continue;
            }
            for (uuid, _) in self.record_paths(other)? {
                if let Some(existing) = by_uuid.get(&uuid)
                    && other.precedence() > existing.status.precedence()
                {
                    warn!(uuid = %uuid, kept = %other, dropped = %existing.status, "duplicate task record");
                    by_uuid.remove(&uuid);
                }
            }
        }

        debug!(repo = %self.repo().display(), count = by_uuid.len(), "read task records");
        Ok(by_uuid.into_values().collect())
    }

    fn write_one(&mut self, task: &Task) -> Result<(), DtaskError> {
        if task.status == Status::Deleted {
            return self.remove_copies(task.uuid, None);
        }

        let dir = self.status_dir(task.status);
        std::fs::create_dir_all(&dir).map_err(|e| DtaskError::io(&dir, e))?;
        let path = self.task_path(task.status, task.uuid);
        let tmp = path.with_extension("yml.tmp");
        let data = serde_yaml::to_string(task).map_err(|e| DtaskError::Parse {
            path: path.clone(),
            msg: e.to_string(),
        })?;
        std::fs::write(&tmp, data.as_bytes()).map_err(|e| DtaskError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| DtaskError::io(&path, e))?;
        debug!(path = %path.display(), "wrote task record");

        self.remove_copies(task.uuid, Some(task.status))
    }

    fn commit(&mut self, message: &str) -> Result<(), DtaskError> {
        self.git.init()?;
        self.git.commit_all(message)
    }

    fn id_hints(&self) -> Result<IdMap, DtaskError> {
        self.state.load_ids()
    }

    fn save_id_hints(&mut self, ids: &IdMap) -> Result<(), DtaskError> {
        self.state.save_ids(ids)
    }
}

fn read_task(path: &Path) -> Result<Task, DtaskError> {
    let data = std::fs::read_to_string(path).map_err(|e| DtaskError::io(path, e))?;
    serde_yaml::from_str(&data).map_err(|e| DtaskError::Parse {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })
}
