#![forbid(unsafe_code)]

//! Per-device state that must not be synced: the active context and the
//! display IDs handed out last time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::DtaskError;
use crate::task::ids::IdMap;
use crate::task::query::Query;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct ContextFile {
    context: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StateDir {
    dir: PathBuf,
}

impl StateDir {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn ids_path(&self) -> PathBuf {
        self.dir.join("ids.json")
    }

    #[must_use]
    pub fn context_path(&self) -> PathBuf {
        self.dir.join("context.json")
    }

    pub fn load_ids(&self) -> Result<IdMap, DtaskError> {
        Ok(read_json(&self.ids_path())?.unwrap_or_default())
    }

    pub fn save_ids(&self, ids: &IdMap) -> Result<(), DtaskError> {
        write_json(&self.ids_path(), ids)
    }

    /// Loads the active context. No file means no context.
    pub fn load_context(&self) -> Result<Query, DtaskError> {
        let file: ContextFile = read_json(&self.context_path())?.unwrap_or_default();
        let query = Query::parse(file.context.as_slice())?;
        query.validate_as_context()?;
        Ok(query)
    }

    pub fn save_context(&self, context: &Query) -> Result<(), DtaskError> {
        context.validate_as_context()?;
        write_json(
            &self.context_path(),
            &ContextFile {
                context: context.tokens(),
            },
        )
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DtaskError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path).map_err(|e| DtaskError::io(path, e))?;
    let value = serde_json::from_slice(&data).map_err(|e| DtaskError::Parse {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DtaskError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DtaskError::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(|e| DtaskError::Parse {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })?;
    std::fs::write(&tmp, &data).map_err(|e| DtaskError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| DtaskError::io(path, e))?;
    Ok(())
}
