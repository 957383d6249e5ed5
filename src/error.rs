#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

use crate::task::status::{Action, Status};

#[derive(Debug, Error)]
pub enum DtaskError {
    #[error("invalid task data: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("cannot {action} a task that is {from}")]
    InvalidTransition { action: Action, from: Status },

    #[error("cannot comment on a task that is {0}")]
    CommentsClosed(Status),

    #[error("git is required but was not found in PATH")]
    GitNotFound,

    #[error("git error: {0}")]
    Vcs(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("io error at {}: {source}", .path.display())]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {msg}", .path.display())]
    Parse { path: PathBuf, msg: String },
}

impl DtaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = DtaskError> = std::result::Result<T, E>;
