#![forbid(unsafe_code)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info};

use crate::error::DtaskError;

/// Thin wrapper over the `git` executable, rooted at the task repository.
#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    #[must_use]
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }

    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    #[must_use]
    pub fn is_repo(&self) -> bool {
        let candidate = self.repo_root.join(".git");
        candidate.is_dir() || candidate.is_file()
    }

    /// Creates the repository directory and runs `git init` when needed.
    pub fn init(&self) -> Result<(), DtaskError> {
        std::fs::create_dir_all(&self.repo_root)
            .map_err(|e| DtaskError::io(&self.repo_root, e))?;
        if self.is_repo() {
            return Ok(());
        }
        let _ = self.run(&["init", "--quiet"])?;
        info!(repo = %self.repo_root.display(), "initialised task repository");
        Ok(())
    }

    /// Stages everything and commits with `message`. A clean tree is not an
    /// error; nothing is committed.
    pub fn commit_all(&self, message: &str) -> Result<(), DtaskError> {
        let _ = self.run(&["add", "--all", "."])?;
        let status = self.run(&["status", "--porcelain"])?;
        if status.trim().is_empty() {
            debug!("working tree clean, skipping commit");
            return Ok(());
        }
        let _ = self.run(&["commit", "--no-gpg-sign", "--quiet", "-m", message])?;
        info!(commit = message, "committed");
        Ok(())
    }

    /// Pulls then pushes the current branch.
    pub fn sync(&self) -> Result<(), DtaskError> {
        let remotes = self.run(&["remote"])?;
        if remotes.trim().is_empty() {
            return Err(DtaskError::Vcs(
                "no remote configured; add one with `dtask git remote add origin <url>`".to_owned(),
            ));
        }
        let _ = self.run(&["pull", "--no-edit", "--quiet"])?;
        let _ = self.run(&["push", "--quiet"])?;
        Ok(())
    }

    /// Reverts the most recent commit.
    pub fn undo(&self) -> Result<String, DtaskError> {
        let subject = self.run(&["log", "-1", "--pretty=format:%s"])?;
        let _ = self.run(&["revert", "--no-edit", "--no-gpg-sign", "HEAD"])?;
        Ok(subject.trim().to_owned())
    }

    /// Runs git with inherited stdio and returns its exit code.
    pub fn passthrough<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<i32, DtaskError> {
        let status = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .status()
            .map_err(map_spawn_error)?;
        Ok(status.code().unwrap_or(1))
    }

    pub fn run(&self, args: &[&str]) -> Result<String, DtaskError> {
        let out = self.run_raw(args)?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr);
            Err(DtaskError::Vcs(format!(
                "git {}: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }

    pub fn run_raw(&self, args: &[&str]) -> Result<Output, DtaskError> {
        debug!(?args, "running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(map_spawn_error)
    }
}

fn map_spawn_error(e: std::io::Error) -> DtaskError {
    match e.kind() {
        std::io::ErrorKind::NotFound => DtaskError::GitNotFound,
        _ => DtaskError::Vcs(format!("failed to run git: {e}")),
    }
}
