#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::DtaskError;
use crate::task::status::{Action, Status};

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    /// Higher is more urgent.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::High => 2,
            Self::Normal => 1,
            Self::Low => 0,
        }
    }

    /// Command-line token: `P0` (critical) through `P3` (low).
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Critical => "P0",
            Self::High => "P1",
            Self::Normal => "P2",
            Self::Low => "P3",
        }
    }

    /// Parses a `P<n>` token. Returns `Ok(None)` for anything that is not
    /// shaped like a priority, and a validation error for `P<n>` outside
    /// `P0..=P3`.
    pub fn parse_token(token: &str) -> Result<Option<Self>, DtaskError> {
        let Some(digits) = token.strip_prefix('P') else {
            return Ok(None);
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Ok(None);
        }
        match digits {
            "0" => Ok(Some(Self::Critical)),
            "1" => Ok(Some(Self::High)),
            "2" => Ok(Some(Self::Normal)),
            "3" => Ok(Some(Self::Low)),
            _ => Err(DtaskError::Validation(format!(
                "unknown priority '{token}', expected P0, P1, P2 or P3"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Dense display ID, recomputed on every load. `0` means none.
    #[serde(skip)]
    pub id: u32,
    pub uuid: Uuid,
    pub status: Status,
    pub summary: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub resolved: Option<OffsetDateTime>,
    #[serde(skip)]
    pub write_pending: bool,
}

impl Task {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            id: 0,
            uuid: Uuid::new_v4(),
            status: Status::Pending,
            summary: summary.into(),
            tags: BTreeSet::new(),
            project: None,
            priority: Priority::Normal,
            comments: Vec::new(),
            created: OffsetDateTime::now_utc(),
            resolved: None,
            write_pending: true,
        }
    }

    pub fn validate(&self) -> Result<(), DtaskError> {
        if self.summary.trim().is_empty() {
            return Err(DtaskError::Validation("summary must not be empty".to_owned()));
        }
        if let Some(tag) = self
            .tags
            .iter()
            .find(|t| t.is_empty() || t.chars().any(char::is_whitespace))
        {
            return Err(DtaskError::Validation(format!("invalid tag '{tag}'")));
        }
        if let Some(project) = self.project.as_deref()
            && (project.is_empty() || project.chars().any(char::is_whitespace))
        {
            return Err(DtaskError::Validation(format!(
                "invalid project '{project}'"
            )));
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DtaskError> {
        self.status = self.status.apply(Action::Start)?;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), DtaskError> {
        self.status = self.status.apply(Action::Stop)?;
        Ok(())
    }

    /// Resolves the task and stamps `resolved` with `now`.
    pub fn resolve(&mut self, now: OffsetDateTime) -> Result<(), DtaskError> {
        self.status = self.status.apply(Action::Resolve)?;
        self.resolved = Some(now);
        Ok(())
    }

    pub fn remove(&mut self) -> Result<(), DtaskError> {
        self.status = self.status.apply(Action::Remove)?;
        Ok(())
    }

    pub fn add_comment(&mut self, text: impl Into<String>) -> Result<(), DtaskError> {
        if !self.status.accepts_comments() {
            return Err(DtaskError::CommentsClosed(self.status));
        }
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DtaskError::Validation("comment must not be empty".to_owned()));
        }
        self.comments.push(text);
        Ok(())
    }

    /// Whether this task receives a display ID under `id_statuses`.
    #[must_use]
    pub fn bears_id(&self, id_statuses: &[Status]) -> bool {
        id_statuses.contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn priority_tokens() {
        assert_eq!(Priority::parse_token("P0").unwrap(), Some(Priority::Critical));
        assert_eq!(Priority::parse_token("P3").unwrap(), Some(Priority::Low));
        assert_eq!(Priority::parse_token("Paris").unwrap(), None);
        assert_eq!(Priority::parse_token("P").unwrap(), None);
        assert!(Priority::parse_token("P4").is_err());
        for p in Priority::ALL {
            assert_eq!(Priority::parse_token(p.token()).unwrap(), Some(p));
        }
    }

    #[test]
    fn empty_summary_is_rejected() {
        let task = Task::new("   ");
        assert!(matches!(task.validate(), Err(DtaskError::Validation(_))));
        assert!(Task::new("Buy milk").validate().is_ok());
    }

    #[test]
    fn tags_with_whitespace_are_rejected() {
        let mut task = Task::new("x");
        task.tags.insert("two words".to_owned());
        assert!(task.validate().is_err());
    }

    #[test]
    fn resolve_sets_timestamp_once() {
        let mut task = Task::new("x");
        task.resolve(fixed_time()).unwrap();
        assert_eq!(task.status, Status::Resolved);
        assert_eq!(task.resolved, Some(fixed_time()));

        let later = fixed_time() + time::Duration::hours(1);
        assert!(task.resolve(later).is_err());
        assert_eq!(task.resolved, Some(fixed_time()));
    }

    #[test]
    fn comments_append_in_order() {
        let mut task = Task::new("x");
        task.add_comment("first").unwrap();
        task.add_comment("second").unwrap();
        assert_eq!(task.comments, vec!["first", "second"]);

        task.resolve(fixed_time()).unwrap();
        let err = task.add_comment("third").unwrap_err();
        assert!(matches!(err, DtaskError::CommentsClosed(Status::Resolved)));
        assert_eq!(err.to_string(), "cannot comment on a task that is resolved");
        assert_eq!(task.comments.len(), 2);
    }

    #[test]
    fn yaml_record_round_trips() {
        let mut task = Task::new("Call bank");
        task.created = fixed_time();
        task.project = Some("finance".to_owned());
        task.tags.insert("phone".to_owned());
        task.priority = Priority::High;
        task.comments.push("ask about fees".to_owned());
        task.resolve(fixed_time() + time::Duration::minutes(5)).unwrap();
        task.id = 7;

        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(!yaml.contains("write_pending"));
        assert!(yaml.contains("priority: high"));

        let mut back: Task = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.id, 0);
        back.id = task.id;
        back.write_pending = task.write_pending;
        assert_eq!(back, task);
    }

    #[test]
    fn missing_priority_reads_as_normal() {
        let yaml = "uuid: 5f0c9a1e-3a38-4e0c-9f7e-0c6f8d3b2a11\nstatus: pending\nsummary: hi\ncreated: 2023-11-14T22:13:20Z\n";
        let task: Task = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.priority, Priority::Normal);
        assert!(task.tags.is_empty());
        assert!(task.resolved.is_none());
    }
}
