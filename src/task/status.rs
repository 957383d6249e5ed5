#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DtaskError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Active,
    Paused,
    Resolved,
    Template,
    Deleted,
}

/// Statuses shown by default: everything that still needs attention.
pub const NON_RESOLVED: &[Status] = &[
    Status::Pending,
    Status::Active,
    Status::Paused,
    Status::Template,
];

/// Every status that has a directory in the repository.
pub const ALL: &[Status] = &[
    Status::Pending,
    Status::Active,
    Status::Paused,
    Status::Resolved,
    Status::Template,
];

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Resolved => "resolved",
            Self::Template => "template",
            Self::Deleted => "deleted",
        }
    }

    /// Rank used to pick a winner when a merge leaves the same task in two
    /// status directories.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Template => 0,
            Self::Pending => 1,
            Self::Active => 2,
            Self::Paused => 3,
            Self::Resolved => 4,
            Self::Deleted => 5,
        }
    }

    #[must_use]
    pub const fn accepts_comments(self) -> bool {
        !matches!(self, Self::Resolved | Self::Deleted)
    }

    /// Returns the status reached by applying `action`, or
    /// [`DtaskError::InvalidTransition`] when the edge does not exist.
    pub fn apply(self, action: Action) -> Result<Self, DtaskError> {
        let next = match (action, self) {
            (Action::Start, Self::Pending) => Self::Active,
            (Action::Stop, Self::Active) => Self::Pending,
            (Action::Resolve, Self::Pending | Self::Active | Self::Paused) => Self::Resolved,
            (Action::Remove, from) if from != Self::Deleted => Self::Deleted,
            (action, from) => return Err(DtaskError::InvalidTransition { action, from }),
        };
        Ok(next)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Status {
    type Error = DtaskError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "resolved" => Ok(Self::Resolved),
            "template" => Ok(Self::Template),
            "deleted" => Ok(Self::Deleted),
            _ => Err(DtaskError::Validation(format!("unknown status '{value}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Resolve,
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Resolve => "resolve",
            Self::Remove => "remove",
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Status::Pending, Action::Start, Some(Status::Active))]
    #[case(Status::Active, Action::Start, None)]
    #[case(Status::Paused, Action::Start, None)]
    #[case(Status::Resolved, Action::Start, None)]
    #[case(Status::Template, Action::Start, None)]
    #[case(Status::Active, Action::Stop, Some(Status::Pending))]
    #[case(Status::Pending, Action::Stop, None)]
    #[case(Status::Paused, Action::Stop, None)]
    #[case(Status::Template, Action::Stop, None)]
    #[case(Status::Pending, Action::Resolve, Some(Status::Resolved))]
    #[case(Status::Active, Action::Resolve, Some(Status::Resolved))]
    #[case(Status::Paused, Action::Resolve, Some(Status::Resolved))]
    #[case(Status::Resolved, Action::Resolve, None)]
    #[case(Status::Template, Action::Resolve, None)]
    #[case(Status::Resolved, Action::Remove, Some(Status::Deleted))]
    #[case(Status::Template, Action::Remove, Some(Status::Deleted))]
    #[case(Status::Deleted, Action::Remove, None)]
    fn apply_follows_the_transition_table(
        #[case] from: Status,
        #[case] action: Action,
        #[case] expected: Option<Status>,
    ) {
        assert_eq!(from.apply(action).ok(), expected);
    }

    #[test]
    fn illegal_transition_reports_action_and_state() {
        let err = Status::Resolved.apply(Action::Resolve).unwrap_err();
        assert!(matches!(
            err,
            DtaskError::InvalidTransition {
                action: Action::Resolve,
                from: Status::Resolved
            }
        ));
        assert_eq!(err.to_string(), "cannot resolve a task that is resolved");
    }

    #[test]
    fn comments_are_refused_once_resolved() {
        assert!(Status::Template.accepts_comments());
        assert!(Status::Paused.accepts_comments());
        assert!(!Status::Resolved.accepts_comments());
        assert!(!Status::Deleted.accepts_comments());
    }

    #[test]
    fn parses_status_names() {
        for s in ALL {
            assert_eq!(Status::try_from(s.as_str()).unwrap(), *s);
        }
        assert!(Status::try_from("done").is_err());
    }
}
