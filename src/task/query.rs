#![forbid(unsafe_code)]

//! Command-line predicates.
//!
//! A [`Query`] is parsed from the tokens a user types after a command
//! (`+tag -tag project:x -project:y P1 some words`). The same structure is
//! used to filter the working view and to describe the fields of a new or
//! modified task.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DtaskError;
use crate::task::model::{Priority, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub ids: Vec<u32>,
    pub tags: BTreeSet<String>,
    pub anti_tags: BTreeSet<String>,
    /// `Some("")` means an explicit `project:` with no value.
    pub project: Option<String>,
    pub anti_projects: BTreeSet<String>,
    pub priority: Option<Priority>,
    pub template: Option<u32>,
    pub text: String,
    pub note: String,
    pub ignore_context: bool,
}

impl Query {
    /// Parses a filter or command line. Leading positive integers are task
    /// IDs.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, DtaskError> {
        Self::parse_tokens(tokens, true)
    }

    /// Parses the description of a new task, where every number is text.
    pub fn parse_task_line<S: AsRef<str>>(tokens: &[S]) -> Result<Self, DtaskError> {
        Self::parse_tokens(tokens, false)
    }

    fn parse_tokens<S: AsRef<str>>(tokens: &[S], mut ids_allowed: bool) -> Result<Self, DtaskError> {
        let mut q = Self::default();
        let mut words: Vec<&str> = Vec::new();
        let mut notes: Vec<&str> = Vec::new();
        let mut in_note = false;

        for token in tokens {
            let token = token.as_ref();
            if in_note {
                notes.push(token);
                continue;
            }
            if ids_allowed
                && let Ok(id) = token.parse::<u32>()
                && id > 0
            {
                q.ids.push(id);
                continue;
            }
            ids_allowed = false;

            if token == "/" {
                in_note = true;
            } else if token == "--" {
                q.ignore_context = true;
            } else if let Some(project) = token.strip_prefix("-project:") {
                if !project.is_empty() {
                    q.anti_projects.insert(project.to_owned());
                }
            } else if let Some(project) = token.strip_prefix("project:") {
                q.project = Some(project.to_owned());
            } else if let Some(id) = token.strip_prefix("template:") {
                let id = id.parse::<u32>().ok().filter(|&n| n > 0).ok_or_else(|| {
                    DtaskError::Validation(format!("invalid template reference '{token}'"))
                })?;
                q.template = Some(id);
            } else if let Some(tag) = tag_body(token, '+') {
                q.tags.insert(tag.to_owned());
            } else if let Some(tag) = tag_body(token, '-') {
                q.anti_tags.insert(tag.to_owned());
            } else if let Some(priority) = Priority::parse_token(token)? {
                q.priority = Some(priority);
            } else {
                words.push(token);
            }
        }

        q.text = words.join(" ");
        q.note = notes.join(" ");
        Ok(q)
    }

    /// Whether `task` satisfies every axis of this predicate. IDs, templates
    /// and notes are not predicate axes and are ignored here.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if !self.tags.iter().all(|t| task.tags.contains(t)) {
            return false;
        }
        if self.anti_tags.iter().any(|t| task.tags.contains(t)) {
            return false;
        }
        if let Some(project) = self.project.as_deref()
            && !project.is_empty()
            && task.project.as_deref() != Some(project)
        {
            return false;
        }
        if let Some(project) = task.project.as_deref()
            && self.anti_projects.contains(project)
        {
            return false;
        }
        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }
        if !self.text.is_empty()
            && !task
                .summary
                .to_lowercase()
                .contains(&self.text.to_lowercase())
        {
            return false;
        }
        true
    }

    /// Folds the tags, project and priority of `context` into this query.
    /// Used when a task is added while a context is active, so the new task
    /// shows up under that context.
    pub fn merge(&mut self, context: &Self) {
        if self.ignore_context {
            return;
        }
        self.tags.extend(context.tags.iter().cloned());
        self.anti_tags.extend(context.anti_tags.iter().cloned());
        if self.project.is_none() {
            self.project.clone_from(&context.project);
        }
        self.anti_projects
            .extend(context.anti_projects.iter().cloned());
        if self.priority.is_none() {
            self.priority = context.priority;
        }
    }

    /// Rejects anything that makes no sense as a standing filter.
    pub fn validate_as_context(&self) -> Result<(), DtaskError> {
        let reason = if !self.ids.is_empty() {
            Some("task IDs")
        } else if self.template.is_some() {
            Some("a template reference")
        } else if !self.text.is_empty() {
            Some("free text")
        } else if !self.note.is_empty() {
            Some("a note")
        } else if self.ignore_context {
            Some("'--'")
        } else {
            None
        };
        match reason {
            Some(what) => Err(DtaskError::Validation(format!(
                "a context cannot contain {what}"
            ))),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.tags.is_empty()
            && self.anti_tags.is_empty()
            && self.project.is_none()
            && self.anti_projects.is_empty()
            && self.priority.is_none()
            && self.template.is_none()
            && self.text.is_empty()
            && self.note.is_empty()
            && !self.ignore_context
    }

    /// Writes tags, project and priority from this query onto `task`.
    /// `-tag` removes a tag; an empty `project:` clears the project.
    pub fn apply_to(&self, task: &mut Task) {
        task.tags.extend(self.tags.iter().cloned());
        for tag in &self.anti_tags {
            task.tags.remove(tag);
        }
        match self.project.as_deref() {
            Some("") => task.project = None,
            Some(project) => task.project = Some(project.to_owned()),
            None => {}
        }
        if let Some(project) = task.project.as_deref()
            && self.anti_projects.contains(project)
        {
            task.project = None;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
    }

    /// Round-trippable token form, as stored for the context.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        let mut out: Vec<String> = self.ids.iter().map(u32::to_string).collect();
        out.extend(self.tags.iter().map(|t| format!("+{t}")));
        out.extend(self.anti_tags.iter().map(|t| format!("-{t}")));
        if let Some(project) = &self.project {
            out.push(format!("project:{project}"));
        }
        out.extend(self.anti_projects.iter().map(|p| format!("-project:{p}")));
        if let Some(priority) = self.priority {
            out.push(priority.token().to_owned());
        }
        if let Some(template) = self.template {
            out.push(format!("template:{template}"));
        }
        if self.ignore_context {
            out.push("--".to_owned());
        }
        if !self.text.is_empty() {
            out.push(self.text.clone());
        }
        if !self.note.is_empty() {
            out.push("/".to_owned());
            out.push(self.note.clone());
        }
        out
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens().join(" "))
    }
}

/// Composes the active context with a command-line query.
#[must_use]
pub fn visible(context: &Query, query: &Query, task: &Task) -> bool {
    (query.ignore_context || context.matches(task)) && query.matches(task)
}

fn tag_body(token: &str, sigil: char) -> Option<&str> {
    let body = token.strip_prefix(sigil)?;
    let valid = !body.is_empty() && !body.starts_with(['+', '-']) && !body.contains(':');
    valid.then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(tokens: &[&str]) -> Query {
        Query::parse(tokens).unwrap()
    }

    fn task(summary: &str, tags: &[&str], project: Option<&str>) -> Task {
        let mut t = Task::new(summary);
        t.tags = tags.iter().map(|s| (*s).to_owned()).collect();
        t.project = project.map(str::to_owned);
        t
    }

    #[test]
    fn parses_every_token_kind() {
        let parsed = q(&[
            "3", "12", "+errand", "-home", "project:work.backend", "-project:misc", "P1",
            "Buy", "milk", "--", "/", "a", "note",
        ]);
        assert_eq!(parsed.ids, vec![3, 12]);
        assert!(parsed.tags.contains("errand"));
        assert!(parsed.anti_tags.contains("home"));
        assert_eq!(parsed.project.as_deref(), Some("work.backend"));
        assert!(parsed.anti_projects.contains("misc"));
        assert_eq!(parsed.priority, Some(Priority::High));
        assert_eq!(parsed.text, "Buy milk");
        assert!(parsed.ignore_context);
        assert_eq!(parsed.note, "a note");
    }

    #[test]
    fn numbers_after_text_are_words() {
        let parsed = q(&["Buy", "2", "eggs"]);
        assert!(parsed.ids.is_empty());
        assert_eq!(parsed.text, "Buy 2 eggs");
    }

    #[test]
    fn task_lines_keep_leading_numbers_as_text() {
        let parsed = Query::parse_task_line(&["3", "eggs", "+shop"]).unwrap();
        assert!(parsed.ids.is_empty());
        assert_eq!(parsed.text, "3 eggs");
        assert!(parsed.tags.contains("shop"));
    }

    #[test]
    fn unknown_priority_is_a_validation_error() {
        assert!(matches!(
            Query::parse(&["P7"]),
            Err(DtaskError::Validation(_))
        ));
        assert!(Query::parse(&["template:x"]).is_err());
    }

    #[test]
    fn matching_checks_each_axis() {
        let t = task("Buy milk", &["errand"], Some("home"));
        assert!(q(&["+errand"]).matches(&t));
        assert!(!q(&["+work"]).matches(&t));
        assert!(!q(&["-errand"]).matches(&t));
        assert!(q(&["project:home"]).matches(&t));
        assert!(!q(&["project:work"]).matches(&t));
        assert!(!q(&["-project:home"]).matches(&t));
        assert!(q(&["-project:work"]).matches(&t));
        assert!(q(&["P2"]).matches(&t));
        assert!(!q(&["P0"]).matches(&t));
        assert!(q(&["MILK"]).matches(&t));
        assert!(!q(&["bread"]).matches(&t));
    }

    #[test]
    fn project_match_is_exact() {
        let t = task("x", &[], Some("work.backend"));
        assert!(!q(&["project:work"]).matches(&t));
        assert!(q(&["project:work.backend"]).matches(&t));
    }

    #[test]
    fn independent_axes_commute() {
        let tasks = vec![
            task("a", &["x"], Some("p")),
            task("b", &["x"], Some("q")),
            task("c", &["y"], Some("p")),
            task("d", &[], None),
        ];
        let by_tag = q(&["+x"]);
        let by_project = q(&["project:p"]);

        let tag_then_project: Vec<&str> = tasks
            .iter()
            .filter(|t| by_tag.matches(t))
            .filter(|t| by_project.matches(t))
            .map(|t| t.summary.as_str())
            .collect();
        let project_then_tag: Vec<&str> = tasks
            .iter()
            .filter(|t| by_project.matches(t))
            .filter(|t| by_tag.matches(t))
            .map(|t| t.summary.as_str())
            .collect();
        assert_eq!(tag_then_project, project_then_tag);
        assert_eq!(tag_then_project, vec!["a"]);
    }

    #[test]
    fn ignore_context_escapes_the_context() {
        let context = q(&["+work"]);
        let home = task("Water plants", &["home"], None);
        assert!(!visible(&context, &Query::default(), &home));
        assert!(visible(&context, &q(&["--"]), &home));
        assert!(!visible(&context, &q(&["--", "+work"]), &home));
    }

    #[test]
    fn merge_applies_context_unless_ignored() {
        let context = q(&["+work", "project:acme"]);
        let mut added = q(&["+urgent", "Fix", "build"]);
        added.merge(&context);
        assert!(added.tags.contains("work"));
        assert_eq!(added.project.as_deref(), Some("acme"));

        let mut escaped = q(&["--", "Fix", "build"]);
        escaped.merge(&context);
        assert!(escaped.tags.is_empty());
        assert!(escaped.project.is_none());
    }

    #[test]
    fn context_rejects_ids_and_text() {
        assert!(q(&["+work", "project:x", "P1"]).validate_as_context().is_ok());
        assert!(q(&["4"]).validate_as_context().is_err());
        assert!(q(&["+work", "meeting"]).validate_as_context().is_err());
        assert!(q(&["--"]).validate_as_context().is_err());
    }

    #[test]
    fn apply_to_edits_tags_and_project() {
        let mut t = task("x", &["old", "keep"], Some("a"));
        q(&["+new", "-old", "project:", "P0"]).apply_to(&mut t);
        assert!(t.tags.contains("new"));
        assert!(t.tags.contains("keep"));
        assert!(!t.tags.contains("old"));
        assert!(t.project.is_none());
        assert_eq!(t.priority, Priority::Critical);
    }

    #[test]
    fn tokens_reparse_to_the_same_query() {
        let original = q(&["+work", "-home", "project:acme", "-project:misc", "P1"]);
        assert_eq!(Query::parse(original.tokens().as_slice()).unwrap(), original);
    }
}
