#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::output::table::Table;
use crate::task::model::Task;
use crate::task::set::ProjectSummary;

/// JSON shape of a listed task: the stored record plus its display ID.
#[derive(Debug, Serialize)]
pub struct TaskJson<'a> {
    pub id: u32,
    #[serde(flatten)]
    pub task: &'a Task,
}

impl<'a> From<&'a Task> for TaskJson<'a> {
    fn from(task: &'a Task) -> Self {
        Self { id: task.id, task }
    }
}

#[must_use]
pub fn task_table<'a>(tasks: impl IntoIterator<Item = &'a Task>, summary_width: usize) -> Table {
    let mut table = Table::new(["ID", "Status", "Pri", "Tags", "Project", "Summary"]);
    for task in tasks {
        let id = if task.id == 0 {
            "-".to_owned()
        } else {
            task.id.to_string()
        };
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        let mut summary = truncate(&task.summary, summary_width);
        if !task.comments.is_empty() {
            summary.push_str(" ✎");
        }
        table.row([
            id,
            task.status.to_string(),
            task.priority.token().to_owned(),
            tags.join(" "),
            task.project.clone().unwrap_or_default(),
            summary,
        ]);
    }
    table
}

#[must_use]
pub fn project_table(summaries: &BTreeMap<String, ProjectSummary>) -> Table {
    let mut table = Table::new(["Project", "Open", "Active", "Resolved", "Total"]);
    for (name, s) in summaries {
        table.row([
            name.clone(),
            (s.tasks - s.resolved).to_string(),
            s.active.to_string(),
            s.resolved.to_string(),
            s.tasks.to_string(),
        ]);
    }
    table
}

/// Multi-line description of one task, shown after it changes.
#[must_use]
pub fn describe(task: &Task) -> String {
    let mut out = String::new();
    if task.id == 0 {
        let _ = writeln!(out, "{} ({})", task.summary, task.status);
    } else {
        let _ = writeln!(out, "{}: {} ({})", task.id, task.summary, task.status);
    }
    let _ = writeln!(out, "  UUID:     {}", task.uuid);
    let _ = writeln!(out, "  Priority: {} ({})", task.priority, task.priority.token());
    if let Some(project) = &task.project {
        let _ = writeln!(out, "  Project:  {project}");
    }
    if !task.tags.is_empty() {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        let _ = writeln!(out, "  Tags:     {}", tags.join(", "));
    }
    let _ = writeln!(out, "  Created:  {}", format_date(task.created));
    if let Some(resolved) = task.resolved {
        let _ = writeln!(out, "  Resolved: {}", format_date(resolved));
    }
    for comment in &task.comments {
        let _ = writeln!(out, "  > {comment}");
    }
    out
}

#[must_use]
pub fn format_date(t: OffsetDateTime) -> String {
    t.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| "unknown".to_owned())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::status::Status;

    #[test]
    fn table_shows_dash_for_unnumbered_tasks() {
        let mut open = Task::new("Buy milk");
        open.id = 1;
        open.tags.insert("errand".to_owned());
        let mut done = Task::new("Call bank");
        done.status = Status::Resolved;

        let mut out = Vec::new();
        task_table([&open, &done], 60).write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].starts_with("1 "));
        assert!(lines[1].contains("errand"));
        assert!(lines[2].starts_with("- "));
        assert!(lines[2].contains("resolved"));
    }

    #[test]
    fn json_view_carries_the_display_id() {
        let mut task = Task::new("Buy milk");
        task.id = 4;
        let value = serde_json::to_value(TaskJson::from(&task)).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["summary"], "Buy milk");
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn long_summaries_are_truncated() {
        assert_eq!(truncate("abcdefghijkl", 10), "abcdefg...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn description_lists_comments() {
        let mut task = Task::new("Call bank");
        task.comments.push("ask about fees".to_owned());
        task.project = Some("finance".to_owned());
        let text = describe(&task);
        assert!(text.contains("Project:  finance"));
        assert!(text.contains("> ask about fees"));
    }
}
