#![forbid(unsafe_code)]

//! Candidates for the hidden `_completions` command.
//!
//! Shell scripts call `dtask _completions <words...>` with the words typed
//! so far; the last word is the one being completed and may be empty. One
//! candidate is printed per line.

use std::collections::BTreeSet;

use clap::CommandFactory as _;
use tracing::debug;

use super::{Cli, Env, OPEN};
use crate::task::model::Priority;
use crate::task::query::Query;
use crate::task::status::{self, Status};

/// Commands whose arguments are query tokens.
const TOKEN_COMMANDS: &[&str] = &[
    "next",
    "add",
    "log",
    "template",
    "modify",
    "context",
    "show-open",
    "show-active",
    "show-paused",
    "show-resolved",
    "show-templates",
    "show-projects",
    "show-tags",
];

#[derive(Debug, Default)]
struct Vocabulary {
    commands: Vec<String>,
    projects: BTreeSet<String>,
    tags: BTreeSet<String>,
    templates: Vec<u32>,
}

pub(super) fn run(words: &[String]) {
    let vocab = vocabulary(words);
    for candidate in candidates(words, &vocab) {
        println!("{candidate}");
    }
}

/// Collects everything that can be offered. A repository that cannot be read
/// still yields the command names.
fn vocabulary(words: &[String]) -> Vocabulary {
    let mut vocab = Vocabulary {
        commands: command_names(),
        ..Vocabulary::default()
    };
    let (command, rest, _) = split(words, &vocab.commands);
    let ignore_context = Query::parse(rest).is_ok_and(|q| q.ignore_context)
        || matches!(command, Some("context" | "modify"));

    let loaded = Env::open().and_then(|env| {
        let ts = env.load(status::NON_RESOLVED)?;
        Ok((env, ts))
    });
    let (env, mut ts) = match loaded {
        Ok(pair) => pair,
        Err(err) => {
            debug!(error = %err, "completing commands only");
            return vocab;
        }
    };

    vocab.templates = ts
        .all_tasks()
        .iter()
        .filter(|t| t.status == Status::Template && t.id != 0)
        .map(|t| t.id)
        .collect();
    ts.filter_statuses(OPEN);
    if !ignore_context {
        ts.filter(&env.context, &Query::default());
    }
    vocab.projects = ts.projects();
    vocab.tags = ts.tags();
    vocab
}

fn command_names() -> Vec<String> {
    let cmd = Cli::command();
    let mut names = Vec::new();
    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        names.push(sub.get_name().to_owned());
        names.extend(sub.get_all_aliases().map(str::to_owned));
    }
    names.sort();
    names.dedup();
    names
}

/// Splits the typed words into (command, finished arguments, partial word).
fn split<'a>(words: &'a [String], commands: &[String]) -> (Option<&'a str>, &'a [String], &'a str) {
    let (partial, done) = match words.split_last() {
        Some((last, done)) => (last.as_str(), done),
        None => ("", words),
    };
    match done.split_first() {
        Some((first, rest)) if commands.contains(first) => (Some(first.as_str()), rest, partial),
        _ => (None, done, partial),
    }
}

fn candidates(words: &[String], vocab: &Vocabulary) -> Vec<String> {
    let (command, rest, partial) = split(words, &vocab.commands);
    let mut out: Vec<String> = Vec::new();

    if command.is_none() && rest.is_empty() {
        out.extend(vocab.commands.iter().cloned());
    }
    if command.is_none_or(|c| TOKEN_COMMANDS.contains(&c)) {
        out.extend(Priority::ALL.iter().map(|p| p.token().to_owned()));
        out.extend(vocab.projects.iter().map(|p| format!("project:{p}")));
        out.extend(vocab.projects.iter().map(|p| format!("-project:{p}")));
        out.extend(vocab.tags.iter().map(|t| format!("+{t}")));
        out.extend(vocab.tags.iter().map(|t| format!("-{t}")));
        if command == Some("add") {
            out.extend(vocab.templates.iter().map(|id| format!("template:{id}")));
        }
    }

    out.retain(|c| c.starts_with(partial) && !rest.contains(c));
    out
}
