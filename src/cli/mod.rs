#![forbid(unsafe_code)]

mod completions;

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};
use time::OffsetDateTime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{self, Config};
use crate::core::git::Git;
use crate::core::state::StateDir;
use crate::error::DtaskError;
use crate::output::tasks::{self as render, TaskJson};
use crate::task::status::{self, Status};
use crate::task::storage::TaskStorage;
use crate::task::{Query, Task, TaskSet};

/// Statuses shown by the default listing.
const OPEN: &[Status] = &[Status::Pending, Status::Active, Status::Paused];

#[derive(Debug, Parser)]
#[command(
    name = "dtask",
    version,
    about = "Personal task tracker backed by a git repository"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show open tasks under the current context (default)
    Next(FilterArgs),
    /// Add a task: `add summary words +tag project:x P1 / first note`
    Add(TokenArgs),
    /// Record a task that is already done
    Log(TokenArgs),
    /// Add a template for use with `add template:N`
    Template(TokenArgs),
    /// Mark pending tasks active
    Start(IdsArgs),
    /// Return active tasks to pending
    Stop(IdsArgs),
    /// Resolve tasks
    #[command(alias = "done")]
    Resolve(IdsArgs),
    /// Append a comment to a task
    #[command(alias = "note")]
    Comment(CommentArgs),
    /// Change tags, project or priority: `modify 3 4 +urgent -later P0`
    Modify(TokenArgs),
    /// Delete tasks
    #[command(alias = "rm")]
    Remove(IdsArgs),
    /// Show pending, active and paused tasks
    ShowOpen(FilterArgs),
    ShowActive(FilterArgs),
    ShowPaused(FilterArgs),
    ShowResolved(FilterArgs),
    ShowTemplates(FilterArgs),
    /// Per-project task counts
    ShowProjects(FilterArgs),
    /// Tags in use on open tasks
    ShowTags(FilterArgs),
    /// Show, set or clear (`context none`) the standing filter
    Context(TokenArgs),
    /// Run git inside the task repository
    Git(PassthroughArgs),
    /// Pull then push the task repository
    Sync,
    /// Revert the most recent change
    Undo,
    Config(ConfigArgs),
    Completion(CompletionArgs),
    #[command(name = "_completions", hide = true)]
    Completions(TokenArgs),
    Version,
    /// Bare filter tokens run `next`.
    #[command(external_subcommand)]
    Filter(Vec<String>),
}

#[derive(Debug, Parser)]
pub struct FilterArgs {
    /// Output in JSON format
    #[arg(long = "json")]
    pub json: bool,
    /// Output tables as CSV
    #[arg(long = "csv", conflicts_with = "json")]
    pub csv: bool,
    /// IDs, +tag, -tag, project:x, -project:x, P0-P3, words, `--` to ignore the context
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub tokens: Vec<String>,
}

impl FilterArgs {
    fn split(self, escaped: bool) -> (Vec<String>, Format) {
        let format = self.format();
        (restore_escape(self.tokens, escaped), format)
    }

    const fn format(&self) -> Format {
        if self.json {
            Format::Json
        } else if self.csv {
            Format::Csv
        } else {
            Format::Table
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
pub struct TokenArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub tokens: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct IdsArgs {
    #[arg(required = true)]
    pub ids: Vec<u32>,
}

#[derive(Debug, Parser)]
pub struct CommentArgs {
    pub id: u32,
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub text: Vec<String>,
}

#[derive(Debug, Parser)]
#[command(trailing_var_arg = true, allow_hyphen_values = true)]
pub struct PassthroughArgs {
    pub args: Vec<OsString>,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

pub fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = run(cli, std::env::args_os().collect());
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DTASK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn run(cli: Cli, raw_args: Vec<OsString>) -> anyhow::Result<ExitCode> {
    let escaped = raw_args.iter().any(|a| a == "--");
    match cli.cmd {
        None => cmd_list(&[], Format::Table, status::NON_RESOLVED, OPEN),
        Some(Commands::Filter(tokens)) => cmd_list(&tokens, Format::Table, status::NON_RESOLVED, OPEN),
        Some(Commands::Next(args) | Commands::ShowOpen(args)) => {
            let (tokens, format) = args.split(escaped);
            cmd_list(&tokens, format, status::NON_RESOLVED, OPEN)
        }
        Some(Commands::ShowActive(args)) => {
            let (tokens, format) = args.split(escaped);
            cmd_list(&tokens, format, status::NON_RESOLVED, &[Status::Active])
        }
        Some(Commands::ShowPaused(args)) => {
            let (tokens, format) = args.split(escaped);
            cmd_list(&tokens, format, status::NON_RESOLVED, &[Status::Paused])
        }
        Some(Commands::ShowTemplates(args)) => {
            let (tokens, format) = args.split(escaped);
            cmd_list(&tokens, format, status::NON_RESOLVED, &[Status::Template])
        }
        Some(Commands::ShowResolved(args)) => {
            let (tokens, format) = args.split(escaped);
            cmd_list(&tokens, format, status::ALL, &[Status::Resolved])
        }
        Some(Commands::ShowProjects(args)) => {
            let (tokens, format) = args.split(escaped);
            cmd_show_projects(&tokens, format)
        }
        Some(Commands::ShowTags(args)) => {
            let (tokens, format) = args.split(escaped);
            cmd_show_tags(&tokens, format)
        }
        Some(Commands::Add(args)) => cmd_add(&restore_escape(args.tokens, escaped), NewTask::Pending),
        Some(Commands::Log(args)) => cmd_add(&restore_escape(args.tokens, escaped), NewTask::Resolved),
        Some(Commands::Template(args)) => {
            cmd_add(&restore_escape(args.tokens, escaped), NewTask::Template)
        }
        Some(Commands::Start(args)) => cmd_each(&args.ids, "Started", TaskSet::start),
        Some(Commands::Stop(args)) => cmd_each(&args.ids, "Stopped", TaskSet::stop),
        Some(Commands::Resolve(args)) => cmd_each(&args.ids, "Resolved", TaskSet::resolve),
        Some(Commands::Remove(args)) => cmd_each(&args.ids, "Removed", TaskSet::remove),
        Some(Commands::Comment(args)) => cmd_comment(args),
        Some(Commands::Modify(args)) => cmd_modify(&restore_escape(args.tokens, escaped)),
        Some(Commands::Context(args)) => cmd_context(&args.tokens),
        Some(Commands::Git(args)) => cmd_git(&args.args),
        Some(Commands::Sync) => cmd_sync(),
        Some(Commands::Undo) => cmd_undo(),
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "dtask", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Completions(args)) => {
            completions::run(&args.tokens);
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config(args)) => match args.cmd {
            ConfigCmd::List => {
                print!("{}", config::list_resolved_toml()?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Set(set) => {
                config::set_value_string(&set.key, &set.value)?;
                println!("Set {} = {}", set.key, set.value);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Get(get) => {
                let val = config::get_value_string(&get.key)?;
                match val {
                    Some(v) => {
                        println!("{v}");
                        Ok(ExitCode::SUCCESS)
                    }
                    None => anyhow::bail!(
                        "configuration key '{}' not found - use 'dtask config list' to see available keys",
                        get.key
                    ),
                }
            }
        },
        Some(Commands::Version) => Ok(cmd_version()),
    }
}

/// clap consumes a `--` that appears before the first token; put it back so
/// the query still sees the ignore-context marker.
fn restore_escape(mut tokens: Vec<String>, escaped: bool) -> Vec<String> {
    if escaped && !tokens.iter().any(|t| t == "--") {
        tokens.insert(0, "--".to_owned());
    }
    tokens
}

/// Resolved configuration, storage and context for one invocation.
struct Env {
    cfg: Config,
    storage: TaskStorage,
    context: Query,
}

impl Env {
    fn open() -> anyhow::Result<Self> {
        let (cfg, state) = open_state()?;
        let context = state.load_context().with_context(|| {
            format!(
                "failed to read context from {} (clear it with 'dtask context none')",
                state.context_path().display()
            )
        })?;
        let repo = cfg.repo_path()?;
        debug!(repo = %repo.display(), context = %context, "opened task repository");
        Ok(Self {
            storage: TaskStorage::new(repo, state),
            cfg,
            context,
        })
    }

    /// Loads `statuses` plus every ID-bearing status, so display IDs are the
    /// same whichever command reads them.
    fn load(&self, statuses: &[Status]) -> anyhow::Result<TaskSet<TaskStorage>> {
        let id_statuses = &self.cfg.tasks.id_statuses;
        let mut wanted = statuses.to_vec();
        wanted.extend(id_statuses.iter().filter(|s| !statuses.contains(*s)));
        TaskSet::load(self.storage.clone(), &wanted, id_statuses)
            .with_context(|| format!("failed to load tasks from {}", self.storage.repo().display()))
    }

    fn save(&self, ts: &mut TaskSet<TaskStorage>, message: &str) -> anyhow::Result<()> {
        let written = ts.persist_all(message).context("failed to save tasks")?;
        if written > 0 && self.cfg.git.auto_sync {
            ts.store().git().sync().context("automatic sync failed")?;
        }
        Ok(())
    }

    fn git(&self) -> &Git {
        self.storage.git()
    }
}

fn open_state() -> anyhow::Result<(Config, StateDir)> {
    let (cfg, _doc, _paths) = config::load()?;
    let state = StateDir::new(cfg.state_dir()?);
    Ok((cfg, state))
}

fn cmd_list(
    tokens: &[String],
    format: Format,
    load: &[Status],
    show: &[Status],
) -> anyhow::Result<ExitCode> {
    let query = Query::parse(tokens)?;
    let env = Env::open()?;
    let mut ts = env.load(load)?;

    if !query.ids.is_empty() {
        for &id in &query.ids {
            let task = ts.get_by_id(id)?;
            if format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&TaskJson::from(&task))?);
            } else {
                print!("{}", render::describe(&task));
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    ts.filter_statuses(show);
    ts.filter(&env.context, &query);
    ts.sort_for_display();

    if format == Format::Json {
        let rows: Vec<TaskJson<'_>> = ts.tasks().map(TaskJson::from).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(ExitCode::SUCCESS);
    }

    let table = render::task_table(ts.tasks(), env.cfg.ui.summary_width);
    if format == Format::Csv {
        table.write_csv(std::io::stdout().lock())?;
    } else if table.is_empty() {
        println!("No tasks found");
    } else {
        table.print()?;
    }
    if !env.context.is_empty() && !query.ignore_context {
        eprintln!("Active context: {} (use '--' to ignore it)", env.context);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show_projects(tokens: &[String], format: Format) -> anyhow::Result<ExitCode> {
    let query = Query::parse(tokens)?;
    let env = Env::open()?;
    let mut ts = env.load(status::ALL)?;
    ts.filter_statuses(&[Status::Pending, Status::Active, Status::Paused, Status::Resolved]);
    ts.filter(&env.context, &query);
    let summaries = ts.project_summaries();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        Format::Csv => render::project_table(&summaries).write_csv(std::io::stdout().lock())?,
        Format::Table if summaries.is_empty() => println!("No projects found"),
        Format::Table => render::project_table(&summaries).print()?,
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show_tags(tokens: &[String], format: Format) -> anyhow::Result<ExitCode> {
    let query = Query::parse(tokens)?;
    let env = Env::open()?;
    let mut ts = env.load(status::NON_RESOLVED)?;
    ts.filter_statuses(OPEN);
    ts.filter(&env.context, &query);
    let tags = ts.tags();

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        for tag in tags {
            println!("{tag}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewTask {
    Pending,
    Resolved,
    Template,
}

impl NewTask {
    const fn verb(self) -> &'static str {
        match self {
            Self::Pending => "Added",
            Self::Resolved => "Logged",
            Self::Template => "Added template",
        }
    }
}

enum Draft {
    FromTemplate(u32),
    Fresh(Task),
}

fn cmd_add(tokens: &[String], kind: NewTask) -> anyhow::Result<ExitCode> {
    let mut query = Query::parse_task_line(tokens)?;
    let draft = match query.template {
        Some(_) if kind != NewTask::Pending => {
            anyhow::bail!("template:N can only be used with 'dtask add'")
        }
        Some(template_id) => Draft::FromTemplate(template_id),
        None => {
            let task = Task::new(query.text.trim());
            task.validate()?;
            Draft::Fresh(task)
        }
    };

    let env = Env::open()?;
    query.merge(&env.context);
    let mut ts = env.load(status::NON_RESOLVED)?;

    let added = match draft {
        Draft::FromTemplate(template_id) => ts.instantiate(template_id, &query)?,
        Draft::Fresh(mut task) => {
            query.apply_to(&mut task);
            if !query.note.is_empty() {
                task.add_comment(query.note.clone())?;
            }
            match kind {
                NewTask::Pending => {}
                NewTask::Resolved => task.resolve(OffsetDateTime::now_utc())?,
                NewTask::Template => task.status = Status::Template,
            }
            ts.add(task)?
        }
    };

    env.save(&mut ts, &format!("{}: {}", kind.verb(), added.summary))?;
    if added.id == 0 {
        println!("{}: {}", kind.verb(), added.summary);
    } else {
        println!("{} {}: {}", kind.verb(), added.id, added.summary);
    }
    if !env.context.is_empty() && !query.ignore_context {
        eprintln!("Context applied: {}", env.context);
    }
    Ok(ExitCode::SUCCESS)
}

/// Applies `op` to every ID in order and commits once. Nothing is written
/// when any ID fails.
fn cmd_each(
    ids: &[u32],
    verb: &str,
    op: fn(&mut TaskSet<TaskStorage>, u32) -> Result<Task, DtaskError>,
) -> anyhow::Result<ExitCode> {
    let env = Env::open()?;
    let mut ts = env.load(status::NON_RESOLVED)?;
    let mut summaries = Vec::with_capacity(ids.len());
    for &id in ids {
        let task = op(&mut ts, id).with_context(|| format!("task {id}"))?;
        println!("{verb} {id}: {}", task.summary);
        summaries.push(task.summary);
    }
    env.save(&mut ts, &format!("{verb}: {}", summaries.join(", ")))?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_comment(args: CommentArgs) -> anyhow::Result<ExitCode> {
    let text = args.text.join(" ");
    if text.trim().is_empty() {
        return Err(DtaskError::Validation("comment text is empty".to_owned()).into());
    }
    let env = Env::open()?;
    let mut ts = env.load(status::NON_RESOLVED)?;
    let task = ts
        .comment(args.id, text.trim())
        .with_context(|| format!("task {}", args.id))?;
    env.save(&mut ts, &format!("Commented: {}", task.summary))?;
    println!("Commented {}: {}", args.id, task.summary);
    Ok(ExitCode::SUCCESS)
}

fn cmd_modify(tokens: &[String]) -> anyhow::Result<ExitCode> {
    let query = Query::parse(tokens)?;
    if query.ids.is_empty() {
        anyhow::bail!("modify needs at least one task ID, e.g. 'dtask modify 3 +urgent'");
    }
    if !query.text.is_empty() {
        anyhow::bail!("modify does not change summaries; unexpected text '{}'", query.text);
    }
    if query.template.is_some() {
        anyhow::bail!("template:N cannot be used with modify");
    }

    let env = Env::open()?;
    let mut ts = env.load(status::NON_RESOLVED)?;
    let mut summaries = Vec::with_capacity(query.ids.len());
    for &id in &query.ids {
        let task = ts.modify(id, &query).with_context(|| format!("task {id}"))?;
        println!("Modified {id}: {}", task.summary);
        summaries.push(task.summary);
    }
    env.save(&mut ts, &format!("Modified: {}", summaries.join(", ")))?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_context(tokens: &[String]) -> anyhow::Result<ExitCode> {
    let (_cfg, state) = open_state()?;
    match tokens {
        [] => {
            let context = state.load_context()?;
            if context.is_empty() {
                println!("No context set");
            } else {
                println!("{context}");
            }
        }
        [none] if none == "none" => {
            state.save_context(&Query::default())?;
            println!("Context cleared");
        }
        _ => {
            let context = Query::parse(tokens)?;
            context.validate_as_context()?;
            state.save_context(&context)?;
            println!("Context set to {context}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_git(args: &[OsString]) -> anyhow::Result<ExitCode> {
    let (cfg, _state) = open_state()?;
    let code = Git::new(cfg.repo_path()?).passthrough(args)?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

fn cmd_sync() -> anyhow::Result<ExitCode> {
    let env = Env::open()?;
    env.git().sync().context("sync failed")?;
    println!("Synced {}", env.storage.repo().display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_undo() -> anyhow::Result<ExitCode> {
    let env = Env::open()?;
    let subject = env.git().undo().context("undo failed")?;
    if env.cfg.git.auto_sync {
        env.git().sync().context("automatic sync failed")?;
    }
    println!("Reverted: {subject}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_version() -> ExitCode {
    println!("dtask version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_tokens_become_a_filter() {
        let cli = Cli::try_parse_from(["dtask", "+work", "P1"]).unwrap();
        match cli.cmd {
            Some(Commands::Filter(tokens)) => assert_eq!(tokens, vec!["+work", "P1"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn add_keeps_hyphenated_tokens() {
        let cli = Cli::try_parse_from(["dtask", "add", "Buy", "milk", "-later", "+errand"]).unwrap();
        match cli.cmd {
            Some(Commands::Add(args)) => {
                assert_eq!(args.tokens, vec!["Buy", "milk", "-later", "+errand"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn aliases_resolve() {
        let cli = Cli::try_parse_from(["dtask", "done", "1", "2"]).unwrap();
        assert!(matches!(cli.cmd, Some(Commands::Resolve(IdsArgs { ref ids })) if ids == &[1, 2]));
        let cli = Cli::try_parse_from(["dtask", "note", "3", "call", "back"]).unwrap();
        assert!(matches!(cli.cmd, Some(Commands::Comment(_))));
    }

    #[test]
    fn json_flag_precedes_filter_tokens() {
        let cli = Cli::try_parse_from(["dtask", "next", "--json", "+work"]).unwrap();
        match cli.cmd {
            Some(Commands::Next(args)) => {
                assert_eq!(args.format(), Format::Json);
                assert_eq!(args.tokens, vec!["+work"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn json_and_csv_conflict() {
        assert!(Cli::try_parse_from(["dtask", "next", "--json", "--csv"]).is_err());
        let cli = Cli::try_parse_from(["dtask", "show-projects", "--csv"]).unwrap();
        match cli.cmd {
            Some(Commands::ShowProjects(args)) => assert_eq!(args.format(), Format::Csv),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn escape_marker_is_restored_once() {
        assert_eq!(restore_escape(vec!["+a".to_owned()], true), vec!["--", "+a"]);
        assert_eq!(
            restore_escape(vec!["+a".to_owned(), "--".to_owned()], true),
            vec!["+a", "--"]
        );
        assert_eq!(restore_escape(vec!["+a".to_owned()], false), vec!["+a"]);
    }
}
