#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::error::DtaskError;
use crate::task::status::{self, Status};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub repo: RepoConfig,
    pub state: StateConfig,
    pub tasks: TasksConfig,
    pub git: GitConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepoConfig {
    pub path: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: "~/.dtask".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    pub dir: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: "~/.cache/dtask".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TasksConfig {
    /// Statuses whose tasks receive a display ID.
    pub id_statuses: Vec<Status>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            id_statuses: status::NON_RESOLVED.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitConfig {
    /// Pull and push after every committed change.
    pub auto_sync: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub summary_width: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { summary_width: 60 }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
}

/// Config file location: `DTASK_CONFIG`, else `~/.config/dtask/config.toml`.
/// On Windows the platform config dir is used unless the Unix-style file
/// already exists.
pub fn default_paths() -> anyhow::Result<ConfigPaths> {
    if let Some(path) = std::env::var_os("DTASK_CONFIG") {
        return Ok(ConfigPaths {
            config_file: PathBuf::from(path),
        });
    }

    let home = home_dir().context("failed to determine home directory")?;
    let unix = home.join(".config").join("dtask").join("config.toml");
    if !cfg!(windows) || unix.exists() {
        return Ok(ConfigPaths { config_file: unix });
    }

    let proj = ProjectDirs::from("", "", "dtask")
        .context("failed to determine platform config directory")?;
    Ok(ConfigPaths {
        config_file: proj.config_dir().join("config.toml"),
    })
}

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

#[must_use]
pub fn expand_tilde(input: &str) -> String {
    match (input.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => input.to_owned(),
    }
}

pub fn expand_path(input: &str) -> anyhow::Result<PathBuf> {
    let expanded = expand_env_vars(&expand_tilde(input));
    let p = PathBuf::from(expanded);
    if p.is_absolute() {
        return Ok(p);
    }
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    Ok(cwd.join(p))
}

fn expand_env_vars(input: &str) -> String {
    // Expand $VAR and ${VAR}. Leave unknown vars untouched.
    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return input.to_owned();
    };
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        std::env::var(key).unwrap_or_else(|_| caps[0].to_owned())
    })
    .to_string()
}

impl Config {
    /// Task repository, honouring `DTASK_REPO`.
    pub fn repo_path(&self) -> anyhow::Result<PathBuf> {
        match std::env::var("DTASK_REPO") {
            Ok(v) if !v.trim().is_empty() => expand_path(&v),
            _ => expand_path(&self.repo.path),
        }
    }

    /// Local state directory, honouring `DTASK_STATE_DIR`.
    pub fn state_dir(&self) -> anyhow::Result<PathBuf> {
        match std::env::var("DTASK_STATE_DIR") {
            Ok(v) if !v.trim().is_empty() => expand_path(&v),
            _ => expand_path(&self.state.dir),
        }
    }

    pub fn validate(&self) -> Result<(), DtaskError> {
        if self.repo.path.trim().is_empty() {
            return Err(DtaskError::Config("repo.path must not be empty".to_owned()));
        }
        if self.state.dir.trim().is_empty() {
            return Err(DtaskError::Config("state.dir must not be empty".to_owned()));
        }
        if self.tasks.id_statuses.is_empty() {
            return Err(DtaskError::Config(
                "tasks.id_statuses must list at least one status".to_owned(),
            ));
        }
        if self.tasks.id_statuses.contains(&Status::Deleted) {
            return Err(DtaskError::Config(
                "tasks.id_statuses must not contain deleted".to_owned(),
            ));
        }
        if self.ui.summary_width < 10 {
            return Err(DtaskError::Config(
                "ui.summary_width must be >= 10".to_owned(),
            ));
        }
        Ok(())
    }
}

pub fn load() -> anyhow::Result<(Config, toml_edit::DocumentMut, ConfigPaths)> {
    let paths = default_paths()?;
    let (doc, cfg) = load_from_file(&paths.config_file)?;
    cfg.validate()?;
    Ok((cfg, doc, paths))
}

pub fn list_resolved_toml() -> anyhow::Result<String> {
    let (cfg, _doc, _paths) = load()?;
    Ok(toml::to_string_pretty(&cfg)?)
}

pub fn get_value_string(key: &str) -> anyhow::Result<Option<String>> {
    let paths = default_paths()?;
    get_value_string_at_path(&paths.config_file, key)
}

pub fn set_value_string(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = default_paths()?;
    set_value_string_at_path(&paths.config_file, key, value)
}

fn load_from_file(path: &Path) -> anyhow::Result<(toml_edit::DocumentMut, Config)> {
    if !path.exists() {
        return Ok((toml_edit::DocumentMut::new(), Config::default()));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let doc = raw
        .parse::<toml_edit::DocumentMut>()
        .with_context(|| format!("failed to parse TOML in {}", path.display()))?;

    let cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to deserialize TOML in {}", path.display()))?;
    Ok((doc, cfg))
}

pub fn get_value_string_at_path(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let (_doc, cfg) = load_from_file(path)?;
    cfg.validate()?;
    let value = lookup_value(&cfg, key);
    Ok(value.map(format_value_for_stdout))
}

pub fn set_value_string_at_path(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let (mut doc, cfg) = load_from_file(path)?;
    cfg.validate()?;

    let value_item = parse_value(key, value)?;
    apply_set(&mut doc, key, value_item)?;

    // Validate by re-parsing the updated doc into a Config.
    let new_raw = doc.to_string();
    let new_cfg: Config = toml::from_str(&new_raw)
        .with_context(|| format!("config update produced invalid TOML for {}", path.display()))?;
    new_cfg.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, new_raw.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Bool,
    Int,
    String,
    StatusList,
}

fn key_type(key: &str) -> Option<KeyType> {
    Some(match key {
        "repo.path" | "state.dir" => KeyType::String,
        "git.auto_sync" => KeyType::Bool,
        "ui.summary_width" => KeyType::Int,
        "tasks.id_statuses" => KeyType::StatusList,
        _ => return None,
    })
}

fn parse_value(key: &str, value: &str) -> anyhow::Result<toml_edit::Item> {
    let key_type = key_type(key).ok_or_else(|| DtaskError::InvalidConfigKey(key.to_owned()))?;
    let invalid = |msg: String| DtaskError::InvalidConfigValue {
        key: key.to_owned(),
        msg,
    };
    let item = match key_type {
        KeyType::Bool => toml_edit::value(parse_bool(value).map_err(invalid)?),
        KeyType::Int => toml_edit::value(parse_int(value).map_err(invalid)?),
        KeyType::String => toml_edit::value(value),
        KeyType::StatusList => {
            let mut array = toml_edit::Array::new();
            for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let status = Status::try_from(name).map_err(|e| invalid(e.to_string()))?;
                array.push(status.as_str());
            }
            toml_edit::value(array)
        }
    };
    Ok(item)
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true|false, got '{other}'")),
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.trim()
        .parse::<i64>()
        .map_err(|e| format!("expected integer, got '{s}': {e}"))
}

fn apply_set(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: toml_edit::Item,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, tables)) = parts.split_last() else {
        return Err(DtaskError::InvalidConfigKey(key.to_owned()).into());
    };

    let mut cur = doc.as_table_mut();
    for seg in tables {
        if !cur.contains_key(seg) {
            let mut t = toml_edit::Table::new();
            t.set_implicit(true);
            cur.insert(seg, toml_edit::Item::Table(t));
        }
        cur = cur[seg].as_table_mut().ok_or_else(|| {
            DtaskError::Config(format!("cannot set {key}: '{seg}' is not a table"))
        })?;
    }

    cur.insert(leaf, value);
    Ok(())
}

/// Resolved value at dotted `key`, defaults included.
fn lookup_value(cfg: &Config, key: &str) -> Option<toml::Value> {
    let root = toml::Value::try_from(cfg).ok()?;
    key.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(root, |value, seg| match value {
            toml::Value::Table(mut table) => table.remove(seg),
            _ => None,
        })
}

fn format_value_for_stdout(value: toml::Value) -> String {
    match value {
        toml::Value::String(s) => s,
        toml::Value::Array(items) => items
            .into_iter()
            .map(format_value_for_stdout)
            .collect::<Vec<_>>()
            .join(","),
        table @ toml::Value::Table(_) => {
            toml::to_string_pretty(&table).unwrap_or_else(|_| table.to_string())
        }
        other => other.to_string(),
    }
}
