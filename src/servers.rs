//! Server registry loaded from a Cursor-style `mcp.json`.
//!
//! Two shapes are accepted:
//!
//! ```json
//! { "mcpServers": { "name": { "command": "uv", "args": ["run", "main.py"], "env": {} } } }
//! { "name": "solo", "command": "uv", "args": ["run", "main.py"] }
//! ```
//!
//! Entries without a `command` are skipped. The working directory of an
//! entry comes from a `--directory <dir>` pair in its arguments when
//! present, otherwise it is the inspector's own working directory. When no
//! usable entry is found the registry holds a single `fallback` server
//! running `uv run main.py`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::rpc::process::LaunchSpec;
use crate::{AppError, Result};

/// File name looked up in the working directory and in `~/.cursor`.
pub const CONFIG_FILE_NAME: &str = "mcp.json";

/// Name of the server used when nothing is configured.
pub const FALLBACK_SERVER_NAME: &str = "fallback";

/// One configured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Name from the config, or `default` for the single-server shape.
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Directory the server is started in.
    pub working_dir: PathBuf,
    /// Environment overrides.
    pub env: BTreeMap<String, String>,
}

impl ServerEntry {
    /// The registry's last-resort server.
    #[must_use]
    pub fn fallback(working_dir: &Path) -> Self {
        Self {
            name: FALLBACK_SERVER_NAME.into(),
            command: vec!["uv".into(), "run".into(), "main.py".into()],
            working_dir: working_dir.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    /// Turn the entry into a launch description.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the command vector is empty.
    pub fn to_launch_spec(&self) -> Result<LaunchSpec> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| AppError::Config(format!("server {} has no command", self.name)))?;
        Ok(LaunchSpec {
            name: self.name.clone(),
            program: program.clone(),
            args: args.to_vec(),
            working_dir: Some(self.working_dir.clone()),
            env: self.env.clone(),
        })
    }
}

/// Ordered list of configured servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRegistry {
    source: Option<PathBuf>,
    base_dir: PathBuf,
    entries: Vec<ServerEntry>,
}

/// Locate the config file: explicit path, `./mcp.json`, `~/.cursor/mcp.json`.
///
/// An explicit path is returned as-is even when it does not exist so the
/// caller can report it.
#[must_use]
pub fn discover(explicit: Option<&Path>, cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    home.map(|home| home.join(".cursor").join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

/// The user's home directory from `HOME` (or `USERPROFILE` on Windows).
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

impl ServerRegistry {
    /// Discover and load the registry. Never fails: an unreadable or empty
    /// config yields the fallback server.
    #[must_use]
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Self {
        let home = home_dir();
        let Some(path) = discover(explicit, cwd, home.as_deref()) else {
            info!("no mcp.json found, using fallback server");
            return Self::from_entries(None, cwd, Vec::new());
        };

        match Self::load_from_path(&path, cwd) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read server config");
                Self::from_entries(Some(path), cwd, Vec::new())
            }
        }
    }

    /// Load the registry from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or is not JSON.
    pub fn load_from_path(path: &Path, cwd: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let entries = parse_entries(&raw, cwd)?;
        info!(path = %path.display(), servers = entries.len(), "loaded server config");
        Ok(Self::from_entries(Some(path.to_path_buf()), cwd, entries))
    }

    /// Parse a registry from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `raw` is not valid JSON.
    pub fn from_json_str(raw: &str, cwd: &Path) -> Result<Self> {
        Ok(Self::from_entries(None, cwd, parse_entries(raw, cwd)?))
    }

    fn from_entries(source: Option<PathBuf>, cwd: &Path, mut entries: Vec<ServerEntry>) -> Self {
        if entries.is_empty() {
            entries.push(ServerEntry::fallback(cwd));
        }
        Self {
            source,
            base_dir: cwd.to_path_buf(),
            entries,
        }
    }

    /// Config file the registry came from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The inspector's working directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// All entries in config order.
    #[must_use]
    pub fn entries(&self) -> &[ServerEntry] {
        &self.entries
    }

    /// Number of configured servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; an empty config is replaced by the fallback server.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether only one server is configured.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.entries.len() == 1
    }

    /// Pick a server by name, or the first one when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no entry has that name.
    pub fn select(&self, name: Option<&str>) -> Result<&ServerEntry> {
        match name {
            Some(name) => self
                .entries
                .iter()
                .find(|entry| entry.name == name)
                .ok_or_else(|| {
                    let known: Vec<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
                    AppError::NotFound(format!(
                        "server {name} not configured (known: {})",
                        known.join(", ")
                    ))
                }),
            None => {
                let first = self
                    .entries
                    .first()
                    .ok_or_else(|| AppError::NotFound("no servers configured".into()))?;
                if self.entries.len() > 1 {
                    info!(
                        server = %first.name,
                        "several servers configured, using the first; pass --server to choose"
                    );
                }
                Ok(first)
            }
        }
    }
}

fn parse_entries(raw: &str, cwd: &Path) -> Result<Vec<ServerEntry>> {
    let config: Value = serde_json::from_str(raw)?;

    if let Some(servers) = config.get("mcpServers").and_then(Value::as_object) {
        return Ok(servers
            .iter()
            .filter_map(|(name, server)| parse_entry(name, server, cwd))
            .collect());
    }

    if config.get("command").is_some() {
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or("default");
        return Ok(parse_entry(name, &config, cwd).into_iter().collect());
    }

    Ok(Vec::new())
}

fn parse_entry(name: &str, server: &Value, cwd: &Path) -> Option<ServerEntry> {
    let command = server
        .get("command")
        .and_then(Value::as_str)
        .filter(|command| !command.is_empty())?;

    let args: Vec<String> = server
        .get("args")
        .and_then(Value::as_array)
        .map(|args| {
            args.iter()
                .filter_map(|arg| match arg {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default();

    let env = server
        .get("env")
        .and_then(Value::as_object)
        .map(|env| {
            env.iter()
                .map(|(key, value)| {
                    let value = value
                        .as_str()
                        .map_or_else(|| value.to_string(), str::to_owned);
                    (key.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    let working_dir = directory_from_args(&args).map_or_else(|| cwd.to_path_buf(), PathBuf::from);

    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(command.to_owned());
    full.extend(args);

    Some(ServerEntry {
        name: name.to_owned(),
        command: full,
        working_dir,
        env,
    })
}

/// The value following the first `--directory` argument.
#[must_use]
pub fn directory_from_args(args: &[String]) -> Option<&str> {
    args.windows(2)
        .find(|pair| pair[0] == "--directory")
        .map(|pair| pair[1].as_str())
}
