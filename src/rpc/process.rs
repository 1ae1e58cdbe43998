//! Server process launcher.
//!
//! Spawns the MCP server with all three standard streams piped and
//! `kill_on_drop(true)`, so a dropped session never leaks a child. The
//! environment is inherited with a few adjustments:
//!
//! - `VIRTUAL_ENV` is removed so a `uv`-launched server picks its own venv.
//! - `PYTHONUTF8=1` and `PYTHONIOENCODING=utf-8` force UTF-8 stdio.
//! - Per-server overrides from the registry are applied last.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Variables removed from the inherited environment.
pub const REMOVED_ENV_VARS: &[&str] = &["VIRTUAL_ENV"];

/// Variables forced on every child before per-server overrides.
pub const FORCED_ENV_VARS: &[(&str, &str)] = &[("PYTHONUTF8", "1"), ("PYTHONIOENCODING", "utf-8")];

/// Everything needed to start one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Display name of the server.
    pub name: String,
    /// Executable to run.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Working directory; inherited when `None`.
    pub working_dir: Option<PathBuf>,
    /// Environment overrides, applied after the built-in adjustments.
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Launch `program args...` with no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// The full command line, for logs and error messages.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Compute the environment changes applied to the child.
///
/// Returns `(removed, set)`; `set` is ordered so overrides win.
#[must_use]
pub fn child_env(spec: &LaunchSpec) -> (Vec<&'static str>, Vec<(String, String)>) {
    let mut set: Vec<(String, String)> = FORCED_ENV_VARS
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    set.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    (REMOVED_ENV_VARS.to_vec(), set)
}

/// Piped standard streams of a freshly spawned server.
#[derive(Debug)]
pub struct ProcessStreams {
    /// Server stdin, where requests are written.
    pub stdin: ChildStdin,
    /// Server stdout, the reply stream.
    pub stdout: ChildStdout,
    /// Server stderr, the diagnostic stream.
    pub stderr: ChildStderr,
}

/// Handle to a running server process.
#[derive(Debug)]
pub struct ServerProcess {
    name: String,
    child: Option<Child>,
}

/// Spawn the server described by `spec`.
///
/// # Errors
///
/// - [`AppError::CommandNotFound`] when the executable does not exist.
/// - [`AppError::Spawn`] for any other launch failure, including a missing
///   working directory or a stream that could not be captured.
pub fn spawn_server(spec: &LaunchSpec) -> Result<(ServerProcess, ProcessStreams)> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);

    let (removed, set) = child_env(spec);
    for key in removed {
        cmd.env_remove(key);
    }
    for (key, value) in set {
        cmd.env(key, value);
    }

    if let Some(dir) = &spec.working_dir {
        if !dir.is_dir() {
            return Err(AppError::Spawn(format!(
                "working directory {} for {} does not exist",
                dir.display(),
                spec.name
            )));
        }
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::CommandNotFound(format!("{}: {err}", spec.program))
        } else {
            AppError::Spawn(format!("failed to start {}: {err}", spec.command_line()))
        }
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stderr".into()))?;

    info!(
        server = %spec.name,
        pid = child.id(),
        command = %spec.command_line(),
        "server process started"
    );

    Ok((
        ServerProcess {
            name: spec.name.clone(),
            child: Some(child),
        },
        ProcessStreams {
            stdin,
            stdout,
            stderr,
        },
    ))
}

impl ServerProcess {
    /// OS process id, while the process is held.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Whether the process has already exited, without waiting.
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            None => true,
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
        }
    }

    /// Stop the process: ask it to terminate, wait up to `grace`, then kill.
    ///
    /// Idempotent; a second call is a no-op. The caller closes stdin first
    /// so well-behaved servers exit on end-of-file.
    pub async fn stop(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!(server = %self.name, ?status, "server process already exited");
            return;
        }

        request_terminate(&mut child);

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(server = %self.name, ?status, "server process exited");
            }
            Ok(Err(err)) => {
                warn!(server = %self.name, %err, "error waiting for server process");
            }
            Err(_) => {
                warn!(
                    server = %self.name,
                    ?grace,
                    "server process did not exit within grace period, forcing kill"
                );
                if let Err(err) = child.kill().await {
                    warn!(server = %self.name, %err, "failed to force-kill server process");
                }
            }
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, %err, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "start_kill failed");
    }
}
