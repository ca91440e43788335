//! Interpreter environments for checking and running generated scripts.
//!
//! The default implementation manages a uv-created Python virtualenv.

mod python;
#[cfg(test)]
pub(crate) mod shell;

pub use python::PythonEnv;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::error::{Error, Result};

/// Snapshot of an environment's state, recomputed on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvStatus {
    /// Whether the launcher answered a version check.
    pub tool_available: bool,
    /// Whether the environment directory exists.
    pub environment_exists: bool,
    /// Location of the environment.
    pub environment_path: PathBuf,
}

/// A started script with its live output streams.
///
/// Both streams must be drained before waiting on `child`; a full pipe
/// blocks the script. The child is killed if this value (or the child
/// taken out of it) is dropped before it exits.
#[derive(Debug)]
pub struct RunningScript {
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl RunningScript {
    /// Spawns `command` with piped stdout/stderr and a null stdin.
    pub fn spawn(mut command: Command) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::Launch(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Launch("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Launch("stderr was not captured".to_string()))?;

        Ok(Self {
            child,
            stdout,
            stderr,
        })
    }
}

/// An interpreter that can parse-check and run scripts.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Makes the environment usable. Safe to call repeatedly.
    async fn ensure_environment(&self) -> Result<()>;

    /// Reports the current environment state.
    async fn status(&self) -> EnvStatus;

    /// Parse-checks a script without executing it.
    ///
    /// Returns `Ok(None)` when the script parses, `Ok(Some(diagnostic))` when
    /// it does not, and an error when the check itself could not run.
    async fn check_syntax(&self, script: &Path) -> Result<Option<String>>;

    /// Starts a script with the given arguments.
    fn run_script(&self, script: &Path, args: &[String]) -> Result<RunningScript>;

    /// Returns the name of this interpreter.
    fn name(&self) -> &str;
}
