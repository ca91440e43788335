//! uv-managed Python virtualenv.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::{EnvStatus, Interpreter, RunningScript};

const REMEDIATION: &str =
    "Please install uv (https://docs.astral.sh/uv/) or point launcher_path at it";

/// Compiles the file named by the first argument without running it.
const COMPILE_ONLY: &str =
    "import sys; compile(open(sys.argv[1], encoding='utf-8').read(), sys.argv[1], 'exec')";

/// Python virtualenv created and provisioned through a launcher (uv).
#[derive(Debug, Clone)]
pub struct PythonEnv {
    /// Launcher binary.
    launcher: String,
    /// Virtualenv directory.
    env_path: PathBuf,
    /// Package every generated script may import.
    dependency: String,
}

impl PythonEnv {
    /// Creates a manager for the virtualenv at `env_path`.
    pub fn new(
        launcher: impl Into<String>,
        env_path: impl Into<PathBuf>,
        dependency: impl Into<String>,
    ) -> Self {
        Self {
            launcher: launcher.into(),
            env_path: env_path.into(),
            dependency: dependency.into(),
        }
    }

    /// Returns the launcher.
    pub fn launcher(&self) -> &str {
        &self.launcher
    }

    /// Returns the virtualenv directory.
    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    /// Returns the interpreter inside the virtualenv.
    pub fn python_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.env_path.join("Scripts").join("python.exe")
        } else {
            self.env_path.join("bin").join("python")
        }
    }

    fn command(program: impl AsRef<OsStr>) -> Command {
        let mut command = Command::new(program);
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    async fn check_launcher(&self) -> std::result::Result<(), String> {
        let output = Self::command(&self.launcher)
            .arg("--version")
            .output()
            .await
            .map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(())
        } else {
            Err(format!("`{} --version` exited with {}", self.launcher, output.status))
        }
    }

    async fn dependency_importable(&self) -> bool {
        let module = self.dependency.replace('-', "_");
        Self::command(self.python_path())
            .arg("-c")
            .arg(format!("import {}", module))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn run_launcher(&self, args: &[&OsStr], action: &str) -> Result<()> {
        let output = Self::command(&self.launcher)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Environment(format!("failed to {}: {}", action, e)))?;

        if !output.status.success() {
            return Err(Error::Environment(format!(
                "failed to {}: {}\n{}",
                action,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Interpreter for PythonEnv {
    async fn ensure_environment(&self) -> Result<()> {
        if let Err(reason) = self.check_launcher().await {
            return Err(Error::ToolchainUnavailable {
                launcher: self.launcher.clone(),
                reason,
                remediation: REMEDIATION.to_string(),
            });
        }

        if !tokio::fs::try_exists(&self.env_path).await.unwrap_or(false) {
            tracing::info!(env_path = ?self.env_path, "creating virtual environment");
            self.run_launcher(
                &[OsStr::new("venv"), self.env_path.as_os_str()],
                "create virtual environment",
            )
            .await?;
        }

        if !self.dependency_importable().await {
            tracing::info!(dependency = %self.dependency, "installing dependency");
            let python = self.python_path();
            self.run_launcher(
                &[
                    OsStr::new("pip"),
                    OsStr::new("install"),
                    OsStr::new(&self.dependency),
                    OsStr::new("--python"),
                    python.as_os_str(),
                ],
                "install dependencies",
            )
            .await?;
        }

        tracing::info!(env_path = ?self.env_path, "python environment ready");
        Ok(())
    }

    async fn status(&self) -> EnvStatus {
        EnvStatus {
            tool_available: self.check_launcher().await.is_ok(),
            environment_exists: tokio::fs::try_exists(&self.env_path).await.unwrap_or(false),
            environment_path: self.env_path.clone(),
        }
    }

    async fn check_syntax(&self, script: &Path) -> Result<Option<String>> {
        let output = Self::command(self.python_path())
            .arg("-c")
            .arg(COMPILE_ONLY)
            .arg(script)
            .output()
            .await
            .map_err(|e| Error::CheckExecution(format!("failed to run python: {}", e)))?;

        if output.status.success() {
            return Ok(None);
        }

        let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
        let diagnostic = diagnostic.trim();

        if diagnostic.is_empty() {
            Ok(Some(format!("syntax check exited with {}", output.status)))
        } else {
            Ok(Some(diagnostic.to_string()))
        }
    }

    fn run_script(&self, script: &Path, args: &[String]) -> Result<RunningScript> {
        tracing::info!(script = ?script, python = ?self.python_path(), "starting script");
        let mut command = Command::new(self.python_path());
        command.arg(script).args(args);
        RunningScript::spawn(command)
    }

    fn name(&self) -> &str {
        "python"
    }
}
