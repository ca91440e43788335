//! POSIX shell interpreter used by unit tests in place of Python.
//!
//! `sh -n` is the parse-only check and `sh <script> <args>` runs a script,
//! so the check and run loops can be driven without a Python toolchain.
//! `tests/pipeline_integration.rs` carries a copy with the same behavior.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::{EnvStatus, Interpreter, RunningScript};

pub(crate) struct ShellInterpreter;

#[async_trait]
impl Interpreter for ShellInterpreter {
    async fn ensure_environment(&self) -> Result<()> {
        Ok(())
    }

    async fn status(&self) -> EnvStatus {
        EnvStatus {
            tool_available: true,
            environment_exists: true,
            environment_path: PathBuf::from("/bin"),
        }
    }

    async fn check_syntax(&self, script: &Path) -> Result<Option<String>> {
        let output = Command::new("sh")
            .arg("-n")
            .arg(script)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::CheckExecution(e.to_string()))?;

        if output.status.success() {
            return Ok(None);
        }

        let diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostic.is_empty() {
            Ok(Some(format!("sh -n exited with {}", output.status)))
        } else {
            Ok(Some(diagnostic))
        }
    }

    fn run_script(&self, script: &Path, args: &[String]) -> Result<RunningScript> {
        let mut command = Command::new("sh");
        command.arg(script).args(args);
        RunningScript::spawn(command)
    }

    fn name(&self) -> &str {
        "sh"
    }
}

/// Writes an executable stand-in for uv into `dir`.
///
/// Every invocation appends its subcommand to `log`. `venv` creates the
/// environment with `/bin/sh` as its python and `pip` always succeeds.
#[cfg(unix)]
pub(crate) fn fake_uv(dir: &Path, log: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        "#!/bin/sh\n\
         echo \"$1\" >> '{log}'\n\
         case \"$1\" in\n\
           --version) echo 'uv 0.4.0' ;;\n\
           venv) mkdir -p \"$2/bin\" && ln -s /bin/sh \"$2/bin/python\" ;;\n\
           pip) exit 0 ;;\n\
           *) exit 2 ;;\n\
         esac\n",
        log = log.display()
    );
    let path = dir.join("fake-uv");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn check_separates_parse_errors_from_valid_scripts() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.sh");
        let bad = temp.path().join("bad.sh");
        std::fs::write(&good, "for f in a b; do echo \"$f\"; done\n").unwrap();
        std::fs::write(&bad, "for f in; do").unwrap();

        assert_eq!(ShellInterpreter.check_syntax(&good).await.unwrap(), None);
        let diagnostic = ShellInterpreter.check_syntax(&bad).await.unwrap().unwrap();
        assert!(!diagnostic.is_empty());
    }
}
