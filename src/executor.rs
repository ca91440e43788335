//! Batch execution of generated scripts with runtime repair.
//!
//! Each attempt materializes the candidate into a throwaway directory,
//! runs it against the input/output directories and drains both output
//! streams concurrently. Progress lines update the shared monitor. A
//! failing run is handed to the repairer until the retry budget is spent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::error::{Error, Result};
use crate::monitor::{BatchProgress, BatchStatus, ProgressInfo, ProgressMonitor};
use crate::repair::Repairer;
use crate::runner::{Interpreter, RunningScript};

/// Outcome of a batch run.
///
/// `total_files == succeeded + failed` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Absolute output directory.
    pub output_path: PathBuf,
    pub errors: Vec<String>,
}

impl BatchResult {
    fn from_tally(total: usize, succeeded: usize, output_path: &Path) -> Self {
        let succeeded = succeeded.min(total);
        Self {
            total_files: total,
            succeeded,
            failed: total - succeeded,
            output_path: output_path.to_path_buf(),
            errors: Vec::new(),
        }
    }
}

/// Runs scripts over a directory of inputs and publishes progress.
pub struct BatchExecutor {
    interpreter: Arc<dyn Interpreter>,
    repairer: Arc<dyn Repairer>,
    monitor: Arc<ProgressMonitor>,
}

impl BatchExecutor {
    /// Creates an executor with an idle monitor.
    pub fn new(interpreter: Arc<dyn Interpreter>, repairer: Arc<dyn Repairer>) -> Self {
        Self {
            interpreter,
            repairer,
            monitor: Arc::new(ProgressMonitor::new()),
        }
    }

    /// Returns a copy of the current progress snapshot.
    pub fn progress(&self) -> BatchProgress {
        self.monitor.snapshot()
    }

    /// Returns the monitor this executor publishes to.
    pub fn monitor(&self) -> Arc<ProgressMonitor> {
        self.monitor.clone()
    }

    /// Runs `code` over `input_dir`, writing into `output_dir`.
    ///
    /// Argument errors are reported before anything is spawned or
    /// published. Once the first attempt starts, the last snapshot
    /// published is always `completed` or `failed`.
    ///
    /// A run that still fails after `max_retries` repairs, or whose repair
    /// call fails, is returned as [`Error::Execution`] carrying the failure
    /// result.
    pub async fn execute(
        &self,
        code: &str,
        input_dir: &str,
        output_dir: &str,
        max_retries: u32,
    ) -> Result<BatchResult> {
        if code.trim().is_empty() {
            return Err(Error::InvalidInput("script code must not be empty".to_string()));
        }
        let input_dir = input_dir.trim();
        let output_dir = output_dir.trim();
        if input_dir.is_empty() || output_dir.is_empty() {
            return Err(Error::InvalidInput(
                "input and output directories must not be empty".to_string(),
            ));
        }

        let input = std::path::absolute(input_dir)?;
        if !tokio::fs::metadata(&input)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(Error::NotFound(format!(
                "input directory does not exist: {}",
                input.display()
            )));
        }

        let output = std::path::absolute(output_dir)?;
        tokio::fs::create_dir_all(&output).await?;

        tracing::info!(
            interpreter = self.interpreter.name(),
            input = ?input,
            output = ?output,
            max_retries,
            "starting batch"
        );

        let outcome = self.attempts(code, &input, &output, max_retries).await;

        match &outcome {
            Ok(result) => {
                tracing::info!(
                    total = result.total_files,
                    succeeded = result.succeeded,
                    "batch completed"
                );
                self.monitor.publish(BatchProgress {
                    status: BatchStatus::Completed,
                    progress: 1.0,
                    total_files: result.total_files,
                    processed: result.succeeded,
                    failed: result.failed,
                    message: "completed".to_string(),
                    ..BatchProgress::default()
                });
            }
            Err(Error::Execution {
                last_error, result, ..
            }) => {
                self.monitor.publish(BatchProgress {
                    status: BatchStatus::Failed,
                    total_files: result.total_files,
                    processed: result.succeeded,
                    failed: result.failed,
                    message: last_error.clone(),
                    ..BatchProgress::default()
                });
            }
            Err(err) => {
                self.monitor
                    .publish(BatchProgress::with_status(BatchStatus::Failed, err.to_string()));
            }
        }

        outcome
    }

    async fn attempts(
        &self,
        code: &str,
        input: &Path,
        output: &Path,
        max_retries: u32,
    ) -> Result<BatchResult> {
        let args = vec![
            "--input".to_string(),
            input.to_string_lossy().into_owned(),
            "--output".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        let mut candidate = code.to_string();
        let mut last_error = String::new();

        for attempt in 0..=max_retries {
            let failure = match self.run_once(&candidate, &args).await? {
                None => {
                    let (total, succeeded) = self.monitor.tally();
                    return Ok(BatchResult::from_tally(total, succeeded, output));
                }
                Some(failure) => failure,
            };

            tracing::warn!(attempt, max_retries, error = %failure, "script failed");
            last_error = failure;

            if attempt == max_retries {
                break;
            }

            self.monitor.publish(BatchProgress::with_status(
                BatchStatus::Fixing,
                format!("attempt {}/{}", attempt + 1, max_retries),
            ));

            match self.repairer.repair(&candidate, &last_error).await {
                Ok(fixed) => candidate = fixed,
                Err(err) => {
                    tracing::warn!(error = %err, "runtime repair failed");
                    return Err(self.failure(attempt + 1, last_error, Some(err.to_string()), output));
                }
            }
        }

        Err(self.failure(max_retries.saturating_add(1), last_error, None, output))
    }

    fn failure(
        &self,
        attempts: u32,
        last_error: String,
        repair_error: Option<String>,
        output: &Path,
    ) -> Error {
        let (total, succeeded) = self.monitor.tally();
        let mut result = BatchResult::from_tally(total, succeeded, output);
        result.errors.push(last_error.clone());
        Error::Execution {
            attempts,
            last_error,
            repair_error,
            result: Box::new(result),
        }
    }

    /// Runs one attempt. `Ok(Some(text))` is a script failure.
    async fn run_once(&self, code: &str, args: &[String]) -> Result<Option<String>> {
        let dir = tempfile::Builder::new().prefix("logforge-run-").tempdir()?;
        let script = dir.path().join("script.py");
        tokio::fs::write(&script, code).await?;

        self.monitor.reset_tally();
        self.monitor
            .publish(BatchProgress::with_status(BatchStatus::Running, "running script"));

        let RunningScript {
            mut child,
            stdout,
            mut stderr,
        } = self.interpreter.run_script(&script, args)?;

        let monitor = self.monitor.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).split(b'\n');
            while let Ok(Some(line)) = lines.next_segment().await {
                if let Some(info) = ProgressInfo::parse_line(&String::from_utf8_lossy(&line)) {
                    monitor.record(&info);
                }
            }
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                tracing::warn!(error = %e, "stderr read interrupted");
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let (stdout_done, stderr_text) = tokio::join!(stdout_task, stderr_task);
        if let Err(e) = stdout_done {
            tracing::warn!(error = %e, "stdout drain task failed");
        }
        let stderr_text = stderr_text.unwrap_or_default();

        let status = child.wait().await?;
        if status.success() {
            return Ok(None);
        }

        let stderr_text = stderr_text.trim();
        if stderr_text.is_empty() {
            Ok(Some(format!("script exited with {}", status)))
        } else {
            Ok(Some(stderr_text.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::shell::ShellInterpreter;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    const FAILING: &str = "echo boom >&2\nexit 1\n";

    /// Records every call and answers with a fixed script, or fails.
    struct ScriptedRepairer {
        reply: Option<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
        monitor: OnceLock<Arc<ProgressMonitor>>,
        seen_status: Mutex<Vec<BatchStatus>>,
    }

    impl ScriptedRepairer {
        fn replying(reply: &'static str) -> Arc<Self> {
            Self::build(Some(reply))
        }

        fn failing() -> Arc<Self> {
            Self::build(None)
        }

        fn build(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
                monitor: OnceLock::new(),
                seen_status: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Repairer for ScriptedRepairer {
        async fn repair(&self, code: &str, error: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((code.to_string(), error.to_string()));
            if let Some(monitor) = self.monitor.get() {
                self.seen_status.lock().unwrap().push(monitor.snapshot().status);
            }
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => Err(Error::RepairCall("model unavailable".to_string())),
            }
        }
    }

    struct Dirs {
        _temp: TempDir,
        input: String,
        output: String,
    }

    fn dirs() -> Dirs {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in");
        std::fs::create_dir(&input).unwrap();
        let output = temp.path().join("out");
        Dirs {
            input: input.to_string_lossy().into_owned(),
            output: output.to_string_lossy().into_owned(),
            _temp: temp,
        }
    }

    fn executor(repairer: Arc<ScriptedRepairer>) -> BatchExecutor {
        BatchExecutor::new(Arc::new(ShellInterpreter), repairer)
    }

    #[tokio::test]
    async fn empty_input_dir_completes_without_repair() {
        let dirs = dirs();
        let repairer = ScriptedRepairer::failing();
        let executor = executor(repairer.clone());

        let result = executor
            .execute("exit 0\n", &dirs.input, &dirs.output, 3)
            .await
            .unwrap();

        assert_eq!(result.total_files, 0);
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failed, 0);
        assert!(result.errors.is_empty());
        assert_eq!(repairer.call_count(), 0);

        let progress = executor.progress();
        assert_eq!(progress.status, BatchStatus::Completed);
        assert_eq!(progress.progress, 1.0);
    }

    #[tokio::test]
    async fn script_receives_absolute_dirs_and_reports_progress() {
        let dirs = dirs();
        let executor = executor(ScriptedRepairer::failing());
        let script = r#"[ "$1" = "--input" ] && [ -d "$2" ] || exit 3
[ "$3" = "--output" ] && [ -d "$4" ] || exit 4
case "$2" in /*) ;; *) exit 5 ;; esac
echo "starting up"
echo '{"file": "a.log", "progress": 0.5, "total": 2, "current": 1}'
echo 'not json {'
echo '{"file": "b.log", "progress": 1.0, "total": 2, "current": 2}'
touch "$4/result.xlsx"
"#;

        let result = executor
            .execute(script, &dirs.input, &dirs.output, 0)
            .await
            .unwrap();

        assert_eq!(result.total_files, 2);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 0);
        assert!(result.output_path.is_absolute());
        assert!(result.output_path.join("result.xlsx").exists());
    }

    #[tokio::test]
    async fn partial_progress_counts_remaining_as_failed() {
        let dirs = dirs();
        let executor = executor(ScriptedRepairer::failing());
        let script = "echo '{\"file\": \"a.log\", \"progress\": 0.33, \"total\": 3, \"current\": 1}'\n";

        let result = executor
            .execute(script, &dirs.input, &dirs.output, 0)
            .await
            .unwrap();

        assert_eq!(result.total_files, 3);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 2);
    }

    #[tokio::test]
    async fn failing_repair_aborts_after_first_attempt() {
        let dirs = dirs();
        let repairer = ScriptedRepairer::failing();
        let executor = executor(repairer.clone());

        let err = executor
            .execute(FAILING, &dirs.input, &dirs.output, 5)
            .await
            .unwrap_err();

        match err {
            Error::Execution {
                attempts,
                last_error,
                repair_error,
                result,
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(last_error, "boom");
                assert!(repair_error.unwrap().contains("model unavailable"));
                assert_eq!(result.errors, vec!["boom".to_string()]);
            }
            other => panic!("Expected Execution error, got {:?}", other),
        }
        assert_eq!(repairer.call_count(), 1);
        assert_eq!(executor.progress().status, BatchStatus::Failed);
    }

    #[tokio::test]
    async fn successful_repair_recovers() {
        let dirs = dirs();
        let repairer = ScriptedRepairer::replying("exit 0\n");
        let executor = executor(repairer.clone());
        repairer.monitor.set(executor.monitor()).ok();

        let result = executor
            .execute(FAILING, &dirs.input, &dirs.output, 2)
            .await
            .unwrap();

        assert!(result.errors.is_empty());
        let calls = repairer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, FAILING);
        assert_eq!(calls[0].1, "boom");
        assert_eq!(*repairer.seen_status.lock().unwrap(), vec![BatchStatus::Fixing]);
        assert_eq!(executor.progress().status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn largest_budget_repairs_until_success() {
        let dirs = dirs();
        let repairer = ScriptedRepairer::replying("exit 0\n");
        let executor = executor(repairer.clone());

        let result = executor
            .execute(FAILING, &dirs.input, &dirs.output, u32::MAX)
            .await
            .unwrap();

        assert!(result.errors.is_empty());
        assert_eq!(repairer.call_count(), 1);
        assert_eq!(executor.progress().status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_last_error() {
        let dirs = dirs();
        let repairer = ScriptedRepairer::replying(FAILING);
        let executor = executor(repairer.clone());

        let err = executor
            .execute(FAILING, &dirs.input, &dirs.output, 2)
            .await
            .unwrap_err();

        match err {
            Error::Execution {
                attempts,
                repair_error,
                result,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(repair_error.is_none());
                assert_eq!(result.errors, vec!["boom".to_string()]);
            }
            other => panic!("Expected Execution error, got {:?}", other),
        }
        assert_eq!(repairer.call_count(), 2);

        let progress = executor.progress();
        assert_eq!(progress.status, BatchStatus::Failed);
        assert_eq!(progress.message, "boom");
    }

    #[tokio::test]
    async fn silent_failure_uses_exit_status() {
        let dirs = dirs();
        let executor = executor(ScriptedRepairer::failing());

        let err = executor
            .execute("exit 7\n", &dirs.input, &dirs.output, 0)
            .await
            .unwrap_err();

        match err {
            Error::Execution { last_error, .. } => {
                assert!(last_error.starts_with("script exited with"));
            }
            other => panic!("Expected Execution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn large_output_on_both_streams_does_not_block() {
        let dirs = dirs();
        let executor = executor(ScriptedRepairer::failing());
        let script = "i=0\nwhile [ $i -lt 4000 ]; do\n  echo \"noise line $i padding padding padding\"\n  echo \"warning line $i padding padding padding\" >&2\n  i=$((i+1))\ndone\n";

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            executor.execute(script, &dirs.input, &dirs.output, 0),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(result.total_files, 0);
    }

    #[tokio::test]
    async fn missing_input_dir_is_not_found() {
        let dirs = dirs();
        let executor = executor(ScriptedRepairer::failing());
        let missing = format!("{}/nope", dirs.input);

        let err = executor
            .execute("exit 0\n", &missing, &dirs.output, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(executor.progress().status, BatchStatus::Idle);
    }

    #[tokio::test]
    async fn output_dir_is_created() {
        let dirs = dirs();
        let executor = executor(ScriptedRepairer::failing());
        let nested = format!("{}/deep/er", dirs.output);

        executor
            .execute("exit 0\n", &dirs.input, &nested, 0)
            .await
            .unwrap();

        assert!(Path::new(&nested).is_dir());
    }

    #[tokio::test]
    async fn deadline_kills_running_script() {
        let dirs = dirs();
        let executor = executor(ScriptedRepairer::failing());
        let marker = format!("{}/late", dirs.output);
        let script = format!("sleep 2\ntouch '{}'\n", marker);

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            executor.execute(&script, &dirs.input, &dirs.output, 0),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!Path::new(&marker).exists());
    }

    proptest! {
        #[test]
        fn blank_dirs_are_rejected_before_spawning(
            blank in "[ \t\n]{0,6}",
            blank_is_input in any::<bool>(),
        ) {
            let dirs = dirs();
            let repairer = ScriptedRepairer::failing();
            let executor = executor(repairer.clone());
            let (input, output) = if blank_is_input {
                (blank.as_str(), dirs.output.as_str())
            } else {
                (dirs.input.as_str(), blank.as_str())
            };

            let outcome = tokio_test::block_on(executor.execute("exit 0\n", input, output, 1));

            prop_assert!(matches!(outcome, Err(Error::InvalidInput(_))));
            prop_assert_eq!(executor.progress().status, BatchStatus::Idle);
            prop_assert_eq!(repairer.call_count(), 0);
        }
    }
}
