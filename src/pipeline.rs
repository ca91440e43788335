//! Application service tying generation, validation, execution and
//! project storage together.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::analyzer::SampleAnalyzer;
use crate::config::{Settings, MAX_RETRY_LIMIT};
use crate::error::{Error, Result};
use crate::executor::{BatchExecutor, BatchResult};
use crate::llm::{ChatModel, LlmClient, Message};
use crate::monitor::BatchProgress;
use crate::project::{Project, ProjectStatus, ProjectStore, ProjectUpdate};
use crate::repair::{LlmRepairer, RepairKind};
use crate::runner::{EnvStatus, Interpreter, PythonEnv};
use crate::validator::CodeValidator;

/// Deadline for turning a sample into code.
pub const ANALYZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for the connectivity check.
pub const LLM_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of [`Pipeline::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub project_id: String,
    pub code: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Stages that need a chat model.
struct Stages {
    model: Arc<dyn ChatModel>,
    analyzer: SampleAnalyzer,
    validator: CodeValidator,
    executor: Arc<BatchExecutor>,
}

impl Stages {
    fn build(model: Arc<dyn ChatModel>, interpreter: Arc<dyn Interpreter>) -> Self {
        let analyzer = SampleAnalyzer::new(model.clone());
        let validator = CodeValidator::new(
            interpreter.clone(),
            Arc::new(LlmRepairer::new(model.clone(), RepairKind::Syntax)),
        );
        let executor = Arc::new(BatchExecutor::new(
            interpreter,
            Arc::new(LlmRepairer::new(model.clone(), RepairKind::Runtime)),
        ));
        Self {
            model,
            analyzer,
            validator,
            executor,
        }
    }
}

/// Clears the active-batch flag when the batch task ends, however it ends.
struct ActiveBatch(Arc<AtomicBool>);

impl Drop for ActiveBatch {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Front door for generating and running log processing scripts.
pub struct Pipeline {
    settings: Settings,
    interpreter: Arc<dyn Interpreter>,
    stages: Option<Stages>,
    store: Arc<dyn ProjectStore>,
    batch_active: Arc<AtomicBool>,
}

impl Pipeline {
    /// Builds a pipeline from settings.
    ///
    /// Model-backed stages are only created when the LLM section is
    /// complete; otherwise operations that need them return
    /// [`Error::Config`].
    pub fn new(settings: Settings, config_dir: &Path, store: Arc<dyn ProjectStore>) -> Result<Self> {
        Self::check_retry_budget(&settings)?;
        let interpreter = Self::interpreter_for(&settings, config_dir);
        let model = Self::model_for(&settings)?;
        Ok(Self::from_parts(settings, interpreter, model, store))
    }

    /// Builds a pipeline from already constructed collaborators.
    pub fn from_parts(
        settings: Settings,
        interpreter: Arc<dyn Interpreter>,
        model: Option<Arc<dyn ChatModel>>,
        store: Arc<dyn ProjectStore>,
    ) -> Self {
        let stages = model.map(|model| Stages::build(model, interpreter.clone()));
        Self {
            settings,
            interpreter,
            stages,
            store,
            batch_active: Arc::new(AtomicBool::new(false)),
        }
    }

    fn interpreter_for(settings: &Settings, config_dir: &Path) -> Arc<dyn Interpreter> {
        let env = PythonEnv::new(
            settings.launcher(),
            settings.resolved_env_dir(config_dir),
            settings.dependency.clone(),
        );
        tracing::debug!(
            launcher = %env.launcher(),
            env_path = ?env.env_path(),
            "python environment configured"
        );
        Arc::new(env)
    }

    fn check_retry_budget(settings: &Settings) -> Result<()> {
        if settings.max_retries > MAX_RETRY_LIMIT {
            return Err(Error::Config(format!(
                "max_retries must not exceed {} (got {})",
                MAX_RETRY_LIMIT, settings.max_retries
            )));
        }
        Ok(())
    }

    fn model_for(settings: &Settings) -> Result<Option<Arc<dyn ChatModel>>> {
        if !settings.llm.is_complete() {
            tracing::info!("LLM is not configured");
            return Ok(None);
        }
        let client = LlmClient::new(&settings.llm)?;
        tracing::info!(endpoint = %client.endpoint(), model = %client.model(), "LLM configured");
        Ok(Some(Arc::new(client)))
    }

    /// Replaces the settings and rebuilds every dependent component.
    ///
    /// Refused while a batch is running.
    pub fn reconfigure(&mut self, settings: Settings, config_dir: &Path) -> Result<()> {
        if self.batch_active.load(Ordering::SeqCst) {
            return Err(Error::InvalidInput(
                "cannot reconfigure while a batch is running".to_string(),
            ));
        }
        Self::check_retry_budget(&settings)?;
        let interpreter = Self::interpreter_for(&settings, config_dir);
        let model = Self::model_for(&settings)?;
        self.stages = model.map(|model| Stages::build(model, interpreter.clone()));
        self.interpreter = interpreter;
        self.settings = settings;
        Ok(())
    }

    /// Returns the active settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether the model-backed stages are available.
    pub fn is_llm_configured(&self) -> bool {
        self.stages.is_some()
    }

    fn stages(&self) -> Result<&Stages> {
        self.stages.as_ref().ok_or_else(|| {
            Error::Config("LLM is not configured. Please configure LLM settings first".to_string())
        })
    }

    /// Generates and validates a script for `sample`, then stores it as a
    /// new project.
    ///
    /// The interpreter environment is prepared before the model is asked
    /// for anything.
    pub async fn generate(&self, project_name: &str, sample: &str) -> Result<GenerateResult> {
        let stages = self.stages()?;
        let name = project_name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("project name must not be empty".to_string()));
        }

        self.interpreter.ensure_environment().await?;

        let code = tokio::time::timeout(ANALYZE_TIMEOUT, stages.analyzer.analyze(sample))
            .await
            .map_err(|_| {
                Error::LlmCall(format!(
                    "sample analysis timed out after {}s",
                    ANALYZE_TIMEOUT.as_secs()
                ))
            })??;

        let validation = stages
            .validator
            .validate(&code, self.settings.max_retries)
            .await?;

        let status = if validation.valid {
            ProjectStatus::Validated
        } else {
            ProjectStatus::Draft
        };
        let project = self
            .store
            .create(Project::new(name, sample, validation.code.clone()).with_status(status))?;

        tracing::info!(
            id = %project.id,
            valid = validation.valid,
            retries = validation.retries,
            "project generated"
        );

        Ok(GenerateResult {
            project_id: project.id,
            code: validation.code,
            valid: validation.valid,
            errors: validation.errors,
        })
    }

    /// Starts a batch run of a project's script on a background task.
    ///
    /// The task prepares the interpreter environment first; if that fails
    /// the error is returned and the project is left untouched. Otherwise
    /// the project is marked `executed` or `failed` when the task ends.
    /// Only one batch may run at a time. Must be called from within a
    /// Tokio runtime.
    pub fn run_batch(
        &self,
        project_id: &str,
        input_dir: &str,
        output_dir: &str,
    ) -> Result<JoinHandle<Result<BatchResult>>> {
        let stages = self.stages()?;
        let project = self.store.get(project_id)?;
        if project.code.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "project {} has no code to run",
                project.id
            )));
        }
        if input_dir.trim().is_empty() || output_dir.trim().is_empty() {
            return Err(Error::InvalidInput(
                "input and output directories must not be empty".to_string(),
            ));
        }
        if self
            .batch_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::InvalidInput("a batch is already running".to_string()));
        }

        let active = ActiveBatch(self.batch_active.clone());
        let interpreter = self.interpreter.clone();
        let executor = stages.executor.clone();
        let store = self.store.clone();
        let max_retries = self.settings.max_retries;
        let input_dir = input_dir.to_string();
        let output_dir = output_dir.to_string();

        tracing::info!(id = %project.id, "starting batch run");

        Ok(tokio::spawn(async move {
            let _active = active;
            interpreter.ensure_environment().await?;

            let outcome = executor
                .execute(&project.code, &input_dir, &output_dir, max_retries)
                .await;

            let status = if outcome.is_ok() {
                ProjectStatus::Executed
            } else {
                ProjectStatus::Failed
            };
            if let Err(e) = store.update(&project.id, ProjectUpdate::status(status)) {
                tracing::warn!(id = %project.id, error = %e, "failed to record batch status");
            }

            outcome
        }))
    }

    /// Whether a batch task is still running.
    pub fn is_batch_active(&self) -> bool {
        self.batch_active.load(Ordering::SeqCst)
    }

    /// Returns a copy of the batch progress, idle when unconfigured.
    pub fn batch_progress(&self) -> BatchProgress {
        self.stages
            .as_ref()
            .map(|stages| stages.executor.progress())
            .unwrap_or_default()
    }

    /// Prepares the interpreter environment.
    pub async fn ensure_environment(&self) -> Result<()> {
        self.interpreter.ensure_environment().await
    }

    /// Reports the interpreter environment state.
    pub async fn environment_status(&self) -> EnvStatus {
        self.interpreter.status().await
    }

    /// Sends a one-line request to the model and expects any reply.
    pub async fn check_llm(&self) -> Result<()> {
        let stages = self.stages()?;
        let request = [Message::user("Reply with OK")];
        tokio::time::timeout(LLM_CHECK_TIMEOUT, stages.model.chat(&request))
            .await
            .map_err(|_| {
                Error::LlmCall(format!(
                    "connection test timed out after {}s",
                    LLM_CHECK_TIMEOUT.as_secs()
                ))
            })??;
        Ok(())
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.list()
    }

    pub fn get_project(&self, id: &str) -> Result<Project> {
        self.store.get(id)
    }

    /// Replaces a project's code. The status is left unchanged.
    pub fn update_project_code(&self, id: &str, code: &str) -> Result<Project> {
        self.store.update(id, ProjectUpdate::code(code))
    }

    pub fn delete_project(&self, id: &str) -> Result<()> {
        self.store.delete(id)
    }
}
