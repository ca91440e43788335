//! LogForge CLI
//!
//! Generates log processing scripts from samples and runs them in batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;

use logforge::{
    default_config_dir, BatchProgress, Error, JsonProjectStore, Pipeline, Result, SettingsStore,
    Validate,
};

#[derive(Parser)]
#[command(name = "logforge")]
#[command(about = "Generate and run log-to-spreadsheet converters from sample log lines")]
struct Cli {
    /// Settings file (defaults to <config dir>/logforge/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a script from a log sample and save it as a project
    Generate {
        /// Project name
        #[arg(short, long)]
        name: String,
        /// File holding the sample lines (reads stdin when omitted)
        #[arg(short, long)]
        sample: Option<PathBuf>,
    },
    /// Run a project's script over a directory of log files
    Run {
        /// Project id
        #[arg(short, long)]
        project: String,
        /// Input directory (defaults to the configured one)
        #[arg(short, long)]
        input: Option<String>,
        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Manage stored projects
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
    /// Manage the Python environment
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },
    /// Check that the configured LLM answers
    CheckLlm,
}

#[derive(Subcommand)]
enum ProjectsCommand {
    /// List projects, newest first
    List,
    /// Show a project with its code
    Show { id: String },
    /// Delete a project
    Delete { id: String },
}

#[derive(Subcommand)]
enum EnvCommand {
    /// Create the environment and install its dependency
    Setup,
    /// Show the environment status
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .unwrap_or_else(|| default_config_dir().join("settings.toml"));
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_dir);

    let settings = SettingsStore::new(&config_path).load()?;
    for warning in settings.validate().warnings {
        tracing::warn!(path = ?config_path, "{}", warning);
    }

    let store = Arc::new(JsonProjectStore::new(config_dir.join("projects"))?);
    let pipeline = Pipeline::new(settings, &config_dir, store)?;

    match cli.command {
        Commands::Generate { name, sample } => generate(&pipeline, &name, sample.as_deref()).await,
        Commands::Run {
            project,
            input,
            output,
        } => run_batch(&pipeline, &project, input, output).await,
        Commands::Projects { command } => projects(&pipeline, command),
        Commands::Env { command } => env(&pipeline, command).await,
        Commands::CheckLlm => {
            pipeline.check_llm().await?;
            println!("LLM connection OK");
            Ok(())
        }
    }
}

async fn generate(pipeline: &Pipeline, name: &str, sample: Option<&Path>) -> Result<()> {
    let sample = match sample {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };

    let result = pipeline.generate(name, &sample).await?;

    println!("Project: {}", result.project_id);
    println!("Valid:   {}", result.valid);
    if !result.errors.is_empty() {
        println!();
        println!("Diagnostics:");
        for error in &result.errors {
            println!("  {}", error.replace('\n', "\n  "));
        }
    }
    println!();
    println!("{}", result.code);
    Ok(())
}

async fn run_batch(
    pipeline: &Pipeline,
    project: &str,
    input: Option<String>,
    output: Option<String>,
) -> Result<()> {
    let settings = pipeline.settings();
    let input = input
        .or_else(|| dir_string(settings.default_input_dir.as_deref()))
        .ok_or_else(|| Error::InvalidInput("no input directory given or configured".to_string()))?;
    let output = output
        .or_else(|| dir_string(settings.default_output_dir.as_deref()))
        .ok_or_else(|| Error::InvalidInput("no output directory given or configured".to_string()))?;

    let mut handle = pipeline.run_batch(project, &input, &output)?;
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut last: Option<BatchProgress> = None;

    let joined = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            _ = ticker.tick() => {
                let progress = pipeline.batch_progress();
                if progress.status.is_active() && last.as_ref() != Some(&progress) {
                    print_progress(&progress);
                    last = Some(progress);
                }
            }
        }
    };

    // The ticker can miss the final snapshot.
    let progress = pipeline.batch_progress();
    if progress.status.is_terminal() && last.as_ref() != Some(&progress) {
        print_progress(&progress);
    }

    let result = joined.map_err(|e| Error::Io(std::io::Error::other(e)))??;

    println!("{}", "=".repeat(60));
    println!("Batch complete");
    println!("{}", "=".repeat(60));
    println!("Files:     {}", result.total_files);
    println!("Succeeded: {}", result.succeeded);
    println!("Failed:    {}", result.failed);
    println!("Output:    {}", result.output_path.display());
    Ok(())
}

fn dir_string(dir: Option<&Path>) -> Option<String> {
    dir.map(|d| d.to_string_lossy().into_owned())
}

fn print_progress(progress: &BatchProgress) {
    if progress.current_file.is_empty() {
        println!("[{:?}] {}", progress.status, progress.message);
    } else {
        println!(
            "[{:?}] {:>5.1}% {}/{} {}",
            progress.status,
            progress.progress * 100.0,
            progress.processed,
            progress.total_files,
            progress.current_file
        );
    }
}

fn projects(pipeline: &Pipeline, command: ProjectsCommand) -> Result<()> {
    match command {
        ProjectsCommand::List => {
            for project in pipeline.list_projects()? {
                println!(
                    "{}  {:<10} {}  {}",
                    project.id,
                    project.status,
                    project.created_at.format("%Y-%m-%d %H:%M"),
                    project.name
                );
            }
        }
        ProjectsCommand::Show { id } => {
            let project = pipeline.get_project(&id)?;
            println!("Id:      {}", project.id);
            println!("Name:    {}", project.name);
            println!("Status:  {}", project.status);
            println!("Created: {}", project.created_at.to_rfc3339());
            println!("Updated: {}", project.updated_at.to_rfc3339());
            println!();
            println!("{}", project.code);
        }
        ProjectsCommand::Delete { id } => {
            pipeline.delete_project(&id)?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

async fn env(pipeline: &Pipeline, command: EnvCommand) -> Result<()> {
    match command {
        EnvCommand::Setup => {
            pipeline.ensure_environment().await?;
            println!("Environment ready");
        }
        EnvCommand::Status => {
            let status = pipeline.environment_status().await;
            println!("Launcher available: {}", status.tool_available);
            println!("Environment exists: {}", status.environment_exists);
            println!("Environment path:   {}", status.environment_path.display());
        }
    }
    Ok(())
}
