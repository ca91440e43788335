//! Persistent projects: a log sample and the script generated for it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where a project stands in the generate/run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Generated but did not pass the syntax check.
    #[default]
    Draft,
    Validated,
    Executed,
    Failed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Validated => "validated",
            ProjectStatus::Executed => "executed",
            ProjectStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A stored project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub sample_data: String,
    pub code: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates a draft project with a fresh id.
    pub fn new(
        name: impl Into<String>,
        sample_data: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            sample_data: sample_data.into(),
            code: code.into(),
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub code: Option<String>,
    pub status: Option<ProjectStatus>,
}

impl ProjectUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Storage for projects.
pub trait ProjectStore: Send + Sync {
    /// Stores a new project, renaming it if its name is taken.
    fn create(&self, project: Project) -> Result<Project>;

    /// Loads a project by id.
    fn get(&self, id: &str) -> Result<Project>;

    /// Lists projects, newest first.
    fn list(&self) -> Result<Vec<Project>>;

    /// Applies a partial update and returns the stored result.
    fn update(&self, id: &str, update: ProjectUpdate) -> Result<Project>;

    /// Removes a project.
    fn delete(&self, id: &str) -> Result<()>;
}

/// [`ProjectStore`] keeping one pretty-printed JSON file per project.
#[derive(Debug)]
pub struct JsonProjectStore {
    dir: PathBuf,
    /// Serializes writers so name uniqueness holds.
    write_lock: Mutex<()>,
}

impl JsonProjectStore {
    /// Opens a store in `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Store(format!(
                "failed to create storage directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for an id, reduced to its final component.
    fn file_path(&self, id: &str) -> PathBuf {
        let clean = Path::new(id)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .unwrap_or("_invalid_");
        self.dir.join(format!("{}.json", clean))
    }

    fn write(&self, project: &Project) -> Result<()> {
        let json = serde_json::to_string_pretty(project)?;
        std::fs::write(self.file_path(&project.id), json)
            .map_err(|e| Error::Store(format!("failed to write project {}: {}", project.id, e)))
    }

    fn unique_name(&self, base: &str, self_id: &str) -> Result<String> {
        let taken: HashSet<String> = self
            .list()?
            .into_iter()
            .filter(|p| p.id != self_id)
            .map(|p| p.name)
            .collect();
        Ok(unique_name(base, &taken))
    }
}

/// Returns `base`, or `root_<n>` for the first free `n` when `base` is taken.
///
/// A base already ending in `_<n>` keeps its root and counts up from `n`
/// (at least 2).
fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }

    let (root, start) = match base.rsplit_once('_') {
        Some((root, digits))
            if !root.is_empty()
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            (root, digits.parse::<u64>().unwrap_or(2).max(2))
        }
        _ => (base, 2),
    };

    (start..)
        .map(|n| format!("{}_{}", root, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{}_{}", root, uuid::Uuid::new_v4()))
}

impl ProjectStore for JsonProjectStore {
    fn create(&self, mut project: Project) -> Result<Project> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !project.name.is_empty() {
            project.name = self.unique_name(&project.name, &project.id)?;
        }
        self.write(&project)?;
        tracing::info!(id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    fn get(&self, id: &str) -> Result<Project> {
        let path = self.file_path(id);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("project not found: {}", id)));
            }
            Err(e) => return Err(Error::Store(format!("failed to read project {}: {}", id, e))),
        };
        serde_json::from_str(&data)
            .map_err(|e| Error::Store(format!("failed to decode project {}: {}", id, e)))
    }

    fn list(&self) -> Result<Vec<Project>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| Error::Store(format!("failed to read storage directory: {}", e)))?;

        let mut projects: Vec<Project> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let data = std::fs::read_to_string(&path).ok()?;
                match serde_json::from_str::<Project>(&data) {
                    Ok(project) => Some(project),
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "skipping unreadable project");
                        None
                    }
                }
            })
            .collect();

        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    fn update(&self, id: &str, update: ProjectUpdate) -> Result<Project> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut project = self.get(id)?;

        if let Some(name) = update.name {
            project.name = self.unique_name(&name, id)?;
        }
        if let Some(code) = update.code {
            project.code = code;
        }
        if let Some(status) = update.status {
            project.status = status;
        }
        project.updated_at = Utc::now();

        self.write(&project)?;
        Ok(project)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.file_path(id);
        if !path.exists() {
            return Err(Error::NotFound(format!("project not found: {}", id)));
        }
        std::fs::remove_file(&path)
            .map_err(|e| Error::Store(format!("failed to delete project {}: {}", id, e)))?;
        tracing::info!(id = %id, "project deleted");
        Ok(())
    }
}
