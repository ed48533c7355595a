use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory-backed JSON persistence for workflow configurations.
///
/// A thin collaborator around the core: configurations are saved as
/// pretty-printed JSON files named `<workflow-name>.json` inside the store's
/// directory.
///
/// # Examples
///
/// ```no_run
/// use stepflow::{ConfigStore, StepConfig, WorkflowConfig};
///
/// # fn main() -> Result<(), stepflow::WorkflowError> {
/// let store = ConfigStore::new("workflow_configs")?;
///
/// let config = WorkflowConfig::builder("demo")
///     .step(StepConfig::new("a", "function").with_function("echo"))
///     .build()?;
///
/// store.save(&config)?;
/// let loaded = store.load("demo.json")?;
/// assert_eq!(loaded, config);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Opens a store at the given directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, WorkflowError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves a configuration under `<name>.json`.
    pub fn save(&self, config: &WorkflowConfig) -> Result<PathBuf, WorkflowError> {
        self.save_as(config, &format!("{}.json", config.name))
    }

    /// Saves a configuration under an explicit file name.
    pub fn save_as(
        &self,
        config: &WorkflowConfig,
        filename: &str,
    ) -> Result<PathBuf, WorkflowError> {
        let path = self.dir.join(filename);
        fs::write(&path, config.to_json()?)?;
        info!("saved workflow config to {}", path.display());
        Ok(path)
    }

    /// Loads a configuration by file name.
    pub fn load(&self, filename: &str) -> Result<WorkflowConfig, WorkflowError> {
        let path = self.dir.join(filename);
        let content = fs::read_to_string(&path)?;
        let config = WorkflowConfig::from_json(&content)?;
        info!("loaded workflow config from {}", path.display());
        Ok(config)
    }

    /// Lists the `.json` file names in the store, sorted.
    pub fn list(&self) -> Result<Vec<String>, WorkflowError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes a configuration file.
    ///
    /// Returns `true` if a file was deleted, `false` if none existed.
    pub fn delete(&self, filename: &str) -> Result<bool, WorkflowError> {
        let path = self.dir.join(filename);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("deleted workflow config {}", path.display());
            return Ok(true);
        }
        Ok(false)
    }
}
