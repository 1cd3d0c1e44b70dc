use directories::ProjectDirs;
use doc_model::SessionConfig;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "datasheet_config.json";

/// Overrides the config file location when set.
pub const CONFIG_PATH_ENV: &str = "DATASHEET_EXPLORER_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve the per-user config directory")]
    NoConfigDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unable to replace config file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// The single JSON document holding the root folder and all notes.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "DatasheetExplorer", "DatasheetExplorer")
            .ok_or(StorageError::NoConfigDirectory)?;

        Ok(Self { path: dirs.config_dir().join(CONFIG_FILE_NAME) })
    }

    /// `$DATASHEET_EXPLORER_CONFIG` if set, otherwise the platform config dir.
    pub fn from_env_or_default() -> Result<Self, StorageError> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Ok(Self::at(path)),
            _ => Self::from_default_project(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SessionConfig, StorageError> {
        if !self.path.exists() {
            return Ok(SessionConfig::default());
        }

        let bytes = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Rewrites the whole file through a sibling temp file, so a failed write
    /// leaves the previous contents in place.
    pub fn save(&self, config: &SessionConfig) -> Result<(), StorageError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let bytes = serde_json::to_vec_pretty(config)?;

        let mut staged = tempfile::NamedTempFile::new_in(&parent)?;
        staged.write_all(&bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path)?;

        log::debug!("saved config to {}", self.path.display());
        Ok(())
    }
}
