//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of the engine's state
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Store snapshot, `data.json` unless the settings name another file
    pub fn data_file(&self, configured: &Path) -> File {
        if configured.as_os_str().is_empty() {
            File::new(self.base_dir.join("data.json"))
        } else {
            File::new(self.base_dir.join(configured))
        }
    }

    /// Default location of project checkouts
    pub fn projects_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("projects"))
    }

    /// Live data of bundled backend services, never inside a checkout
    pub fn volumes_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("volumes"))
    }

    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Create the directories of the layout
    pub async fn setup(&self) -> Result<(), EngineError> {
        Dir::new(&self.base_dir).create().await?;
        self.projects_dir().create().await?;
        self.volumes_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/var/lib/deployd")
    }
}
