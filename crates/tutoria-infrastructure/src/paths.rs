//! Unified path management for Tutoria files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/tutoria/           # Config directory
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/tutoria/      # Data directory
//! ├── kv.json                  # Session and local-only collections
//! └── tables/                  # Local table store
//!     ├── sectors.json
//!     ├── tutorials.json
//!     └── users.json
//! ```

use std::path::{Path, PathBuf};

use tutoria_core::{Result, TutoriaError};

const APP_DIR: &str = "tutoria";

/// Resolves Tutoria paths, optionally rooted at an explicit base directory.
///
/// With a base directory (tests, portable installs) both config and data live
/// directly under it.
#[derive(Debug, Clone, Default)]
pub struct TutoriaPaths {
    base_dir: Option<PathBuf>,
}

impl TutoriaPaths {
    pub fn new(base_dir: Option<&Path>) -> Self {
        Self {
            base_dir: base_dir.map(Path::to_path_buf),
        }
    }

    pub fn config_dir(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or_else(|| TutoriaError::config("Cannot find config directory")),
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(base) => Ok(base.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or_else(|| TutoriaError::config("Cannot find data directory")),
        }
    }

    pub fn config_file(&self) -> Result<PathBuf> {
        Ok(self.config_dir()?.join("config.toml"))
    }

    pub fn kv_file(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("kv.json"))
    }

    pub fn tables_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("tables"))
    }
}
