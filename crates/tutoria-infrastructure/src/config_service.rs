//! Configuration loading and backend construction.

use std::path::Path;
use std::sync::Arc;

use tutoria_core::config::{AppConfig, BackendConfig, RemoteConfig};
use tutoria_core::kv::KeyValueStore;
use tutoria_core::{PersistenceAdapter, Result, TutoriaError};

use crate::kv_store::FileKeyValueStore;
use crate::memory_adapter::MemoryAdapter;
use crate::paths::TutoriaPaths;
use crate::remote_adapter::RemoteDocumentAdapter;
use crate::table_adapter::TableStoreAdapter;

pub const ENV_BACKEND: &str = "TUTORIA_BACKEND";
pub const ENV_REMOTE_URL: &str = "TUTORIA_REMOTE_URL";
pub const ENV_LOG: &str = "TUTORIA_LOG";

/// Loads `AppConfig` and builds the stores it describes.
#[derive(Debug, Clone)]
pub struct ConfigService {
    paths: TutoriaPaths,
}

impl ConfigService {
    pub fn new(paths: TutoriaPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &TutoriaPaths {
        &self.paths
    }

    /// Reads the config file (defaults if missing) and applies process
    /// environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        let path = self.paths.config_file()?;
        let mut config = load_config_file(&path)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Paths for data files, rooted at `data_dir` from the config when set.
    pub fn data_paths(&self, config: &AppConfig) -> TutoriaPaths {
        match &config.data_dir {
            Some(dir) => TutoriaPaths::new(Some(dir)),
            None => self.paths.clone(),
        }
    }

    pub async fn open_kv_store(&self, config: &AppConfig) -> Result<Arc<dyn KeyValueStore>> {
        let path = self.data_paths(config).kv_file()?;
        Ok(Arc::new(FileKeyValueStore::open(path).await?))
    }

    /// Builds the configured persistence adapter.
    pub async fn build_adapter(
        &self,
        config: &AppConfig,
        kv: Arc<dyn KeyValueStore>,
    ) -> Result<Arc<dyn PersistenceAdapter>> {
        let adapter: Arc<dyn PersistenceAdapter> = match &config.backend {
            BackendConfig::Memory { snapshot: true } => {
                Arc::new(MemoryAdapter::with_snapshot(kv).await?)
            }
            BackendConfig::Memory { snapshot: false } => Arc::new(MemoryAdapter::new()),
            BackendConfig::Local { dir } => {
                let dir = match dir {
                    Some(dir) => dir.clone(),
                    None => self.data_paths(config).tables_dir()?,
                };
                Arc::new(TableStoreAdapter::open(dir).await?)
            }
            BackendConfig::Remote(remote) => Arc::new(RemoteDocumentAdapter::new(remote)?),
        };
        tracing::info!("[Config] Using {} backend", adapter.kind());
        Ok(adapter)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new(TutoriaPaths::default())
    }
}

/// Parses a config file. A missing or blank file yields the defaults.
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::debug!("[Config] No config at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| TutoriaError::io(format!("Failed to read config {:?}: {}", path, e)))?;
    if content.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(toml::from_str(&content)?)
}

/// Applies `TUTORIA_*` overrides read through `lookup`.
///
/// `TUTORIA_BACKEND` accepts `memory`, `local` or `remote`; `remote` needs a
/// URL from `TUTORIA_REMOTE_URL` unless the file already configured one.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup(ENV_LOG) {
        config.log_level = level;
    }

    let remote_url = lookup(ENV_REMOTE_URL);

    if let Some(kind) = lookup(ENV_BACKEND) {
        config.backend = match kind.trim().to_lowercase().as_str() {
            "memory" => BackendConfig::Memory { snapshot: true },
            "local" => BackendConfig::Local { dir: None },
            "remote" => match (&config.backend, &remote_url) {
                (_, Some(url)) => BackendConfig::Remote(RemoteConfig::new(url.clone())),
                (BackendConfig::Remote(existing), None) => BackendConfig::Remote(existing.clone()),
                _ => {
                    return Err(TutoriaError::config(format!(
                        "{}=remote requires {}",
                        ENV_BACKEND, ENV_REMOTE_URL
                    )));
                }
            },
            other => {
                return Err(TutoriaError::config(format!(
                    "Unknown {} '{}'",
                    ENV_BACKEND, other
                )));
            }
        };
    } else if let (Some(url), BackendConfig::Remote(remote)) = (&remote_url, &mut config.backend) {
        remote.base_url = url.clone();
    }

    Ok(())
}
