use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::persistence::BackendKind;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

/// Root of `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Insert the default sectors, users and tutorials into empty collections.
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
    #[serde(default)]
    pub users: UserDurability,
    /// Overrides the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            seed_defaults: true,
            users: UserDurability::default(),
            data_dir: None,
            backend: BackendConfig::default(),
        }
    }
}

/// Where user records are persisted.
///
/// `LocalOnly` keeps the users collection out of the backing store entirely;
/// it lives in the key-value store under the `users` key.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserDurability {
    #[default]
    Durable,
    LocalOnly,
}

/// Backing store selection.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process tables, optionally snapshotted into the key-value store.
    Memory {
        #[serde(default = "default_true")]
        snapshot: bool,
    },
    /// One JSON table file per collection.
    Local {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dir: Option<PathBuf>,
    },
    /// HTTP document-collection service.
    Remote(RemoteConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local { dir: None }
    }
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Memory { .. } => BackendKind::Memory,
            BackendConfig::Local { .. } => BackendKind::LocalTable,
            BackendConfig::Remote(_) => BackendKind::Remote,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Sent as a bearer token when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.backend.kind(), BackendKind::LocalTable);
        assert!(config.seed_defaults);
    }

    #[test]
    fn test_remote_backend_parses() {
        let config: AppConfig = toml::from_str(
            r#"
log_level = "debug"
users = "local_only"

[backend]
kind = "remote"
base_url = "https://docs.example.com/v1"
api_key = "secret"
"#,
        )
        .unwrap();

        assert_eq!(config.users, UserDurability::LocalOnly);
        match config.backend {
            BackendConfig::Remote(remote) => {
                assert_eq!(remote.base_url, "https://docs.example.com/v1");
                assert_eq!(remote.api_key.as_deref(), Some("secret"));
                assert_eq!(remote.poll_interval_ms, 2_000);
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn test_memory_backend_snapshot_default() {
        let config: AppConfig = toml::from_str("[backend]\nkind = \"memory\"\n").unwrap();
        assert_eq!(config.backend, BackendConfig::Memory { snapshot: true });
    }
}
