//! Backing stores for Tutoria: persistence adapters, key-value stores,
//! path resolution and configuration loading.

pub mod config_service;
pub mod kv_store;
pub mod listeners;
pub mod memory_adapter;
pub mod paths;
pub mod remote_adapter;
pub mod storage;
pub mod table_adapter;

pub use crate::config_service::ConfigService;
pub use crate::kv_store::{FileKeyValueStore, MemoryKeyValueStore};
pub use crate::memory_adapter::MemoryAdapter;
pub use crate::paths::TutoriaPaths;
pub use crate::remote_adapter::RemoteDocumentAdapter;
pub use crate::table_adapter::TableStoreAdapter;
