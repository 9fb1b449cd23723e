//! Startup wiring from configuration to a connected store.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tutoria_core::PersistenceAdapter;
use tutoria_core::config::AppConfig;
use tutoria_core::kv::KeyValueStore;
use tutoria_infrastructure::{ConfigService, MemoryAdapter};

use crate::store::{EntityStore, StoreOptions};

/// A running store and its background applier.
pub struct Tutoria {
    pub config: AppConfig,
    pub store: Arc<EntityStore>,
    pub sync_task: Option<JoinHandle<()>>,
}

impl Tutoria {
    /// Releases subscriptions and waits for the sync loop to drain.
    pub async fn shutdown(self) {
        self.store.shutdown();
        if let Some(task) = self.sync_task {
            let _ = task.await;
        }
    }
}

/// Loads configuration through `service` and starts the store.
pub async fn start(service: &ConfigService) -> anyhow::Result<Tutoria> {
    let config = service.load().context("Failed to load configuration")?;
    start_with_config(service, config).await
}

/// Starts the store for an already loaded configuration.
///
/// A backend that cannot be built is replaced by an in-memory one.
pub async fn start_with_config(
    service: &ConfigService,
    config: AppConfig,
) -> anyhow::Result<Tutoria> {
    let kv = service
        .open_kv_store(&config)
        .await
        .context("Failed to open key-value store")?;
    let adapter = build_adapter_or_memory(service, &config, kv.clone()).await;

    let store = Arc::new(EntityStore::new(
        adapter,
        kv,
        StoreOptions::from_config(&config),
    ));
    store.restore_session().await;
    if config.seed_defaults {
        store.seed_defaults().await;
    }
    store.connect().await;
    let sync_task = store.spawn_sync_loop().await;

    tracing::info!("[Bootstrap] Store ready ({} backend)", store.adapter().kind());
    Ok(Tutoria {
        config,
        store,
        sync_task,
    })
}

async fn build_adapter_or_memory(
    service: &ConfigService,
    config: &AppConfig,
    kv: Arc<dyn KeyValueStore>,
) -> Arc<dyn PersistenceAdapter> {
    match service.build_adapter(config, kv).await {
        Ok(adapter) => adapter,
        Err(e) => {
            tracing::warn!(
                "[Bootstrap] {} backend unavailable ({}), using in-memory store",
                config.backend.kind(),
                e
            );
            Arc::new(MemoryAdapter::new())
        }
    }
}
