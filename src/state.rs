use std::sync::Arc;

use crate::{
    auth::repo::UserStore, config::AppConfig, db::PgStore, memory::MemoryStore,
    rides::repo::RideStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub rides: Arc<dyn RideStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = PgStore::connect(&config).await?;

        if let Err(e) = store.migrate().await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        Ok(Self::from_parts(
            config,
            Arc::new(store.clone()),
            Arc::new(store),
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        rides: Arc<dyn RideStore>,
    ) -> Self {
        Self {
            config,
            users,
            rides,
        }
    }

    /// State backed by the given in-memory store.
    pub fn from_memory(config: AppConfig, store: MemoryStore) -> Self {
        Self::from_parts(
            Arc::new(config),
            Arc::new(store.clone()),
            Arc::new(store),
        )
    }

    /// State backed by a fresh, empty in-memory store.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::from_memory(config, MemoryStore::new())
    }
}
