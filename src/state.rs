use std::{sync::Arc, time::Instant};

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{
    config::Config,
    reconcile::ResultsRegistry,
    utils::{
        photo::{LocalPhotoStore, PhotoStore},
        qr::{QrEncoder, SvgQrEncoder},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub registry: ResultsRegistry,
    pub qr: Arc<dyn QrEncoder>,
    pub photos: Arc<dyn PhotoStore>,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the engine and the default collaborators around an open pool.
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            registry: ResultsRegistry::new(pool.clone()),
            qr: Arc::new(SvgQrEncoder),
            photos: Arc::new(LocalPhotoStore::new(&config.upload_dir)),
            started_at: Instant::now(),
            pool,
            config,
        }
    }

    pub fn with_qr_encoder(mut self, encoder: Arc<dyn QrEncoder>) -> Self {
        self.qr = encoder;
        self
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for ResultsRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}
