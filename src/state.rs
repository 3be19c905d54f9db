//! Application state management

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::MetadataStore;
use crate::upload::{ChunkWriter, Coordinator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    coordinator: Coordinator,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool, store: Arc<dyn MetadataStore>) -> Self {
        // Idempotent: `main` also creates these at startup, but tests build
        // `AppState` directly against fresh temp directories, so this is the
        // one place guaranteed to run before the first chunk lands.
        let _ = std::fs::create_dir_all(&config.upload_dir);
        let _ = std::fs::create_dir_all(&config.temp_dir);

        let writer = ChunkWriter::new(config.upload_dir.clone());
        let coordinator = Coordinator::new(store, writer, config.chunk_size);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                coordinator,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    pub fn upload_dir(&self) -> &PathBuf {
        &self.inner.config.upload_dir
    }

    pub fn temp_dir(&self) -> &PathBuf {
        &self.inner.config.temp_dir
    }
}
