pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod moderation;
pub mod routes;
pub mod services;
pub mod storage;
pub mod tasks;
pub mod ws;

use config::Config;
use moderation::ContentClassifier;
use std::sync::Arc;
use storage::FileStore;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub gateway: Arc<ws::gateway::GatewayState>,
    pub files: FileStore,
    pub classifier: Arc<dyn ContentClassifier>,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: Config) -> Self {
        let classifier = moderation::from_config(&config);
        Self::with_classifier(db, config, classifier)
    }

    pub fn with_classifier(
        db: sqlx::SqlitePool,
        config: Config,
        classifier: Arc<dyn ContentClassifier>,
    ) -> Self {
        let gateway = ws::gateway::GatewayState::with_typing_timeout(config.typing_timeout());
        let files = FileStore::new(&config.upload_dir, config.max_upload_bytes);
        Self {
            db,
            config,
            gateway: Arc::new(gateway),
            files,
            classifier,
        }
    }
}
