//! # Application State
//!
//! Shared state handed to every handler through the `State` extractor. All
//! persistent data lives in SQLite; uploaded files live under the media root.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::media::MediaStore;

#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub media: MediaStore,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let tokens = TokenService::new(config.jwt_secret.clone(), config.jwt_expiration_hours);
        let media = MediaStore::new(config.media_root.clone());
        Self {
            pool,
            config: Arc::new(config),
            tokens,
            media,
        }
    }
}
