use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::auth::token_cache::TokenCache;
use crate::config::AppConfig;
use crate::db;
use crate::products::{pg::PgProductStore, repo::MemoryProductStore, repo::ProductStore};
use crate::users::{pg::PgUserStore, repo::MemoryUserStore, repo::UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub products: Arc<dyn ProductStore>,
    pub keys: Arc<JwtKeys>,
    pub token_cache: Option<Arc<TokenCache>>,
}

impl AppState {
    /// PostgreSQL stores when `DATABASE_URL` is set, in-memory otherwise.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let (users, products): (Arc<dyn UserStore>, Arc<dyn ProductStore>) =
            match config.database_url.as_deref() {
                Some(url) => {
                    let db = db::connect(url, config.database_max_connections).await?;
                    info!("using postgres stores");
                    (
                        Arc::new(PgUserStore::new(db.clone())),
                        Arc::new(PgProductStore::new(db)),
                    )
                }
                None => {
                    warn!("DATABASE_URL not set; data lives in memory and is lost on restart");
                    (
                        Arc::new(MemoryUserStore::default()),
                        Arc::new(MemoryProductStore::default()),
                    )
                }
            };
        Ok(Self::from_parts(config, users, products))
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        products: Arc<dyn ProductStore>,
    ) -> Self {
        let keys = Arc::new(JwtKeys::new(&config.jwt));
        let token_cache = TokenCache::from_config(&config.token_cache).map(Arc::new);
        Self {
            config: Arc::new(config),
            users,
            products,
            keys,
            token_cache,
        }
    }

    #[cfg(test)]
    pub fn in_memory(config: AppConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(MemoryUserStore::default()),
            Arc::new(MemoryProductStore::default()),
        )
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::in_memory(test_config())
    }
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    use crate::config::{JwtConfig, SeedConfig, TokenCacheConfig};

    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: None,
        database_max_connections: 1,
        jwt: JwtConfig {
            secret: "test".into(),
            issuer: "test".into(),
            audience: "test".into(),
            ttl_minutes: 5,
        },
        token_cache: TokenCacheConfig {
            enabled: true,
            min_remaining_seconds: 60,
        },
        seed: SeedConfig::default(),
    }
}
