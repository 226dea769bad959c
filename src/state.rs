use std::sync::Arc;

use tracing::info;

use crate::auth::identity::{IdentityResolver, RemoteIdentityResolver};
use crate::config::AppConfig;
use crate::db;
use crate::storage::{Storage, StorageClient};
use crate::users::{repo::PgUserRepo, repo::UserRepo, services::UserService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Connects to every outbound dependency in turn. Any exhausted retry
    /// budget aborts startup.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        info!("connecting to document store");
        let pool = db::connect(&config.db).await?;
        let repo = Arc::new(PgUserRepo::new(pool, config.db.collection.clone())) as Arc<dyn UserRepo>;

        info!("connecting to object store");
        let storage = Arc::new(Storage::connect(&config.minio).await?) as Arc<dyn StorageClient>;

        info!("initializing auth client");
        let identity = Arc::new(RemoteIdentityResolver::connect(&config.auth_service_addr).await?)
            as Arc<dyn IdentityResolver>;

        Ok(Self::from_parts(config, repo, storage, identity))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        repo: Arc<dyn UserRepo>,
        storage: Arc<dyn StorageClient>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            config,
            users: UserService::new(repo, storage),
            identity,
        }
    }

    #[cfg(test)]
    pub fn fake(
        repo: Arc<dyn UserRepo>,
        storage: Arc<dyn StorageClient>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        use std::collections::HashMap;

        let vars = HashMap::from([("DB_PASSWORD", "test"), ("MINIO_ROOT_PASSWORD", "test")]);
        let config = Arc::new(AppConfig::from_map(&vars).expect("test config"));
        Self::from_parts(config, repo, storage, identity)
    }
}
