use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection};

use crate::AnnalConfig;
use crate::config::{BatchLimits, DatabaseConfig, PoolConfig};
use crate::dao::EntityDao;
use crate::router::ShardRouter;
use aideon_annal_core::{AnnalError, AnnalResult, Entity, ShardKey, mapping_for};

/// Connection set for one deployment: default write store, read store and
/// the year shards.
#[derive(Clone)]
pub struct AnnalStore {
    write: DatabaseConnection,
    read: DatabaseConnection,
    router: Arc<ShardRouter>,
    batch: BatchLimits,
}

impl AnnalStore {
    pub async fn connect(config: &AnnalConfig, base_dir: &Path) -> AnnalResult<Self> {
        let pool = config.pool.as_ref();
        let write = connect_database(&config.database, pool, base_dir).await?;
        let read = match &config.read_database {
            Some(database) => connect_database(database, pool, base_dir).await?,
            None => write.clone(),
        };
        let mut router = ShardRouter::new();
        for (name, database) in &config.shards {
            let key = parse_shard_name(name)?;
            let database = match database {
                DatabaseConfig::Sqlite { path: None } => DatabaseConfig::Sqlite {
                    path: Some(format!("{}.sqlite", name.to_ascii_lowercase())),
                },
                other => other.clone(),
            };
            let conn = connect_database(&database, pool, base_dir).await?;
            router.register(key, conn);
        }
        log::info!(
            "annal: connected {} store with {} shard(s)",
            config.backend_name(),
            config.shards.len()
        );
        Ok(Self::from_connections(
            write,
            read,
            router,
            BatchLimits::from_config(config),
        ))
    }

    pub async fn connect_sqlite(path: &Path) -> AnnalResult<Self> {
        let config = AnnalConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub fn from_connections(
        write: DatabaseConnection,
        read: DatabaseConnection,
        router: ShardRouter,
        batch: BatchLimits,
    ) -> Self {
        Self {
            write,
            read,
            router: Arc::new(router),
            batch,
        }
    }

    pub fn dao<T: Entity>(&self) -> AnnalResult<EntityDao<T>> {
        self.dao_with_key(None)
    }

    /// Access engine whose identity is `key` instead of the declared one.
    pub fn dao_with_key<T: Entity>(&self, key: Option<&str>) -> AnnalResult<EntityDao<T>> {
        let mapping = mapping_for::<T>(key)?;
        Ok(EntityDao::new(
            mapping,
            self.write.clone(),
            self.read.clone(),
            self.router.clone(),
            self.batch,
        ))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.write
    }

    pub fn read_connection(&self) -> &DatabaseConnection {
        &self.read
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.write.get_database_backend()
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    pub fn shard_connection(&self, key: ShardKey) -> AnnalResult<DatabaseConnection> {
        self.router.resolve_key(key)
    }

    pub fn shard_keys(&self) -> Vec<String> {
        self.router.keys()
    }

    pub fn batch_limits(&self) -> BatchLimits {
        self.batch
    }
}

async fn connect_database(
    database: &DatabaseConfig,
    pool: Option<&PoolConfig>,
    base_dir: &Path,
) -> AnnalResult<DatabaseConnection> {
    let url = database.connection_url(base_dir)?;
    let mut options = ConnectOptions::new(url);
    if let Some(pool) = pool {
        if let Some(max) = pool.max_connections {
            options.max_connections(max);
        }
        if let Some(min) = pool.min_connections {
            options.min_connections(min);
        }
        if let Some(timeout_ms) = pool.connect_timeout_ms {
            options.connect_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.acquire_timeout_ms {
            options.acquire_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.idle_timeout_ms {
            options.idle_timeout(Duration::from_millis(timeout_ms));
        }
    }
    let conn = Database::connect(options).await.map_err(AnnalError::from)?;
    log::info!("annal: opened {} connection", database.backend_name());
    Ok(conn)
}

fn parse_shard_name(name: &str) -> AnnalResult<ShardKey> {
    name.strip_prefix(ShardKey::PREFIX)
        .and_then(|year| year.parse::<i32>().ok())
        .map(ShardKey)
        .ok_or_else(|| {
            AnnalError::configuration(format!(
                "shard name '{name}' must look like {}<year>",
                ShardKey::PREFIX
            ))
        })
}
