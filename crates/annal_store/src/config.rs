use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use aideon_annal_core::{AnnalError, AnnalResult};

const DEFAULT_CONFIG_NAME: &str = "annal.json";
const DEFAULT_DB_NAME: &str = "annal.sqlite";

pub const DEFAULT_INSERT_CHUNK_ROWS: usize = 50_000;
pub const DEFAULT_DELETE_CHUNK_ROWS: usize = 1_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

impl DatabaseConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    /// Relative SQLite paths resolve against `base_dir`.
    pub fn sqlite_path(&self, base_dir: &Path) -> AnnalResult<PathBuf> {
        match self {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(AnnalError::configuration("config is not sqlite backend")),
        }
    }

    pub fn connection_url(&self, base_dir: &Path) -> AnnalResult<String> {
        match self {
            DatabaseConfig::Sqlite { .. } => {
                let path = self.sqlite_path(base_dir)?;
                Ok(format!("sqlite://{}?mode=rwc", path.display()))
            }
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Ok(url.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub insert_chunk_rows: Option<usize>,
    pub delete_chunk_rows: Option<usize>,
}

impl BatchConfig {
    pub fn with_defaults() -> Self {
        Self {
            insert_chunk_rows: Some(DEFAULT_INSERT_CHUNK_ROWS),
            delete_chunk_rows: Some(DEFAULT_DELETE_CHUNK_ROWS),
        }
    }
}

/// Resolved chunk sizes; zero is treated as one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub insert_chunk_rows: usize,
    pub delete_chunk_rows: usize,
}

impl BatchLimits {
    pub fn from_config(config: &AnnalConfig) -> Self {
        let batch = config.batch.clone().unwrap_or_else(BatchConfig::with_defaults);
        Self {
            insert_chunk_rows: batch
                .insert_chunk_rows
                .unwrap_or(DEFAULT_INSERT_CHUNK_ROWS)
                .max(1),
            delete_chunk_rows: batch
                .delete_chunk_rows
                .unwrap_or(DEFAULT_DELETE_CHUNK_ROWS)
                .max(1),
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            insert_chunk_rows: DEFAULT_INSERT_CHUNK_ROWS,
            delete_chunk_rows: DEFAULT_DELETE_CHUNK_ROWS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnalConfig {
    /// Default store for generic writes, and for reads unless `read_database` is set.
    pub database: DatabaseConfig,
    pub read_database: Option<DatabaseConfig>,
    /// Year shards keyed `DB_<year>`.
    #[serde(default)]
    pub shards: BTreeMap<String, DatabaseConfig>,
    pub pool: Option<PoolConfig>,
    pub batch: Option<BatchConfig>,
}

impl AnnalConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            read_database: None,
            shards: BTreeMap::new(),
            pool: None,
            batch: Some(BatchConfig::with_defaults()),
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> AnnalResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| AnnalError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| AnnalError::storage(format!("read config: {err}")))?;
            let config: AnnalConfig = serde_json::from_str(&raw)
                .map_err(|err| AnnalError::configuration(err.to_string()))?;
            return Ok(config);
        }
        let default = AnnalConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| AnnalError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| AnnalError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join(DEFAULT_CONFIG_NAME)
    }

    pub fn default_db_name() -> &'static str {
        DEFAULT_DB_NAME
    }

    pub fn with_shard(mut self, key: impl Into<String>, database: DatabaseConfig) -> Self {
        self.shards.insert(key.into(), database);
        self
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> AnnalResult<PathBuf> {
        self.database.sqlite_path(base_dir)
    }

    pub fn backend_name(&self) -> &'static str {
        self.database.backend_name()
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }
}
