pub mod config;
pub mod dao;
pub mod datastore;
pub mod router;
mod sql;
pub mod store;

pub mod api {
    pub use aideon_annal_core::api::*;
}

pub use aideon_annal_core::*;
pub use config::{AnnalConfig, BatchConfig, BatchLimits, DatabaseConfig, PoolConfig};
pub use dao::EntityDao;
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use router::ShardRouter;
pub use sql::{bind_placeholders, chunk_rows, max_bind_params};
pub use store::AnnalStore;
