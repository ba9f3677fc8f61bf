use std::path::{Path, PathBuf};

use crate::{AnnalConfig, AnnalResult, AnnalStore};

pub fn load_or_init_config(base: &Path) -> AnnalResult<AnnalConfig> {
    let default_sqlite = default_sqlite_path(base);
    AnnalConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> AnnalResult<AnnalStore> {
    let config = load_or_init_config(base)?;
    AnnalStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(AnnalConfig::default_db_name())
}
