//! Year-shard routing for writes.
//!
//! The routing key lives in task-local storage, so two operations running
//! concurrently never observe each other's key. A key is only visible inside
//! [`scope`]; outside of one, writes go to the default store.

use std::cell::Cell;
use std::collections::HashMap;
use std::future::Future;

use sea_orm::DatabaseConnection;

use aideon_annal_core::{AnnalError, AnnalResult, ShardKey};

tokio::task_local! {
    static ROUTING_KEY: Cell<Option<ShardKey>>;
}

/// Runs `fut` with `key` as the routing key.
pub async fn scope<F: Future>(key: ShardKey, fut: F) -> F::Output {
    ROUTING_KEY.scope(Cell::new(Some(key)), fut).await
}

/// Replaces the key of the enclosing [`scope`].
pub fn set_routing_key(key: ShardKey) -> AnnalResult<()> {
    ROUTING_KEY
        .try_with(|cell| cell.set(Some(key)))
        .map_err(|_| AnnalError::configuration("routing key set outside a routing scope"))
}

pub fn current_key() -> Option<ShardKey> {
    ROUTING_KEY.try_with(Cell::get).ok().flatten()
}

#[derive(Clone, Debug)]
pub struct ShardRouter<S = DatabaseConnection> {
    stores: HashMap<String, S>,
}

impl<S> Default for ShardRouter<S> {
    fn default() -> Self {
        Self {
            stores: HashMap::new(),
        }
    }
}

impl<S: Clone> ShardRouter<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: ShardKey, store: S) {
        self.register_named(key.store_key(), store);
    }

    pub fn register_named(&mut self, name: impl Into<String>, store: S) {
        let name = name.into();
        log::info!("annal: registered shard store {name}");
        self.stores.insert(name, store);
    }

    pub fn contains(&self, key: ShardKey) -> bool {
        self.stores.contains_key(&key.store_key())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.stores.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Store for the key of the enclosing scope.
    pub fn resolve(&self) -> AnnalResult<S> {
        let key = current_key()
            .ok_or_else(|| AnnalError::configuration("no routing key in scope"))?;
        self.resolve_key(key)
    }

    pub fn resolve_key(&self, key: ShardKey) -> AnnalResult<S> {
        let name = key.store_key();
        self.stores.get(&name).cloned().ok_or_else(|| {
            AnnalError::configuration(format!("no store registered for shard {name}"))
        })
    }

    /// Routed store when a key is in scope, `None` otherwise.
    pub fn resolve_scoped(&self) -> AnnalResult<Option<S>> {
        current_key().map(|key| self.resolve_key(key)).transpose()
    }
}
