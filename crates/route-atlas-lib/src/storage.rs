//! Route persistence contract
//!
//! The core only needs four operations from a store. Backends decide how
//! records are laid out; the command-line driver implements the trait on top
//! of a JSON key-value file.

use crate::color::PeriodKey;
use crate::route::RouteRecord;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Route {0} already exists")]
    Duplicate(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Store for route records
pub trait RouteStore: Send + Sync {
    /// Add routes. Fails without writing anything if an id is already stored.
    fn add_routes(&self, routes: &[RouteRecord]) -> StorageResult<()>;

    /// All stored routes, ordered by id
    fn all_routes(&self) -> StorageResult<Vec<RouteRecord>>;

    /// Routes grouped under `period`, ordered by id
    fn routes_by_period(&self, period: PeriodKey) -> StorageResult<Vec<RouteRecord>> {
        Ok(self
            .all_routes()?
            .into_iter()
            .filter(|r| r.period_key == period)
            .collect())
    }

    /// Delete a route. Deleting a missing id is not an error.
    fn delete_route(&self, id: &str) -> StorageResult<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryRouteStore {
    routes: RwLock<BTreeMap<String, RouteRecord>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Debug>(e: E) -> StorageError {
    StorageError::Backend(format!("lock poisoned: {:?}", e))
}

impl RouteStore for MemoryRouteStore {
    fn add_routes(&self, routes: &[RouteRecord]) -> StorageResult<()> {
        let mut guard = self.routes.write().map_err(poisoned)?;
        if let Some(dup) = routes.iter().find(|r| guard.contains_key(&r.id)) {
            return Err(StorageError::Duplicate(dup.id.clone()));
        }
        for route in routes {
            guard.insert(route.id.clone(), route.clone());
        }
        Ok(())
    }

    fn all_routes(&self) -> StorageResult<Vec<RouteRecord>> {
        let guard = self.routes.read().map_err(poisoned)?;
        Ok(guard.values().cloned().collect())
    }

    fn delete_route(&self, id: &str) -> StorageResult<()> {
        self.routes.write().map_err(poisoned)?.remove(id);
        Ok(())
    }
}
