//! Storage used by the command-line driver.
//!
//! This module provides a string key-value trait `StorageBackend`, a
//! file-backed implementation `FileStorage`, and `KeyValueRouteStore`, which
//! implements the library's `RouteStore` on top of any backend.
//!
//! `FileStorage` keeps a single JSON file containing a map of string keys to
//! string values. The file lives in a per-user configuration directory unless
//! a path is given, and is read once and rewritten on every mutation.

use route_atlas_lib::{RouteRecord, RouteStore};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Platform storage error: {0}")]
    Platform(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for route_atlas_lib::StorageError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Json(msg) => route_atlas_lib::StorageError::Serialization(msg),
            other => route_atlas_lib::StorageError::Backend(other.to_string()),
        }
    }
}

/// Simple generic storage backend trait.
///
/// Keys and values are UTF-8 strings. Structured data goes through
/// [`save_json_backend`] and [`load_json_backend`].
pub trait StorageBackend: Send + Sync {
    /// Store a string value for a key.
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Store several values at once. Backends that persist on every write
    /// should override this to persist once.
    fn set_strings(&self, entries: &[(String, String)]) -> StorageResult<()> {
        for (key, value) in entries {
            self.set_string(key, value)?;
        }
        Ok(())
    }

    /// Store several values unless one of the keys already exists.
    ///
    /// Check and write happen under one lock. Returns the first existing key
    /// and writes nothing in that case.
    fn insert_new(&self, entries: &[(String, String)]) -> StorageResult<Option<String>>;

    /// Read a string value for a key. Returns Ok(None) when key is missing.
    fn get_string(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove a key (no-op if key does not exist).
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// All stored keys, sorted.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

pub fn save_json_backend<T: Serialize>(
    backend: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    match serde_json::to_string(value) {
        Ok(s) => backend.set_string(key, &s),
        Err(e) => Err(StorageError::Json(e.to_string())),
    }
}

pub fn load_json_backend<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> StorageResult<Option<T>> {
    match backend.get_string(key)? {
        Some(s) => match serde_json::from_str::<T>(&s) {
            Ok(v) => Ok(Some(v)),
            Err(e) => Err(StorageError::Json(e.to_string())),
        },
        None => Ok(None),
    }
}

/// File-based storage: a single JSON file which is a map of key -> string value.
///
/// - On init, the file is read into memory.
/// - Mutations write the file synchronously and only then update memory.
pub struct FileStorage {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Default storage file path for the current user:
    /// - On Windows: %APPDATA%/RouteAtlas/storage.json
    /// - Else: $HOME/.config/route-atlas/storage.json
    pub fn default_storage_path() -> PathBuf {
        if cfg!(windows)
            && let Ok(appdata) = std::env::var("APPDATA")
        {
            return Path::new(&appdata).join("RouteAtlas").join("storage.json");
        }

        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home)
                .join(".config")
                .join("route-atlas")
                .join("storage.json");
        }

        Path::new(".").join("route-atlas-storage.json")
    }

    pub fn new_with_path(path: Option<PathBuf>) -> StorageResult<Self> {
        let path = path.unwrap_or_else(Self::default_storage_path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = fs::create_dir_all(parent)
        {
            return Err(StorageError::Io(format!(
                "Failed to create storage parent directory: {}",
                e
            )));
        }

        let mut map = BTreeMap::new();
        if path.exists() {
            let s = fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("Failed to read storage file: {}", e)))?;
            if !s.trim().is_empty() {
                map = serde_json::from_str::<BTreeMap<String, String>>(&s).map_err(|e| {
                    StorageError::Json(format!("Failed to parse storage JSON: {}", e))
                })?;
            }
        }
        tracing::debug!("Opened storage {} with {} keys", path.display(), map.len());

        Ok(FileStorage {
            path,
            inner: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Platform(format!("mutex poisoned: {:?}", e)))
    }

    fn flush(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        let s = serde_json::to_string_pretty(map).map_err(|e| StorageError::Json(e.to_string()))?;
        fs::write(&self.path, s).map_err(|e| StorageError::Io(format!("write failed: {}", e)))
    }

    /// Apply `change` to a copy of the map, persist the copy, then swap it in.
    /// Memory is left untouched when persisting fails.
    fn update<F>(&self, change: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.flush(&next)?;
        *guard = next;
        Ok(())
    }
}

impl StorageBackend for FileStorage {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn set_strings(&self, entries: &[(String, String)]) -> StorageResult<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert(key.clone(), value.clone());
            }
            true
        })
    }

    fn insert_new(&self, entries: &[(String, String)]) -> StorageResult<Option<String>> {
        let mut existing = None;
        self.update(|map| {
            existing = entries
                .iter()
                .find(|(key, _)| map.contains_key(key))
                .map(|(key, _)| key.clone());
            if existing.is_some() {
                return false;
            }
            for (key, value) in entries {
                map.insert(key.clone(), value.clone());
            }
            true
        })?;
        Ok(existing)
    }

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.update(|map| map.remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

const ROUTE_KEY_PREFIX: &str = "route:";

fn route_key(id: &str) -> String {
    format!("{}{}", ROUTE_KEY_PREFIX, id)
}

/// Route store keeping one JSON record per key
pub struct KeyValueRouteStore<B> {
    backend: B,
}

impl<B: StorageBackend> KeyValueRouteStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: StorageBackend> RouteStore for KeyValueRouteStore<B> {
    fn add_routes(&self, routes: &[RouteRecord]) -> route_atlas_lib::storage::StorageResult<()> {
        let mut entries = Vec::with_capacity(routes.len());
        for route in routes {
            let key = route_key(&route.id);
            if entries.iter().any(|(k, _): &(String, String)| *k == key) {
                return Err(route_atlas_lib::StorageError::Duplicate(route.id.clone()));
            }
            let json = serde_json::to_string(route)
                .map_err(|e| route_atlas_lib::StorageError::Serialization(e.to_string()))?;
            entries.push((key, json));
        }
        if let Some(key) = self.backend.insert_new(&entries)? {
            let id = key.strip_prefix(ROUTE_KEY_PREFIX).unwrap_or(&key).to_string();
            return Err(route_atlas_lib::StorageError::Duplicate(id));
        }
        tracing::debug!("Stored {} routes", entries.len());
        Ok(())
    }

    fn all_routes(&self) -> route_atlas_lib::storage::StorageResult<Vec<RouteRecord>> {
        let mut routes = Vec::new();
        for key in self.backend.keys()? {
            if !key.starts_with(ROUTE_KEY_PREFIX) {
                continue;
            }
            if let Some(route) = load_json_backend::<RouteRecord>(&self.backend, &key)? {
                routes.push(route);
            }
        }
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(routes)
    }

    fn delete_route(&self, id: &str) -> route_atlas_lib::storage::StorageResult<()> {
        Ok(self.backend.remove(&route_key(id))?)
    }
}
