//! StateStore — redb-backed scoped configuration persistence.
//!
//! Every named configuration is a set of JSON documents, one per pool, with
//! the empty pool acting as the default layer. Reads resolve a pool by merging
//! its document over the default. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde_json::Value;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::merge::{merge_into, merged};
use crate::tables::SCOPED_CONFIGS;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Persistence seam for pool-scoped configuration documents.
///
/// Implementations must make `set_field` atomic with respect to other writers
/// of the same entry; nothing above this trait takes locks.
pub trait ConfigStore: Send + Sync {
    /// Create the entry for `pool`. Fails with `AlreadyExists` if present.
    fn save(&self, scope: &Scope, pool: &str, doc: &Value) -> StateResult<()>;

    /// Merge `doc` into the entry for `pool`, creating it if absent.
    fn save_merge(&self, scope: &Scope, pool: &str, doc: &Value) -> StateResult<()>;

    /// Resolve `pool`: the default document with the pool document on top.
    fn load(&self, scope: &Scope, pool: &str) -> StateResult<Value>;

    /// Documents for every pool with an entry, optionally restricted to
    /// `filter` and optionally resolved against the default.
    fn load_all_pools(
        &self,
        scope: &Scope,
        filter: Option<&[String]>,
        merge: bool,
    ) -> StateResult<BTreeMap<PoolName, Value>>;

    /// Replace one top-level field of the existing entry for `pool`. `null`
    /// removes it. Fails with `NotFound` if there is no entry.
    fn set_field(&self, scope: &Scope, pool: &str, field: &str, value: Value) -> StateResult<()>;

    /// Delete the entry for `pool`. Returns true if it existed.
    fn remove(&self, scope: &Scope, pool: &str) -> StateResult<bool>;

    /// All distinct configuration names in `collection`, sorted.
    fn list_names(&self, collection: &str) -> StateResult<Vec<String>>;
}

/// Thread-safe scoped configuration store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read every entry belonging to `scope`, keyed by pool.
    fn scope_entries(&self, scope: &Scope) -> StateResult<BTreeMap<PoolName, Value>> {
        let prefix = format!("{}/{}/", scope.collection, scope.name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
        let mut results = BTreeMap::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let entry = decode(value.value())?;
            // Names may contain '/', so the prefix alone is not conclusive.
            if entry.belongs_to(scope) {
                results.insert(entry.pool, entry.value);
            }
        }
        Ok(results)
    }

    fn entry_for(scope: &Scope, pool: &str, value: Value) -> ScopedEntry {
        ScopedEntry {
            collection: scope.collection.clone(),
            name: scope.name.clone(),
            pool: pool.to_string(),
            value,
        }
    }
}

impl ConfigStore for StateStore {
    fn save(&self, scope: &Scope, pool: &str, doc: &Value) -> StateResult<()> {
        ensure_object(doc)?;
        let key = scope.table_key(pool);
        let entry = Self::entry_for(scope, pool, doc.clone());
        let bytes = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
            let exists = table.get(key.as_str()).map_err(map_err!(Read))?.is_some();
            if exists {
                return Err(StateError::AlreadyExists(describe(scope, pool)));
            }
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "scoped config saved");
        Ok(())
    }

    fn save_merge(&self, scope: &Scope, pool: &str, doc: &Value) -> StateResult<()> {
        ensure_object(doc)?;
        let key = scope.table_key(pool);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
            let existing = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let value = match existing {
                Some(entry) => merged(&entry.value, doc, scope.policy),
                None => doc.clone(),
            };
            let entry = Self::entry_for(scope, pool, value);
            let bytes = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "scoped config merged");
        Ok(())
    }

    fn load(&self, scope: &Scope, pool: &str) -> StateResult<Value> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
        let base = match table
            .get(scope.table_key(DEFAULT_POOL).as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => Some(decode(guard.value())?.value),
            None => None,
        };
        let overlay = if pool == DEFAULT_POOL {
            None
        } else {
            match table
                .get(scope.table_key(pool).as_str())
                .map_err(map_err!(Read))?
            {
                Some(guard) => Some(decode(guard.value())?.value),
                None => None,
            }
        };
        match (base, overlay) {
            (None, None) => Err(StateError::NotFound(describe(scope, pool))),
            (Some(base), None) => Ok(base),
            (None, Some(overlay)) => Ok(overlay),
            (Some(mut base), Some(overlay)) => {
                merge_into(&mut base, overlay, scope.policy);
                Ok(base)
            }
        }
    }

    fn load_all_pools(
        &self,
        scope: &Scope,
        filter: Option<&[String]>,
        merge: bool,
    ) -> StateResult<BTreeMap<PoolName, Value>> {
        let mut entries = self.scope_entries(scope)?;
        if let Some(pools) = filter {
            entries.retain(|pool, _| pool.as_str() == DEFAULT_POOL || pools.contains(pool));
        }
        if !merge {
            return Ok(entries);
        }
        let Some(base) = entries.get(DEFAULT_POOL).cloned() else {
            return Ok(entries);
        };
        let mut resolved = BTreeMap::new();
        for (pool, value) in entries {
            let value = if pool == DEFAULT_POOL {
                value
            } else {
                merged(&base, &value, scope.policy)
            };
            resolved.insert(pool, value);
        }
        // Filtered pools without an explicit override resolve to the default.
        for pool in filter.unwrap_or_default() {
            resolved.entry(pool.clone()).or_insert_with(|| base.clone());
        }
        Ok(resolved)
    }

    fn set_field(&self, scope: &Scope, pool: &str, field: &str, value: Value) -> StateResult<()> {
        let key = scope.table_key(pool);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
            let existing = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let mut doc = match existing.map(|e| e.value) {
                Some(Value::Object(map)) => map,
                Some(_) => return Err(StateError::InvalidDocument(describe(scope, pool))),
                None => return Err(StateError::NotFound(describe(scope, pool))),
            };
            if value.is_null() {
                doc.remove(field);
            } else {
                doc.insert(field.to_string(), value);
            }
            let entry = Self::entry_for(scope, pool, Value::Object(doc));
            let bytes = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, %field, "scoped config field set");
        Ok(())
    }

    fn remove(&self, scope: &Scope, pool: &str) -> StateResult<bool> {
        let key = scope.table_key(pool);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "scoped config removed");
        Ok(existed)
    }

    fn list_names(&self, collection: &str) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCOPED_CONFIGS).map_err(map_err!(Table))?;
        let mut names = BTreeSet::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entry = decode(value.value())?;
            if entry.collection == collection {
                names.insert(entry.name);
            }
        }
        Ok(names.into_iter().collect())
    }
}

fn decode(bytes: &[u8]) -> StateResult<ScopedEntry> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn ensure_object(doc: &Value) -> StateResult<()> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(StateError::InvalidDocument(
            "scoped documents must be JSON objects".to_string(),
        ))
    }
}

fn describe(scope: &Scope, pool: &str) -> String {
    if pool == DEFAULT_POOL {
        format!("{}/{} (default)", scope.collection, scope.name)
    } else {
        format!("{}/{} (pool {pool})", scope.collection, scope.name)
    }
}
