//! Registry — CRUD over node container configurations.
//!
//! Each configuration name is a scope in the `nodeContainer` collection of
//! the config store. Pool documents layer over the default document, with
//! list fields (env, binds, ...) appended to the defaults rather than
//! replacing them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use nodefleet_state::{ConfigStore, DEFAULT_POOL, MergePolicy, Scope};

use crate::error::{Error, Result};
use crate::types::{NodeContainerConfig, NodeContainerConfigGroup};

/// Store collection holding node container configurations.
pub const NODE_CONTAINER_COLLECTION: &str = "nodeContainer";

const PINNED_IMAGE_FIELD: &str = "PinnedImage";

/// Node container configuration registry over an explicit store.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn ConfigStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Store a new configuration at `pool`. Fails if one already exists there.
    pub fn add(&self, pool: &str, config: &NodeContainerConfig) -> Result<()> {
        config.validate(pool)?;
        let doc = to_document(config)?;
        self.store.save(&scope_for(&config.name), pool, &doc)?;
        info!(name = %config.name, %pool, "node container added");
        Ok(())
    }

    /// Merge `config` into the stored document at `pool`.
    pub fn update(&self, pool: &str, config: &NodeContainerConfig) -> Result<()> {
        config.validate(pool)?;
        let doc = to_document(config)?;
        self.store.save_merge(&scope_for(&config.name), pool, &doc)?;
        info!(name = %config.name, %pool, "node container updated");
        Ok(())
    }

    /// Delete the entry for `pool`. Removing the default scope drops the
    /// global baseline for that name.
    pub fn remove(&self, pool: &str, name: &str) -> Result<()> {
        if !self.store.remove(&scope_for(name), pool)? {
            return Err(Error::NotFound(describe(name, pool)));
        }
        info!(%name, %pool, "node container removed");
        Ok(())
    }

    /// The configuration resolved for `pool` (pool overrides on defaults).
    pub fn load(&self, pool: &str, name: &str) -> Result<NodeContainerConfig> {
        let doc = self.store.load(&scope_for(name), pool)?;
        from_document(name, doc)
    }

    /// Per-pool configurations for `name`. With `merge`, each pool is resolved
    /// against the default instead of returned as stored.
    pub fn load_all_for_pools(
        &self,
        name: &str,
        merge: bool,
    ) -> Result<BTreeMap<String, NodeContainerConfig>> {
        self.load_pools(name, None, merge)
    }

    /// Like [`Registry::load_all_for_pools`] with merge, but restricted to
    /// `pools`; pools without an override resolve to the default.
    pub fn load_for_pools(
        &self,
        name: &str,
        pools: &[String],
    ) -> Result<BTreeMap<String, NodeContainerConfig>> {
        self.load_pools(name, Some(pools), true)
    }

    fn load_pools(
        &self,
        name: &str,
        filter: Option<&[String]>,
        merge: bool,
    ) -> Result<BTreeMap<String, NodeContainerConfig>> {
        self.store
            .load_all_pools(&scope_for(name), filter, merge)?
            .into_iter()
            .map(|(pool, doc)| Ok((pool, from_document(name, doc)?)))
            .collect()
    }

    /// Every configuration name, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.store.list_names(NODE_CONTAINER_COLLECTION)?)
    }

    /// Every configuration with its stored per-pool documents, sorted by name.
    pub fn list_all(&self) -> Result<Vec<NodeContainerConfigGroup>> {
        self.names()?
            .into_iter()
            .map(|name| {
                let config_pools = self.load_all_for_pools(&name, false)?;
                Ok(NodeContainerConfigGroup { name, config_pools })
            })
            .collect()
    }

    /// Record the digest-qualified image for `name` at the default scope.
    /// Fails with `NotFound` if `name` has no default entry.
    pub fn set_pinned_image(&self, name: &str, image: &str) -> Result<()> {
        self.store.set_field(
            &scope_for(name),
            DEFAULT_POOL,
            PINNED_IMAGE_FIELD,
            Value::String(image.to_string()),
        )?;
        debug!(%name, %image, "pinned image recorded");
        Ok(())
    }

    /// Forget the pinned image so the next pull resolves the tag again.
    /// Fails with `NotFound` if `name` has no default entry.
    pub fn reset_image(&self, name: &str) -> Result<()> {
        self.store
            .set_field(&scope_for(name), DEFAULT_POOL, PINNED_IMAGE_FIELD, Value::Null)?;
        info!(%name, "pinned image reset");
        Ok(())
    }

    /// Add `config` at the default scope unless a configuration with that
    /// name is already present. Returns whether it was created.
    pub fn ensure_baseline(&self, config: &NodeContainerConfig) -> Result<bool> {
        match self.load(DEFAULT_POOL, &config.name) {
            Ok(_) => return Ok(false),
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        match self.add(DEFAULT_POOL, config) {
            Ok(()) => {
                info!(name = %config.name, "baseline node container initialized");
                Ok(true)
            }
            // Another hook created it between the load and the add.
            Err(Error::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn scope_for(name: &str) -> Scope {
    Scope::new(NODE_CONTAINER_COLLECTION, name).with_policy(MergePolicy::slice_add())
}

fn to_document(config: &NodeContainerConfig) -> Result<Value> {
    serde_json::to_value(config).map_err(|e| Error::Document {
        name: config.name.clone(),
        reason: e.to_string(),
    })
}

fn from_document(name: &str, doc: Value) -> Result<NodeContainerConfig> {
    let mut config: NodeContainerConfig =
        serde_json::from_value(doc).map_err(|e| Error::Document {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    if config.name.is_empty() {
        config.name = name.to_string();
    }
    Ok(config)
}

fn describe(name: &str, pool: &str) -> String {
    if pool.is_empty() {
        format!("{name} (default)")
    } else {
        format!("{name} (pool {pool})")
    }
}
