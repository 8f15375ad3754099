//! Record types for the scoped configuration store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::merge::MergePolicy;

/// Pool identifier. The empty string is the default scope.
pub type PoolName = String;

/// The default (global) scope.
pub const DEFAULT_POOL: &str = "";

/// Addresses one named configuration inside a collection, together with the
/// policy used to layer its pool documents over the default document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub collection: String,
    pub name: String,
    pub policy: MergePolicy,
}

impl Scope {
    pub fn new(collection: &str, name: &str) -> Self {
        Self {
            collection: collection.to_string(),
            name: name.to_string(),
            policy: MergePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the composite key for one pool of this scope.
    pub fn table_key(&self, pool: &str) -> String {
        format!("{}/{}/{}", self.collection, self.name, pool)
    }
}

/// A stored document for one (collection, name, pool) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScopedEntry {
    pub collection: String,
    pub name: String,
    pub pool: PoolName,
    pub value: Value,
}

impl ScopedEntry {
    /// Build the composite key for the scoped configs table.
    pub fn table_key(&self) -> String {
        format!("{}/{}/{}", self.collection, self.name, self.pool)
    }

    pub fn belongs_to(&self, scope: &Scope) -> bool {
        self.collection == scope.collection && self.name == scope.name
    }
}
