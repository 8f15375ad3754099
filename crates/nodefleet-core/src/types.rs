//! Domain types for node containers.
//!
//! Container and host settings use the Docker Engine API field names
//! (`PascalCase`), so a stored document is directly the create payload.
//! Unset fields are omitted when serialized: a pool document only carries
//! the fields it overrides.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata key carrying a node's pool assignment.
pub const POOL_METADATA_KEY: &str = "pool";

// ── Node container config ─────────────────────────────────────────

/// One named container template, resolved for a single pool scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NodeContainerConfig {
    #[serde(default)]
    pub name: String,
    /// Digest-qualified image recorded after pulling a floating tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_image: Option<String>,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub host_config: HostConfig,
}

impl NodeContainerConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Check the config may be stored at the given pool scope.
    ///
    /// Image selection is global: only the default scope may set one.
    pub fn validate(&self, pool: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Validation(
                "node container config name cannot be empty".to_string(),
            ));
        }
        let has_image = self.config.image.as_deref().is_some_and(|i| !i.is_empty());
        if has_image && !pool.is_empty() {
            return Err(Error::Validation(
                "it's not possible to override image in pool, please set image as a default value"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Environment as a key → value map. Entries without `=` map to "".
    pub fn env_map(&self) -> BTreeMap<String, String> {
        self.config
            .env
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (entry.clone(), String::new()),
            })
            .collect()
    }
}

/// Container-level settings (Docker `Config`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Keys like `"8080/tcp"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, EmptyObject>,
}

/// Host-level settings (Docker `HostConfig`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_config: Option<LogConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_retry_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(rename = "Type")]
    pub driver: String,
    #[serde(rename = "Config", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmptyObject {}

// ── Groups ────────────────────────────────────────────────────────

/// A configuration name with its per-pool documents, for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeContainerConfigGroup {
    pub name: String,
    pub config_pools: BTreeMap<String, NodeContainerConfig>,
}

// ── Cluster ───────────────────────────────────────────────────────

/// A cluster node as reported by the provisioner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    /// Container engine endpoint, e.g. `http://10.0.0.1:2375`.
    pub address: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Node {
    pub fn new(address: &str, pool: &str) -> Self {
        let mut metadata = BTreeMap::new();
        if !pool.is_empty() {
            metadata.insert(POOL_METADATA_KEY.to_string(), pool.to_string());
        }
        Self {
            address: address.to_string(),
            metadata,
        }
    }

    /// The node's pool, or the default scope if unassigned.
    pub fn pool(&self) -> &str {
        self.metadata
            .get(POOL_METADATA_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Registry credentials handed to image pulls. Never inspected here.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryAuth {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(rename = "serveraddress", default, skip_serializing_if = "String::is_empty")]
    pub server_address: String,
}

impl RegistryAuth {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty() && self.server_address.is_empty()
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server_address", &self.server_address)
            .finish()
    }
}
