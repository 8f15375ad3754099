//! `nodefleet.toml` — store location, engine settings, and the node list.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use nodefleet_core::{DEFAULT_PULL_ATTEMPTS, Node, NodeContainerConfig, RegistryAuth};
use nodefleet_docker::EngineOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FleetConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub registry: RegistryAuth,
    pub baseline: Option<BaselineConfig>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pull_attempts")]
    pub pull_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            pull_attempts: default_pull_attempts(),
        }
    }
}

/// Node container every node must run, created on first node registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaselineConfig {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeEntry {
    pub address: String,
    #[serde(default)]
    pub pool: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("nodefleet.redb")
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

fn default_pull_attempts() -> u32 {
    DEFAULT_PULL_ATTEMPTS
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: FleetConfig =
            toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Like [`FleetConfig::from_file`], but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            connect_timeout: Duration::from_secs(self.engine.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.engine.request_timeout_secs),
        }
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .map(|n| Node::new(&n.address, &n.pool))
            .collect()
    }

    pub fn baseline_container(&self) -> Option<NodeContainerConfig> {
        self.baseline.as_ref().map(|b| {
            let mut config = NodeContainerConfig::new(&b.name);
            config.config.image = Some(b.image.clone());
            config.config.env = b.env.clone();
            config
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[store]
path = "/var/lib/nodefleet/state.redb"

[engine]
connect_timeout_secs = 3
request_timeout_secs = 120
pull_attempts = 5

[registry]
username = "ci"
password = "s3cret"
serveraddress = "registry.local:5000"

[baseline]
name = "big-sibling"
image = "fleet/big-sibling"
env = ["LOG_LEVEL=info"]

[[nodes]]
address = "http://10.0.0.1:2375"
pool = "edge"

[[nodes]]
address = "10.0.0.2:2375"
"#;
        let config: FleetConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.store.path, PathBuf::from("/var/lib/nodefleet/state.redb"));
        assert_eq!(config.engine.pull_attempts, 5);
        assert_eq!(config.engine_options().connect_timeout, Duration::from_secs(3));
        assert_eq!(config.registry.server_address, "registry.local:5000");

        let nodes = config.nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].pool(), "edge");
        assert_eq!(nodes[1].pool(), "");

        let baseline = config.baseline_container().unwrap();
        assert_eq!(baseline.name, "big-sibling");
        assert_eq!(baseline.config.image.as_deref(), Some("fleet/big-sibling"));
        assert_eq!(baseline.config.env, vec!["LOG_LEVEL=info"]);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: FleetConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.path, PathBuf::from("nodefleet.redb"));
        assert_eq!(config.engine.pull_attempts, DEFAULT_PULL_ATTEMPTS);
        assert_eq!(config.engine_options(), EngineOptions::default());
        assert!(config.registry.is_empty());
        assert!(config.baseline_container().is_none());
        assert!(config.nodes().is_empty());
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodefleet.toml");
        std::fs::write(&path, "[engine]\npull_attempts = \"many\"\n").unwrap();

        let err = FleetConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().starts_with("parsing config"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FleetConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FleetConfig::default());
    }
}
