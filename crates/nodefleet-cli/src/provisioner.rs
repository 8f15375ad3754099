//! Cluster view backed by the `[[nodes]]` list of the config file.

use std::sync::Arc;

use async_trait::async_trait;

use nodefleet_core::{ContainerEngine, Error, Node, Provisioner, RegistryAuth, Result};
use nodefleet_docker::{DockerEngine, EngineOptions};

pub struct StaticProvisioner {
    nodes: Vec<Node>,
    auth: RegistryAuth,
    options: EngineOptions,
}

impl StaticProvisioner {
    pub fn new(nodes: Vec<Node>, auth: RegistryAuth, options: EngineOptions) -> Self {
        Self {
            nodes,
            auth,
            options,
        }
    }

    /// The configured node at `address`, or an unpooled node if unknown.
    pub fn resolve(&self, address: &str) -> Node {
        self.nodes
            .iter()
            .find(|n| n.address == address)
            .cloned()
            .unwrap_or_else(|| Node::new(address, ""))
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.clone())
    }

    fn registry_auth(&self) -> RegistryAuth {
        self.auth.clone()
    }

    fn engine(&self, node: &Node) -> Result<Arc<dyn ContainerEngine>> {
        let engine = DockerEngine::connect(&node.address, self.options)
            .map_err(|e| Error::Cluster(format!("node {}: {e}", node.address)))?;
        Ok(Arc::new(engine))
    }
}
