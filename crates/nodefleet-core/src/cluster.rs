//! Cluster view supplied by the caller.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::types::{Node, RegistryAuth};

/// Source of nodes, registry credentials, and per-node engine clients.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Every node in the cluster, in a stable order.
    async fn nodes(&self) -> Result<Vec<Node>>;

    /// Credentials passed through to image pulls.
    fn registry_auth(&self) -> RegistryAuth;

    /// An engine client bound to `node`'s address.
    fn engine(&self, node: &Node) -> Result<Arc<dyn ContainerEngine>>;
}
