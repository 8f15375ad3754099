//! Container engine seam.
//!
//! The lifecycle manager only needs four primitives from a node's engine.
//! Implementations must report the "already exists" and "already running"
//! conditions as the dedicated [`EngineError`] variants so callers can absorb
//! them.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ContainerConfig, HostConfig, RegistryAuth};

/// Errors surfaced by a container engine client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("container already exists")]
    AlreadyExists,

    #[error("container already running")]
    AlreadyRunning,

    #[error("no such container: {0}")]
    NotFound(String),

    #[error("engine API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("image pull failed: {0}")]
    Pull(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid engine endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Client for one node's container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create a container named `name`. Returns `AlreadyExists` on conflict.
    async fn create_container(
        &self,
        name: &str,
        config: &ContainerConfig,
        host_config: &HostConfig,
    ) -> Result<(), EngineError>;

    /// Start the container. Returns `AlreadyRunning` if it is running.
    async fn start_container(
        &self,
        name: &str,
        host_config: &HostConfig,
    ) -> Result<(), EngineError>;

    /// Remove the container, killing it first when `force` is set.
    async fn remove_container(&self, name: &str, force: bool) -> Result<(), EngineError>;

    /// Pull `image`, appending the rendered progress stream to `output`.
    async fn pull_image(
        &self,
        image: &str,
        auth: &RegistryAuth,
        output: &mut String,
    ) -> Result<(), EngineError>;
}
