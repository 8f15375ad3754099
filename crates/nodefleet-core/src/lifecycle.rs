//! Lifecycle manager — create and start one node container on one node.
//!
//! A unit is pulled, created, then started. Conflicts the engine reports
//! for state we are already in ("already exists", "already running") are
//! absorbed; any other engine error ends the unit with a single error.

use tracing::{debug, info};

use crate::engine::{ContainerEngine, EngineError};
use crate::error::{Error, LifecycleAction, Result};
use crate::image::{DEFAULT_PULL_ATTEMPTS, effective_image, pin_if_needed, pull_with_retry};
use crate::registry::Registry;
use crate::types::{NodeContainerConfig, RegistryAuth};

/// Environment variable carrying the node's engine endpoint into the container.
pub const ENDPOINT_ENV: &str = "DOCKER_ENDPOINT";

/// What a completed unit had to do to get its container running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    /// Image the container was created from.
    pub image: String,
    /// Digest-qualified reference recorded during this run.
    pub pinned: Option<String>,
    /// Creation hit an existing container that was kept.
    pub already_existed: bool,
    /// An existing container was removed and created again.
    pub replaced: bool,
    /// The container was running before the start call.
    pub already_running: bool,
}

/// Drives one unit against a node's engine.
pub struct Lifecycle<'a> {
    registry: &'a Registry,
    engine: &'a dyn ContainerEngine,
    auth: &'a RegistryAuth,
    pull_attempts: u32,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        registry: &'a Registry,
        engine: &'a dyn ContainerEngine,
        auth: &'a RegistryAuth,
    ) -> Self {
        Self {
            registry,
            engine,
            auth,
            pull_attempts: DEFAULT_PULL_ATTEMPTS,
        }
    }

    pub fn with_pull_attempts(mut self, attempts: u32) -> Self {
        self.pull_attempts = attempts;
        self
    }

    /// Pull the image, then create and start `config` on the node at `endpoint`.
    ///
    /// With `relaunch`, an existing container is force-removed and created
    /// again; otherwise it is kept and only started.
    pub async fn ensure_started(
        &self,
        mut config: NodeContainerConfig,
        endpoint: &str,
        relaunch: bool,
    ) -> Result<UnitOutcome> {
        let image = effective_image(&config)
            .ok_or_else(|| {
                Error::Validation(format!("node container {} has no image", config.name))
            })?
            .to_string();

        let pulled = pull_with_retry(self.engine, &image, self.auth, self.pull_attempts).await?;
        let pinned = pin_if_needed(self.registry, &mut config, &image, &pulled.output);

        config.config.image = Some(image.clone());
        config
            .config
            .env
            .insert(0, format!("{ENDPOINT_ENV}={endpoint}"));

        let mut outcome = UnitOutcome {
            image,
            pinned,
            ..Default::default()
        };
        self.create(&config, relaunch, &mut outcome).await?;
        debug!(name = %config.name, %endpoint, "node container created");
        self.start(&config, &mut outcome).await?;

        info!(
            name = %config.name,
            %endpoint,
            image = %outcome.image,
            replaced = outcome.replaced,
            "node container started"
        );
        Ok(outcome)
    }

    async fn create(
        &self,
        config: &NodeContainerConfig,
        relaunch: bool,
        outcome: &mut UnitOutcome,
    ) -> Result<()> {
        let name = &config.name;
        match self
            .engine
            .create_container(name, &config.config, &config.host_config)
            .await
        {
            Ok(()) => Ok(()),
            Err(EngineError::AlreadyExists) if relaunch => {
                debug!(%name, "container exists, relaunching");
                self.engine
                    .remove_container(name, true)
                    .await
                    .map_err(|e| lifecycle_error(LifecycleAction::Remove, name, e))?;
                outcome.replaced = true;
                match self
                    .engine
                    .create_container(name, &config.config, &config.host_config)
                    .await
                {
                    // Something recreated it between remove and create; keep it.
                    Ok(()) | Err(EngineError::AlreadyExists) => Ok(()),
                    Err(e) => Err(lifecycle_error(LifecycleAction::Create, name, e)),
                }
            }
            Err(EngineError::AlreadyExists) => {
                debug!(%name, "container exists, keeping it");
                outcome.already_existed = true;
                Ok(())
            }
            Err(e) => Err(lifecycle_error(LifecycleAction::Create, name, e)),
        }
    }

    async fn start(&self, config: &NodeContainerConfig, outcome: &mut UnitOutcome) -> Result<()> {
        match self
            .engine
            .start_container(&config.name, &config.host_config)
            .await
        {
            Ok(()) => Ok(()),
            Err(EngineError::AlreadyRunning) => {
                outcome.already_running = true;
                Ok(())
            }
            Err(e) => Err(lifecycle_error(LifecycleAction::Start, &config.name, e)),
        }
    }
}

fn lifecycle_error(action: LifecycleAction, container: &str, source: EngineError) -> Error {
    Error::Lifecycle {
        action,
        container: container.to_string(),
        source,
    }
}
