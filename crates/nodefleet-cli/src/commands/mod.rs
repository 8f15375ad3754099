pub mod container;
pub mod recreate;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use nodefleet_core::{Recreator, Registry};
use nodefleet_state::StateStore;

use crate::config::FleetConfig;
use crate::provisioner::StaticProvisioner;

/// Everything a command needs, assembled from the config file.
pub struct App {
    pub config: FleetConfig,
    pub registry: Registry,
    pub provisioner: Arc<StaticProvisioner>,
}

impl App {
    pub fn open(config_path: &Path) -> anyhow::Result<Self> {
        let config = FleetConfig::load_or_default(config_path)?;
        if let Some(dir) = config.store.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let store = StateStore::open(&config.store.path)?;
        info!(path = ?config.store.path, "state store opened");

        let provisioner = Arc::new(StaticProvisioner::new(
            config.nodes(),
            config.registry.clone(),
            config.engine_options(),
        ));
        Ok(Self {
            registry: Registry::new(Arc::new(store)),
            provisioner,
            config,
        })
    }

    pub fn recreator(&self) -> Recreator {
        Recreator::new(self.registry.clone(), self.provisioner.clone())
            .with_pull_attempts(self.config.engine.pull_attempts)
    }
}
