//! In-memory engine and provisioner used by the unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cluster::Provisioner;
use crate::engine::{ContainerEngine, EngineError};
use crate::error::{Error, Result};
use crate::types::{ContainerConfig, HostConfig, Node, RegistryAuth};

pub(crate) const FAKE_DIGEST: &str = "sha256:0f1e2d3c4b5a";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Pull(String),
    Create(String),
    Start(String),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeContainer {
    pub config: ContainerConfig,
    pub running: bool,
}

#[derive(Default)]
struct EngineState {
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<Call>,
    pull_script: VecDeque<std::result::Result<(), EngineError>>,
    create_errors: HashMap<String, EngineError>,
    start_errors: HashMap<String, EngineError>,
}

/// Stateful engine: containers persist across calls like a real daemon.
#[derive(Default)]
pub(crate) struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_pulls(&self, times: usize, err: EngineError) {
        self.script_pulls((0..times).map(|_| Err(err.clone())).collect());
    }

    pub fn script_pulls(&self, script: Vec<std::result::Result<(), EngineError>>) {
        self.state.lock().unwrap().pull_script.extend(script);
    }

    pub fn fail_create(&self, name: &str, err: EngineError) {
        self.state
            .lock()
            .unwrap()
            .create_errors
            .insert(name.to_string(), err);
    }

    pub fn fail_start(&self, name: &str, err: EngineError) {
        self.state
            .lock()
            .unwrap()
            .start_errors
            .insert(name.to_string(), err);
    }

    pub fn with_container(&self, name: &str, running: bool) {
        self.state.lock().unwrap().containers.insert(
            name.to_string(),
            FakeContainer {
                config: ContainerConfig::default(),
                running,
            },
        );
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn pull_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Pull(_)))
            .count()
    }

    pub fn containers(&self) -> BTreeMap<String, FakeContainer> {
        self.state.lock().unwrap().containers.clone()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn create_container(
        &self,
        name: &str,
        config: &ContainerConfig,
        _host_config: &HostConfig,
    ) -> std::result::Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(name.to_string()));
        if let Some(err) = state.create_errors.get(name) {
            return Err(err.clone());
        }
        if state.containers.contains_key(name) {
            return Err(EngineError::AlreadyExists);
        }
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                config: config.clone(),
                running: false,
            },
        );
        Ok(())
    }

    async fn start_container(
        &self,
        name: &str,
        _host_config: &HostConfig,
    ) -> std::result::Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(name.to_string()));
        if let Some(err) = state.start_errors.get(name) {
            return Err(err.clone());
        }
        match state.containers.get_mut(name) {
            None => Err(EngineError::NotFound(name.to_string())),
            Some(c) if c.running => Err(EngineError::AlreadyRunning),
            Some(c) => {
                c.running = true;
                Ok(())
            }
        }
    }

    async fn remove_container(
        &self,
        name: &str,
        _force: bool,
    ) -> std::result::Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove(name.to_string()));
        match state.containers.remove(name) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(name.to_string())),
        }
    }

    async fn pull_image(
        &self,
        image: &str,
        _auth: &RegistryAuth,
        output: &mut String,
    ) -> std::result::Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Pull(image.to_string()));
        if let Some(scripted) = state.pull_script.pop_front() {
            scripted?;
        }
        output.push_str(&format!("Pulling from {image}\nDigest: {FAKE_DIGEST}\n"));
        output.push_str(&format!("Status: Downloaded newer image for {image}\n"));
        Ok(())
    }
}

/// Provisioner over a fixed node list with one fake engine per node.
pub(crate) struct FakeProvisioner {
    nodes: Vec<Node>,
    engines: HashMap<String, Arc<FakeEngine>>,
}

impl FakeProvisioner {
    pub fn new(nodes: Vec<Node>) -> Self {
        let engines = nodes
            .iter()
            .map(|n| (n.address.clone(), Arc::new(FakeEngine::new())))
            .collect();
        Self { nodes, engines }
    }

    pub fn engine_for(&self, address: &str) -> Arc<FakeEngine> {
        self.engines[address].clone()
    }

    pub fn nodes_list(&self) -> Vec<Node> {
        self.nodes.clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.clone())
    }

    fn registry_auth(&self) -> RegistryAuth {
        RegistryAuth::default()
    }

    fn engine(&self, node: &Node) -> Result<Arc<dyn ContainerEngine>> {
        self.engines
            .get(&node.address)
            .map(|e| e.clone() as Arc<dyn ContainerEngine>)
            .ok_or_else(|| Error::Cluster(format!("unknown node {}", node.address)))
    }
}
