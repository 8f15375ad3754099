//! Recreate orchestrator — run the lifecycle for every node × configuration.
//!
//! Every (node, configuration name) pair is one unit, spawned on a single
//! [`JoinSet`]. Units never cancel each other: the orchestrator waits for all
//! of them and folds every failure into one [`AggregateError`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info};

use crate::cluster::Provisioner;
use crate::error::{AggregateError, Error, Result, UnitFailure};
use crate::image::DEFAULT_PULL_ATTEMPTS;
use crate::lifecycle::{Lifecycle, UnitOutcome};
use crate::progress::{DiscardProgress, ProgressSink};
use crate::registry::Registry;
use crate::types::Node;

/// Counts from a fully successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecreateSummary {
    pub nodes: usize,
    pub configs: usize,
    pub units: usize,
}

/// Identity of one unit, kept outside the task so a panic can still be
/// attributed.
#[derive(Debug, Clone)]
struct UnitKey {
    node: String,
    pool: String,
    config: String,
}

impl UnitKey {
    fn failure(self, error: Error) -> UnitFailure {
        UnitFailure {
            node: self.node,
            pool: self.pool,
            config: self.config,
            error,
        }
    }
}

/// Everything a unit task owns.
struct UnitTask {
    registry: Registry,
    provisioner: Arc<dyn Provisioner>,
    progress: Arc<dyn ProgressSink>,
    node: Node,
    config_name: String,
    relaunch: bool,
    pull_attempts: u32,
}

impl UnitTask {
    async fn run(self) -> Result<UnitOutcome> {
        let pool = self.node.pool();
        let config = self.registry.load(pool, &self.config_name)?;
        let engine = self.provisioner.engine(&self.node)?;
        let auth = self.provisioner.registry_auth();

        debug!(
            node = %self.node.address,
            %pool,
            config = %self.config_name,
            "recreating node container"
        );
        self.progress.line(&format!(
            "relaunching node container {:?} in the node {} [{}]",
            self.config_name, self.node.address, pool
        ));

        Lifecycle::new(&self.registry, engine.as_ref(), &auth)
            .with_pull_attempts(self.pull_attempts)
            .ensure_started(config, &self.node.address, self.relaunch)
            .await
    }
}

/// Fans the lifecycle manager out across a set of nodes.
#[derive(Clone)]
pub struct Recreator {
    registry: Registry,
    provisioner: Arc<dyn Provisioner>,
    progress: Arc<dyn ProgressSink>,
    pull_attempts: u32,
}

impl Recreator {
    pub fn new(registry: Registry, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            registry,
            provisioner,
            progress: Arc::new(DiscardProgress),
            pull_attempts: DEFAULT_PULL_ATTEMPTS,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_pull_attempts(mut self, attempts: u32) -> Self {
        self.pull_attempts = attempts;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Replace every node container on `nodes` (all nodes if empty).
    pub async fn recreate(&self, nodes: Vec<Node>) -> Result<RecreateSummary> {
        self.ensure_started(true, nodes).await
    }

    /// Ensure every configuration is created and running on `nodes`, or on
    /// every cluster node when `nodes` is empty.
    ///
    /// Listing nodes or configuration names fails fast. After that, every
    /// unit runs to completion and failures come back as
    /// [`Error::Aggregate`], sorted by node, pool, and configuration.
    pub async fn ensure_started(
        &self,
        relaunch: bool,
        nodes: Vec<Node>,
    ) -> Result<RecreateSummary> {
        let names = self.registry.names()?;
        let nodes = if nodes.is_empty() {
            self.provisioner.nodes().await?
        } else {
            nodes
        };
        let summary = RecreateSummary {
            nodes: nodes.len(),
            configs: names.len(),
            units: nodes.len() * names.len(),
        };
        let pools: BTreeSet<&str> = nodes.iter().map(Node::pool).collect();
        info!(
            nodes = summary.nodes,
            configs = summary.configs,
            pools = pools.len(),
            relaunch,
            "recreating node containers"
        );

        let mut set = JoinSet::new();
        let mut keys: HashMap<Id, UnitKey> = HashMap::with_capacity(summary.units);
        for node in &nodes {
            for name in &names {
                let task = UnitTask {
                    registry: self.registry.clone(),
                    provisioner: Arc::clone(&self.provisioner),
                    progress: Arc::clone(&self.progress),
                    node: node.clone(),
                    config_name: name.clone(),
                    relaunch,
                    pull_attempts: self.pull_attempts,
                };
                let handle = set.spawn(task.run());
                keys.insert(
                    handle.id(),
                    UnitKey {
                        node: node.address.clone(),
                        pool: node.pool().to_string(),
                        config: name.clone(),
                    },
                );
            }
        }

        let mut failures = Vec::new();
        while let Some(joined) = set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, Ok(_outcome))) => {
                    keys.remove(&id);
                    continue;
                }
                Ok((id, Err(e))) => (id, e),
                Err(join_err) => {
                    let id = join_err.id();
                    (id, Error::Aborted(join_err.to_string()))
                }
            };
            let Some(key) = keys.remove(&id) else {
                continue;
            };
            error!(
                node = %key.node,
                pool = %key.pool,
                config = %key.config,
                error = %result,
                "failed to create node container"
            );
            failures.push(key.failure(result));
        }

        if failures.is_empty() {
            info!(units = summary.units, "node containers ready");
            return Ok(summary);
        }
        failures.sort_by(|a, b| {
            (&a.node, &a.pool, &a.config).cmp(&(&b.node, &b.pool, &b.config))
        });
        Err(AggregateError::new(failures).into())
    }
}
