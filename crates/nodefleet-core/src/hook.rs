//! Cluster hook — bring a newly registered node up to date.

use tracing::info;

use crate::error::{Error, HookStage, Result};
use crate::recreate::{RecreateSummary, Recreator};
use crate::types::{Node, NodeContainerConfig};

/// Topology events the hook is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    BeforeNodeRegister,
    AfterNodeRegister,
}

/// Ensures the baseline configuration exists, then starts every node
/// container on the affected node without replacing existing ones.
pub struct ClusterHook {
    recreator: Recreator,
    baseline: NodeContainerConfig,
}

impl ClusterHook {
    pub fn new(recreator: Recreator, baseline: NodeContainerConfig) -> Self {
        Self {
            recreator,
            baseline,
        }
    }

    pub async fn run(&self, event: HookEvent, node: &Node) -> Result<RecreateSummary> {
        info!(?event, node = %node.address, pool = %node.pool(), "running node container hook");
        self.recreator
            .registry()
            .ensure_baseline(&self.baseline)
            .map_err(|e| hook_error(HookStage::Baseline, e))?;
        self.recreator
            .ensure_started(false, vec![node.clone()])
            .await
            .map_err(|e| hook_error(HookStage::Recreate, e))
    }
}

fn hook_error(stage: HookStage, source: Error) -> Error {
    Error::Hook {
        stage,
        source: Box::new(source),
    }
}
