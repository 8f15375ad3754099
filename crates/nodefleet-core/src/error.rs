//! Error types for node container operations.

use std::fmt;

use thiserror::Error;

use nodefleet_state::StateError;

use crate::engine::EngineError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the registry, lifecycle, recreation, and hook layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("node container not found: {0}")]
    NotFound(String),

    #[error("node container already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid node container document {name}: {reason}")]
    Document { name: String, reason: String },

    #[error("state store error: {0}")]
    Store(StateError),

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("failed to pull image {image} after {attempts} attempt(s): {source}")]
    Pull {
        image: String,
        attempts: u32,
        #[source]
        source: EngineError,
    },

    #[error("failed to {action} container {container}: {source}")]
    Lifecycle {
        action: LifecycleAction,
        container: String,
        #[source]
        source: EngineError,
    },

    #[error("unit task aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("{stage}: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: Box<Error>,
    },
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => Error::NotFound(what),
            StateError::AlreadyExists(what) => Error::AlreadyExists(what),
            other => Error::Store(other),
        }
    }
}

/// Engine operation that failed during a lifecycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Create,
    Remove,
    Start,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleAction::Create => "create",
            LifecycleAction::Remove => "remove",
            LifecycleAction::Start => "start",
        })
    }
}

/// Stage of the cluster hook that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Baseline,
    Recreate,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookStage::Baseline => "unable to initialize baseline node container",
            HookStage::Recreate => "unable to start node containers",
        })
    }
}

/// One failed (node, configuration) unit.
#[derive(Debug, Error)]
#[error("failed to create node container {config:?} in {node} [{pool}]: {error}")]
pub struct UnitFailure {
    pub node: String,
    pub pool: String,
    pub config: String,
    #[source]
    pub error: Error,
}

/// Every unit failure from one recreation run.
#[derive(Debug)]
pub struct AggregateError {
    failures: Vec<UnitFailure>,
}

impl AggregateError {
    pub fn new(failures: Vec<UnitFailure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node container error(s): ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
