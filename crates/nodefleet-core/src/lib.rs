//! nodefleet-core — node containers: per-node system containers that every
//! cluster node must run.
//!
//! Configurations are stored per pool in the state store and resolved over
//! a default document. Floating image tags are pinned to the digest seen on
//! the first pull, and recreation fans out across every node concurrently,
//! reporting every failure in a single aggregate error.
//!
//! # Architecture
//!
//! ```text
//! ClusterHook (node registered)
//!   └── Recreator::ensure_started(nodes)
//!         ├── Registry::names / Registry::load(pool, name)
//!         └── JoinSet: one Lifecycle per node × config
//!               ├── pull_with_retry → pin_if_needed
//!               └── create (relaunch: remove + create) → start
//! ```
//!
//! The container engine and the cluster view are traits
//! ([`ContainerEngine`], [`Provisioner`]) so the core has no transport code.

pub mod cluster;
pub mod engine;
pub mod error;
pub mod hook;
pub mod image;
pub mod lifecycle;
pub mod progress;
pub mod recreate;
pub mod registry;
pub mod types;

#[cfg(test)]
mod fakes;

pub use cluster::Provisioner;
pub use engine::{ContainerEngine, EngineError};
pub use error::{AggregateError, Error, HookStage, LifecycleAction, Result, UnitFailure};
pub use hook::{ClusterHook, HookEvent};
pub use image::{DEFAULT_PULL_ATTEMPTS, extract_digest, pull_with_retry, should_pin};
pub use lifecycle::{ENDPOINT_ENV, Lifecycle, UnitOutcome};
pub use progress::{CollectingProgress, DiscardProgress, ProgressSink, WriterProgress};
pub use recreate::{RecreateSummary, Recreator};
pub use registry::{NODE_CONTAINER_COLLECTION, Registry};
pub use types::*;
