//! nodefleet-docker — Docker Engine API client for nodefleet.
//!
//! Implements [`nodefleet_core::ContainerEngine`] over plain HTTP/1.1 with
//! hyper, one TCP connection per call. Only the four operations the
//! lifecycle manager needs are covered: create, start, remove, and pull.

pub mod client;
pub mod endpoint;
pub mod stream;

pub use client::{DockerEngine, EngineOptions};
pub use endpoint::{DEFAULT_ENGINE_PORT, Endpoint};
pub use stream::render_pull_stream;
