//! nodefleet-state — scoped configuration store for nodefleet.
//!
//! Backed by [redb](https://docs.rs/redb), stores named configurations as
//! JSON documents layered per pool: one default document (empty pool) plus
//! optional pool documents that override individual fields.
//!
//! # Architecture
//!
//! All documents are JSON-serialized into redb's `&[u8]` value columns under
//! composite keys `{collection}/{name}/{pool}`. Resolution merges the pool
//! document over the default according to the scope's [`MergePolicy`].
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Consumers depend on the
//! [`ConfigStore`] trait rather than on redb directly.

pub mod error;
pub mod merge;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use merge::MergePolicy;
pub use store::{ConfigStore, StateStore};
pub use types::*;
