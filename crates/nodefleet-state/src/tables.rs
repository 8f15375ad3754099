//! redb table definitions for the scoped configuration store.
//!
//! Keys follow the pattern `{collection}/{name}/{pool}`; the default scope
//! uses an empty pool, so its key ends with a trailing `/`.

use redb::TableDefinition;

/// Scoped documents, JSON-encoded as [`crate::types::ScopedEntry`].
pub const SCOPED_CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("scoped_configs");
