//! Connection Management
//!
//! The connection handle, its table-metadata cache, statement statistics
//! and the registry that memoizes connections by configuration.

pub mod executor;
pub mod metadata;
pub mod registry;
pub mod statistics;

// Re-export for convenience
pub use executor::{Connection, Hydrate};
pub use metadata::{primary_key_of, ColumnMeta, KeyRole, MemorySchemaCache, SchemaCache};
pub use registry::ConnectionRegistry;
pub use statistics::{StatementStats, StatsSnapshot};
