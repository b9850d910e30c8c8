//! Database Layer
//!
//! This module handles all persistent state behind async traits:
//!
//! - [`GraphStore`] - The namespace graph (`FileNode` records, `connects_to` edges)
//! - [`ListCache`] - Ordered per-upload chunk lists
//! - [`HashRegistry`] - Tenant + content hash → storage path, for deduplication
//!
//! # Architecture
//!
//! The graph lives in SurrealDB ([`SurrealGraph`], embedded RocksDB or in-memory).
//! The two small relational stores live in libsql tables. Every trait also has an
//! in-process implementation used by tests and `GraphDisk::in_memory`.

mod error;
mod graph_store;
mod hash_registry;
mod list_cache;
mod memory_graph;
mod sqlite;
mod surreal_graph;

pub use error::DatabaseError;
pub use graph_store::{GraphOp, GraphStore, GraphTransaction};
pub use hash_registry::{HashRegistry, LibsqlHashRegistry, MemoryHashRegistry};
pub use list_cache::{LibsqlListCache, ListCache, MemoryListCache};
pub use memory_graph::MemoryGraph;
pub use surreal_graph::SurrealGraph;

pub(crate) use sqlite::SqliteHandle;
