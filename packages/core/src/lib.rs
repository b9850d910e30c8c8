//! GraphDisk Core
//!
//! Multi-tenant virtual filesystem whose directory tree lives in a graph
//! database, with a chunked upload pipeline that assembles files in the
//! background.
//!
//! # Architecture
//!
//! - **Graph namespace**: every directory and file is a node; `connects_to`
//!   edges form one tree per namespace root (`remoteDisk` live, `trashDisk`
//!   deleted)
//! - **Tenants**: one `user` node per tenant below each root; callers only act
//!   on their own tenant unless they are the admin identity
//! - **Atomic mutations**: inserts, moves and deletes are single graph
//!   transactions with in-transaction guards
//! - **Chunked uploads**: chunks land in a blob bucket, a list cache tracks
//!   them, and a queue-driven worker merges them with bounded retries and a
//!   dead-letter queue
//!
//! # Modules
//!
//! - [`models`] - Data structures (FileNode, MergeMessage, Caller, ...)
//! - [`db`] - Graph store, list cache and hash registry (SurrealDB, libsql, memory)
//! - [`blob`] - Object storage trait and backends
//! - [`mq`] - Work queue trait and in-process broker
//! - [`operations`] - Path resolution, insert planning, tree reconstruction
//! - [`services`] - Namespace engine, upload/merge pipeline, export, composition root
//!
//! # Example
//!
//! ```no_run
//! use graphdisk_core::{Caller, CoreConfig, GraphDisk, UploadRequest};
//!
//! # async fn run() -> anyhow::Result<()> {
//! graphdisk_core::init_tracing();
//! let disk = GraphDisk::open(CoreConfig::from_env()).await?;
//! let outcome = disk
//!     .uploads
//!     .upload(
//!         &Caller::new("t1"),
//!         UploadRequest::whole("t1", "docs/report.pdf", "report.pdf", b"%PDF".to_vec()),
//!     )
//!     .await?;
//! println!("{:?}", outcome);
//! disk.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod mq;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::CoreConfig;
pub use logging::init_tracing;
pub use models::*;
pub use services::*;
