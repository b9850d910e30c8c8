//! Business Services
//!
//! This module contains the services built on top of the storage traits:
//!
//! - `NamespaceService` - Multi-tenant tree: insert, move, soft delete, queries
//! - `ChunkTracker` - Per-upload record of stored chunks
//! - `MergeCoordinator` - Publishes a merge once every chunk is present
//! - `MergeWorker` - Background consumer assembling chunks into files
//! - `UploadService` - Whole-file and chunk uploads with per-tenant dedup
//! - `ExportService` - Subtree export to the local filesystem
//! - `GraphDisk` - Composition root wiring all of the above
//!
//! Services never construct their collaborators; everything is injected as
//! `Arc<dyn …>` by the composition root or by tests.

pub mod chunk_tracker;
pub mod error;
pub mod export_service;
pub mod graph_disk;
pub mod merge_coordinator;
pub mod merge_worker;
pub mod namespace_service;
pub mod upload_service;

pub use chunk_tracker::ChunkTracker;
pub use error::{ExportError, MergeError, NamespaceError, UploadError};
pub use export_service::{ExportResult, ExportService};
pub use graph_disk::{Backends, GraphDisk};
pub use merge_coordinator::{DispatchOutcome, MergeCoordinator, MergeTarget};
pub use merge_worker::{Disposition, MergeProcessor, MergeWorker, MergeWorkerConfig};
pub use namespace_service::{NamespaceService, DEFAULT_MAX_DEPTH};
pub use upload_service::{ChunkInfo, UploadOutcome, UploadRequest, UploadService};
