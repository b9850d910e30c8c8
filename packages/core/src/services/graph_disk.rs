//! Composition root
//!
//! Builds every collaborator once, injects it into the services and starts the
//! merge worker. Two stock layouts exist:
//!
//! - [`GraphDisk::open`] - SurrealDB (RocksDB) graph, filesystem blobs, libsql
//!   registry, chunk lists and work queue below `config.data_dir`
//! - [`GraphDisk::in_memory`] - everything in process, for tests and tooling
//!
//! Anything else goes through [`GraphDisk::from_backends`].

use crate::blob::{BlobStore, FsBlobStore, MemoryBlobStore};
use crate::config::CoreConfig;
use crate::db::{
    GraphStore, HashRegistry, LibsqlHashRegistry, LibsqlListCache, ListCache, MemoryGraph,
    MemoryHashRegistry, MemoryListCache, SurrealGraph,
};
use crate::mq::{LibsqlQueue, MemoryQueue, WorkQueue};
use crate::services::chunk_tracker::ChunkTracker;
use crate::services::export_service::ExportService;
use crate::services::merge_coordinator::MergeCoordinator;
use crate::services::merge_worker::{MergeProcessor, MergeWorker, MergeWorkerConfig};
use crate::services::namespace_service::NamespaceService;
use crate::services::upload_service::UploadService;
use anyhow::Context;
use std::sync::Arc;

/// The collaborators a [`GraphDisk`] runs on
#[derive(Clone)]
pub struct Backends {
    pub graph: Arc<dyn GraphStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub lists: Arc<dyn ListCache>,
    pub registry: Arc<dyn HashRegistry>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            graph: Arc::new(MemoryGraph::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            queue: Arc::new(MemoryQueue::new()),
            lists: Arc::new(MemoryListCache::new()),
            registry: Arc::new(MemoryHashRegistry::new()),
        }
    }

    pub async fn open(config: &CoreConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

        let graph = SurrealGraph::open(config.graph_path())
            .await
            .context("opening graph store")?;
        let lists = LibsqlListCache::open(&config.chunk_list_path())
            .await
            .context("opening chunk list cache")?;
        let registry = LibsqlHashRegistry::open(&config.registry_path())
            .await
            .context("opening hash registry")?;
        let queue = LibsqlQueue::open(&config.queue_path())
            .await
            .context("opening work queue")?;

        Ok(Self {
            graph: Arc::new(graph),
            blobs: Arc::new(FsBlobStore::new(config.blob_root.clone())),
            queue: Arc::new(queue),
            lists: Arc::new(lists),
            registry: Arc::new(registry),
        })
    }
}

/// A running instance: services plus the merge worker
pub struct GraphDisk {
    pub namespace: NamespaceService,
    pub uploads: UploadService,
    pub exports: ExportService,
    config: CoreConfig,
    queue: Arc<dyn WorkQueue>,
    worker: MergeWorker,
}

impl GraphDisk {
    pub async fn in_memory(config: CoreConfig) -> anyhow::Result<Self> {
        Self::from_backends(config, Backends::in_memory()).await
    }

    pub async fn open(config: CoreConfig) -> anyhow::Result<Self> {
        let backends = Backends::open(&config).await?;
        Self::from_backends(config, backends).await
    }

    /// Wire services over `backends`, declare queues, create buckets and start
    /// the merge worker.
    pub async fn from_backends(config: CoreConfig, backends: Backends) -> anyhow::Result<Self> {
        let Backends {
            graph,
            blobs,
            queue,
            lists,
            registry,
        } = backends;

        for name in [&config.merge_queue, &config.dead_letter_queue] {
            queue
                .declare(name)
                .await
                .with_context(|| format!("declaring queue {}", name))?;
        }
        for bucket in [&config.chunk_bucket, &config.file_bucket] {
            blobs
                .ensure_bucket(bucket)
                .await
                .with_context(|| format!("creating bucket {}", bucket))?;
        }

        let namespace = NamespaceService::new(graph)
            .with_admin_identity(config.admin_identity.clone())
            .with_max_depth(config.max_walk_depth);
        let coordinator = MergeCoordinator::new(
            ChunkTracker::new(lists),
            queue.clone(),
            config.merge_queue.clone(),
        );
        let uploads = UploadService::new(
            namespace.clone(),
            blobs.clone(),
            registry,
            coordinator,
            &config,
        );
        let exports =
            ExportService::new(namespace.clone(), blobs.clone(), config.file_bucket.clone());

        let processor = MergeProcessor::new(
            namespace.clone(),
            blobs,
            queue.clone(),
            MergeWorkerConfig::from(&config),
        );
        let worker = MergeWorker::spawn(processor);
        tracing::info!("GraphDisk ready (data dir {})", config.data_dir.display());

        Ok(Self {
            namespace,
            uploads,
            exports,
            config,
            queue,
            worker,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    /// Stop the merge worker after its current message
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
    }
}
