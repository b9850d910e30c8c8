//! Upload Service
//!
//! Entry point for file bytes. A whole file is stored and inserted directly; a
//! chunk is stored, recorded with the chunk tracker and, when it completes its
//! group, triggers a merge through the coordinator.
//!
//! Whole-file uploads are deduplicated per tenant by content hash: the registry
//! maps `"{tenant}_{sha256(payload)}"` to the storage path of the first copy.
//!
//! Each upload runs on its own task and reports back over a single-use channel,
//! so a caller that goes away does not cancel a half-written upload.

use crate::blob::{object_key, BlobStore};
use crate::config::CoreConfig;
use crate::db::HashRegistry;
use crate::models::content_type::{extension_of, resolve_content_type};
use crate::models::{
    generate_file_name, group_key, truncated_sha256, Caller, FileNode, InsertOutcome,
    InsertRequest, LeafDescriptor, FILE_NAME_LEN,
};
use crate::operations::{normalize_path, reject_reserved};
use crate::services::error::{NamespaceError, UploadError};
use crate::services::merge_coordinator::{DispatchOutcome, MergeCoordinator, MergeTarget};
use crate::services::namespace_service::NamespaceService;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Position of a chunk inside its file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    /// 1-based chunk index
    pub current: u32,
    pub total: u32,
    /// Digest of the whole file, shared by all its chunks
    pub file_hash: String,
    /// Size of the whole file
    #[serde(default)]
    pub file_size: u64,
}

/// One upload call: a whole file, or one chunk of one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Tenant-qualified mount path
    pub target_path: String,
    /// Storage path below the mount, including the file name; defaults to `name`
    #[serde(default)]
    pub relative_path: String,
    /// Original file name
    pub name: String,
    #[serde(default, rename = "type")]
    pub content_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub chunk: Option<ChunkInfo>,
}

impl UploadRequest {
    pub fn whole(
        target_path: impl Into<String>,
        relative_path: impl Into<String>,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            target_path: target_path.into(),
            relative_path: relative_path.into(),
            name: name.into(),
            content_type: String::new(),
            data,
            chunk: None,
        }
    }

    pub fn with_chunk(mut self, chunk: ChunkInfo) -> Self {
        self.chunk = Some(chunk);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    fn storage_relative_path(&self) -> String {
        if self.relative_path.trim().is_empty() {
            self.name.clone()
        } else {
            self.relative_path.clone()
        }
    }
}

/// How an upload ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Same bytes already stored for this tenant
    Deduplicated { storage_path: String },
    /// Whole file stored and inserted
    Stored { leaf: FileNode, storage_path: String },
    /// Chunk stored, group still incomplete
    ChunkAccepted { received: usize, expected: usize },
    /// Chunk completed its group; a merge is queued
    MergeDispatched { final_blob_name: String },
}

/// Upload orchestration
#[derive(Clone)]
pub struct UploadService {
    namespace: NamespaceService,
    blobs: Arc<dyn BlobStore>,
    registry: Arc<dyn HashRegistry>,
    coordinator: MergeCoordinator,
    chunk_bucket: String,
    file_bucket: String,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn with_extension(stem: String, name: &str) -> String {
    match extension_of(name) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

impl UploadService {
    pub fn new(
        namespace: NamespaceService,
        blobs: Arc<dyn BlobStore>,
        registry: Arc<dyn HashRegistry>,
        coordinator: MergeCoordinator,
        config: &CoreConfig,
    ) -> Self {
        Self {
            namespace,
            blobs,
            registry,
            coordinator,
            chunk_bucket: config.chunk_bucket.clone(),
            file_bucket: config.file_bucket.clone(),
        }
    }

    /// Run an upload on its own task and wait for its result.
    pub async fn upload(
        &self,
        caller: &Caller,
        request: UploadRequest,
    ) -> Result<UploadOutcome, UploadError> {
        let tenant = self.validate(caller, &request)?;

        let (result_tx, result_rx) = oneshot::channel();
        let service = self.clone();
        let caller = caller.clone();
        tokio::spawn(async move {
            let result = match request.chunk.clone() {
                Some(chunk) => service.store_chunk(&tenant, request, chunk).await,
                None => service.store_whole(&caller, &tenant, request).await,
            };
            if result_tx.send(result).is_err() {
                tracing::debug!("Upload finished after its caller went away");
            }
        });

        result_rx
            .await
            .map_err(|e| UploadError::Aborted(e.to_string()))?
    }

    /// Checks that need no I/O; returns the tenant owning the target.
    fn validate(&self, caller: &Caller, request: &UploadRequest) -> Result<String, UploadError> {
        if request.name.trim().is_empty() {
            return Err(UploadError::invalid("file name is required"));
        }
        let target = normalize_path(&request.target_path).map_err(NamespaceError::from)?;
        let tenant = target
            .first()
            .cloned()
            .ok_or_else(|| UploadError::invalid("target path is empty"))?;
        reject_reserved(&target).map_err(NamespaceError::from)?;
        if !caller.may_access(&tenant, self.namespace.admin_identity()) {
            return Err(NamespaceError::unauthorized(caller.identity(), &tenant).into());
        }

        if let Some(chunk) = &request.chunk {
            if chunk.current < 1 || chunk.total < 1 || chunk.current > chunk.total {
                return Err(UploadError::invalid(format!(
                    "chunk {} of {} is out of range",
                    chunk.current, chunk.total
                )));
            }
            if chunk.file_hash.trim().is_empty() {
                return Err(UploadError::invalid("chunk upload without file hash"));
            }
        }
        Ok(tenant)
    }

    async fn store_whole(
        &self,
        caller: &Caller,
        tenant: &str,
        request: UploadRequest,
    ) -> Result<UploadOutcome, UploadError> {
        let payload_hash = sha256_hex(&request.data);
        let registry_key = format!("{}_{}", tenant, payload_hash);
        if let Some(storage_path) = self.registry.lookup(&registry_key).await? {
            tracing::info!("Upload of {} deduplicated to {}", request.name, storage_path);
            return Ok(UploadOutcome::Deduplicated { storage_path });
        }

        // Whole-file uploads never replace an existing leaf
        let mut segments = normalize_path(&request.target_path).map_err(NamespaceError::from)?;
        segments.extend(
            normalize_path(&request.storage_relative_path()).map_err(NamespaceError::from)?,
        );
        match self.namespace.resolve_path(caller, &segments).await {
            Ok(existing) => {
                return Err(NamespaceError::conflict(format!(
                    "{} already holds {}",
                    segments.join("/"),
                    existing.file_name
                ))
                .into())
            }
            Err(NamespaceError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let blob_name = with_extension(
            generate_file_name(&format!("{}{}", request.name, payload_hash)),
            &request.name,
        );
        let content_type = resolve_content_type(&request.name, &request.content_type);
        let key = object_key(tenant, &blob_name);
        let size = request.data.len() as u64;

        self.blobs.ensure_bucket(&self.file_bucket).await?;
        self.blobs
            .put(&self.file_bucket, &key, request.data.clone(), &content_type)
            .await?;

        let leaf = LeafDescriptor::file(blob_name, content_type, size, payload_hash);
        let outcome = self
            .namespace
            .insert_path(
                caller,
                InsertRequest::new(
                    request.target_path.clone(),
                    request.storage_relative_path(),
                    leaf,
                ),
            )
            .await?;
        let leaf = match outcome {
            InsertOutcome::Created { leaf, .. } => leaf,
            // Lost a race with another upload to the same path
            InsertOutcome::AlreadyExists(existing) => {
                return Err(NamespaceError::conflict(format!(
                    "{} already holds {}",
                    segments.join("/"),
                    existing.file_name
                ))
                .into())
            }
        };

        let storage_path = format!("{}/{}", self.file_bucket, key);
        self.registry.upsert(&registry_key, &storage_path).await?;
        tracing::info!("Stored {} as {}", request.name, storage_path);

        Ok(UploadOutcome::Stored { leaf, storage_path })
    }

    async fn store_chunk(
        &self,
        tenant: &str,
        request: UploadRequest,
        chunk: ChunkInfo,
    ) -> Result<UploadOutcome, UploadError> {
        let relative = request.storage_relative_path();
        // Same file at the same path always merges into the same blob
        let final_blob_name = with_extension(
            truncated_sha256(
                &format!(
                    "{}/{}/{}{}",
                    tenant, request.target_path, relative, chunk.file_hash
                ),
                FILE_NAME_LEN,
            ),
            &request.name,
        );

        let token_key = object_key(tenant, &format!("{}_{}", final_blob_name, chunk.current));
        self.blobs.ensure_bucket(&self.chunk_bucket).await?;
        self.blobs
            .put(
                &self.chunk_bucket,
                &token_key,
                request.data.clone(),
                &request.content_type,
            )
            .await?;

        let group = group_key(tenant, &chunk.file_hash);
        let received = self
            .coordinator
            .tracker()
            .record_chunk(&group, &final_blob_name, chunk.current)
            .await?;

        let target = MergeTarget {
            tenant: tenant.to_string(),
            final_blob_name: final_blob_name.clone(),
            content_type: request.content_type.clone(),
            target_path: request.target_path.clone(),
            relative_path: relative,
            display_name: request.name.clone(),
            file_hash: chunk.file_hash.clone(),
            declared_size: chunk.file_size,
        };

        match self
            .coordinator
            .dispatch_if_complete(&group, chunk.total as usize, received, target)
            .await?
        {
            DispatchOutcome::Pending { received, expected } => {
                Ok(UploadOutcome::ChunkAccepted { received, expected })
            }
            DispatchOutcome::Dispatched(_) => {
                Ok(UploadOutcome::MergeDispatched { final_blob_name })
            }
        }
    }
}
