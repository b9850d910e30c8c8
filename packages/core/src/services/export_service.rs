//! Export Service
//!
//! Materialises a subtree on the local filesystem: the tree rebuilt from
//! `subtree_paths` becomes directories, every file leaf is downloaded from the
//! file bucket. Downloads run concurrently on a [`JoinSet`]; the first failure
//! aborts the rest.

use crate::blob::{object_key, BlobStore};
use crate::models::content_type::{extension_for_mime, extension_of};
use crate::models::{Caller, FileNode};
use crate::operations::{build_tree, FileTreeNode};
use crate::services::error::{ExportError, NamespaceError};
use crate::services::namespace_service::NamespaceService;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Where an export landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Fresh directory holding the exported tree
    pub directory: PathBuf,
    pub files: usize,
    pub directories: usize,
}

#[derive(Clone)]
pub struct ExportService {
    namespace: NamespaceService,
    blobs: Arc<dyn BlobStore>,
    file_bucket: String,
}

/// Local file name for a leaf: display name plus the extension of its type
fn local_file_name(node: &FileNode) -> String {
    if node.is_dir {
        return node.name.clone();
    }
    let Some(ext) = extension_for_mime(&node.content_type) else {
        return node.name.clone();
    };
    if extension_of(&node.name).as_deref() == Some(ext) {
        node.name.clone()
    } else {
        format!("{}.{}", node.name, ext)
    }
}

/// Local names for the children of one directory, in child order
///
/// A child whose display name is used as-is keeps it; a name that only exists
/// through an added extension (`report` stored as `application/pdf`) yields to
/// it and becomes `report (2).pdf`.
fn sibling_names(children: &[FileTreeNode]) -> Vec<String> {
    let wanted: Vec<String> = children
        .iter()
        .map(|child| local_file_name(&child.node))
        .collect();

    let mut taken = HashSet::new();
    let mut names = vec![String::new(); children.len()];
    let exact = |i: &usize| wanted[*i] == children[*i].node.name;
    let (first, rest): (Vec<usize>, Vec<usize>) = (0..children.len()).partition(exact);
    for i in first.into_iter().chain(rest) {
        names[i] = unique_name(&wanted[i], &mut taken);
    }
    names
}

fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
        _ => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

struct Download {
    key: String,
    dest: PathBuf,
}

impl ExportService {
    pub fn new(
        namespace: NamespaceService,
        blobs: Arc<dyn BlobStore>,
        file_bucket: impl Into<String>,
    ) -> Self {
        Self {
            namespace,
            blobs,
            file_bucket: file_bucket.into(),
        }
    }

    /// Export the subtree rooted at `file_name` into a new directory below `dest_root`.
    pub async fn export(
        &self,
        caller: &Caller,
        file_name: &str,
        dest_root: &Path,
    ) -> Result<ExportResult, ExportError> {
        let tenant = self.namespace.authorize_node(caller, file_name).await?;
        let subtree = self.namespace.subtree_paths(file_name, true).await?;
        let tree = build_tree(&subtree)
            .ok_or_else(|| NamespaceError::not_found(format!("subtree of {}", file_name)))?;

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let directory = dest_root.join(&suffix[..16]);
        tokio::fs::create_dir_all(&directory).await?;

        let mut downloads = Vec::new();
        let directories = Self::lay_out(&tree, &directory, &tenant.name, &mut downloads).await?;
        let files = downloads.len();
        tracing::info!(
            "Exporting {} ({} files, {} directories) to {}",
            file_name,
            files,
            directories,
            directory.display()
        );

        self.download_all(downloads).await?;
        Ok(ExportResult {
            directory,
            files,
            directories,
        })
    }

    /// Create directories depth-first and collect the downloads they need.
    async fn lay_out(
        tree: &FileTreeNode,
        parent: &Path,
        tenant: &str,
        downloads: &mut Vec<Download>,
    ) -> Result<usize, ExportError> {
        let mut created = 0;
        let mut stack = vec![(tree, parent.join(local_file_name(&tree.node)))];

        while let Some((entry, path)) = stack.pop() {
            let node = &entry.node;
            if node.is_dir {
                tokio::fs::create_dir_all(&path).await?;
                created += 1;
                let names = sibling_names(&entry.children);
                for (child, name) in entry.children.iter().zip(names).rev() {
                    stack.push((child, path.join(name)));
                }
            } else {
                downloads.push(Download {
                    key: object_key(tenant, &node.file_name),
                    dest: path,
                });
            }
        }
        Ok(created)
    }

    async fn download_all(&self, downloads: Vec<Download>) -> Result<(), ExportError> {
        let mut tasks = JoinSet::new();
        for download in downloads {
            let blobs = self.blobs.clone();
            let bucket = self.file_bucket.clone();
            tasks.spawn(async move {
                let bytes = blobs.get(&bucket, &download.key).await?;
                tokio::fs::write(&download.dest, bytes).await?;
                Ok::<_, ExportError>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| ExportError::Task(e.to_string()))
                .and_then(|result| result);
            if let Err(e) = outcome {
                tracing::error!("Export download failed: {}", e);
                tasks.abort_all();
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::db::MemoryGraph;
    use crate::models::{InsertRequest, LeafDescriptor};

    async fn seeded() -> anyhow::Result<(ExportService, NamespaceService, Arc<MemoryBlobStore>)> {
        let namespace = NamespaceService::new(Arc::new(MemoryGraph::new()));
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.ensure_bucket("remote-disk").await?;

        let t1 = Caller::new("t1");
        for (relative, blob, mime, body) in [
            ("docs/report", "blobreport.pdf", "application/pdf", &b"%PDF"[..]),
            ("docs/notes.txt", "blobnotes.txt", "text/plain", &b"notes"[..]),
        ] {
            blobs
                .put("remote-disk", &object_key("t1", blob), body.to_vec(), mime)
                .await?;
            let leaf = LeafDescriptor::file(blob, mime, body.len() as u64, "h");
            namespace
                .insert_path(&t1, InsertRequest::new("t1", relative, leaf))
                .await?;
        }

        let service = ExportService::new(namespace.clone(), blobs.clone(), "remote-disk");
        Ok((service, namespace, blobs))
    }

    #[test]
    fn test_local_file_name_adds_missing_extension() {
        let pdf = FileNode::leaf(
            "report",
            &LeafDescriptor::file("b.pdf", "application/pdf", 1, "h"),
            "b.pdf",
            crate::models::NodeType::Normal,
        );
        assert_eq!(local_file_name(&pdf), "report.pdf");

        let txt = FileNode::leaf(
            "notes.txt",
            &LeafDescriptor::file("b.txt", "text/plain", 1, "h"),
            "b.txt",
            crate::models::NodeType::Normal,
        );
        assert_eq!(local_file_name(&txt), "notes.txt");
    }

    #[tokio::test]
    async fn test_export_materialises_tree() -> anyhow::Result<()> {
        let (service, namespace, _) = seeded().await?;
        let dest = tempfile::tempdir()?;
        let docs = namespace
            .resolve_path(&Caller::new("t1"), &["t1".to_string(), "docs".to_string()])
            .await?;

        let result = service
            .export(&Caller::new("t1"), &docs.file_name, dest.path())
            .await?;
        assert_eq!(result.files, 2);
        assert_eq!(result.directories, 1);
        assert_eq!(
            result.directory.file_name().map(|n| n.len()),
            Some(16)
        );

        let root = result.directory.join("docs");
        assert_eq!(std::fs::read(root.join("report.pdf"))?, b"%PDF");
        assert_eq!(std::fs::read(root.join("notes.txt"))?, b"notes");
        Ok(())
    }

    #[tokio::test]
    async fn test_sibling_name_clash_is_disambiguated() -> anyhow::Result<()> {
        let (service, namespace, blobs) = seeded().await?;
        let t1 = Caller::new("t1");
        blobs
            .put(
                "remote-disk",
                &object_key("t1", "blobreport2.pdf"),
                b"%PDF-2".to_vec(),
                "application/pdf",
            )
            .await?;
        let leaf = LeafDescriptor::file("blobreport2.pdf", "application/pdf", 6, "h2");
        namespace
            .insert_path(&t1, InsertRequest::new("t1", "docs/report.pdf", leaf))
            .await?;
        let docs = namespace
            .resolve_path(&t1, &["t1".to_string(), "docs".to_string()])
            .await?;

        let dest = tempfile::tempdir()?;
        let result = service.export(&t1, &docs.file_name, dest.path()).await?;
        assert_eq!(result.files, 3);

        let root = result.directory.join("docs");
        assert_eq!(std::fs::read(root.join("report.pdf"))?, b"%PDF-2");
        assert_eq!(std::fs::read(root.join("report (2).pdf"))?, b"%PDF");
        assert_eq!(std::fs::read(root.join("notes.txt"))?, b"notes");
        Ok(())
    }

    #[tokio::test]
    async fn test_export_requires_tenant_access() -> anyhow::Result<()> {
        let (service, namespace, _) = seeded().await?;
        let dest = tempfile::tempdir()?;
        let docs = namespace
            .resolve_path(&Caller::new("t1"), &["t1".to_string(), "docs".to_string()])
            .await?;

        let denied = service
            .export(&Caller::new("t2"), &docs.file_name, dest.path())
            .await;
        assert!(matches!(
            denied,
            Err(ExportError::Namespace(NamespaceError::Unauthorized { .. }))
        ));

        let unknown = service.export(&Caller::new("t1"), "nope", dest.path()).await;
        assert!(matches!(
            unknown,
            Err(ExportError::Namespace(NamespaceError::NotFound(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_blob_fails_export() -> anyhow::Result<()> {
        let (service, namespace, _) = seeded().await?;
        let t1 = Caller::new("t1");
        let leaf = LeafDescriptor::file("ghost.bin", "application/octet-stream", 1, "h");
        namespace
            .insert_path(&t1, InsertRequest::new("t1", "docs/ghost", leaf))
            .await?;
        let docs = namespace
            .resolve_path(&t1, &["t1".to_string(), "docs".to_string()])
            .await?;

        let dest = tempfile::tempdir()?;
        let result = service.export(&t1, &docs.file_name, dest.path()).await;
        assert!(matches!(result, Err(ExportError::Blob(_))));
        Ok(())
    }
}
