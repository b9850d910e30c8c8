//! Namespace Engine
//!
//! Multi-tenant file tree on top of a [`GraphStore`]:
//!
//! - `insert_path` creates the missing part of a tenant path in one transaction
//! - `move_subtree` re-parents a node, including restores out of the trash
//! - `soft_delete` detaches a node into the trash namespace
//! - read-side queries: lookups, path resolution, subtree paths, ancestors
//!
//! # Namespaces
//!
//! ```text
//! remoteDisk (root)            trashDisk (root)
//!  └── t1 (user)                └── t1 (user)
//!       └── docs                     └── old.txt
//!            └── report.pdf
//! ```
//!
//! Every tenant owns one `user` node directly below each root. A caller may only
//! touch the tenant named after it, unless it is the admin identity.
//!
//! # Failure semantics
//!
//! Validation, authorization and not-found checks all run before any write.
//! Every mutation is a single [`GraphTransaction`]; guards inside it re-check the
//! lookups done beforehand, so a concurrent writer makes the transaction fail
//! instead of corrupting the tree.

use crate::db::{GraphStore, GraphTransaction};
use crate::models::{
    generate_file_name, Caller, FileNode, InsertOutcome, InsertRequest, NodeAttribute, NodeType,
    SubtreePaths, ADMIN_IDENTITY, ROOT_MARKER, TRASH_MARKER,
};
use crate::operations::{normalize_path, plan_insert, reject_reserved, walk, PathWalk};
use crate::services::error::NamespaceError;
use std::collections::HashSet;
use std::sync::Arc;

/// Default bound for upward and downward walks
pub const DEFAULT_MAX_DEPTH: usize = 1024;

const INSERT_ATTEMPTS: usize = 3;

/// Namespace engine over a shared graph store
#[derive(Clone)]
pub struct NamespaceService {
    graph: Arc<dyn GraphStore>,
    admin_identity: String,
    max_depth: usize,
}

impl NamespaceService {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self {
            graph,
            admin_identity: ADMIN_IDENTITY.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_admin_identity(mut self, admin_identity: impl Into<String>) -> Self {
        self.admin_identity = admin_identity.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    pub fn admin_identity(&self) -> &str {
        &self.admin_identity
    }

    fn authorize(&self, caller: &Caller, tenant: &str) -> Result<(), NamespaceError> {
        if caller.may_access(tenant, &self.admin_identity) {
            Ok(())
        } else {
            Err(NamespaceError::unauthorized(caller.identity(), tenant))
        }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Create every missing node of `target_path/relative_path`.
    ///
    /// The first target segment names the tenant. Intermediate nodes are
    /// directories; the last one is shaped by `request.leaf`. A path that
    /// already exists is a no-op (`AlreadyExists`) unless the request is a
    /// restore, which must not land on an existing leaf.
    ///
    /// A commit that loses an optimistic write conflict is re-planned from a
    /// fresh walk, so a concurrent insert of the same blob ends in `Conflict`.
    pub async fn insert_path(
        &self,
        caller: &Caller,
        request: InsertRequest,
    ) -> Result<InsertOutcome, NamespaceError> {
        let mut attempt = 1;
        loop {
            match self.insert_once(caller, &request).await {
                Err(NamespaceError::Database(e))
                    if e.is_write_conflict() && attempt < INSERT_ATTEMPTS =>
                {
                    tracing::debug!("Insert attempt {} hit a write conflict: {}", attempt, e);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn insert_once(
        &self,
        caller: &Caller,
        request: &InsertRequest,
    ) -> Result<InsertOutcome, NamespaceError> {
        let target = normalize_path(&request.target_path)?;
        if target.is_empty() {
            return Err(NamespaceError::validation("target path is empty"));
        }
        let relative = normalize_path(&request.relative_path)?;
        self.authorize(caller, &target[0])?;

        let segments: Vec<String> = target.into_iter().chain(relative).collect();
        reject_reserved(&segments)?;
        let last = segments.len() - 1;

        let root_exists = self
            .graph
            .find_node(NodeAttribute::FileName, ROOT_MARKER)
            .await?
            .is_some();
        let path_walk = if root_exists {
            walk(self.graph.as_ref(), ROOT_MARKER, &segments).await?
        } else {
            PathWalk {
                matched: Vec::new(),
                fault_index: Some(0),
            }
        };
        path_walk.check_directories(last)?;

        if let Some(existing) = path_walk.terminal() {
            if request.is_restore {
                return Err(NamespaceError::conflict(format!(
                    "duplicate leaf: {}",
                    segments.join("/")
                )));
            }
            tracing::debug!("Path already exists: {}", segments.join("/"));
            return Ok(InsertOutcome::AlreadyExists(existing.clone()));
        }

        if !request.leaf.is_dir {
            if let Some(file_name) = request.leaf.file_name.as_deref() {
                if self
                    .graph
                    .find_node(NodeAttribute::FileName, file_name)
                    .await?
                    .is_some()
                {
                    return Err(NamespaceError::conflict(format!(
                        "file name already exists: {}",
                        file_name
                    )));
                }
            }
        }

        let plan = plan_insert(&segments, &path_walk, &request.leaf)?;
        self.graph.commit(plan.transaction).await?;

        tracing::info!(
            "Inserted {} ({} new nodes) for {}",
            segments.join("/"),
            plan.created.len(),
            caller
        );
        Ok(InsertOutcome::Created {
            leaf: plan.leaf,
            created: plan.created,
        })
    }

    // =========================================================================
    // Move / delete
    // =========================================================================

    /// Split an optional leading `trashDisk` off a segment list.
    fn namespace_of<'a>(
        &self,
        caller: &Caller,
        segments: &'a [String],
    ) -> Result<(&'static str, &'a [String]), NamespaceError> {
        let (root, rest) = match segments.split_first() {
            Some((first, rest)) if first == TRASH_MARKER => (TRASH_MARKER, rest),
            Some(_) => (ROOT_MARKER, segments),
            None => return Err(NamespaceError::validation("segment list is empty")),
        };
        if rest.is_empty() {
            return Err(NamespaceError::validation("segment list names no tenant"));
        }
        if rest.iter().any(|s| s.trim().is_empty()) {
            return Err(NamespaceError::validation("empty path segment"));
        }
        reject_reserved(rest)?;
        self.authorize(caller, &rest[0])?;
        Ok((root, rest))
    }

    async fn resolve_in(&self, root: &str, segments: &[String]) -> Result<FileNode, NamespaceError> {
        let path_walk = walk(self.graph.as_ref(), root, segments).await?;
        path_walk.terminal().cloned().ok_or_else(|| {
            NamespaceError::not_found(format!("{}/{}", root, segments.join("/")))
        })
    }

    /// Re-parent the node at `source` under the directory at `target`.
    ///
    /// Either list may start with `trashDisk` to address the trash namespace,
    /// which is how deleted nodes are restored.
    pub async fn move_subtree(
        &self,
        caller: &Caller,
        source: &[String],
        target: &[String],
    ) -> Result<FileNode, NamespaceError> {
        let (source_root, source_rest) = self.namespace_of(caller, source)?;
        let (target_root, target_rest) = self.namespace_of(caller, target)?;

        let node = self.resolve_in(source_root, source_rest).await?;
        let destination = self.resolve_in(target_root, target_rest).await?;

        if node.is_namespace_root() || node.is_tenant() {
            return Err(NamespaceError::validation(format!(
                "{} node '{}' cannot be moved",
                node.node_type, node.name
            )));
        }
        if !destination.is_dir {
            return Err(NamespaceError::conflict(format!(
                "move target '{}' is not a directory",
                destination.name
            )));
        }
        self.ensure_not_descendant(&node, &destination).await?;
        if self
            .graph
            .child_by_name(&destination.file_name, &node.name)
            .await?
            .is_some()
        {
            return Err(NamespaceError::conflict(format!(
                "'{}' already contains '{}'",
                destination.name, node.name
            )));
        }

        let parent = self
            .graph
            .parent(&node.file_name)
            .await?
            .ok_or_else(|| NamespaceError::not_found(format!("parent of {}", node.file_name)))?;

        let mut tx = GraphTransaction::new();
        tx.detach(parent.file_name.clone(), node.file_name.clone())
            .ensure_no_child_named(destination.file_name.clone(), node.name.clone())
            .relate(destination.file_name.clone(), node.file_name.clone());
        self.graph.commit(tx).await?;

        tracing::info!(
            "Moved {} from {} to {} for {}",
            node.name,
            parent.name,
            destination.name,
            caller
        );
        Ok(node)
    }

    /// Reject moving `node` into itself or below itself.
    async fn ensure_not_descendant(
        &self,
        node: &FileNode,
        destination: &FileNode,
    ) -> Result<(), NamespaceError> {
        let cycle = || {
            NamespaceError::conflict(format!(
                "cannot move '{}' into its own subtree",
                node.name
            ))
        };
        if destination.file_name == node.file_name {
            return Err(cycle());
        }
        let chain = self.ancestors(&destination.file_name).await?;
        if chain.iter().any(|n| n.file_name == node.file_name) {
            return Err(cycle());
        }
        Ok(())
    }

    /// Detach `file_name` from the live tree and park it under the trash-side
    /// node of its owning tenant.
    pub async fn soft_delete(
        &self,
        caller: &Caller,
        file_name: &str,
    ) -> Result<FileNode, NamespaceError> {
        if file_name.trim().is_empty() {
            return Err(NamespaceError::validation("file name is empty"));
        }
        let node = self
            .graph
            .find_node(NodeAttribute::FileName, file_name)
            .await?
            .ok_or_else(|| NamespaceError::not_found(file_name))?;
        if node.is_namespace_root() || node.is_tenant() {
            return Err(NamespaceError::validation(format!(
                "{} node '{}' cannot be deleted",
                node.node_type, node.name
            )));
        }

        // node, parent, ..., tenant, root
        let chain = self.ancestors(file_name).await?;
        let live = chain
            .last()
            .map(|root| root.file_name == ROOT_MARKER)
            .unwrap_or(false);
        if chain.len() < 3 || !live {
            return Err(NamespaceError::not_found(format!(
                "{} is not in the live namespace",
                file_name
            )));
        }
        let parent = &chain[1];
        let tenant = &chain[chain.len() - 2];
        self.authorize(caller, &tenant.name)?;

        let trash_tenant = match self
            .graph
            .find_node(NodeAttribute::FileName, TRASH_MARKER)
            .await?
        {
            Some(_) => self.graph.child_by_name(TRASH_MARKER, &tenant.name).await?,
            None => None,
        };

        let mut tx = GraphTransaction::new();
        tx.detach(parent.file_name.clone(), node.file_name.clone())
            .ensure_root(FileNode::root(TRASH_MARKER));
        match trash_tenant {
            Some(existing) => {
                tx.relate(existing.file_name, node.file_name.clone());
            }
            None => {
                let mount = FileNode::directory(
                    tenant.name.clone(),
                    generate_file_name(&tenant.name),
                    NodeType::User,
                );
                tx.ensure_no_child_named(TRASH_MARKER, tenant.name.clone())
                    .create_node(mount.clone())
                    .relate(TRASH_MARKER, mount.file_name.clone())
                    .relate(mount.file_name, node.file_name.clone());
            }
        }
        self.graph.commit(tx).await?;

        tracing::info!("Moved {} to trash for {}", node.name, caller);
        Ok(node)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn find_node(
        &self,
        attribute: NodeAttribute,
        value: &str,
    ) -> Result<Option<FileNode>, NamespaceError> {
        Ok(self.graph.find_node(attribute, value).await?)
    }

    /// Terminal node of `segments`, authorised like `move_subtree`
    pub async fn resolve_path(
        &self,
        caller: &Caller,
        segments: &[String],
    ) -> Result<FileNode, NamespaceError> {
        let (root, rest) = self.namespace_of(caller, segments)?;
        self.resolve_in(root, rest).await
    }

    /// Every chain of file names from `file_name` down to a leaf, plus the
    /// deduplicated node records.
    pub async fn subtree_paths(
        &self,
        file_name: &str,
        include_start: bool,
    ) -> Result<SubtreePaths, NamespaceError> {
        let start = self
            .graph
            .find_node(NodeAttribute::FileName, file_name)
            .await?
            .ok_or_else(|| NamespaceError::not_found(file_name))?;

        let mut result = SubtreePaths::default();
        let mut seen = HashSet::new();
        let mut stack = vec![(start.clone(), vec![start.file_name.clone()])];

        while let Some((node, chain)) = stack.pop() {
            if chain.len() > self.max_depth {
                return Err(NamespaceError::conflict(format!(
                    "subtree below {} is deeper than {}",
                    file_name, self.max_depth
                )));
            }
            if seen.insert(node.file_name.clone()) {
                result.nodes.push(node.clone());
            }

            let children = self.graph.children(&node.file_name).await?;
            if children.is_empty() {
                // A childless start node has no path below it
                if chain.len() > 1 {
                    result.paths.push(chain);
                }
                continue;
            }
            for child in children.into_iter().rev() {
                let mut next = chain.clone();
                next.push(child.file_name.clone());
                stack.push((child, next));
            }
        }

        if !include_start {
            result.nodes.retain(|n| n.file_name != start.file_name);
            result.paths = result
                .paths
                .into_iter()
                .map(|chain| chain.into_iter().skip(1).collect::<Vec<_>>())
                .filter(|chain| !chain.is_empty())
                .collect();
        }
        Ok(result)
    }

    /// The node followed by each ancestor up to its namespace root.
    pub async fn ancestors(&self, file_name: &str) -> Result<Vec<FileNode>, NamespaceError> {
        let mut current = self
            .graph
            .find_node(NodeAttribute::FileName, file_name)
            .await?
            .ok_or_else(|| NamespaceError::not_found(file_name))?;
        let mut chain = Vec::new();

        loop {
            if chain.len() >= self.max_depth {
                return Err(NamespaceError::conflict(format!(
                    "ancestor walk from {} exceeded {} steps",
                    file_name, self.max_depth
                )));
            }
            let is_root = current.is_namespace_root();
            let parent = if is_root {
                None
            } else {
                self.graph.parent(&current.file_name).await?
            };
            chain.push(current);
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
        Ok(chain)
    }

    /// Tenant owning `file_name`, found by walking up to its namespace root
    pub async fn owning_tenant(&self, file_name: &str) -> Result<FileNode, NamespaceError> {
        let chain = self.ancestors(file_name).await?;
        chain
            .into_iter()
            .find(|n| n.is_tenant())
            .ok_or_else(|| NamespaceError::not_found(format!("tenant owning {}", file_name)))
    }

    /// Authorise `caller` against the tenant owning `file_name`
    pub async fn authorize_node(
        &self,
        caller: &Caller,
        file_name: &str,
    ) -> Result<FileNode, NamespaceError> {
        let tenant = self.owning_tenant(file_name).await?;
        self.authorize(caller, &tenant.name)?;
        Ok(tenant)
    }
}

#[cfg(test)]
#[path = "namespace_service_test.rs"]
mod namespace_service_test;
