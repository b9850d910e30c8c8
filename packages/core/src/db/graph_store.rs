//! Graph store abstraction
//!
//! The namespace engine only ever talks to a [`GraphStore`]. Reads are single
//! lookups along `connects_to` edges. Writes are collected into a
//! [`GraphTransaction`], an ordered batch of guarded operations that the backend
//! applies atomically: either every operation lands or none does.
//!
//! Guards (`EnsureAbsent`, `EnsureNoChildNamed`) re-check at commit time what the
//! engine already looked up before building the batch, which closes the window
//! between the lookup and the write.

use super::DatabaseError;
use crate::models::{FileNode, NodeAttribute};
use async_trait::async_trait;

/// Single graph mutation inside a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOp {
    /// Create a node; fails if its `file_name` is taken
    CreateNode(FileNode),
    /// Create a namespace root unless one with the same `file_name` exists
    EnsureRoot(FileNode),
    /// Add `parent -> child`; fails if the child already has a parent
    Relate { parent: String, child: String },
    /// Remove `parent -> child`; fails if the edge is missing
    Detach { parent: String, child: String },
    /// Abort unless no node carries `file_name`
    EnsureAbsent { file_name: String },
    /// Abort if `parent` already has a child called `name`
    EnsureNoChildNamed { parent: String, name: String },
}

/// Ordered batch of [`GraphOp`]s committed as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphTransaction {
    ops: Vec<GraphOp>,
}

impl GraphTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_node(&mut self, node: FileNode) -> &mut Self {
        self.ops.push(GraphOp::CreateNode(node));
        self
    }

    pub fn ensure_root(&mut self, root: FileNode) -> &mut Self {
        self.ops.push(GraphOp::EnsureRoot(root));
        self
    }

    pub fn relate(&mut self, parent: impl Into<String>, child: impl Into<String>) -> &mut Self {
        self.ops.push(GraphOp::Relate {
            parent: parent.into(),
            child: child.into(),
        });
        self
    }

    pub fn detach(&mut self, parent: impl Into<String>, child: impl Into<String>) -> &mut Self {
        self.ops.push(GraphOp::Detach {
            parent: parent.into(),
            child: child.into(),
        });
        self
    }

    pub fn ensure_absent(&mut self, file_name: impl Into<String>) -> &mut Self {
        self.ops.push(GraphOp::EnsureAbsent {
            file_name: file_name.into(),
        });
        self
    }

    pub fn ensure_no_child_named(
        &mut self,
        parent: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(GraphOp::EnsureNoChildNamed {
            parent: parent.into(),
            name: name.into(),
        });
        self
    }

    pub fn ops(&self) -> &[GraphOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Property-graph backend holding `FileNode` records and `connects_to` edges
///
/// Nodes are addressed by their globally unique `file_name`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// First node whose `attribute` equals `value`
    async fn find_node(
        &self,
        attribute: NodeAttribute,
        value: &str,
    ) -> Result<Option<FileNode>, DatabaseError>;

    /// Child of `parent` whose display name is `name`
    async fn child_by_name(
        &self,
        parent: &str,
        name: &str,
    ) -> Result<Option<FileNode>, DatabaseError>;

    /// All children of `parent`; order is backend-defined
    async fn children(&self, parent: &str) -> Result<Vec<FileNode>, DatabaseError>;

    /// The node's single parent, if attached
    async fn parent(&self, file_name: &str) -> Result<Option<FileNode>, DatabaseError>;

    /// Apply every operation of `tx` atomically
    async fn commit(&self, tx: GraphTransaction) -> Result<(), DatabaseError>;
}
