//! In-process graph backend
//!
//! Commits clone the current state, apply the batch to the clone and swap it in
//! only if every operation succeeded, all under one write lock. Transactions are
//! therefore serialisable and a failed batch leaves no trace.

use super::graph_store::{GraphOp, GraphStore, GraphTransaction};
use super::DatabaseError;
use crate::models::{FileNode, NodeAttribute};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: HashMap<String, FileNode>,
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, String>,
    /// Creation order, so lookups by attribute are deterministic
    order: Vec<String>,
}

impl GraphState {
    fn insert_node(&mut self, node: FileNode) {
        self.order.push(node.file_name.clone());
        self.nodes.insert(node.file_name.clone(), node);
    }

    fn child_named(&self, parent: &str, name: &str) -> Option<&FileNode> {
        self.children
            .get(parent)?
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .find(|n| n.name == name)
    }

    fn apply(&mut self, op: &GraphOp) -> Result<(), DatabaseError> {
        match op {
            GraphOp::CreateNode(node) => {
                if self.nodes.contains_key(&node.file_name) {
                    return Err(DatabaseError::constraint_violation(format!(
                        "file name already exists: {}",
                        node.file_name
                    )));
                }
                self.insert_node(node.clone());
            }
            GraphOp::EnsureRoot(root) => {
                if !self.nodes.contains_key(&root.file_name) {
                    self.insert_node(root.clone());
                }
            }
            GraphOp::Relate { parent, child } => {
                if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
                    return Err(DatabaseError::transaction_aborted(format!(
                        "cannot relate missing nodes {} -> {}",
                        parent, child
                    )));
                }
                if self.parents.contains_key(child) {
                    return Err(DatabaseError::constraint_violation(format!(
                        "node already has a parent: {}",
                        child
                    )));
                }
                self.parents.insert(child.clone(), parent.clone());
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .push(child.clone());
            }
            GraphOp::Detach { parent, child } => {
                if self.parents.get(child) != Some(parent) {
                    return Err(DatabaseError::constraint_violation(format!(
                        "no edge {} -> {}",
                        parent, child
                    )));
                }
                self.parents.remove(child);
                if let Some(siblings) = self.children.get_mut(parent) {
                    siblings.retain(|c| c != child);
                }
            }
            GraphOp::EnsureAbsent { file_name } => {
                if self.nodes.contains_key(file_name) {
                    return Err(DatabaseError::constraint_violation(format!(
                        "file name already exists: {}",
                        file_name
                    )));
                }
            }
            GraphOp::EnsureNoChildNamed { parent, name } => {
                if self.child_named(parent, name).is_some() {
                    return Err(DatabaseError::constraint_violation(format!(
                        "{} already has a child named {}",
                        parent, name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Graph store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: RwLock<GraphState>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.read().await.parents.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn find_node(
        &self,
        attribute: NodeAttribute,
        value: &str,
    ) -> Result<Option<FileNode>, DatabaseError> {
        let state = self.state.read().await;
        if attribute == NodeAttribute::FileName {
            return Ok(state.nodes.get(value).cloned());
        }
        Ok(state
            .order
            .iter()
            .filter_map(|f| state.nodes.get(f))
            .find(|n| attribute.value_of(n) == value)
            .cloned())
    }

    async fn child_by_name(
        &self,
        parent: &str,
        name: &str,
    ) -> Result<Option<FileNode>, DatabaseError> {
        Ok(self.state.read().await.child_named(parent, name).cloned())
    }

    async fn children(&self, parent: &str) -> Result<Vec<FileNode>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .children
            .get(parent)
            .map(|kids| {
                kids.iter()
                    .filter_map(|c| state.nodes.get(c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn parent(&self, file_name: &str) -> Result<Option<FileNode>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .parents
            .get(file_name)
            .and_then(|p| state.nodes.get(p))
            .cloned())
    }

    async fn commit(&self, tx: GraphTransaction) -> Result<(), DatabaseError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        for op in tx.ops() {
            if let Err(e) = next.apply(op) {
                tracing::debug!("MemoryGraph transaction rolled back: {}", e);
                return Err(e);
            }
        }
        *guard = next;
        Ok(())
    }
}
