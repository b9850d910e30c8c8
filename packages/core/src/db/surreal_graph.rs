//! SurrealDB graph backend
//!
//! Nodes live in the `fs_node` table with record id `fs_node:<file_name>`;
//! parent → child links are `connects_to` relation records. Two unique indexes
//! back the engine's pre-commit lookups: one on `fs_node.file_name` and one on
//! `connects_to.out` (a node has at most one parent).
//!
//! A [`GraphTransaction`] is rendered as a single `BEGIN … COMMIT` script. Guard
//! operations `THROW` inside the script, which cancels the whole transaction.
//!
//! # Examples
//!
//! ```rust,no_run
//! use graphdisk_core::db::{GraphStore, SurrealGraph};
//! use graphdisk_core::models::NodeAttribute;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let graph = SurrealGraph::in_memory().await?;
//!     let root = graph.find_node(NodeAttribute::FileName, "remoteDisk").await?;
//!     assert!(root.is_none());
//!     Ok(())
//! }
//! ```

use super::graph_store::{GraphOp, GraphStore, GraphTransaction};
use super::DatabaseError;
use crate::models::{FileNode, NodeAttribute, NodeType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::sql::{Id, Thing};
use surrealdb::{Connection, Surreal};

const NODE_TABLE: &str = "fs_node";

/// Prefix of every message thrown by a guard statement.
const GUARD_PREFIX: &str = "constraint:";

const NODE_FIELDS: [&str; 8] = [
    "file_name",
    "name",
    "is_dir",
    "update_time",
    "content_type",
    "size",
    "file_hash",
    "node_type",
];

/// Record layout of `fs_node`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurrealFsNode {
    file_name: String,
    name: String,
    is_dir: bool,
    update_time: String,
    content_type: String,
    size: u64,
    file_hash: String,
    node_type: NodeType,
}

impl From<&FileNode> for SurrealFsNode {
    fn from(node: &FileNode) -> Self {
        Self {
            file_name: node.file_name.clone(),
            name: node.name.clone(),
            is_dir: node.is_dir,
            update_time: node.update_time.to_rfc3339(),
            content_type: node.content_type.clone(),
            size: node.size,
            file_hash: node.file_hash.clone(),
            node_type: node.node_type,
        }
    }
}

impl From<SurrealFsNode> for FileNode {
    fn from(sn: SurrealFsNode) -> Self {
        FileNode {
            is_dir: sn.is_dir,
            name: sn.name,
            update_time: DateTime::parse_from_rfc3339(&sn.update_time)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            content_type: sn.content_type,
            size: sn.size,
            file_hash: sn.file_hash,
            file_name: sn.file_name,
            node_type: sn.node_type,
        }
    }
}

/// `a.file_name AS file_name, a.name AS name, …` for reading a node through an edge
fn projection(side: &str) -> String {
    NODE_FIELDS
        .iter()
        .map(|f| format!("{side}.{f} AS {f}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn node_thing(file_name: &str) -> Thing {
    Thing::from((NODE_TABLE, Id::String(file_name.to_string())))
}

/// Sort a failed transaction into guard rejections, optimistic write
/// conflicts and everything else.
fn classify(err: surrealdb::Error) -> DatabaseError {
    let msg = err.to_string();
    if msg.contains(GUARD_PREFIX) || msg.contains("already exists") || msg.contains("already contains")
    {
        DatabaseError::constraint_violation(msg)
    } else if msg.contains("can be retried") {
        DatabaseError::write_conflict(msg)
    } else {
        DatabaseError::transaction_aborted(msg)
    }
}

/// A cancelled script reports an error for every statement; the most specific
/// one decides the class.
fn classify_all(errors: impl IntoIterator<Item = surrealdb::Error>) -> DatabaseError {
    let mut classified: Vec<DatabaseError> = errors.into_iter().map(classify).collect();
    let rank = |err: &DatabaseError| match err {
        DatabaseError::ConstraintViolation(_) => 0,
        DatabaseError::WriteConflict(_) => 1,
        _ => 2,
    };
    classified.sort_by_key(rank);
    classified
        .into_iter()
        .next()
        .unwrap_or_else(|| DatabaseError::transaction_aborted("transaction failed"))
}

/// SurrealDB-backed [`GraphStore`]
///
/// Generic over the connection so the embedded engines and remote clients share
/// one implementation.
pub struct SurrealGraph<C = Db>
where
    C: Connection,
{
    db: Arc<Surreal<C>>,
}

impl SurrealGraph<Db> {
    /// Open (or create) an embedded RocksDB graph at `db_path`
    pub async fn open(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Surreal::new::<RocksDb>(db_path.clone())
            .await
            .map_err(|e| DatabaseError::connection_failed(&db_path, e))?;
        Self::from_client(db).await
    }

    /// Volatile graph, mostly for tests
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let db = Surreal::new::<Mem>(())
            .await
            .map_err(|e| DatabaseError::connection_failed("memory", e))?;
        Self::from_client(db).await
    }
}

impl<C> SurrealGraph<C>
where
    C: Connection,
{
    /// Wrap an already connected client and make sure the schema exists
    pub async fn from_client(db: Surreal<C>) -> Result<Self, DatabaseError> {
        db.use_ns("graphdisk").use_db("namespace").await?;
        Self::initialize_schema(&db).await?;
        tracing::info!("SurrealGraph ready");
        Ok(Self { db: Arc::new(db) })
    }

    async fn initialize_schema(db: &Surreal<C>) -> Result<(), DatabaseError> {
        db.query(
            "
            DEFINE TABLE IF NOT EXISTS fs_node SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS fs_node_file_name ON TABLE fs_node FIELDS file_name UNIQUE;
            DEFINE TABLE IF NOT EXISTS connects_to SCHEMALESS TYPE RELATION;
            DEFINE INDEX IF NOT EXISTS connects_to_single_parent ON TABLE connects_to FIELDS out UNIQUE;
            ",
        )
        .await
        .and_then(|r| r.check())
        .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?;
        Ok(())
    }

    async fn select_nodes(
        &self,
        query: String,
        bindings: Vec<(&'static str, Thing)>,
        name: Option<String>,
    ) -> Result<Vec<FileNode>, DatabaseError> {
        let mut builder = self.db.query(query);
        for binding in bindings {
            builder = builder.bind(binding);
        }
        if let Some(name) = name {
            builder = builder.bind(("name", name));
        }
        let mut response = builder
            .await
            .map_err(|e| DatabaseError::query_failed(e.to_string()))?;
        let rows: Vec<SurrealFsNode> = response
            .take(0)
            .map_err(|e| DatabaseError::serialization(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl<C> GraphStore for SurrealGraph<C>
where
    C: Connection,
{
    async fn find_node(
        &self,
        attribute: NodeAttribute,
        value: &str,
    ) -> Result<Option<FileNode>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM {} WHERE {} = $value LIMIT 1;",
            NODE_FIELDS.join(", "),
            NODE_TABLE,
            attribute.field()
        );
        let mut response = self
            .db
            .query(query)
            .bind(("value", value.to_string()))
            .await
            .map_err(|e| DatabaseError::query_failed(e.to_string()))?;
        let rows: Vec<SurrealFsNode> = response
            .take(0)
            .map_err(|e| DatabaseError::serialization(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).next())
    }

    async fn child_by_name(
        &self,
        parent: &str,
        name: &str,
    ) -> Result<Option<FileNode>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM connects_to WHERE in = $parent AND out.name = $name LIMIT 1;",
            projection("out")
        );
        let rows = self
            .select_nodes(
                query,
                vec![("parent", node_thing(parent))],
                Some(name.to_string()),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn children(&self, parent: &str) -> Result<Vec<FileNode>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM connects_to WHERE in = $parent;",
            projection("out")
        );
        self.select_nodes(query, vec![("parent", node_thing(parent))], None)
            .await
    }

    async fn parent(&self, file_name: &str) -> Result<Option<FileNode>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM connects_to WHERE out = $child LIMIT 1;",
            projection("in")
        );
        let rows = self
            .select_nodes(query, vec![("child", node_thing(file_name))], None)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn commit(&self, tx: GraphTransaction) -> Result<(), DatabaseError> {
        if tx.is_empty() {
            return Ok(());
        }

        let mut query = self.db.query("BEGIN TRANSACTION;");
        for (i, op) in tx.ops().iter().enumerate() {
            match op {
                GraphOp::CreateNode(node) => {
                    let content = serde_json::to_value(SurrealFsNode::from(node))
                        .map_err(|e| DatabaseError::serialization(e.to_string()))?;
                    query = query
                        .query(format!(
                            "CREATE type::thing('{NODE_TABLE}', $file_{i}) CONTENT $content_{i};"
                        ))
                        .bind((format!("file_{i}"), node.file_name.clone()))
                        .bind((format!("content_{i}"), content));
                }
                GraphOp::EnsureRoot(root) => {
                    let content = serde_json::to_value(SurrealFsNode::from(root))
                        .map_err(|e| DatabaseError::serialization(e.to_string()))?;
                    query = query
                        .query(format!(
                            "IF array::len(SELECT VALUE id FROM {NODE_TABLE} WHERE file_name = $file_{i}) = 0 {{
                                CREATE type::thing('{NODE_TABLE}', $file_{i}) CONTENT $content_{i};
                            }};"
                        ))
                        .bind((format!("file_{i}"), root.file_name.clone()))
                        .bind((format!("content_{i}"), content));
                }
                GraphOp::Relate { parent, child } => {
                    query = query
                        .query(format!(
                            "IF $parent_{i}.id = NONE OR $child_{i}.id = NONE {{
                                THROW '{GUARD_PREFIX} cannot relate missing nodes';
                            }};
                            IF array::len(SELECT VALUE id FROM connects_to WHERE out = $child_{i}) > 0 {{
                                THROW '{GUARD_PREFIX} node already has a parent';
                            }};
                            RELATE $parent_{i}->connects_to->$child_{i};"
                        ))
                        .bind((format!("parent_{i}"), node_thing(parent)))
                        .bind((format!("child_{i}"), node_thing(child)));
                }
                GraphOp::Detach { parent, child } => {
                    query = query
                        .query(format!(
                            "IF array::len(SELECT VALUE id FROM connects_to WHERE in = $parent_{i} AND out = $child_{i}) = 0 {{
                                THROW '{GUARD_PREFIX} edge to detach does not exist';
                            }};
                            DELETE connects_to WHERE in = $parent_{i} AND out = $child_{i};"
                        ))
                        .bind((format!("parent_{i}"), node_thing(parent)))
                        .bind((format!("child_{i}"), node_thing(child)));
                }
                GraphOp::EnsureAbsent { file_name } => {
                    query = query
                        .query(format!(
                            "IF array::len(SELECT VALUE id FROM {NODE_TABLE} WHERE file_name = $file_{i}) > 0 {{
                                THROW '{GUARD_PREFIX} file name already exists';
                            }};"
                        ))
                        .bind((format!("file_{i}"), file_name.clone()));
                }
                GraphOp::EnsureNoChildNamed { parent, name } => {
                    query = query
                        .query(format!(
                            "IF array::len(SELECT VALUE id FROM connects_to WHERE in = $parent_{i} AND out.name = $name_{i}) > 0 {{
                                THROW '{GUARD_PREFIX} sibling with the same name exists';
                            }};"
                        ))
                        .bind((format!("parent_{i}"), node_thing(parent)))
                        .bind((format!("name_{i}"), name.clone()));
                }
            }
        }

        let mut response = query
            .query("COMMIT TRANSACTION;")
            .await
            .map_err(classify)?;
        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(classify_all(errors.into_values()));
        }

        tracing::debug!("SurrealGraph committed {} operations", tx.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ROOT_MARKER;

    fn dir(name: &str, file_name: &str) -> FileNode {
        FileNode::directory(name, file_name, NodeType::Normal)
    }

    async fn seeded() -> anyhow::Result<SurrealGraph> {
        let graph = SurrealGraph::in_memory().await?;
        let mut tx = GraphTransaction::new();
        tx.ensure_root(FileNode::root(ROOT_MARKER))
            .create_node(dir("docs", "fd"))
            .relate(ROOT_MARKER, "fd");
        graph.commit(tx).await?;
        Ok(graph)
    }

    fn query_error(msg: &str) -> surrealdb::Error {
        surrealdb::Error::Api(surrealdb::error::Api::Query(msg.to_string()))
    }

    #[test]
    fn test_classify_picks_most_specific_error() {
        let cancelled = "The query was not executed due to a failed transaction";

        let guard = classify_all(vec![
            query_error(cancelled),
            query_error("An error occurred: constraint: file name already exists"),
        ]);
        assert!(guard.is_constraint_violation());

        let retry = classify_all(vec![
            query_error(cancelled),
            query_error("Failed to commit transaction due to a read or write conflict. This transaction can be retried"),
        ]);
        assert!(retry.is_write_conflict());

        assert!(matches!(
            classify_all(vec![query_error(cancelled)]),
            DatabaseError::TransactionAborted(_)
        ));
        assert!(matches!(
            classify_all(Vec::new()),
            DatabaseError::TransactionAborted(_)
        ));
    }

    #[tokio::test]
    async fn test_guard_rejects_whole_transaction() -> anyhow::Result<()> {
        let graph = seeded().await?;

        let mut tx = GraphTransaction::new();
        tx.create_node(dir("new", "fn"))
            .relate(ROOT_MARKER, "fn")
            .ensure_absent("fd");
        let err = graph.commit(tx).await.unwrap_err();
        assert!(err.is_constraint_violation(), "got {err}");

        assert!(graph
            .find_node(NodeAttribute::FileName, "fn")
            .await?
            .is_none());
        assert_eq!(graph.children(ROOT_MARKER).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_structural_guards_are_constraint_violations() -> anyhow::Result<()> {
        let graph = seeded().await?;

        let mut duplicate = GraphTransaction::new();
        duplicate.create_node(dir("again", "fd"));
        assert!(graph.commit(duplicate).await.unwrap_err().is_constraint_violation());

        let mut sibling = GraphTransaction::new();
        sibling.ensure_no_child_named(ROOT_MARKER, "docs");
        assert!(graph.commit(sibling).await.unwrap_err().is_constraint_violation());

        let mut second_parent = GraphTransaction::new();
        second_parent
            .create_node(dir("other", "fo"))
            .relate(ROOT_MARKER, "fo")
            .relate("fo", "fd");
        assert!(graph
            .commit(second_parent)
            .await
            .unwrap_err()
            .is_constraint_violation());

        let mut stale = GraphTransaction::new();
        stale.detach("fd", ROOT_MARKER);
        assert!(graph.commit(stale).await.unwrap_err().is_constraint_violation());

        let parent = graph.parent("fd").await?.unwrap();
        assert_eq!(parent.file_name, ROOT_MARKER);
        Ok(())
    }
}
