//! Insert planning
//!
//! Turns a partial walk into an explicit batch: ensure the live root, then for
//! every segment from the fault index on, create one node and one edge from the
//! previous node. Guards re-check at commit time that nobody created the first
//! missing segment or took the leaf's file name in the meantime.

use super::error::PathError;
use super::path_resolver::PathWalk;
use crate::db::GraphTransaction;
use crate::models::{generate_file_name, FileNode, LeafDescriptor, NodeType, ROOT_MARKER};

/// Ordered creations for one `insert_path` call
#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub transaction: GraphTransaction,
    pub leaf: FileNode,
    /// File names of the new nodes, top-down
    pub created: Vec<String>,
}

/// Build the batch that attaches `segments[fault..]` below the matched prefix.
///
/// `walk` must come from walking `segments` from the live root and must not be
/// complete.
pub fn plan_insert(
    segments: &[String],
    walk: &PathWalk,
    descriptor: &LeafDescriptor,
) -> Result<InsertPlan, PathError> {
    if segments.is_empty() {
        return Err(PathError::empty("insert path"));
    }
    let fault = walk
        .fault_index
        .ok_or_else(|| PathError::empty("nothing left to create"))?;
    let last = segments.len() - 1;

    if last == 0 && !descriptor.is_dir {
        return Err(PathError::TenantMustBeDirectory {
            tenant: segments[0].clone(),
        });
    }

    let mut transaction = GraphTransaction::new();
    transaction.ensure_root(FileNode::root(ROOT_MARKER));

    let mut parent = match fault {
        0 => ROOT_MARKER.to_string(),
        f => walk.matched[f - 1].file_name.clone(),
    };
    transaction.ensure_no_child_named(parent.clone(), segments[fault].clone());

    let mut created = Vec::with_capacity(segments.len() - fault);
    let mut leaf = None;

    for (index, name) in segments.iter().enumerate().skip(fault) {
        let node_type = if index == 0 {
            NodeType::User
        } else {
            NodeType::Normal
        };

        let node = if index == last {
            let file_name = if descriptor.is_dir {
                generate_file_name(name)
            } else {
                let file_name = descriptor
                    .file_name
                    .clone()
                    .filter(|f| !f.trim().is_empty())
                    .ok_or_else(|| PathError::MissingFileName { name: name.clone() })?;
                transaction.ensure_absent(file_name.clone());
                file_name
            };
            FileNode::leaf(name.clone(), descriptor, file_name, node_type)
        } else {
            FileNode::directory(name.clone(), generate_file_name(name), node_type)
        };

        let file_name = node.file_name.clone();
        transaction
            .create_node(node.clone())
            .relate(parent.clone(), file_name.clone());
        created.push(file_name.clone());
        parent = file_name;

        if index == last {
            leaf = Some(node);
        }
    }

    let leaf = leaf.ok_or_else(|| PathError::empty("no leaf planned"))?;
    Ok(InsertPlan {
        transaction,
        leaf,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GraphOp;

    fn segments(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_from_empty_graph() {
        let segs = segments(&["t1", "docs", "report.pdf"]);
        let walk = PathWalk {
            matched: vec![],
            fault_index: Some(0),
        };
        let leaf = LeafDescriptor::file("blob.pdf", "application/pdf", 10, "h");
        let plan = plan_insert(&segs, &walk, &leaf).unwrap();

        assert_eq!(plan.created.len(), 3);
        assert_eq!(plan.leaf.file_name, "blob.pdf");
        assert_eq!(plan.leaf.size, 10);

        let creates: Vec<&FileNode> = plan
            .transaction
            .ops()
            .iter()
            .filter_map(|op| match op {
                GraphOp::CreateNode(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(creates[0].node_type, NodeType::User);
        assert!(creates[1].is_dir);
        assert_eq!(creates[1].node_type, NodeType::Normal);
        assert!(plan
            .transaction
            .ops()
            .contains(&GraphOp::EnsureAbsent {
                file_name: "blob.pdf".to_string()
            }));
    }

    #[test]
    fn test_plan_file_leaf_without_name() {
        let segs = segments(&["t1", "a.txt"]);
        let walk = PathWalk {
            matched: vec![],
            fault_index: Some(0),
        };
        let mut leaf = LeafDescriptor::file("", "text/plain", 1, "h");
        leaf.file_name = None;
        assert!(matches!(
            plan_insert(&segs, &walk, &leaf),
            Err(PathError::MissingFileName { .. })
        ));
    }

    #[test]
    fn test_plan_tenant_cannot_be_file() {
        let segs = segments(&["t1"]);
        let walk = PathWalk {
            matched: vec![],
            fault_index: Some(0),
        };
        let leaf = LeafDescriptor::file("x", "text/plain", 1, "h");
        assert!(plan_insert(&segs, &walk, &leaf).is_err());
    }
}
