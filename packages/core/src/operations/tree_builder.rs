//! Tree reconstruction from flat subtree paths
//!
//! `subtree_paths` answers with every start-to-leaf chain of file names plus the
//! node records. Walking the chains left to right, each node not seen yet is
//! hung under its predecessor in the chain. The first placement wins.

use crate::models::{FileNode, SubtreePaths};
use serde::Serialize;
use std::collections::HashMap;

/// A node and its reconstructed children
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTreeNode {
    pub node: FileNode,
    pub children: Vec<FileTreeNode>,
}

impl FileTreeNode {
    pub fn leaf(node: FileNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this tree
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(FileTreeNode::node_count)
            .sum::<usize>()
    }

    pub fn find(&self, file_name: &str) -> Option<&FileTreeNode> {
        if self.node.file_name == file_name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(file_name))
    }
}

struct Slot {
    node: FileNode,
    children: Vec<usize>,
}

/// Rebuild the tree rooted at the queried node; `None` for empty input.
pub fn build_tree(result: &SubtreePaths) -> Option<FileTreeNode> {
    let records: HashMap<&str, &FileNode> = result
        .nodes
        .iter()
        .map(|n| (n.file_name.as_str(), n))
        .collect();

    let root_name = match result.paths.first().and_then(|chain| chain.first()) {
        Some(first) => first.as_str(),
        None => return result.nodes.first().cloned().map(FileTreeNode::leaf),
    };
    let root = *records.get(root_name)?;

    let mut arena = vec![Slot {
        node: root.clone(),
        children: Vec::new(),
    }];
    let mut seen: HashMap<&str, usize> = HashMap::from([(root_name, 0)]);

    for chain in &result.paths {
        for pair in chain.windows(2) {
            let (parent, child) = (pair[0].as_str(), pair[1].as_str());
            if seen.contains_key(child) {
                continue;
            }
            let (Some(&parent_slot), Some(record)) = (seen.get(parent), records.get(child))
            else {
                // Predecessor never placed; the rest of this chain is unreachable
                break;
            };
            arena.push(Slot {
                node: (*record).clone(),
                children: Vec::new(),
            });
            let slot = arena.len() - 1;
            arena[parent_slot].children.push(slot);
            seen.insert(child, slot);
        }
    }

    Some(assemble(&arena, 0))
}

fn assemble(arena: &[Slot], index: usize) -> FileTreeNode {
    FileTreeNode {
        node: arena[index].node.clone(),
        children: arena[index]
            .children
            .iter()
            .map(|&c| assemble(arena, c))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    fn node(name: &str) -> FileNode {
        FileNode::directory(name, name, NodeType::Normal)
    }

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_shared_prefixes_merge() {
        let result = SubtreePaths {
            nodes: ["a", "b", "c", "d"].iter().map(|n| node(n)).collect(),
            paths: vec![chain(&["a", "b", "c"]), chain(&["a", "b", "d"]), chain(&["a", "b"])],
        };
        let tree = build_tree(&result).unwrap();
        assert_eq!(tree.node.file_name, "a");
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.children.len(), 1);
        let b = &tree.children[0];
        let names: Vec<&str> = b.children.iter().map(|c| c.node.name.as_str()).collect();
        assert_eq!(names, vec!["c", "d"]);
    }

    #[test]
    fn test_first_placement_wins() {
        let result = SubtreePaths {
            nodes: ["a", "b", "c"].iter().map(|n| node(n)).collect(),
            paths: vec![chain(&["a", "b"]), chain(&["a", "c", "b"])],
        };
        let tree = build_tree(&result).unwrap();
        assert_eq!(tree.node_count(), 3);
        assert!(tree.find("c").unwrap().children.is_empty());
    }

    #[test]
    fn test_single_node_and_empty_input() {
        let single = SubtreePaths {
            nodes: vec![node("solo")],
            paths: vec![],
        };
        assert_eq!(build_tree(&single).unwrap().node_count(), 1);
        assert!(build_tree(&SubtreePaths::default()).is_none());
    }
}
