//! File Node Data Structures
//!
//! Every directory and file in a namespace is a `FileNode`. Nodes are joined by
//! directed `connects_to` edges (parent → child), so each namespace is a tree
//! hanging off a root node.
//!
//! # Identity
//!
//! - `name` is the display segment used for path walks. It is only unique among
//!   the children of one parent.
//! - `file_name` is the global join key. Directories get a generated 50-char hex
//!   identifier; file leafs carry the blob name chosen by the uploader.
//!
//! # Examples
//!
//! ```rust
//! use graphdisk_core::models::{FileNode, NodeType};
//!
//! let dir = FileNode::directory("docs", "ab".repeat(25), NodeType::Normal);
//! assert!(dir.is_dir);
//! assert_eq!(dir.size, 0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Name and file name of the live namespace root.
pub const ROOT_MARKER: &str = "remoteDisk";

/// Name and file name of the trash namespace root.
pub const TRASH_MARKER: &str = "trashDisk";

/// Content type carried by every directory node.
pub const DIRECTORY_TYPE: &str = "directory";

/// Length of generated node identifiers.
pub const FILE_NAME_LEN: usize = 50;

/// Role of a node inside its namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Namespace root (`remoteDisk` or `trashDisk`)
    Root,
    /// Tenant mount directly under a root
    User,
    /// Everything else
    Normal,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::User => "user",
            NodeType::Normal => "normal",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory or file in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub is_dir: bool,
    pub name: String,
    pub update_time: DateTime<Utc>,
    /// `"directory"` for directories, a MIME type for files
    #[serde(rename = "type")]
    pub content_type: String,
    /// Bytes; always 0 for directories
    pub size: u64,
    /// Content digest; empty for directories
    pub file_hash: String,
    /// Globally unique node identifier
    pub file_name: String,
    pub node_type: NodeType,
}

impl FileNode {
    /// Root node for one of the two namespaces.
    pub fn root(marker: &str) -> Self {
        Self {
            is_dir: true,
            name: marker.to_string(),
            update_time: Utc::now(),
            content_type: DIRECTORY_TYPE.to_string(),
            size: 0,
            file_hash: String::new(),
            file_name: marker.to_string(),
            node_type: NodeType::Root,
        }
    }

    pub fn directory(
        name: impl Into<String>,
        file_name: impl Into<String>,
        node_type: NodeType,
    ) -> Self {
        Self {
            is_dir: true,
            name: name.into(),
            update_time: Utc::now(),
            content_type: DIRECTORY_TYPE.to_string(),
            size: 0,
            file_hash: String::new(),
            file_name: file_name.into(),
            node_type,
        }
    }

    /// Terminal node of an insertion, shaped by the caller's descriptor.
    pub fn leaf(
        name: impl Into<String>,
        descriptor: &LeafDescriptor,
        file_name: impl Into<String>,
        node_type: NodeType,
    ) -> Self {
        Self {
            is_dir: descriptor.is_dir,
            name: name.into(),
            update_time: Utc::now(),
            content_type: descriptor.content_type.clone(),
            size: if descriptor.is_dir { 0 } else { descriptor.size },
            file_hash: descriptor.file_hash.clone(),
            file_name: file_name.into(),
            node_type,
        }
    }

    pub fn is_namespace_root(&self) -> bool {
        self.node_type == NodeType::Root
    }

    pub fn is_tenant(&self) -> bool {
        self.node_type == NodeType::User
    }
}

/// What the caller wants at the end of an insertion path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafDescriptor {
    pub is_dir: bool,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub file_hash: String,
    /// Required for file leafs: the blob name, which becomes the node's `file_name`
    pub file_name: Option<String>,
}

impl LeafDescriptor {
    pub fn directory() -> Self {
        Self {
            is_dir: true,
            content_type: DIRECTORY_TYPE.to_string(),
            ..Default::default()
        }
    }

    pub fn file(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        file_hash: impl Into<String>,
    ) -> Self {
        Self {
            is_dir: false,
            content_type: content_type.into(),
            size,
            file_hash: file_hash.into(),
            file_name: Some(file_name.into()),
        }
    }
}

/// Input of `NamespaceService::insert_path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRequest {
    /// Tenant-qualified mount path; its first segment is the tenant
    pub target_path: String,
    /// Logical storage path below the mount
    pub relative_path: String,
    pub leaf: LeafDescriptor,
    /// Restores must not land on an existing leaf
    #[serde(default)]
    pub is_restore: bool,
}

impl InsertRequest {
    pub fn new(
        target_path: impl Into<String>,
        relative_path: impl Into<String>,
        leaf: LeafDescriptor,
    ) -> Self {
        Self {
            target_path: target_path.into(),
            relative_path: relative_path.into(),
            leaf,
            is_restore: false,
        }
    }

    pub fn restore(mut self) -> Self {
        self.is_restore = true;
        self
    }
}

/// Node properties usable for exact-match lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAttribute {
    FileName,
    Name,
    NodeType,
    FileHash,
}

impl NodeAttribute {
    /// Storage field name; never derived from user input.
    pub fn field(&self) -> &'static str {
        match self {
            NodeAttribute::FileName => "file_name",
            NodeAttribute::Name => "name",
            NodeAttribute::NodeType => "node_type",
            NodeAttribute::FileHash => "file_hash",
        }
    }

    pub fn value_of<'a>(&self, node: &'a FileNode) -> &'a str {
        match self {
            NodeAttribute::FileName => &node.file_name,
            NodeAttribute::Name => &node.name,
            NodeAttribute::NodeType => node.node_type.as_str(),
            NodeAttribute::FileHash => &node.file_hash,
        }
    }
}

/// Flat result of a subtree query: deduplicated nodes plus every
/// start-to-leaf chain of `file_name`s
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreePaths {
    pub nodes: Vec<FileNode>,
    pub paths: Vec<Vec<String>>,
}

/// Result of `insert_path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New nodes were attached; `created` lists their file names top-down
    Created { leaf: FileNode, created: Vec<String> },
    /// The whole path already existed, nothing was written
    AlreadyExists(FileNode),
}

impl InsertOutcome {
    pub fn leaf(&self) -> &FileNode {
        match self {
            InsertOutcome::Created { leaf, .. } => leaf,
            InsertOutcome::AlreadyExists(leaf) => leaf,
        }
    }
}

/// Hex SHA-256 of `input`, truncated to `len` characters (at most 64).
pub fn truncated_sha256(input: &str, len: usize) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..len.min(digest.len())].to_string()
}

/// Fresh node identifier for `seed`.
///
/// Salted with the current time and a random UUID so two segments with the same
/// name created in the same instant still get distinct identifiers.
pub fn generate_file_name(seed: &str) -> String {
    let salt = format!(
        "{}{}{}",
        seed,
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        uuid::Uuid::new_v4()
    );
    truncated_sha256(&salt, FILE_NAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_file_names_are_unique_hex() {
        let a = generate_file_name("docs");
        let b = generate_file_name("docs");
        assert_eq!(a.len(), FILE_NAME_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_leaf_directory_ignores_size() {
        let mut descriptor = LeafDescriptor::directory();
        descriptor.size = 42;
        let node = FileNode::leaf("photos", &descriptor, "x", NodeType::Normal);
        assert!(node.is_dir);
        assert_eq!(node.size, 0);
    }

    #[test]
    fn test_file_node_wire_format() {
        let node = FileNode::root(ROOT_MARKER);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["isDir"], json!(true));
        assert_eq!(value["type"], json!("directory"));
        assert_eq!(value["fileName"], json!("remoteDisk"));
        assert_eq!(value["nodeType"], json!("root"));
    }
}
