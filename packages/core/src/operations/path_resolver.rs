//! Path normalisation and prefix walks
//!
//! A walk follows `connects_to` edges from a start node, matching each segment
//! against child display names. It stops at the first segment with no matching
//! child: the "fault index". Everything before it is the longest existing prefix.

use super::error::PathError;
use crate::db::{DatabaseError, GraphStore};
use crate::models::{FileNode, ROOT_MARKER, TRASH_MARKER};

/// Split a path on `/` or `\`, dropping empty and `.` segments.
pub fn normalize_path(path: &str) -> Result<Vec<String>, PathError> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment.trim() {
            "" | "." => continue,
            ".." => {
                return Err(PathError::ParentTraversal {
                    path: path.to_string(),
                })
            }
            s => segments.push(s.to_string()),
        }
    }
    Ok(segments)
}

/// Reject the namespace root markers anywhere in `segments`.
pub fn reject_reserved(segments: &[String]) -> Result<(), PathError> {
    match segments
        .iter()
        .find(|s| s.as_str() == ROOT_MARKER || s.as_str() == TRASH_MARKER)
    {
        Some(s) => Err(PathError::reserved(s.clone())),
        None => Ok(()),
    }
}

/// Result of walking a segment list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathWalk {
    /// Nodes matched in order, one per segment up to the fault
    pub matched: Vec<FileNode>,
    /// First unmatched segment index; `None` when every segment matched
    pub fault_index: Option<usize>,
}

impl PathWalk {
    pub fn is_complete(&self) -> bool {
        self.fault_index.is_none()
    }

    /// Terminal node of a complete walk
    pub fn terminal(&self) -> Option<&FileNode> {
        if self.is_complete() {
            self.matched.last()
        } else {
            None
        }
    }

    /// Every matched node before `last_index` must be a directory.
    pub fn check_directories(&self, last_index: usize) -> Result<(), PathError> {
        match self
            .matched
            .iter()
            .take(last_index)
            .find(|node| !node.is_dir)
        {
            Some(node) => Err(PathError::not_a_directory(node.name.clone())),
            None => Ok(()),
        }
    }
}

/// Walk `segments` downward from the node `start`.
pub async fn walk(
    graph: &dyn GraphStore,
    start: &str,
    segments: &[String],
) -> Result<PathWalk, DatabaseError> {
    let mut result = PathWalk::default();
    let mut current = start.to_string();

    for (index, segment) in segments.iter().enumerate() {
        match graph.child_by_name(&current, segment).await? {
            Some(node) => {
                current = node.file_name.clone();
                result.matched.push(node);
            }
            None => {
                result.fault_index = Some(index);
                break;
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mixed_separators() {
        let segments = normalize_path("\\t1/docs\\./reports//q1.pdf").unwrap();
        assert_eq!(segments, vec!["t1", "docs", "reports", "q1.pdf"]);
    }

    #[test]
    fn test_normalize_rejects_parent_traversal() {
        assert!(normalize_path("t1/docs/../../t2").is_err());
    }

    #[test]
    fn test_normalize_empty_path() {
        assert!(normalize_path("//./").unwrap().is_empty());
    }

    #[test]
    fn test_reserved_names() {
        let segments = vec!["t1".to_string(), "trashDisk".to_string()];
        assert_eq!(
            reject_reserved(&segments),
            Err(PathError::reserved("trashDisk"))
        );
        assert!(reject_reserved(&["t1".to_string()]).is_ok());
    }
}
