//! Data Models
//!
//! This module contains the data structures shared by every layer:
//!
//! - `FileNode` - A directory or file in the namespace graph
//! - `LeafDescriptor` / `InsertRequest` - Inputs of path insertion
//! - `ChunkToken` / `MergeMessage` - Chunk bookkeeping and merge work items
//! - `Caller` - Identity of whoever invokes an operation

mod chunk;
pub mod content_type;
mod file_node;
mod identity;

pub use chunk::{group_key, order_chunk_tokens, ChunkToken, MergeMessage, OrderedChunks};
pub use file_node::{
    generate_file_name, truncated_sha256, FileNode, InsertOutcome, InsertRequest,
    LeafDescriptor, NodeAttribute, NodeType, SubtreePaths, DIRECTORY_TYPE, FILE_NAME_LEN,
    ROOT_MARKER, TRASH_MARKER,
};
pub use identity::{Caller, ADMIN_IDENTITY};
