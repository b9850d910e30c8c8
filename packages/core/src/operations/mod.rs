//! Namespace Operations
//!
//! Pure building blocks of the namespace engine, kept free of service state:
//!
//! - `path_resolver` - Path normalisation and prefix walks over the graph
//! - `insert_plan` - Ordered node/edge batches for inserts
//! - `tree_builder` - Tree reconstruction from flat subtree paths

pub mod error;
pub mod insert_plan;
pub mod path_resolver;
pub mod tree_builder;

pub use error::PathError;
pub use insert_plan::{plan_insert, InsertPlan};
pub use path_resolver::{normalize_path, reject_reserved, walk, PathWalk};
pub use tree_builder::{build_tree, FileTreeNode};
