//! # Collection Hierarchy
//!
//! A hierarchy engine that organizes records into a tree of named
//! collections, stored as a flat table of parent and alias links.
//!
//! ## Features
//!
//! - **Root Resolution**: find the root of the tree any collection lives in
//! - **Path to Root**: lazy, restartable ancestor walk for breadcrumbs
//! - **Drilldown Trees**: nested subtree views with alias substitution
//! - **Cycle Guards**: structural and reference cycles fail explicitly
//! - **Validated Edits**: self-parenting, structural cycles, dangling links and
//!   deletions that would orphan dependents are rejected at write time
//!
//! ## Architecture
//!
//! ```text
//! Caller → hierarchy (root_of, path_to_root, drilldown_tree, get_tree)
//!                    ↓
//!          CollectionStore → SQLite
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use collection_hierarchy::{Config, Collection, CollectionStore, SqliteStorage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!
//!     let root = Collection::new("Articles");
//!     storage.create_collection(&root).await?;
//!     let child = Collection::new("Preprints").with_parent(&root.id);
//!     storage.create_collection(&child).await?;
//!
//!     let tree = child.get_tree(&storage).await?;
//!     assert_eq!(tree.node.id, root.id);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Tree traversals: root resolution, path to root, drilldown trees.
pub mod hierarchy;
/// Tracing subscriber setup.
pub mod logging;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, HierarchyError, HierarchyResult, StorageError};
pub use hierarchy::{drilldown_tree, get_tree, path_to_root, root_of, PathToRoot, TreeNode};
pub use storage::{Collection, CollectionStore, FacetDescriptor, SqliteStorage};
