use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Collection not found: {collection_id}")]
    CollectionNotFound { collection_id: String },

    #[error("Invalid edit of collection {collection_id}: {reason}")]
    InvalidEdit {
        collection_id: String,
        reason: String,
    },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Traversal errors raised by the hierarchy engine.
///
/// Both variants carry the offending collection id and the ids that were on
/// the active traversal path when it failed: the walk so far for upward
/// walks, the stack from the start down for drilldown builds.
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error(
        "Collection not found: {collection_id}{}{}",
        referenced_by_suffix(.referenced_by),
        path_suffix(.path)
    )]
    NotFound {
        collection_id: String,
        referenced_by: Option<String>,
        path: Vec<String>,
    },

    #[error("Cycle detected at collection {collection_id} (path: {})", .path.join(" -> "))]
    CycleDetected {
        collection_id: String,
        path: Vec<String>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

fn referenced_by_suffix(referenced_by: &Option<String>) -> String {
    match referenced_by {
        Some(id) => format!(" (referenced by {})", id),
        None => String::new(),
    }
}

fn path_suffix(path: &[String]) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" (path: {})", path.join(" -> "))
    }
}

impl HierarchyError {
    /// Id of the collection the traversal failed on, if the failure was
    /// structural rather than a storage fault.
    pub fn collection_id(&self) -> Option<&str> {
        match self {
            HierarchyError::NotFound { collection_id, .. }
            | HierarchyError::CycleDetected { collection_id, .. } => Some(collection_id),
            HierarchyError::Storage(_) => None,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for hierarchy traversals
pub type HierarchyResult<T> = Result<T, HierarchyError>;
