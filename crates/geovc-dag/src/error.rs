//! Error types for the commit graph.

use geovc_types::ObjectId;

/// Errors that can occur during graph operations.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A referenced commit is neither in the graph nor in the store.
    #[error("commit not found: {0}")]
    CommitNotFound(ObjectId),

    /// Reading a commit from the object store failed.
    #[error("store error: {0}")]
    Store(#[from] geovc_store::StoreError),
}

/// Convenience alias for graph results.
pub type DagResult<T> = Result<T, DagError>;
