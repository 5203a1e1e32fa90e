//! Error types for the index crate.

use geovc_types::ObjectId;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A required input is missing or malformed. Raised before any store access.
    #[error("invalid index request: {0}")]
    Validation(String),

    /// A referenced object or index definition does not exist.
    #[error("not found: {0}")]
    NotFound(ObjectId),

    /// An invariant the operation depends on does not hold.
    #[error("index state error: {0}")]
    State(String),

    /// The bounds of a coordinate reference system could not be resolved.
    #[error("cannot resolve bounds of {crs:?} for {tree}.{attribute}: {reason}")]
    ReferenceResolution {
        tree: String,
        attribute: String,
        crs: String,
        reason: String,
    },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] geovc_store::StoreError),

    /// Tree operation failed.
    #[error("tree error: {0}")]
    Tree(#[from] geovc_tree::TreeError),

    /// Commit graph could not be loaded.
    #[error("history error: {0}")]
    Dag(#[from] geovc_dag::DagError),

    /// Ref resolution failed.
    #[error("ref error: {0}")]
    Ref(#[from] geovc_refs::RefError),

    /// Checkpoint encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Reading or writing the index database file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal lock was poisoned by a panicking writer.
    #[error("index database lock poisoned")]
    LockPoisoned,
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
