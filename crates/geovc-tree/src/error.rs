//! Error types for the tree crate.

/// Errors that can occur during tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] geovc_store::StoreError),

    /// A path component names a feature where a tree was expected.
    #[error("not a tree: {path}")]
    NotATree { path: String },

    /// The path is empty or has empty components.
    #[error("invalid tree path: {0:?}")]
    InvalidPath(String),
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
