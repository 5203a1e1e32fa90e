use thiserror::Error;

/// Errors surfaced by repository sessions and transactions.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Some staged objects could not be copied into the shared store.
    #[error("publish incomplete: {failed} of {staged} objects failed")]
    Incomplete { failed: usize, staged: usize },

    #[error("store error: {0}")]
    Store(#[from] geovc_store::StoreError),

    #[error("tree error: {0}")]
    Tree(#[from] geovc_tree::TreeError),

    #[error("ref error: {0}")]
    Ref(#[from] geovc_refs::RefError),

    #[error("history error: {0}")]
    Dag(#[from] geovc_dag::DagError),

    #[error("index error: {0}")]
    Index(#[from] geovc_index::IndexError),
}

pub type RepoResult<T> = Result<T, RepoError>;
