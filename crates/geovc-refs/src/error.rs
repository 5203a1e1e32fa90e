//! Error types for reference operations.

use geovc_types::ObjectId;
use thiserror::Error;

fn show(id: &Option<ObjectId>) -> String {
    id.map_or_else(|| "<none>".to_string(), |id| id.short_hex())
}

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The reference moved since the caller last read it.
    #[error(
        "stale ref {name}: expected {}, found {}",
        show(.expected),
        show(.actual)
    )]
    StaleRef {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    /// The branch or tag name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// A tag is immutable and cannot be updated.
    #[error("tag is immutable: {name}")]
    TagImmutable { name: String },

    /// A stored ref file could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal lock was poisoned by a panicking writer.
    #[error("ref store lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for RefError {
    fn from(e: serde_json::Error) -> Self {
        RefError::Serialization(e.to_string())
    }
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
