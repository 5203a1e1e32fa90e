//! Repository sessions for geovc.
//!
//! A [`Repository`] bundles the stores one session works against and the
//! configuration it runs with. Writers open a [`Transaction`] on a branch,
//! stage feature edits and commits privately, and publish them with a
//! compare-and-swap on the branch head. Secondary indexes are created and
//! kept current through the same session.

pub mod config;
pub mod error;
pub mod repository;
pub mod transaction;

pub use config::{RepoConfig, UserConfig};
pub use error::{RepoError, RepoResult};
pub use repository::Repository;
pub use transaction::{PublishReport, Transaction};

// Re-export the types callers need to drive a session.
pub use geovc_index::{CreateIndexRequest, Index, IndexInfo, IndexType};
pub use geovc_store::{AttributeDescriptor, RevFeature, RevFeatureType};
pub use geovc_types::{AttributeType, Envelope, FieldValue, ObjectId};
