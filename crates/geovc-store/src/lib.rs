//! Content-addressed object storage for geovc.
//!
//! This crate defines the revision object model (commits, trees, features,
//! feature types and tags), its canonical byte encoding, and the stores that
//! hold encoded objects keyed by their BLAKE3 hash (domain-separated by
//! object kind).
//!
//! # Object Types
//!
//! - [`RevCommit`] -- snapshot of a repository: root tree plus ancestry
//! - [`RevTree`] -- hash-trie node with named [`Node`] entries and [`Bucket`]s
//! - [`RevFeature`] -- attribute values of a single feature
//! - [`RevFeatureType`] -- schema of a feature collection
//! - [`RevTag`] -- annotated pointer to a commit
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileObjectStore`] -- zstd-compressed loose objects on disk
//! - [`ForwardingObjectStore`] -- delegates to a lazily resolved backend
//! - [`StagedObjectStore`] -- private staging layer over a shared pool
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Write-then-link: write objects first, then move references.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. `put` is idempotent; writing the same content twice is a no-op.
//! 5. Bulk operations report per-item outcomes and never abort on one bad item.
//! 6. All I/O errors are propagated, never silently ignored.

pub mod bulk;
pub mod codec;
pub mod error;
pub mod file;
pub mod forwarding;
pub mod memory;
pub mod object;
pub mod staged;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use bulk::{BulkOpListener, BulkOutcome, CountingListener, NoopListener};
pub use codec::{encode_value, FORMAT_VERSION};
pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use forwarding::{ForwardingObjectStore, StoreSupplier};
pub use memory::InMemoryObjectStore;
pub use object::{
    AttributeDescriptor, Bucket, Node, NodeKind, ObjectKind, RevCommit, RevFeature,
    RevFeatureType, RevObject, RevTag, RevTree, StoredObject,
};
pub use staged::StagedObjectStore;
pub use traits::ObjectStore;
