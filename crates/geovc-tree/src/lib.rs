//! Canonical revision trees for geovc.
//!
//! A tree is a content-addressed trie of [`RevTree`](geovc_store::RevTree)
//! nodes. Its shape is a pure function of its entry set, so two trees with
//! the same entries always have the same id regardless of edit history.
//!
//! # Key Types
//!
//! - [`TrieEngine`] / [`Partitioner`] -- Generic build/edit engine, reused by secondary indexes
//! - [`TreeOps`] / [`TreeBuilder`] -- Name-partitioned canonical trees and batched edits
//! - [`DiffIter`] / [`DiffEntry`] -- Lazy lock-step diff that skips shared subtrees
//! - [`WalkIter`] -- Lazy depth-first walk over every entry

pub mod canonical;
pub mod diff;
pub mod engine;
pub mod error;
pub mod partition;
pub mod walk;

pub use canonical::{diff, insert, lookup, remove, TreeBuilder, TreeOps};
pub use diff::{DiffEntry, DiffIter};
pub use engine::{load_tree, TrieEngine};
pub use error::{TreeError, TreeResult};
pub use partition::{
    Edit, NamePartitioner, Partitioner, TreeConfig, BUCKETS_PER_LEVEL, MAX_BUCKETS_PER_LEVEL,
    MAX_DEPTH, MAX_LEAF_ENTRIES,
};
pub use walk::WalkIter;
