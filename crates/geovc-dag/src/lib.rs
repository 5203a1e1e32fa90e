//! Commit ancestry graph for geovc.
//!
//! Loads commits from an object store by following parent links and orders
//! a head's history oldest first, parents before children, which is the
//! order full-history index builds iterate in.

pub mod dag;
pub mod error;
pub mod node;

pub use dag::CommitGraph;
pub use error::{DagError, DagResult};
pub use node::CommitNode;
