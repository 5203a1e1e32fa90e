//! Secondary indexes over canonical feature trees.
//!
//! An index is defined once per `(tree, attribute)` pair by an
//! [`IndexInfo`] and materialized, for each canonical tree it is asked to
//! cover, as a parallel index tree built with the same trie engine but a
//! different partitioner. The [`IndexDatabase`] records which index tree
//! belongs to which canonical tree, so each snapshot is indexed once and
//! later snapshots are indexed incrementally from their parent's diff.
//!
//! # Key Types
//!
//! - [`IndexEngine`] -- Create, build, update and drop indexes
//! - [`Index`] -- Handle to one built index tree, with bounding-box queries
//! - [`QuadTreePartitioner`] -- Routes entries by quadrant of their extent
//! - [`AttributePartitioner`] -- Routes entries by hash of an attribute value
//! - [`CrsBoundsProvider`] -- Source of the bounds of a coordinate system

pub mod attribute;
pub mod bounds;
pub mod build;
pub mod create;
pub mod database;
pub mod error;
pub mod index;
pub mod info;
pub mod quadtree;

#[cfg(test)]
mod fixtures;

pub use attribute::{value_key, AttributePartitioner, DEFAULT_ATTRIBUTE_MAX_DEPTH};
pub use bounds::{resolve_bounds, CrsBoundsProvider, StaticBoundsProvider, EPSG_3857, EPSG_4326};
pub use build::{HistoryReport, IndexConfig, IndexEngine};
pub use create::CreateIndexRequest;
pub use database::{FileIndexDatabase, InMemoryIndexDatabase, IndexDatabase, INDEX_DATABASE_FILE};
pub use error::{IndexError, IndexResult};
pub use index::Index;
pub use info::{IndexInfo, IndexType, MetadataValue, ATTRIBUTES_KEY, BOUNDS_KEY, MAX_DEPTH_KEY};
pub use quadtree::{cell_of, quad_path, QuadTreePartitioner, DEFAULT_QUAD_MAX_DEPTH, MAX_QUAD_DEPTH};
