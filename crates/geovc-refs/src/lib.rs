//! Named references for geovc.
//!
//! References are the human-readable entry points into commit history:
//!
//! - **Branches** are mutable pointers to the tip commit of a line of work.
//!   Writers advance them with [`RefStore::compare_and_swap`], which fails
//!   with [`RefError::StaleRef`] if another writer got there first.
//! - **Tags** are immutable pointers to a commit, optionally naming an
//!   annotated tag object. Once created, a compare-and-swap over one fails.
//!
//! # Modules
//!
//! - [`types`] -- [`Ref`] and the canonical name prefixes
//! - [`traits`] -- The [`RefStore`] trait
//! - [`names`] -- Branch/tag name validation
//! - [`memory`] / [`file`] -- In-memory and on-disk stores

pub mod error;
pub mod file;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use file::FileRefStore;
pub use memory::InMemoryRefStore;
pub use names::{validate_branch_name, validate_ref_name, validate_tag_name};
pub use traits::RefStore;
pub use types::{Ref, HEADS_PREFIX, TAGS_PREFIX};
