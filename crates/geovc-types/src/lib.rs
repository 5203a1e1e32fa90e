//! Foundation types for geovc.
//!
//! This crate provides the identity and value primitives shared by every
//! other geovc crate: content-addressed object ids, bounding envelopes,
//! signatures on revisions, and feature attribute values.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`Envelope`] -- Axis-aligned bounding rectangle used for spatial pruning
//! - [`Person`] -- Author/committer identity with a timestamp
//! - [`FieldValue`] -- One attribute value of a feature, possibly a geometry
//! - [`AttributeType`] -- Binding type of a feature attribute

pub mod envelope;
pub mod error;
pub mod object;
pub mod person;
pub mod value;

pub use envelope::Envelope;
pub use error::TypeError;
pub use object::ObjectId;
pub use person::Person;
pub use value::{AttributeType, FieldValue};
