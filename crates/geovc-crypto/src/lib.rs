//! Hashing primitives for geovc.
//!
//! Provides domain-separated BLAKE3 hashing. Every revision object kind has
//! its own domain tag so that two objects of different kinds can never share
//! an id even if their encoded bytes coincide.
//!
//! All hashing wraps BLAKE3; there is no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, HashWriter};
