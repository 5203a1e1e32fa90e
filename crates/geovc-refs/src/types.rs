//! Core reference types.
//!
//! A ref is a named pointer to a commit. Branches move as commits are
//! published; tags never move once created.

use geovc_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Prefix of every branch ref.
pub const HEADS_PREFIX: &str = "refs/heads/";
/// Prefix of every tag ref.
pub const TAGS_PREFIX: &str = "refs/tags/";

/// A named reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ref {
    /// A mutable pointer to the tip commit of a line of history.
    Branch {
        /// Short branch name (e.g. "main", "import/roads").
        name: String,
        /// The commit at the tip of this branch.
        commit_id: ObjectId,
    },

    /// An immutable pointer to a commit.
    Tag {
        /// Tag name (e.g. "v1.0.0").
        name: String,
        /// The tagged commit.
        commit_id: ObjectId,
        /// Id of the annotated tag object, if one was written.
        tag_id: Option<ObjectId>,
    },
}

impl Ref {
    pub fn branch(name: impl Into<String>, commit_id: ObjectId) -> Self {
        Ref::Branch {
            name: name.into(),
            commit_id,
        }
    }

    pub fn tag(name: impl Into<String>, commit_id: ObjectId, tag_id: Option<ObjectId>) -> Self {
        Ref::Tag {
            name: name.into(),
            commit_id,
            tag_id,
        }
    }

    /// Returns the canonical name for this ref (e.g. "refs/heads/main").
    pub fn canonical_name(&self) -> String {
        match self {
            Ref::Branch { name, .. } => format!("{HEADS_PREFIX}{name}"),
            Ref::Tag { name, .. } => format!("{TAGS_PREFIX}{name}"),
        }
    }

    /// Returns the short name of this ref (without the refs/ prefix).
    pub fn short_name(&self) -> &str {
        match self {
            Ref::Branch { name, .. } | Ref::Tag { name, .. } => name,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Ref::Branch { .. })
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Ref::Tag { .. })
    }

    /// The commit this ref points to.
    pub fn commit_id(&self) -> ObjectId {
        match self {
            Ref::Branch { commit_id, .. } | Ref::Tag { commit_id, .. } => *commit_id,
        }
    }
}
