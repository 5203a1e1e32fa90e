//! Index definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use geovc_crypto::ContentHasher;
use geovc_types::{Envelope, ObjectId};

/// Metadata key holding the quadtree's maximum bounds.
pub const BOUNDS_KEY: &str = "@bounds";
/// Metadata key listing extra attributes copied into index nodes.
pub const ATTRIBUTES_KEY: &str = "@attributes";
/// Metadata key overriding the configured trie depth.
pub const MAX_DEPTH_KEY: &str = "@maxDepth";

/// Kind of secondary index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Buckets by a hash of the attribute value.
    Attribute,
    /// Buckets by quadrant of the attribute's bounding box.
    QuadTree,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexType::Attribute => f.write_str("attribute"),
            IndexType::QuadTree => f.write_str("quadtree"),
        }
    }
}

/// One value of an index definition's metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Envelope(Envelope),
    StringList(Vec<String>),
}

impl From<Envelope> for MetadataValue {
    fn from(e: Envelope) -> Self {
        MetadataValue::Envelope(e)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(v: Vec<String>) -> Self {
        MetadataValue::StringList(v)
    }
}

/// Definition of one secondary index over one `(tree, attribute)` pair.
///
/// Identity depends only on the pair, so a repository holds at most one
/// index definition per attribute of a tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub tree_name: String,
    pub attribute_name: String,
    pub index_type: IndexType,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl IndexInfo {
    pub fn new(
        tree_name: impl Into<String>,
        attribute_name: impl Into<String>,
        index_type: IndexType,
    ) -> Self {
        Self {
            tree_name: tree_name.into(),
            attribute_name: attribute_name.into(),
            index_type,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity of the index on `attribute_name` of `tree_name`.
    pub fn id_for(tree_name: &str, attribute_name: &str) -> ObjectId {
        ContentHasher::INDEX_INFO
            .writer()
            .str(tree_name)
            .str(attribute_name)
            .finish()
    }

    pub fn id(&self) -> ObjectId {
        Self::id_for(&self.tree_name, &self.attribute_name)
    }

    /// Maximum bounds of a quadtree index.
    pub fn bounds(&self) -> Option<Envelope> {
        match self.metadata.get(BOUNDS_KEY) {
            Some(MetadataValue::Envelope(e)) => Some(*e),
            _ => None,
        }
    }

    /// Extra attributes materialized into index nodes, in definition order.
    pub fn materialized_attributes(&self) -> &[String] {
        match self.metadata.get(ATTRIBUTES_KEY) {
            Some(MetadataValue::StringList(names)) => names,
            _ => &[],
        }
    }

    /// Depth override from metadata, if a positive one is set.
    pub fn max_depth(&self) -> Option<usize> {
        match self.metadata.get(MAX_DEPTH_KEY) {
            Some(MetadataValue::Int(d)) if *d > 0 => usize::try_from(*d).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} index on {}.{}",
            self.index_type, self.tree_name, self.attribute_name
        )
    }
}
