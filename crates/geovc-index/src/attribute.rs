//! Hash partitioning of index entries by attribute value.

use geovc_store::{encode_value, Node};
use geovc_tree::Partitioner;
use geovc_types::FieldValue;

/// Default deepest attribute index level.
pub const DEFAULT_ATTRIBUTE_MAX_DEPTH: usize = 8;

/// Routing key of an attribute value: the hash of its canonical encoding.
pub fn value_key(value: &FieldValue) -> [u8; 32] {
    *blake3::hash(&encode_value(value)).as_bytes()
}

/// Routes index nodes by the value of one materialized attribute.
///
/// Equal values always share a trie path, so a lookup by value reads one
/// node per level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributePartitioner {
    attribute: String,
    max_depth: usize,
    max_leaf_entries: usize,
    buckets_per_level: u32,
}

impl AttributePartitioner {
    pub fn new(
        attribute: impl Into<String>,
        max_depth: usize,
        max_leaf_entries: usize,
        buckets_per_level: u32,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            max_depth: max_depth.min(32),
            max_leaf_entries,
            buckets_per_level: buckets_per_level.max(1),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl Partitioner for AttributePartitioner {
    type Key = [u8; 32];

    fn key_of(&self, node: &Node) -> [u8; 32] {
        value_key(node.extra_data.get(&self.attribute).unwrap_or(&FieldValue::Null))
    }

    fn bucket_of(&self, key: &[u8; 32], depth: usize) -> Option<u32> {
        key.get(depth).map(|b| u32::from(*b) % self.buckets_per_level)
    }

    fn max_leaf_entries(&self) -> usize {
        self.max_leaf_entries
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }
}
