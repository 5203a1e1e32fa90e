use serde::{Deserialize, Serialize};

use geovc_store::Node;

/// Entry count above which a canonical tree node splits into buckets.
pub const MAX_LEAF_ENTRIES: usize = 512;
/// Fan-out of a canonical bucketed node.
pub const BUCKETS_PER_LEVEL: u32 = 32;
/// Deepest level a canonical tree splits at (one hash byte per level).
pub const MAX_DEPTH: usize = 32;
/// Largest useful fan-out: one bucket per value of a hash byte.
pub const MAX_BUCKETS_PER_LEVEL: u32 = 256;

/// Shape parameters of a canonical tree.
///
/// Trees built with different configurations are not comparable by id;
/// every tree in a repository must use the same values. Keys missing from
/// a serialized config take their defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_leaf_entries: usize,
    pub buckets_per_level: u32,
    pub max_depth: usize,
}

impl TreeConfig {
    /// Check that a tree can be built with these values.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_BUCKETS_PER_LEVEL).contains(&self.buckets_per_level) {
            return Err(format!(
                "buckets_per_level must be between 1 and {MAX_BUCKETS_PER_LEVEL}, got {}",
                self.buckets_per_level
            ));
        }
        if self.max_leaf_entries == 0 {
            return Err("max_leaf_entries must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_leaf_entries: MAX_LEAF_ENTRIES,
            buckets_per_level: BUCKETS_PER_LEVEL,
            max_depth: MAX_DEPTH,
        }
    }
}

/// Places tree entries into buckets.
///
/// A partitioner fixes the shape of a trie: for any set of entries the
/// resulting tree is a pure function of that set. Secondary index trees
/// reuse the canonical engine with their own partitioners.
pub trait Partitioner {
    /// Routing key of an entry, computed once per edit.
    type Key: Clone;

    /// Extract the routing key of a node.
    fn key_of(&self, node: &Node) -> Self::Key;

    /// Bucket of a key at `depth`. `None` keeps the entry at that level.
    fn bucket_of(&self, key: &Self::Key, depth: usize) -> Option<u32>;

    /// Entry count above which a node splits.
    fn max_leaf_entries(&self) -> usize;

    /// Nodes at this depth never split.
    fn max_depth(&self) -> usize;

    fn can_split(&self, depth: usize) -> bool {
        depth < self.max_depth()
    }
}

/// Canonical partitioner: bucket at depth `d` is byte `d` of
/// `blake3(name)` modulo the bucket count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NamePartitioner {
    config: TreeConfig,
}

impl NamePartitioner {
    /// Bucket counts outside `1..=256` are clamped into that range.
    pub fn new(mut config: TreeConfig) -> Self {
        config.buckets_per_level = config.buckets_per_level.clamp(1, MAX_BUCKETS_PER_LEVEL);
        Self { config }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Routing key of a bare name.
    pub fn key_of_name(&self, name: &str) -> [u8; 32] {
        *blake3::hash(name.as_bytes()).as_bytes()
    }
}

impl Partitioner for NamePartitioner {
    type Key = [u8; 32];

    fn key_of(&self, node: &Node) -> [u8; 32] {
        self.key_of_name(&node.name)
    }

    fn bucket_of(&self, key: &[u8; 32], depth: usize) -> Option<u32> {
        key.get(depth)
            .map(|b| u32::from(*b) % self.config.buckets_per_level)
    }

    fn max_leaf_entries(&self) -> usize {
        self.config.max_leaf_entries
    }

    fn max_depth(&self) -> usize {
        self.config.max_depth.min(32)
    }
}

/// One change applied to a trie.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit<K> {
    /// Insert or replace the entry with this node's name.
    Put(K, Node),
    /// Remove the entry with this name, routed by `key`.
    Remove(K, String),
}

impl<K> Edit<K> {
    pub fn name(&self) -> &str {
        match self {
            Edit::Put(_, node) => &node.name,
            Edit::Remove(_, name) => name,
        }
    }

    pub fn key(&self) -> &K {
        match self {
            Edit::Put(key, _) | Edit::Remove(key, _) => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geovc_types::ObjectId;

    #[test]
    fn default_config_matches_constants() {
        let cfg = TreeConfig::default();
        assert_eq!(cfg.max_leaf_entries, 512);
        assert_eq!(cfg.buckets_per_level, 32);
        assert_eq!(cfg.max_depth, 32);
    }

    #[test]
    fn name_buckets_follow_hash_bytes() {
        let p = NamePartitioner::default();
        let key = p.key_of(&Node::feature("road.1", ObjectId::NULL));
        let hash = blake3::hash(b"road.1");
        for depth in 0..32 {
            assert_eq!(
                p.bucket_of(&key, depth),
                Some(u32::from(hash.as_bytes()[depth]) % 32)
            );
        }
        assert_eq!(p.bucket_of(&key, 32), None);
        assert!(p.can_split(31));
        assert!(!p.can_split(32));
    }

    #[test]
    fn small_configs_bound_bucket_index() {
        let p = NamePartitioner::new(TreeConfig {
            max_leaf_entries: 4,
            buckets_per_level: 3,
            max_depth: 6,
        });
        for i in 0..100 {
            let key = p.key_of_name(&format!("n{i}"));
            assert!(p.bucket_of(&key, 0).unwrap() < 3);
        }
        assert!(!p.can_split(6));
    }

    #[test]
    fn out_of_range_bucket_counts_are_clamped() {
        let zero = NamePartitioner::new(TreeConfig {
            buckets_per_level: 0,
            ..TreeConfig::default()
        });
        assert_eq!(zero.config().buckets_per_level, 1);
        let key = zero.key_of_name("road.1");
        assert_eq!(zero.bucket_of(&key, 0), Some(0));

        let wide = NamePartitioner::new(TreeConfig {
            buckets_per_level: 1_000,
            ..TreeConfig::default()
        });
        assert_eq!(wide.config().buckets_per_level, MAX_BUCKETS_PER_LEVEL);
    }

    #[test]
    fn validate_rejects_unusable_shapes() {
        assert!(TreeConfig::default().validate().is_ok());
        let no_buckets = TreeConfig {
            buckets_per_level: 0,
            ..TreeConfig::default()
        };
        assert!(no_buckets.validate().unwrap_err().contains("buckets_per_level"));
        let too_wide = TreeConfig {
            buckets_per_level: 257,
            ..TreeConfig::default()
        };
        assert!(too_wide.validate().is_err());
        let no_leaves = TreeConfig {
            max_leaf_entries: 0,
            ..TreeConfig::default()
        };
        assert!(no_leaves.validate().is_err());
    }
}
