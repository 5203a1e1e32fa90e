//! Generic partitioned trie engine.
//!
//! The engine turns a set of entries into a tree of [`RevTree`] nodes whose
//! shape depends only on that set and on the [`Partitioner`]:
//!
//! - a node holding at most `max_leaf_entries` entries (or sitting at
//!   `max_depth`) is a leaf;
//! - otherwise every entry with a bucket at this depth moves into that
//!   bucket's child tree, and entries without one stay in the node.
//!
//! Applying edits to an existing tree only reads and rewrites the buckets
//! the edits route to. When removals bring a bucketed node back under the
//! threshold it collapses into a leaf, so the result is identical to
//! building the final set from scratch.

use std::collections::BTreeMap;

use tracing::debug;

use geovc_store::{Bucket, Node, ObjectStore, RevObject, RevTree};
use geovc_types::ObjectId;

use crate::error::TreeResult;
use crate::partition::{Edit, Partitioner};

/// Load a tree, serving the empty tree without a store read.
pub fn load_tree(store: &dyn ObjectStore, id: &ObjectId) -> TreeResult<RevTree> {
    if *id == RevTree::empty_id() {
        return Ok(RevTree::empty());
    }
    Ok(store.get_tree(id)?)
}

/// Builds and edits tries on top of an object store.
pub struct TrieEngine<'a, P: Partitioner> {
    store: &'a dyn ObjectStore,
    partitioner: &'a P,
}

impl<'a, P: Partitioner> TrieEngine<'a, P> {
    pub fn new(store: &'a dyn ObjectStore, partitioner: &'a P) -> Self {
        Self { store, partitioner }
    }

    pub fn partitioner(&self) -> &P {
        self.partitioner
    }

    /// Build a tree from scratch and return its id.
    pub fn build(&self, nodes: Vec<Node>) -> TreeResult<ObjectId> {
        let mut by_name: BTreeMap<String, Node> = BTreeMap::new();
        for node in nodes {
            by_name.insert(node.name.clone(), node);
        }
        let keyed = by_name
            .into_values()
            .map(|n| (self.partitioner.key_of(&n), n))
            .collect();
        let tree = self.from_entries(keyed, 0)?;
        self.write(&tree)
    }

    /// Apply edits to the tree `root` and return the new root id.
    ///
    /// Edits apply in order; a later edit to the same name wins.
    pub fn apply(&self, root: &ObjectId, edits: Vec<Edit<P::Key>>) -> TreeResult<ObjectId> {
        if edits.is_empty() {
            return Ok(*root);
        }
        let count = edits.len();
        let tree = load_tree(self.store, root)?;
        let rebuilt = self.rebuild(tree, edits, 0)?;
        let id = self.write(&rebuilt)?;
        debug!(
            root = %root.short_hex(),
            new_root = %id.short_hex(),
            edits = count,
            size = rebuilt.size,
            "trie edited"
        );
        Ok(id)
    }

    fn write(&self, tree: &RevTree) -> TreeResult<ObjectId> {
        let object = RevObject::Tree(tree.clone());
        self.store.put(&object)?;
        Ok(tree.id())
    }

    fn from_entries(&self, entries: Vec<(P::Key, Node)>, depth: usize) -> TreeResult<RevTree> {
        if entries.len() <= self.partitioner.max_leaf_entries()
            || !self.partitioner.can_split(depth)
        {
            return Ok(RevTree::leaf(entries.into_iter().map(|(_, n)| n).collect()));
        }

        let size = entries.len() as u64;
        let mut direct = Vec::new();
        let mut groups: BTreeMap<u32, Vec<(P::Key, Node)>> = BTreeMap::new();
        for (key, node) in entries {
            match self.partitioner.bucket_of(&key, depth) {
                Some(b) => groups.entry(b).or_default().push((key, node)),
                None => direct.push(node),
            }
        }

        let mut buckets = Vec::with_capacity(groups.len());
        for (index, group) in groups {
            let child = self.from_entries(group, depth + 1)?;
            let bounds = child.bounds();
            buckets.push(Bucket::new(index, self.write(&child)?, bounds));
        }
        Ok(RevTree::new(direct, buckets, size))
    }

    fn rebuild(
        &self,
        tree: RevTree,
        edits: Vec<Edit<P::Key>>,
        depth: usize,
    ) -> TreeResult<RevTree> {
        if tree.is_leaf() {
            let mut merged: BTreeMap<String, (P::Key, Node)> = tree
                .entries
                .into_iter()
                .map(|n| (n.name.clone(), (self.partitioner.key_of(&n), n)))
                .collect();
            for edit in edits {
                match edit {
                    Edit::Put(key, node) => {
                        merged.insert(node.name.clone(), (key, node));
                    }
                    Edit::Remove(_, name) => {
                        merged.remove(&name);
                    }
                }
            }
            return self.from_entries(merged.into_values().collect(), depth);
        }

        let RevTree {
            size,
            entries,
            buckets,
        } = tree;
        let old_direct = entries.len() as u64;
        let mut direct: BTreeMap<String, Node> =
            entries.into_iter().map(|n| (n.name.clone(), n)).collect();
        let mut routed: BTreeMap<u32, Vec<Edit<P::Key>>> = BTreeMap::new();
        for edit in edits {
            match self.partitioner.bucket_of(edit.key(), depth) {
                Some(b) => routed.entry(b).or_default().push(edit),
                None => match edit {
                    Edit::Put(_, node) => {
                        direct.insert(node.name.clone(), node);
                    }
                    Edit::Remove(_, name) => {
                        direct.remove(&name);
                    }
                },
            }
        }

        let mut total = size - old_direct + direct.len() as u64;
        let mut new_buckets: BTreeMap<u32, Bucket> =
            buckets.into_iter().map(|b| (b.index, b)).collect();
        for (index, bucket_edits) in routed {
            let child = match new_buckets.get(&index) {
                Some(bucket) => load_tree(self.store, &bucket.tree_id)?,
                None => RevTree::empty(),
            };
            let old_size = child.size;
            let rebuilt = self.rebuild(child, bucket_edits, depth + 1)?;
            total = total - old_size + rebuilt.size;
            if rebuilt.size == 0 {
                new_buckets.remove(&index);
            } else {
                let bounds = rebuilt.bounds();
                let tree_id = self.write(&rebuilt)?;
                new_buckets.insert(index, Bucket::new(index, tree_id, bounds));
            }
        }

        let direct: Vec<Node> = direct.into_values().collect();
        if total as usize <= self.partitioner.max_leaf_entries() {
            let mut all = direct;
            for bucket in new_buckets.values() {
                self.collect_into(&bucket.tree_id, &mut all)?;
            }
            let keyed = all
                .into_iter()
                .map(|n| (self.partitioner.key_of(&n), n))
                .collect();
            return self.from_entries(keyed, depth);
        }
        Ok(RevTree::new(direct, new_buckets.into_values().collect(), total))
    }

    /// Append every entry reachable from `id` to `out`.
    fn collect_into(&self, id: &ObjectId, out: &mut Vec<Node>) -> TreeResult<()> {
        let tree = load_tree(self.store, id)?;
        out.extend(tree.entries);
        for bucket in &tree.buckets {
            self.collect_into(&bucket.tree_id, out)?;
        }
        Ok(())
    }

    /// Find the entry `name` routed by `key`, reading one node per level.
    pub fn lookup(&self, root: &ObjectId, key: &P::Key, name: &str) -> TreeResult<Option<Node>> {
        let mut tree = load_tree(self.store, root)?;
        let mut depth = 0;
        loop {
            if let Some(node) = tree.get(name) {
                return Ok(Some(node.clone()));
            }
            let next = match self.partitioner.bucket_of(key, depth) {
                Some(index) => tree.bucket(index).map(|b| b.tree_id),
                None => None,
            };
            match next {
                Some(id) => {
                    tree = load_tree(self.store, &id)?;
                    depth += 1;
                }
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{NamePartitioner, TreeConfig};
    use geovc_store::InMemoryObjectStore;
    use geovc_types::Envelope;

    fn small() -> NamePartitioner {
        NamePartitioner::new(TreeConfig {
            max_leaf_entries: 4,
            buckets_per_level: 4,
            max_depth: 8,
        })
    }

    fn node(i: usize) -> Node {
        Node::feature(format!("f{i}"), ObjectId::from_bytes(format!("obj{i}").as_bytes()))
            .with_extent(Envelope::point(i as f64, -(i as f64)))
    }

    fn put(p: &NamePartitioner, n: Node) -> Edit<[u8; 32]> {
        Edit::Put(p.key_of(&n), n)
    }

    fn remove(p: &NamePartitioner, name: &str) -> Edit<[u8; 32]> {
        Edit::Remove(p.key_of_name(name), name.to_string())
    }

    #[test]
    fn small_set_is_a_leaf() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let id = engine.build((0..4).map(node).collect()).unwrap();
        let tree = store.get_tree(&id).unwrap();
        assert!(tree.is_leaf());
        assert_eq!(tree.size, 4);
    }

    #[test]
    fn large_set_splits_into_buckets() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let id = engine.build((0..40).map(node).collect()).unwrap();
        let tree = store.get_tree(&id).unwrap();
        assert!(!tree.is_leaf());
        assert!(tree.entries.is_empty());
        assert_eq!(tree.size, 40);
        assert_eq!(tree.bounds(), Some(Envelope::new(0.0, -39.0, 39.0, 0.0)));
    }

    #[test]
    fn edits_match_build_from_scratch() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let base = engine.build((0..30).map(node).collect()).unwrap();

        let edits = vec![
            remove(&p, "f3"),
            remove(&p, "f17"),
            put(&p, node(31)),
            put(&p, node(5).with_extra("tag", "x".into())),
        ];
        let edited = engine.apply(&base, edits).unwrap();

        let mut expected: Vec<Node> = (0..30)
            .filter(|i| *i != 3 && *i != 17)
            .map(node)
            .collect();
        expected.push(node(31));
        expected.retain(|n| n.name != "f5");
        expected.push(node(5).with_extra("tag", "x".into()));
        assert_eq!(edited, engine.build(expected).unwrap());
    }

    #[test]
    fn removals_collapse_back_to_leaf() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let base = engine.build((0..20).map(node).collect()).unwrap();
        let edits = (2..20).map(|i| remove(&p, &format!("f{i}"))).collect();
        let edited = engine.apply(&base, edits).unwrap();
        let tree = store.get_tree(&edited).unwrap();
        assert!(tree.is_leaf());
        assert_eq!(tree.size, 2);
        assert_eq!(edited, engine.build(vec![node(0), node(1)]).unwrap());
    }

    #[test]
    fn removing_everything_yields_empty_tree() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let base = engine.build((0..12).map(node).collect()).unwrap();
        let edits = (0..12).map(|i| remove(&p, &format!("f{i}"))).collect();
        assert_eq!(engine.apply(&base, edits).unwrap(), RevTree::empty_id());
    }

    #[test]
    fn untouched_buckets_are_shared() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let base = engine.build((0..64).map(node).collect()).unwrap();
        let edited = engine.apply(&base, vec![put(&p, node(100))]).unwrap();

        let before = store.get_tree(&base).unwrap();
        let after = store.get_tree(&edited).unwrap();
        let changed = after
            .buckets
            .iter()
            .filter(|b| before.bucket(b.index).map(|o| o.tree_id) != Some(b.tree_id))
            .count();
        assert_eq!(changed, 1);
    }

    #[test]
    fn lookup_descends_buckets() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let root = engine.build((0..50).map(node).collect()).unwrap();
        for i in [0, 17, 49] {
            let name = format!("f{i}");
            let found = engine.lookup(&root, &p.key_of_name(&name), &name).unwrap();
            assert_eq!(found, Some(node(i)));
        }
        let missing = engine.lookup(&root, &p.key_of_name("nope"), "nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn empty_tree_needs_no_store_object() {
        let store = InMemoryObjectStore::new();
        let p = small();
        let engine = TrieEngine::new(&store, &p);
        let id = engine
            .apply(&RevTree::empty_id(), vec![put(&p, node(1))])
            .unwrap();
        assert_eq!(store.get_tree(&id).unwrap().size, 1);
        assert_eq!(engine.apply(&id, vec![]).unwrap(), id);
    }
}
