use geovc_store::{Node, NodeKind, ObjectStore, RevTree};
use geovc_types::ObjectId;

use crate::diff::DiffIter;
use crate::engine::{load_tree, TrieEngine};
use crate::error::{TreeError, TreeResult};
use crate::partition::{Edit, NamePartitioner, Partitioner, TreeConfig};
use crate::walk::WalkIter;

/// Canonical tree operations over a store, for one [`TreeConfig`].
#[derive(Clone, Copy)]
pub struct TreeOps<'a> {
    store: &'a dyn ObjectStore,
    partitioner: NamePartitioner,
}

impl<'a> TreeOps<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self::with_config(store, TreeConfig::default())
    }

    pub fn with_config(store: &'a dyn ObjectStore, config: TreeConfig) -> Self {
        Self {
            store,
            partitioner: NamePartitioner::new(config),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        self.partitioner.config()
    }

    fn engine(&self) -> TrieEngine<'_, NamePartitioner> {
        TrieEngine::new(self.store, &self.partitioner)
    }

    /// A builder batching edits against `base`.
    pub fn builder(&self, base: ObjectId) -> TreeBuilder<'a> {
        TreeBuilder {
            ops: *self,
            base,
            edits: Vec::new(),
        }
    }

    /// Insert or replace `node` and return the new tree id.
    pub fn insert(&self, tree: &ObjectId, node: Node) -> TreeResult<ObjectId> {
        let mut builder = self.builder(*tree);
        builder.put(node);
        builder.build()
    }

    /// Remove the entry `name` and return the new tree id.
    pub fn remove(&self, tree: &ObjectId, name: &str) -> TreeResult<ObjectId> {
        let mut builder = self.builder(*tree);
        builder.remove(name);
        builder.build()
    }

    pub fn lookup(&self, tree: &ObjectId, name: &str) -> TreeResult<Option<Node>> {
        self.engine()
            .lookup(tree, &self.partitioner.key_of_name(name), name)
    }

    /// Lazy sequence of changes from `old` to `new`.
    pub fn diff(&self, old: &ObjectId, new: &ObjectId) -> DiffIter<'a, NamePartitioner> {
        DiffIter::new(self.store, self.partitioner, *old, *new)
    }

    /// Lazy iterator over every entry of `tree`.
    pub fn walk(&self, tree: &ObjectId) -> WalkIter<'a> {
        WalkIter::new(self.store, *tree)
    }

    /// Resolve a `/`-separated path of nested trees to its final node.
    pub fn resolve_path(&self, root: &ObjectId, path: &str) -> TreeResult<Option<Node>> {
        let parts = split_path(path)?;
        let mut current = *root;
        let mut found = None;
        for (i, part) in parts.iter().enumerate() {
            match self.lookup(&current, part)? {
                Some(node) => {
                    if i + 1 < parts.len() {
                        if node.kind != NodeKind::Tree {
                            return Err(TreeError::NotATree {
                                path: parts[..=i].join("/"),
                            });
                        }
                        current = node.object_id;
                    }
                    found = Some(node);
                }
                None => return Ok(None),
            }
        }
        Ok(found)
    }

    /// Id of the tree at `path`; the empty path is the root itself.
    pub fn resolve_tree_id(&self, root: &ObjectId, path: &str) -> TreeResult<Option<ObjectId>> {
        if path.is_empty() {
            return Ok(Some(*root));
        }
        match self.resolve_path(root, path)? {
            Some(node) if node.kind == NodeKind::Tree => Ok(Some(node.object_id)),
            Some(_) => Err(TreeError::NotATree {
                path: path.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Point `path` at `child`, creating intermediate trees as needed, and
    /// return the new root id. The final node carries `metadata_id` and the
    /// child's bounds.
    pub fn update_path(
        &self,
        root: &ObjectId,
        path: &str,
        child: &ObjectId,
        metadata_id: Option<ObjectId>,
    ) -> TreeResult<ObjectId> {
        let parts = split_path(path)?;
        self.update_parts(root, &parts, child, metadata_id)
    }

    fn update_parts(
        &self,
        root: &ObjectId,
        parts: &[&str],
        child: &ObjectId,
        metadata_id: Option<ObjectId>,
    ) -> TreeResult<ObjectId> {
        let (head, rest) = match parts.split_first() {
            Some(split) => split,
            None => return Ok(*child),
        };
        let existing = self.lookup(root, head)?;
        let (target, node_metadata) = if rest.is_empty() {
            (*child, metadata_id)
        } else {
            let nested = match &existing {
                Some(node) if node.kind == NodeKind::Tree => node.object_id,
                Some(_) => {
                    return Err(TreeError::NotATree {
                        path: head.to_string(),
                    })
                }
                None => RevTree::empty_id(),
            };
            let metadata = existing.as_ref().and_then(|n| n.metadata_id);
            (self.update_parts(&nested, rest, child, metadata_id)?, metadata)
        };

        let mut node = Node::tree(*head, target);
        node.metadata_id = node_metadata;
        node.extent = load_tree(self.store, &target)?.bounds();
        self.insert(root, node)
    }
}

fn split_path(path: &str) -> TreeResult<Vec<&str>> {
    let parts: Vec<&str> = path.split('/').collect();
    if path.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// Batches edits against a base tree into a single rebuild.
pub struct TreeBuilder<'a> {
    ops: TreeOps<'a>,
    base: ObjectId,
    edits: Vec<Edit<[u8; 32]>>,
}

impl<'a> TreeBuilder<'a> {
    /// A builder over the empty tree with the default configuration.
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        TreeOps::new(store).builder(RevTree::empty_id())
    }

    /// Insert or replace an entry.
    pub fn put(&mut self, node: Node) -> &mut Self {
        let key = self.ops.partitioner.key_of(&node);
        self.edits.push(Edit::Put(key, node));
        self
    }

    /// Remove an entry by name. Removing a missing name is a no-op.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        let key = self.ops.partitioner.key_of_name(name);
        self.edits.push(Edit::Remove(key, name.to_string()));
        self
    }

    /// Number of pending edits.
    pub fn pending(&self) -> usize {
        self.edits.len()
    }

    /// Write the edited tree and return its id.
    pub fn build(self) -> TreeResult<ObjectId> {
        self.ops.engine().apply(&self.base, self.edits)
    }
}

/// Insert `node` into `tree` with the default configuration.
pub fn insert(store: &dyn ObjectStore, tree: &ObjectId, node: Node) -> TreeResult<ObjectId> {
    TreeOps::new(store).insert(tree, node)
}

/// Remove `name` from `tree` with the default configuration.
pub fn remove(store: &dyn ObjectStore, tree: &ObjectId, name: &str) -> TreeResult<ObjectId> {
    TreeOps::new(store).remove(tree, name)
}

/// Look up `name` in `tree` with the default configuration.
pub fn lookup(store: &dyn ObjectStore, tree: &ObjectId, name: &str) -> TreeResult<Option<Node>> {
    TreeOps::new(store).lookup(tree, name)
}

/// Lazy diff of two trees with the default configuration.
pub fn diff<'a>(
    store: &'a dyn ObjectStore,
    old: &ObjectId,
    new: &ObjectId,
) -> DiffIter<'a, NamePartitioner> {
    TreeOps::new(store).diff(old, new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geovc_store::InMemoryObjectStore;
    use geovc_types::Envelope;
    use proptest::prelude::*;

    fn small() -> TreeConfig {
        TreeConfig {
            max_leaf_entries: 8,
            buckets_per_level: 4,
            max_depth: 16,
        }
    }

    fn leaf(i: u32) -> Node {
        Node::feature(format!("p{i:05}"), ObjectId::from_bytes(&i.to_be_bytes()))
    }

    #[test]
    fn insert_remove_lookup() {
        let store = InMemoryObjectStore::new();
        let empty = RevTree::empty_id();
        let t1 = insert(&store, &empty, leaf(1)).unwrap();
        let t2 = insert(&store, &t1, leaf(2)).unwrap();
        assert_eq!(lookup(&store, &t2, "p00001").unwrap(), Some(leaf(1)));
        let t3 = remove(&store, &t2, "p00001").unwrap();
        assert!(lookup(&store, &t3, "p00001").unwrap().is_none());
        assert_eq!(t3, insert(&store, &empty, leaf(2)).unwrap());
        assert_eq!(remove(&store, &t3, "p00002").unwrap(), empty);
    }

    #[test]
    fn replacing_an_entry_keeps_size() {
        let store = InMemoryObjectStore::new();
        let t = insert(&store, &RevTree::empty_id(), leaf(1)).unwrap();
        let replaced = Node::feature("p00001", ObjectId::from_bytes(b"new"));
        let t2 = insert(&store, &t, replaced.clone()).unwrap();
        assert_eq!(store.get_tree(&t2).unwrap().size, 1);
        assert_eq!(lookup(&store, &t2, "p00001").unwrap(), Some(replaced));
    }

    #[test]
    fn builder_batches_edits() {
        let store = InMemoryObjectStore::new();
        let ops = TreeOps::with_config(&store, small());
        let mut builder = ops.builder(RevTree::empty_id());
        for i in 0..100 {
            builder.put(leaf(i));
        }
        builder.remove("p00050");
        assert_eq!(builder.pending(), 101);
        let id = builder.build().unwrap();
        let tree = store.get_tree(&id).unwrap();
        assert_eq!(tree.size, 99);
        assert!(!tree.is_leaf());
        assert!(ops.lookup(&id, "p00050").unwrap().is_none());
        assert_eq!(ops.lookup(&id, "p00099").unwrap(), Some(leaf(99)));
    }

    #[test]
    fn zero_bucket_config_still_builds() {
        let store = InMemoryObjectStore::new();
        let ops = TreeOps::with_config(
            &store,
            TreeConfig {
                max_leaf_entries: 1,
                buckets_per_level: 0,
                max_depth: 4,
            },
        );
        let mut root = RevTree::empty_id();
        for i in 0..3 {
            root = ops.insert(&root, leaf(i)).unwrap();
        }
        assert_eq!(store.get_tree(&root).unwrap().size, 3);
        assert_eq!(ops.lookup(&root, "p00002").unwrap(), Some(leaf(2)));
        assert_eq!(ops.walk(&root).count(), 3);
    }

    #[test]
    fn nested_paths_resolve() {
        let store = InMemoryObjectStore::new();
        let ops = TreeOps::new(&store);
        let features = ops
            .insert(&RevTree::empty_id(), leaf(7).with_extent(Envelope::point(1.0, 2.0)))
            .unwrap();
        let ft = ObjectId::from_bytes(b"featuretype");
        let root = ops
            .update_path(&RevTree::empty_id(), "layers/points", &features, Some(ft))
            .unwrap();

        let points = ops.resolve_path(&root, "layers/points").unwrap().unwrap();
        assert_eq!(points.kind, NodeKind::Tree);
        assert_eq!(points.object_id, features);
        assert_eq!(points.metadata_id, Some(ft));
        assert_eq!(points.extent, Some(Envelope::point(1.0, 2.0)));
        assert_eq!(ops.resolve_tree_id(&root, "layers/points").unwrap(), Some(features));
        assert_eq!(ops.resolve_tree_id(&root, "").unwrap(), Some(root));
        assert!(ops.resolve_path(&root, "layers/lines").unwrap().is_none());
        assert!(ops.resolve_path(&root, "missing/points").unwrap().is_none());

        let feature = ops
            .resolve_path(&root, "layers/points/p00007")
            .unwrap()
            .unwrap();
        assert_eq!(feature.object_id, leaf(7).object_id);
    }

    #[test]
    fn path_through_feature_is_not_a_tree() {
        let store = InMemoryObjectStore::new();
        let ops = TreeOps::new(&store);
        let root = ops.insert(&RevTree::empty_id(), leaf(1)).unwrap();
        let err = ops.resolve_path(&root, "p00001/x").unwrap_err();
        assert!(matches!(err, TreeError::NotATree { path } if path == "p00001"));
        assert!(matches!(
            ops.resolve_tree_id(&root, "p00001"),
            Err(TreeError::NotATree { .. })
        ));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let store = InMemoryObjectStore::new();
        let ops = TreeOps::new(&store);
        for bad in ["a//b", "/a", "a/"] {
            assert!(matches!(
                ops.resolve_path(&RevTree::empty_id(), bad),
                Err(TreeError::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn update_path_replaces_existing_child() {
        let store = InMemoryObjectStore::new();
        let ops = TreeOps::new(&store);
        let v1 = ops.insert(&RevTree::empty_id(), leaf(1)).unwrap();
        let v2 = ops.insert(&v1, leaf(2)).unwrap();
        let ft = ObjectId::from_bytes(b"ft");
        let root1 = ops.update_path(&RevTree::empty_id(), "points", &v1, Some(ft)).unwrap();
        let root2 = ops.update_path(&root1, "points", &v2, Some(ft)).unwrap();
        assert_eq!(ops.resolve_tree_id(&root2, "points").unwrap(), Some(v2));
        assert_eq!(store.get_tree(&root2).unwrap().size, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn insertion_order_does_not_change_id(
            ids in proptest::collection::btree_set(0u32..5_000, 0..120),
            seed in any::<u64>(),
        ) {
            use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

            let store = InMemoryObjectStore::new();
            let ops = TreeOps::with_config(&store, small());
            let ordered: Vec<u32> = ids.iter().copied().collect();
            let mut shuffled = ordered.clone();
            shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

            let mut a = RevTree::empty_id();
            for i in &ordered {
                a = ops.insert(&a, leaf(*i)).unwrap();
            }
            let mut b = RevTree::empty_id();
            for i in &shuffled {
                b = ops.insert(&b, leaf(*i)).unwrap();
            }
            prop_assert_eq!(a, b);
            prop_assert_eq!(ops.diff(&a, &b).count(), 0);
        }

        #[test]
        fn remove_all_returns_empty_tree(
            ids in proptest::collection::btree_set(0u32..5_000, 0..120),
        ) {
            let store = InMemoryObjectStore::new();
            let ops = TreeOps::with_config(&store, small());
            let mut t = RevTree::empty_id();
            for i in &ids {
                t = ops.insert(&t, leaf(*i)).unwrap();
            }
            for i in ids.iter().rev() {
                t = ops.remove(&t, &format!("p{i:05}")).unwrap();
            }
            prop_assert_eq!(t, RevTree::empty_id());
        }
    }
}
