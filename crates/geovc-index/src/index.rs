//! Handle to one built secondary index tree.

use geovc_store::{Node, ObjectStore, RevTree};
use geovc_tree::{load_tree, WalkIter};
use geovc_types::{Envelope, ObjectId};

use crate::error::IndexResult;
use crate::info::IndexInfo;

/// An index definition together with the index tree built for one
/// canonical tree.
///
/// Index trees are immutable, so a handle stays valid for as long as its
/// objects are in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Index {
    pub info: IndexInfo,
    pub indexed_tree_id: ObjectId,
}

impl Index {
    pub fn new(info: IndexInfo, indexed_tree_id: ObjectId) -> Self {
        Self {
            info,
            indexed_tree_id,
        }
    }

    /// `true` if no feature of the canonical tree was indexed.
    pub fn is_empty(&self) -> bool {
        self.indexed_tree_id == RevTree::empty_id()
    }

    /// Number of indexed features.
    pub fn size(&self, store: &dyn ObjectStore) -> IndexResult<u64> {
        Ok(load_tree(store, &self.indexed_tree_id)?.size)
    }

    /// Lazy iterator over every index node.
    pub fn nodes<'a>(&self, store: &'a dyn ObjectStore) -> WalkIter<'a> {
        WalkIter::new(store, self.indexed_tree_id)
    }

    // ---------------------------------------------------------------
    // Spatial query
    // ---------------------------------------------------------------

    /// Index nodes whose extent intersects `bbox`, sorted by name.
    ///
    /// Buckets whose bounds miss `bbox` are skipped without being read.
    pub fn query(&self, store: &dyn ObjectStore, bbox: &Envelope) -> IndexResult<Vec<Node>> {
        Ok(self.query_with_stats(store, bbox)?.0)
    }

    /// Like [`query`](Self::query), also returning how many tree nodes
    /// were read.
    pub fn query_with_stats(
        &self,
        store: &dyn ObjectStore,
        bbox: &Envelope,
    ) -> IndexResult<(Vec<Node>, usize)> {
        let mut found = Vec::new();
        let mut reads = 0;
        let mut pending = vec![self.indexed_tree_id];
        while let Some(id) = pending.pop() {
            let tree = load_tree(store, &id)?;
            reads += 1;
            found.extend(
                tree.entries
                    .into_iter()
                    .filter(|n| n.extent.is_some_and(|e| e.intersects(bbox))),
            );
            pending.extend(
                tree.buckets
                    .iter()
                    .filter(|b| b.bounds.is_some_and(|e| e.intersects(bbox)))
                    .map(|b| b.tree_id),
            );
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((found, reads))
    }
}
