use std::collections::VecDeque;

use geovc_store::{Node, ObjectStore};
use geovc_types::ObjectId;

use crate::engine::load_tree;
use crate::error::TreeResult;

/// Lazy depth-first iterator over every entry of a tree.
///
/// Keeps a stack of unread buckets, so a bucket is read only when the
/// iterator reaches it. Direct entries of a node come before the entries of
/// its buckets, and buckets are visited in index order.
pub struct WalkIter<'a> {
    store: &'a dyn ObjectStore,
    pending: Vec<ObjectId>,
    current: VecDeque<Node>,
    failed: bool,
}

impl<'a> WalkIter<'a> {
    pub fn new(store: &'a dyn ObjectStore, root: ObjectId) -> Self {
        Self {
            store,
            pending: vec![root],
            current: VecDeque::new(),
            failed: false,
        }
    }
}

impl Iterator for WalkIter<'_> {
    type Item = TreeResult<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(node) = self.current.pop_front() {
                return Some(Ok(node));
            }
            let id = self.pending.pop()?;
            match load_tree(self.store, &id) {
                Ok(tree) => {
                    self.current.extend(tree.entries);
                    self.pending
                        .extend(tree.buckets.iter().rev().map(|b| b.tree_id));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
