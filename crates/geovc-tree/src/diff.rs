//! Lazy lock-step diff of two tries built with the same partitioner.
//!
//! Both trees are walked together, bucket index by bucket index. Subtrees
//! with identical ids are skipped without being read, so the cost is
//! proportional to the number of changed entries rather than tree size.
//! When one side is a leaf and the other is bucketed, the leaf's entries
//! are routed to the buckets they would occupy at that depth and compared
//! against the other side bucket by bucket.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use geovc_store::{Bucket, Node, ObjectStore};
use geovc_types::ObjectId;

use crate::engine::load_tree;
use crate::error::TreeResult;
use crate::partition::Partitioner;

/// A single change between two trees.
#[derive(Clone, Debug, PartialEq)]
pub enum DiffEntry {
    /// The entry exists only in the new tree.
    Added(Node),
    /// The entry exists only in the old tree.
    Removed(Node),
    /// The entry exists in both trees with different contents.
    Modified { old: Node, new: Node },
}

impl DiffEntry {
    /// Name of the changed entry.
    pub fn name(&self) -> &str {
        match self {
            Self::Added(n) | Self::Removed(n) => &n.name,
            Self::Modified { new, .. } => &new.name,
        }
    }

    /// The entry as it was before the change, if it existed.
    pub fn old(&self) -> Option<&Node> {
        match self {
            Self::Removed(n) | Self::Modified { old: n, .. } => Some(n),
            Self::Added(_) => None,
        }
    }

    /// The entry as it is after the change, if it still exists.
    pub fn new_node(&self) -> Option<&Node> {
        match self {
            Self::Added(n) | Self::Modified { new: n, .. } => Some(n),
            Self::Removed(_) => None,
        }
    }
}

enum Side {
    Tree(ObjectId),
    Entries(Vec<Node>),
}

struct Frame {
    old: Side,
    new: Side,
    depth: usize,
}

struct Opened {
    entries: Vec<Node>,
    buckets: Vec<Bucket>,
}

/// Iterator over the changes from one tree to another.
///
/// Yields `Err` once if a subtree cannot be read, then ends.
pub struct DiffIter<'a, P: Partitioner> {
    store: &'a dyn ObjectStore,
    partitioner: P,
    stack: Vec<Frame>,
    ready: VecDeque<DiffEntry>,
    failed: bool,
}

impl<'a, P: Partitioner> DiffIter<'a, P> {
    pub fn new(store: &'a dyn ObjectStore, partitioner: P, old: ObjectId, new: ObjectId) -> Self {
        Self {
            store,
            partitioner,
            stack: vec![Frame {
                old: Side::Tree(old),
                new: Side::Tree(new),
                depth: 0,
            }],
            ready: VecDeque::new(),
            failed: false,
        }
    }

    fn open(&self, side: Side) -> TreeResult<Opened> {
        match side {
            Side::Tree(id) => {
                let tree = load_tree(self.store, &id)?;
                Ok(Opened {
                    entries: tree.entries,
                    buckets: tree.buckets,
                })
            }
            Side::Entries(entries) => Ok(Opened {
                entries,
                buckets: Vec::new(),
            }),
        }
    }

    /// Split a node into the entries kept at `depth` and per-bucket sides.
    fn route(&self, opened: Opened, depth: usize) -> (Vec<Node>, BTreeMap<u32, Side>) {
        let mut groups: BTreeMap<u32, Side> = opened
            .buckets
            .into_iter()
            .map(|b| (b.index, Side::Tree(b.tree_id)))
            .collect();
        let mut direct = Vec::new();
        for node in opened.entries {
            let key = self.partitioner.key_of(&node);
            match self.partitioner.bucket_of(&key, depth) {
                Some(index) if self.partitioner.can_split(depth) => {
                    match groups.entry(index).or_insert_with(|| Side::Entries(Vec::new())) {
                        Side::Entries(list) => list.push(node),
                        // A leaf never has buckets, so a node is either
                        // routed or bucketed, not both.
                        Side::Tree(_) => direct.push(node),
                    }
                }
                _ => direct.push(node),
            }
        }
        (direct, groups)
    }

    fn expand(&mut self, frame: Frame) -> TreeResult<()> {
        if let (Side::Tree(a), Side::Tree(b)) = (&frame.old, &frame.new) {
            if a == b {
                return Ok(());
            }
        }
        let old = self.open(frame.old)?;
        let new = self.open(frame.new)?;
        if old.buckets.is_empty() && new.buckets.is_empty() {
            self.compare(old.entries, new.entries);
            return Ok(());
        }

        let (old_direct, mut old_groups) = self.route(old, frame.depth);
        let (new_direct, mut new_groups) = self.route(new, frame.depth);
        self.compare(old_direct, new_direct);

        let indexes: BTreeSet<u32> = old_groups.keys().chain(new_groups.keys()).copied().collect();
        for index in indexes.into_iter().rev() {
            self.stack.push(Frame {
                old: old_groups
                    .remove(&index)
                    .unwrap_or(Side::Entries(Vec::new())),
                new: new_groups
                    .remove(&index)
                    .unwrap_or(Side::Entries(Vec::new())),
                depth: frame.depth + 1,
            });
        }
        Ok(())
    }

    /// Merge two name-sorted entry lists.
    fn compare(&mut self, old: Vec<Node>, new: Vec<Node>) {
        let mut old = old.into_iter().peekable();
        let mut new = new.into_iter().peekable();
        loop {
            let order = match (old.peek(), new.peek()) {
                (Some(a), Some(b)) => a.name.cmp(&b.name),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => return,
            };
            match order {
                Ordering::Less => {
                    if let Some(a) = old.next() {
                        self.ready.push_back(DiffEntry::Removed(a));
                    }
                }
                Ordering::Greater => {
                    if let Some(b) = new.next() {
                        self.ready.push_back(DiffEntry::Added(b));
                    }
                }
                Ordering::Equal => {
                    if let (Some(a), Some(b)) = (old.next(), new.next()) {
                        if a != b {
                            self.ready.push_back(DiffEntry::Modified { old: a, new: b });
                        }
                    }
                }
            }
        }
    }
}

impl<P: Partitioner> Iterator for DiffIter<'_, P> {
    type Item = TreeResult<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.ready.pop_front() {
                return Some(Ok(entry));
            }
            if self.failed {
                return None;
            }
            let frame = self.stack.pop()?;
            if let Err(e) = self.expand(frame) {
                self.failed = true;
                self.stack.clear();
                return Some(Err(e));
            }
        }
    }
}
