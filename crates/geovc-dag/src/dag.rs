//! The commit ancestry graph and its history ordering.
//!
//! [`CommitGraph`] stores commit nodes in a [`HashMap`] and keeps a
//! forward-edge index (`children`) so a history can be emitted parents
//! first. It is loaded from the object store by walking parent links from
//! one or more heads.
//!
//! # Invariants
//!
//! - Every parent of a node in the graph is also in the graph.
//! - Node ids are unique.
//! - The graph is acyclic (commit ids are content hashes over parent ids).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use geovc_store::{ObjectStore, StoreError};
use geovc_types::ObjectId;

use crate::error::{DagError, DagResult};
use crate::node::CommitNode;

/// Ancestry graph over a set of commits.
#[derive(Clone, Debug, Default)]
pub struct CommitGraph {
    nodes: HashMap<ObjectId, CommitNode>,
    /// Forward-edge index: parent -> children.
    children: HashMap<ObjectId, Vec<ObjectId>>,
}

impl CommitGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.nodes.contains_key(id)
    }

    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// Load every commit reachable from `heads`.
    pub fn load(
        store: &dyn ObjectStore,
        heads: impl IntoIterator<Item = ObjectId>,
    ) -> DagResult<Self> {
        let mut graph = Self::default();
        let mut stack: Vec<ObjectId> = heads.into_iter().collect();
        while let Some(id) = stack.pop() {
            if graph.nodes.contains_key(&id) {
                continue;
            }
            let commit = store.get_commit(&id).map_err(|e| match e {
                StoreError::NotFound(_) => DagError::CommitNotFound(id),
                other => DagError::Store(other),
            })?;
            let node = CommitNode::new(id, &commit);
            stack.extend(node.parents.iter().copied());
            graph.nodes.insert(id, node);
        }
        for node in graph.nodes.values() {
            for parent in &node.parents {
                graph.children.entry(*parent).or_default().push(node.id);
            }
        }
        debug!(commits = graph.nodes.len(), "commit graph loaded");
        Ok(graph)
    }

    /// Like a map lookup, failing with `CommitNotFound`.
    pub fn node(&self, id: &ObjectId) -> DagResult<&CommitNode> {
        self.nodes.get(id).ok_or(DagError::CommitNotFound(*id))
    }

    /// Direct children of a commit within the graph.
    pub fn children(&self, id: &ObjectId) -> &[ObjectId] {
        self.children.get(id).map_or(&[], Vec::as_slice)
    }

    /// A commit plus every ancestor in the graph.
    fn reachable(&self, id: &ObjectId) -> HashSet<ObjectId> {
        let mut visited = HashSet::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                if visited.insert(current) {
                    stack.extend(node.parents.iter().copied());
                }
            }
        }
        visited
    }

    // ---------------------------------------------------------------
    // Topological order
    // ---------------------------------------------------------------

    /// `head` and all its ancestors, parents before children.
    ///
    /// Kahn's algorithm; among commits whose parents are all emitted, the
    /// oldest committer timestamp goes first, ties broken by id.
    pub fn history(&self, head: &ObjectId) -> DagResult<Vec<&CommitNode>> {
        self.node(head)?;
        Ok(self.kahn(self.reachable(head)))
    }

    fn kahn(&self, members: HashSet<ObjectId>) -> Vec<&CommitNode> {
        let mut pending: HashMap<ObjectId, usize> = HashMap::with_capacity(members.len());
        let mut ready = BinaryHeap::new();
        for id in &members {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let degree = node.parents.iter().filter(|p| members.contains(p)).count();
            if degree == 0 {
                ready.push(Reverse(node.order_key()));
            } else {
                pending.insert(*id, degree);
            }
        }

        let mut result = Vec::with_capacity(members.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            result.push(node);
            for child in self.children(&id) {
                if let Some(degree) = pending.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        pending.remove(child);
                        if let Some(c) = self.nodes.get(child) {
                            ready.push(Reverse(c.order_key()));
                        }
                    }
                }
            }
        }
        result
    }
}
