//! Graph node for one commit.

use geovc_store::RevCommit;
use geovc_types::ObjectId;

/// The parts of a commit the ancestry graph needs.
///
/// Nodes are immutable once loaded; the graph is a derived structure that
/// can always be reloaded from the object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitNode {
    pub id: ObjectId,
    /// Parents in commit order without duplicates; the first is the mainline.
    pub parents: Vec<ObjectId>,
    /// Root tree of the commit.
    pub tree_id: ObjectId,
    /// Committer timestamp, epoch milliseconds.
    pub timestamp: i64,
}

impl CommitNode {
    pub fn new(id: ObjectId, commit: &RevCommit) -> Self {
        let mut parents: Vec<ObjectId> = Vec::with_capacity(commit.parent_ids.len());
        for p in &commit.parent_ids {
            if !parents.contains(p) {
                parents.push(*p);
            }
        }
        Self {
            id,
            parents,
            tree_id: commit.tree_id,
            timestamp: commit.timestamp(),
        }
    }

    /// Returns `true` if this commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// Key that orders commits oldest first, ties broken by id.
    pub(crate) fn order_key(&self) -> (i64, ObjectId) {
        (self.timestamp, self.id)
    }
}
