use tracing::{debug, info, warn};
use uuid::Uuid;

use geovc_refs::RefError;
use geovc_store::{
    CountingListener, Node, NodeKind, ObjectStore, RevCommit, RevFeature, RevFeatureType,
    RevObject, RevTree, StagedObjectStore,
};
use geovc_tree::{TreeError, TreeOps};
use geovc_types::ObjectId;

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;

/// What a successful [`Transaction::publish`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishReport {
    /// The commit the branch now points at, if the transaction committed.
    pub commit: Option<ObjectId>,
    /// Per-object outcomes of copying the staging layer into the store.
    pub objects: CountingListener,
}

/// A unit of work against one branch.
///
/// Every object the transaction writes lands in a private staging layer;
/// reads see staged objects first, then the repository store. Nothing is
/// visible to other sessions until [`publish`](Self::publish), which copies
/// the staged objects into the store and then advances the branch with a
/// compare-and-swap against the head the transaction started from.
pub struct Transaction<'r> {
    repo: &'r Repository,
    view: StagedObjectStore,
    branch: String,
    expected: Option<ObjectId>,
    root: ObjectId,
    commit: Option<ObjectId>,
}

impl<'r> Transaction<'r> {
    pub(crate) fn new(
        repo: &'r Repository,
        view: StagedObjectStore,
        branch: String,
        expected: Option<ObjectId>,
        root: ObjectId,
    ) -> Self {
        debug!(view = %view.id(), branch = %branch, "transaction started");
        Self {
            repo,
            view,
            branch,
            expected,
            root,
            commit: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.view.id()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Head of the branch when the transaction started.
    pub fn expected_head(&self) -> Option<ObjectId> {
        self.expected
    }

    /// Working root tree, including uncommitted edits.
    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Last commit recorded by this transaction.
    pub fn head_commit(&self) -> Option<ObjectId> {
        self.commit
    }

    /// Read access to the transaction's view of the repository.
    pub fn store(&self) -> &dyn ObjectStore {
        &self.view
    }

    pub fn staged_len(&self) -> usize {
        self.view.staged_len()
    }

    fn ops(&self) -> TreeOps<'_> {
        TreeOps::with_config(&self.view, self.repo.config().tree)
    }

    /// Id of the feature tree at `path` in the working root.
    pub fn tree(&self, path: &str) -> RepoResult<Option<ObjectId>> {
        Ok(self.ops().resolve_tree_id(&self.root, path)?)
    }

    // ---- Edits ----

    pub fn put_feature_type(&self, feature_type: RevFeatureType) -> RepoResult<ObjectId> {
        let id = feature_type.id();
        self.view.put(&RevObject::from(feature_type))?;
        Ok(id)
    }

    /// Insert or replace named features in the tree at `path`, creating it
    /// if needed. The tree records `feature_type_id` as its default type.
    pub fn insert_features<I, S>(
        &mut self,
        path: &str,
        feature_type_id: &ObjectId,
        features: I,
    ) -> RepoResult<ObjectId>
    where
        I: IntoIterator<Item = (S, RevFeature)>,
        S: Into<String>,
    {
        let feature_type = self.view.get_feature_type(feature_type_id)?;
        let ops = self.ops();
        let base = ops
            .resolve_tree_id(&self.root, path)?
            .unwrap_or_else(RevTree::empty_id);

        let mut builder = ops.builder(base);
        for (name, feature) in features {
            let mut node = Node::feature(name, feature.id()).with_metadata_id(*feature_type_id);
            node.extent = feature.default_bounds(&feature_type);
            self.view.put(&RevObject::from(feature))?;
            builder.put(node);
        }
        let inserted = builder.pending();
        let tree = builder.build()?;
        let root = ops.update_path(&self.root, path, &tree, Some(*feature_type_id))?;

        debug!(view = %self.view.id(), path, inserted, "features inserted");
        self.root = root;
        Ok(root)
    }

    /// Remove named features from the tree at `path`. Missing names and a
    /// missing tree are no-ops. Only the staged view changes.
    pub fn remove_features<I, S>(&mut self, path: &str, names: I) -> RepoResult<ObjectId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ops = self.ops();
        let Some(node) = ops.resolve_path(&self.root, path)? else {
            return Ok(self.root);
        };
        if node.kind != NodeKind::Tree {
            return Err(TreeError::NotATree {
                path: path.to_string(),
            }
            .into());
        }

        let mut builder = ops.builder(node.object_id);
        for name in names {
            builder.remove(name.as_ref());
        }
        let tree = builder.build()?;
        let root = ops.update_path(&self.root, path, &tree, node.metadata_id)?;

        debug!(view = %self.view.id(), path, "features removed");
        self.root = root;
        Ok(root)
    }

    // ---- Commit and publish ----

    /// Record the working root as a commit on top of the previous one.
    ///
    /// Author and committer come from the repository's `[user]` settings.
    pub fn commit(&mut self, message: impl Into<String>) -> RepoResult<ObjectId> {
        let person = self.repo.config().user.person()?;
        let parent = self.commit.or(self.expected);
        let commit = RevCommit {
            tree_id: self.root,
            parent_ids: parent.into_iter().collect(),
            author: person.clone(),
            committer: person,
            message: message.into(),
        };
        let id = commit.id();
        self.view.put(&RevObject::from(commit))?;
        self.commit = Some(id);
        info!(
            view = %self.view.id(),
            branch = %self.branch,
            commit = %id.short_hex(),
            "commit recorded"
        );
        Ok(id)
    }

    /// Copy the staged objects into the repository store, then advance the
    /// branch to the last commit.
    ///
    /// Fails with [`RefError::StaleRef`] if the branch moved since the
    /// transaction started. The published objects stay in the store, but
    /// nothing references them.
    pub fn publish(self) -> RepoResult<PublishReport> {
        let staged = self.view.staged_len();
        let objects = self.view.publish();
        if objects.has_failures() {
            return Err(RepoError::Incomplete {
                failed: objects.failed.len(),
                staged,
            });
        }

        if let Some(commit) = self.commit {
            match self
                .repo
                .refs()
                .update_branch(&self.branch, self.expected, commit)
            {
                Ok(()) => {}
                Err(e @ RefError::StaleRef { .. }) => {
                    warn!(view = %self.view.id(), branch = %self.branch, error = %e, "publish lost race");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            view = %self.view.id(),
            branch = %self.branch,
            commit = ?self.commit.map(|c| c.short_hex()),
            inserted = objects.inserted,
            "transaction published"
        );
        Ok(PublishReport {
            commit: self.commit,
            objects,
        })
    }

    /// Drop everything staged. The repository is untouched.
    pub fn discard(self) {
        self.view.discard();
    }
}
