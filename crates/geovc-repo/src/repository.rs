use std::path::Path;
use std::sync::Arc;
use std::thread;

use tracing::info;

use geovc_index::{
    CreateIndexRequest, CrsBoundsProvider, FileIndexDatabase, HistoryReport, Index,
    IndexDatabase, IndexEngine, IndexInfo, InMemoryIndexDatabase, StaticBoundsProvider,
    INDEX_DATABASE_FILE,
};
use geovc_refs::{validate_branch_name, FileRefStore, InMemoryRefStore, RefStore};
use geovc_store::{FileObjectStore, InMemoryObjectStore, ObjectStore, RevTree, StagedObjectStore};
use geovc_tree::TreeOps;
use geovc_types::ObjectId;

use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};
use crate::transaction::Transaction;

/// A repository session.
///
/// Holds the shared object store, the ref store, the index database, the
/// CRS bounds source and the session's configuration. Every operation
/// reads these from the session; nothing is process-global, so several
/// repositories can be open side by side.
pub struct Repository {
    store: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    indexes: Arc<dyn IndexDatabase>,
    bounds: Arc<dyn CrsBoundsProvider>,
    config: RepoConfig,
}

impl Repository {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        indexes: Arc<dyn IndexDatabase>,
        bounds: Arc<dyn CrsBoundsProvider>,
        config: RepoConfig,
    ) -> Self {
        Self {
            store,
            refs,
            indexes,
            bounds,
            config,
        }
    }

    /// A repository held entirely in memory.
    pub fn in_memory(config: RepoConfig) -> Self {
        Self::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefStore::new()),
            Arc::new(InMemoryIndexDatabase::new()),
            Arc::new(StaticBoundsProvider::default()),
            config,
        )
    }

    /// Open (creating if needed) a repository whose objects, refs and
    /// index definitions live under `root`.
    pub fn open(root: impl AsRef<Path>, config: RepoConfig) -> RepoResult<Self> {
        let root = root.as_ref();
        let store = FileObjectStore::open(root)?;
        let refs = FileRefStore::open(root)?;
        let indexes = FileIndexDatabase::open(root.join(INDEX_DATABASE_FILE))?;
        info!(root = ?root, "repository opened");
        Ok(Self::new(
            Arc::new(store),
            Arc::new(refs),
            Arc::new(indexes),
            Arc::new(StaticBoundsProvider::default()),
            config,
        ))
    }

    // ---- Accessors ----

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn refs(&self) -> &dyn RefStore {
        self.refs.as_ref()
    }

    pub fn index_database(&self) -> &dyn IndexDatabase {
        self.indexes.as_ref()
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Canonical tree operations over the shared store.
    pub fn tree_ops(&self) -> TreeOps<'_> {
        TreeOps::with_config(self.store.as_ref(), self.config.tree)
    }

    // ---- Branches ----

    pub fn branch_head(&self, branch: &str) -> RepoResult<Option<ObjectId>> {
        Ok(self.refs.branch_head(branch)?)
    }

    /// Root tree of the head commit of `branch`.
    pub fn head_tree(&self, branch: &str) -> RepoResult<Option<ObjectId>> {
        match self.branch_head(branch)? {
            Some(commit) => Ok(Some(self.store.get_commit(&commit)?.tree_id)),
            None => Ok(None),
        }
    }

    /// Start a transaction that will advance `branch` from its current head.
    /// The branch need not exist yet.
    pub fn begin(&self, branch: &str) -> RepoResult<Transaction<'_>> {
        validate_branch_name(branch)?;
        let expected = self.branch_head(branch)?;
        let root = match expected {
            Some(commit) => self.store.get_commit(&commit)?.tree_id,
            None => RevTree::empty_id(),
        };
        let view = StagedObjectStore::new(Arc::clone(&self.store));
        Ok(Transaction::new(self, view, branch.to_string(), expected, root))
    }

    // ---- Indexes ----

    /// Index engine over this session's stores and configuration.
    pub fn index_engine(&self) -> IndexEngine<'_> {
        IndexEngine::new(
            self.store.as_ref(),
            self.indexes.as_ref(),
            self.bounds.as_ref(),
            self.refs.as_ref(),
        )
        .with_tree_config(self.config.tree)
        .with_config(self.config.index)
    }

    pub fn create_index(&self, request: CreateIndexRequest) -> RepoResult<Index> {
        Ok(self.index_engine().create_index(request)?)
    }

    pub fn drop_index(&self, tree_name: &str, attribute_name: &str) -> RepoResult<bool> {
        Ok(self.index_engine().drop_index(tree_name, attribute_name)?)
    }

    /// The index on `tree_name.attribute_name` for the head of `branch`, if
    /// that tree has been indexed.
    pub fn index_at(
        &self,
        branch: &str,
        tree_name: &str,
        attribute_name: &str,
    ) -> RepoResult<Option<Index>> {
        let Some(root) = self.head_tree(branch)? else {
            return Ok(None);
        };
        let Some(canonical) = self.tree_ops().resolve_tree_id(&root, tree_name)? else {
            return Ok(None);
        };
        Ok(self
            .index_engine()
            .index_for(tree_name, attribute_name, &canonical)?)
    }

    /// Bring each index up to date with the history of `branch`, one
    /// thread per index. Results are in the order of `infos`.
    pub fn build_indexes(&self, branch: &str, infos: &[IndexInfo]) -> Vec<RepoResult<HistoryReport>> {
        thread::scope(|scope| {
            let workers: Vec<_> = infos
                .iter()
                .map(|info| {
                    scope.spawn(move || {
                        self.index_engine()
                            .build_full_history_index(info, branch)
                            .map_err(RepoError::from)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }

    /// Bring every index defined on `tree_name` up to date with `branch`.
    pub fn update_indexes(&self, branch: &str, tree_name: &str) -> RepoResult<Vec<HistoryReport>> {
        let infos = self.indexes.index_infos(tree_name)?;
        self.build_indexes(branch, &infos).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, Point};
    use geovc_index::{IndexError, IndexType, BOUNDS_KEY};
    use geovc_refs::RefError;
    use geovc_store::{AttributeDescriptor, RevFeature, RevFeatureType};
    use geovc_types::{AttributeType, Envelope};

    const BRANCH: &str = "main";

    fn repo() -> Repository {
        Repository::in_memory(RepoConfig::for_user("tester", "tester@example.com"))
    }

    fn point_type() -> RevFeatureType {
        RevFeatureType::new(
            "point",
            vec![
                AttributeDescriptor::geometry("geom", "EPSG:4326"),
                AttributeDescriptor::new("name", AttributeType::String),
            ],
        )
    }

    fn point(name: &str, x: f64, y: f64) -> (String, RevFeature) {
        let geom: Geometry<f64> = Point::new(x, y).into();
        (name.to_string(), RevFeature::new(vec![geom.into(), name.into()]))
    }

    /// Publish one commit per batch of points under `points`.
    fn commit_batches(repo: &Repository, batches: &[&[(&str, f64, f64)]]) -> (ObjectId, Vec<ObjectId>) {
        let mut commits = Vec::new();
        let mut ft = ObjectId::NULL;
        for batch in batches {
            let mut tx = repo.begin(BRANCH).unwrap();
            ft = tx.put_feature_type(point_type()).unwrap();
            tx.insert_features(
                "points",
                &ft,
                batch.iter().map(|(name, x, y)| point(name, *x, *y)),
            )
            .unwrap();
            commits.push(tx.commit("batch").unwrap());
            tx.publish().unwrap();
        }
        (ft, commits)
    }

    fn quad_request(repo: &Repository, ft: ObjectId) -> CreateIndexRequest {
        let canonical = repo
            .tree_ops()
            .resolve_tree_id(&repo.head_tree(BRANCH).unwrap().unwrap(), "points")
            .unwrap()
            .unwrap();
        CreateIndexRequest::new()
            .tree_name("points")
            .attribute_name("geom")
            .index_type(IndexType::QuadTree)
            .canonical_tree(canonical)
            .feature_type_id(ft)
    }

    #[test]
    fn begin_rejects_bad_branch_name() {
        let repo = repo();
        let err = repo.begin("bad..name").err().unwrap();
        assert!(matches!(err, RepoError::Ref(RefError::InvalidBranchName { .. })));
    }

    #[test]
    fn head_tree_follows_branch() {
        let repo = repo();
        assert_eq!(repo.head_tree(BRANCH).unwrap(), None);
        let (_, commits) = commit_batches(&repo, &[&[("a", 1.0, 1.0)]]);
        let commit = repo.store().get_commit(&commits[0]).unwrap();
        assert_eq!(repo.head_tree(BRANCH).unwrap(), Some(commit.tree_id));
    }

    #[test]
    fn open_persists_objects_and_refs() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepoConfig::for_user("tester", "tester@example.com");
        let head = {
            let repo = Repository::open(dir.path(), config.clone()).unwrap();
            commit_batches(&repo, &[&[("a", 1.0, 1.0)]]).1[0]
        };
        let repo = Repository::open(dir.path(), config).unwrap();
        assert_eq!(repo.branch_head(BRANCH).unwrap(), Some(head));
        let root = repo.head_tree(BRANCH).unwrap().unwrap();
        let node = repo.tree_ops().resolve_path(&root, "points/a").unwrap();
        assert!(node.is_some());
    }

    // ----------------------------------------------------------------
    // Indexes
    // ----------------------------------------------------------------

    #[test]
    fn open_persists_index_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepoConfig::for_user("tester", "tester@example.com");
        let created = {
            let repo = Repository::open(dir.path(), config.clone()).unwrap();
            let (ft, _) = commit_batches(&repo, &[&[("a", 1.0, 1.0)]]);
            repo.create_index(quad_request(&repo, ft)).unwrap()
        };

        let repo = Repository::open(dir.path(), config).unwrap();
        assert_eq!(
            repo.index_database().get_index_info("points", "geom").unwrap(),
            Some(created.info.clone())
        );
        assert_eq!(repo.index_at(BRANCH, "points", "geom").unwrap(), Some(created));
    }

    #[test]
    fn create_index_takes_bounds_from_crs() {
        let repo = repo();
        let (ft, _) = commit_batches(&repo, &[&[("a", 1.0, 1.0), ("b", -10.0, 40.0)]]);
        let index = repo.create_index(quad_request(&repo, ft)).unwrap();
        assert_eq!(
            index.info.bounds(),
            Some(Envelope::new(-180.0, -90.0, 180.0, 90.0))
        );
        assert_eq!(index.size(repo.store()).unwrap(), 2);
        assert_eq!(repo.index_at(BRANCH, "points", "geom").unwrap(), Some(index));
    }

    #[test]
    fn index_at_missing_tree_or_branch() {
        let repo = repo();
        assert_eq!(repo.index_at(BRANCH, "points", "geom").unwrap(), None);
        commit_batches(&repo, &[&[("a", 1.0, 1.0)]]);
        assert_eq!(repo.index_at(BRANCH, "points", "geom").unwrap(), None);
        assert_eq!(repo.index_at(BRANCH, "roads", "geom").unwrap(), None);
    }

    #[test]
    fn update_indexes_covers_new_commits() {
        let repo = repo();
        let (ft, _) = commit_batches(&repo, &[&[("a", 1.0, 1.0)]]);
        repo.create_index(quad_request(&repo, ft).metadata(BOUNDS_KEY, Envelope::new(0.0, 0.0, 10.0, 10.0)))
            .unwrap();
        commit_batches(&repo, &[&[("b", 2.0, 2.0)], &[("c", 3.0, 3.0)]]);

        let reports = repo.update_indexes(BRANCH, "points").unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].commits, 3);
        assert_eq!(reports[0].reused, 1);
        assert_eq!(reports[0].built, 2);

        let index = repo.index_at(BRANCH, "points", "geom").unwrap().unwrap();
        assert_eq!(index.indexed_tree_id, reports[0].head_indexed_tree);
        let names: Vec<String> = index
            .query(repo.store(), &Envelope::new(1.5, 1.5, 3.5, 3.5))
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn build_indexes_runs_each_index() {
        let repo = repo();
        commit_batches(&repo, &[&[("a", 1.0, 1.0)], &[("b", 2.0, 2.0)]]);
        let engine = repo.index_engine();
        let quad = engine
            .create_index_info(
                IndexInfo::new("points", "geom", IndexType::QuadTree)
                    .with_metadata(BOUNDS_KEY, Envelope::new(0.0, 0.0, 10.0, 10.0)),
            )
            .unwrap();
        let by_name = engine
            .create_index_info(IndexInfo::new("points", "name", IndexType::Attribute))
            .unwrap();
        let missing = IndexInfo::new("roads", "geom", IndexType::QuadTree)
            .with_metadata(BOUNDS_KEY, Envelope::new(0.0, 0.0, 10.0, 10.0));
        repo.index_database().create_index_info(missing.clone()).unwrap();

        let results = repo.build_indexes(BRANCH, &[quad, by_name, missing]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().built, 2);
        assert_eq!(results[1].as_ref().unwrap().built, 2);
        assert!(matches!(results[2], Err(RepoError::Index(IndexError::State(_)))));
    }

    #[test]
    fn drop_index_forgets_mappings() {
        let repo = repo();
        let (ft, _) = commit_batches(&repo, &[&[("a", 1.0, 1.0)]]);
        repo.create_index(quad_request(&repo, ft)).unwrap();
        assert!(repo.drop_index("points", "geom").unwrap());
        assert!(!repo.drop_index("points", "geom").unwrap());
        assert_eq!(repo.index_at(BRANCH, "points", "geom").unwrap(), None);
    }
}
